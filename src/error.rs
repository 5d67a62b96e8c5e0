// src/error.rs

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// HTTP Error Type
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

// ============================================================================
// Error Codes
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Internal => 500,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.http_status() >= 500
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Internal => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

// ============================================================================
// Error Response for HTTP
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: AppError,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: AppError) -> Self {
        Self {
            error,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;
        use axum::http::StatusCode;

        log_error(&self);

        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        (status, Json(ErrorResponse::new(self))).into_response()
    }
}

pub fn log_error(error: &AppError) {
    if error.code.is_server_error() {
        log::error!("{}", error);
    } else {
        log::warn!("{}", error);
    }
}

// ============================================================================
// Upstream (chat-completion service) errors
// ============================================================================

/// Everything that can go wrong talking to the hosted model. The detail is
/// for the server log only and never reaches the event stream.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("client build failed: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream reported error {code}: {message}")]
    Api { code: String, message: String },

    #[error("malformed chunk: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("chunk is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

// ============================================================================
// Pipeline errors (mapped to the terminal `error` event)
// ============================================================================

pub const MSG_NOT_CONFIGURED: &str = "服务器未配置 AI 服务，请联系管理员。";
pub const MSG_CLIENT_INIT_FAILED: &str = "AI 客户端初始化失败，请检查配置。";
pub const MSG_UPSTREAM_UNAVAILABLE: &str = "AI 服务暂时不可用，请稍后再试。";
pub const MSG_EMPTY_QUESTION: &str = "问题不能为空，请提供宠物食品或健康相关的问题。";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("upstream credential is not configured")]
    MissingCredential,

    #[error("upstream client initialization failed: {0}")]
    ClientInit(#[source] UpstreamError),

    #[error("upstream call failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("caller disconnected")]
    Disconnected,
}

impl PipelineError {
    /// Sanitized text for the caller. `None` when nobody is listening anymore.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::MissingCredential => Some(MSG_NOT_CONFIGURED),
            Self::ClientInit(_) => Some(MSG_CLIENT_INIT_FAILED),
            Self::Upstream(_) => Some(MSG_UPSTREAM_UNAVAILABLE),
            Self::Disconnected => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
