use serde::{Deserialize, Serialize};

pub const STATUS_THINKING: &str = "thinking";

/// One frame of the `/ask` event stream. Serializes to a single-key JSON
/// object, e.g. `{"content":"..."}` or `{"done":true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEvent {
    Status(String),
    Content(String),
    Formatted(String),
    Done(bool),
    Error(String),
}

impl StreamEvent {
    pub fn thinking() -> Self {
        Self::Status(STATUS_THINKING.to_string())
    }

    pub fn done() -> Self {
        Self::Done(true)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_))
    }
}
