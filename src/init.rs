use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::AskPipeline;
use crate::upstream::{GenerationParams, ZhipuFactory};

const DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub upstream: UpstreamConfig,
}

#[derive(Clone)]
pub struct UpstreamConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Option<Duration>,
    pub params: GenerationParams,
}

// Keeps the credential out of startup logs.
impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<set>"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("params", &self.params)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn Error>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. A missing or blank credential
    /// is allowed here; requests then fail with the "not configured" event.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Box<dyn Error>> {
        let defaults = GenerationParams::default();

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()?,
            upstream: UpstreamConfig {
                api_key: lookup("ZHIPU_API_KEY").filter(|key| !key.trim().is_empty()),
                base_url: lookup("ZHIPU_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                timeout: lookup("UPSTREAM_TIMEOUT_SECS")
                    .map(|secs| secs.parse::<u64>())
                    .transpose()?
                    .map(Duration::from_secs),
                params: GenerationParams {
                    model: lookup("ZHIPU_MODEL").unwrap_or(defaults.model),
                    ..defaults
                },
            },
        })
    }
}

// ============================================================================
// Application State
// ============================================================================

pub struct AppState {
    pub pipeline: Arc<AskPipeline<ZhipuFactory>>,
}

pub fn app_init() -> Result<(Config, Arc<AppState>), Box<dyn Error>> {
    let config = Config::from_env()?;
    log::info!("✅ Configuration loaded");

    let state = build_state(&config);
    if state.pipeline.is_configured() {
        log::info!("✅ AI client will be created on first request");
    } else {
        log::warn!("⚠️  AI credential missing, /ask will answer with an error event");
    }

    Ok((config, state))
}

pub fn build_state(config: &Config) -> Arc<AppState> {
    let factory = ZhipuFactory {
        base_url: config.upstream.base_url.clone(),
        timeout: config.upstream.timeout,
    };
    let pipeline = AskPipeline::new(
        factory,
        config.upstream.api_key.clone(),
        config.upstream.params.clone(),
    );

    Arc::new(AppState {
        pipeline: Arc::new(pipeline),
    })
}
