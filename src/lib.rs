//! chatbridge: OpenAI-compatible chat completion proxy.
//!
//! The binary in `main.rs` is a thin shell around this library; integration
//! tests in `tests/` build the same router against a mock upstream.

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod proxy;
pub mod telemetry;

use models::catalog::ModelMap;
use proxy::upstream::UpstreamClient;

/// Shared application state passed to handlers. Read-only after startup.
pub struct AppState {
    pub config: config::Config,
    pub models: ModelMap,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn from_config(config: config::Config) -> anyhow::Result<Self> {
        let models = ModelMap::with_overrides(&config.model_aliases, config.default_model.as_deref());
        let upstream = UpstreamClient::from_config(&config)?;
        Ok(Self {
            config,
            models,
            upstream,
        })
    }
}
