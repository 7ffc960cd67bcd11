use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.mistral.ai/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Base URL of the backend; `/chat/completions` is appended to it.
    pub upstream_url: String,
    pub upstream_api_key: String,
    /// Bound on waiting for upstream response headers. `None` waits forever.
    pub upstream_timeout: Option<Duration>,
    /// Extra `client=backend` model aliases from CHATBRIDGE_MODEL_ALIASES.
    pub model_aliases: Vec<(String, String)>,
    pub default_model: Option<String>,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            upstream_url: DEFAULT_UPSTREAM_URL.into(),
            upstream_api_key: String::new(),
            upstream_timeout: None,
            model_aliases: Vec::new(),
            default_model: None,
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.upstream_url.trim_end_matches('/'))
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Builds a [`Config`] from any key lookup; `load` passes the process env.
pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
    let upstream_api_key = lookup("CHATBRIDGE_UPSTREAM_API_KEY").unwrap_or_default();

    if upstream_api_key.is_empty() {
        let env_mode = lookup("CHATBRIDGE_ENV")
            .or_else(|| lookup("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "CHATBRIDGE_UPSTREAM_API_KEY is not set. \
                 Set the backend credential before running in production."
            );
        }
        eprintln!("⚠️  CHATBRIDGE_UPSTREAM_API_KEY is not set; upstream calls will be unauthenticated.");
    }

    let upstream_url = lookup("CHATBRIDGE_UPSTREAM_URL")
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.into());
    validate_upstream_url(&upstream_url)?;

    let upstream_timeout = match lookup("CHATBRIDGE_UPSTREAM_TIMEOUT_SECS") {
        Some(raw) if !raw.trim().is_empty() => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid CHATBRIDGE_UPSTREAM_TIMEOUT_SECS: {raw}"))?;
            (secs > 0).then(|| Duration::from_secs(secs))
        }
        _ => None,
    };

    let port = match lookup("CHATBRIDGE_PORT") {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid CHATBRIDGE_PORT: {raw}"))?,
        _ => DEFAULT_PORT,
    };

    let log_format = match lookup("CHATBRIDGE_LOG_FORMAT").as_deref().map(str::trim) {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Text,
    };

    Ok(Config {
        port,
        upstream_url,
        upstream_api_key,
        upstream_timeout,
        model_aliases: parse_aliases(&lookup("CHATBRIDGE_MODEL_ALIASES").unwrap_or_default())?,
        default_model: lookup("CHATBRIDGE_DEFAULT_MODEL")
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()),
        log_format,
    })
}

pub fn validate_upstream_url(raw: &str) -> anyhow::Result<()> {
    let parsed = url::Url::parse(raw).with_context(|| format!("invalid upstream URL: {raw}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("upstream URL must be http or https, got '{}'", parsed.scheme());
    }
    Ok(())
}

/// Parses `client=backend,client2=backend2`. Blank entries are skipped.
fn parse_aliases(raw: &str) -> anyhow::Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| -> anyhow::Result<(String, String)> {
            let (client, backend) = entry
                .split_once('=')
                .with_context(|| format!("model alias '{entry}' must look like client=backend"))?;
            let (client, backend) = (client.trim(), backend.trim());
            if client.is_empty() || backend.is_empty() {
                anyhow::bail!("model alias '{entry}' has an empty side");
            }
            Ok((client.to_string(), backend.to_string()))
        })
        .collect()
}
