use crate::access_log::LogClock;
use crate::config::{Config, WaitUntil};
use crate::error::GatewayError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Default)]
#[command(name = "screencurl")]
#[command(about = "Screenshot gateway in front of a headless-browser rendering service")]
#[command(version)]
pub struct Cli {
    #[arg(long, help = "JSON configuration file providing base settings")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "BROWSERLESS_URL", help = "Base URL of the rendering backend")]
    pub browserless_url: Option<String>,

    #[arg(short, long, env = "PORT", help = "Port to listen on")]
    pub port: Option<u16>,

    #[arg(long, env = "TOKENS", help = "Comma-separated API tokens (empty disables auth)")]
    pub tokens: Option<String>,

    #[arg(long, env = "DEFAULT_VIEWPORT_WIDTH", help = "Default viewport width")]
    pub default_viewport_width: Option<u32>,

    #[arg(long, env = "DEFAULT_VIEWPORT_HEIGHT", help = "Default viewport height")]
    pub default_viewport_height: Option<u32>,

    #[arg(long, env = "WAIT_FOR_LOAD", help = "Page-load event to wait for (load, domcontentloaded, networkidle0, networkidle2)")]
    pub wait_for_load: Option<WaitUntil>,

    #[arg(long, env = "TIMEZONE", help = "Timezone for log timestamps (UTC or an offset like +02:00)")]
    pub timezone: Option<String>,

    #[arg(long, env = "RATE_LIMIT_SECONDS", help = "Cooldown between captures of the same URL, in seconds")]
    pub rate_limit_seconds: Option<u64>,

    #[arg(long, env = "METRICS", help = "Expose Prometheus metrics on /metrics")]
    pub metrics: bool,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,
}

impl Cli {
    /// Applies CLI/environment overrides on top of `base`.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(url) = &self.browserless_url {
            config.browserless_url = url.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(tokens) = &self.tokens {
            config.tokens = parse_tokens(tokens);
        }
        if let Some(width) = self.default_viewport_width {
            config.default_viewport.width = width;
        }
        if let Some(height) = self.default_viewport_height {
            config.default_viewport.height = height;
        }
        if let Some(wait_until) = self.wait_for_load {
            config.wait_until = wait_until;
        }
        if let Some(timezone) = &self.timezone {
            config.timezone = Some(timezone.clone());
        }
        if let Some(seconds) = self.rate_limit_seconds {
            config.cooldown = Duration::from_secs(seconds);
        }
        if self.metrics {
            config.metrics_enabled = true;
        }
        config
    }

    /// Loads the optional config file, applies overrides and validates the result.
    pub async fn load_config(&self) -> Result<Config, GatewayError> {
        let base = match &self.config {
            Some(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                    GatewayError::Configuration(format!("Cannot read {}: {e}", path.display()))
                })?;
                serde_json::from_str(&content).map_err(|e| {
                    GatewayError::Configuration(format!("Invalid config file {}: {e}", path.display()))
                })?
            }
            None => Config::default(),
        };

        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }
}

/// Splits a comma-separated token list, dropping blanks.
pub fn parse_tokens(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn setup_logging(verbose: bool, clock: LogClock) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(clock)
        .with_target(false)
        .try_init()
}
