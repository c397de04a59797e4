//! Configuration management with serde serialization/deserialization
//!
//! This module provides the configuration structures shared by the gateway:
//! backend location, authentication tokens, the default viewport, the page-load
//! wait strategy and the rate-limit / timeout windows.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure for the gateway
///
/// Built once at startup (from a JSON file, CLI flags and environment variables)
/// and handed to each component, which copies out the parts it needs.
///
/// # Examples
///
/// ```rust
/// use screencurl::Config;
///
/// // Use default configuration
/// let config = Config::default();
/// assert!(config.validate().is_ok());
///
/// // Require a token on /screenshot
/// let config = Config {
///     tokens: vec!["secret".to_string()],
///     ..Default::default()
/// };
/// assert!(config.auth_required());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base address of the headless-browser rendering service (default: http://localhost:9897)
    pub browserless_url: String,

    /// Path of the render command on the backend (default: /screenshot)
    pub render_endpoint: String,

    /// Port the gateway listens on (default: 9898)
    pub port: u16,

    /// Accepted API tokens (default: empty)
    ///
    /// An empty list disables authentication entirely.
    pub tokens: Vec<String>,

    /// Viewport used when neither a device preset nor explicit dimensions are given
    pub default_viewport: Viewport,

    /// Page-load event the backend waits for before capturing (default: networkidle0)
    pub wait_until: WaitUntil,

    /// Timezone used for log timestamps (default: UTC)
    ///
    /// Accepts `UTC` or a fixed offset such as `+02:00`.
    pub timezone: Option<String>,

    /// Minimum time between two admitted captures of the same URL (default: 10 seconds)
    pub cooldown: Duration,

    /// Overall timeout for the backend call (default: 30 seconds)
    pub request_timeout: Duration,

    /// Navigation timeout the backend applies while loading the page (default: 25 seconds)
    ///
    /// Must stay below `request_timeout` so a page-load failure reported by the
    /// backend is distinguishable from a transport timeout.
    pub page_load_timeout: Duration,

    /// Install the Prometheus recorder and serve `/metrics` (default: false)
    pub metrics_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browserless_url: "http://localhost:9897".to_string(),
            render_endpoint: "/screenshot".to_string(),
            port: 9898,
            tokens: Vec::new(),
            default_viewport: Viewport::default(),
            wait_until: WaitUntil::default(),
            timezone: None,
            cooldown: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            page_load_timeout: Duration::from_secs(25),
            metrics_enabled: false,
        }
    }
}

impl Config {
    pub fn auth_required(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Full URL of the backend render command.
    pub fn render_url(&self) -> String {
        format!(
            "{}/{}",
            self.browserless_url.trim_end_matches('/'),
            self.render_endpoint.trim_start_matches('/')
        )
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.default_viewport.width == 0 || self.default_viewport.height == 0 {
            return Err(GatewayError::Configuration(
                "Viewport dimensions must be greater than 0".to_string(),
            ));
        }

        if !(self.default_viewport.device_scale_factor > 0.0) {
            return Err(GatewayError::Configuration(
                "Device scale factor must be greater than 0".to_string(),
            ));
        }

        if self.cooldown.is_zero() {
            return Err(GatewayError::Configuration(
                "Rate limit cooldown must be greater than 0".to_string(),
            ));
        }

        if self.page_load_timeout >= self.request_timeout {
            return Err(GatewayError::Configuration(format!(
                "Page load timeout ({:?}) must be shorter than the request timeout ({:?})",
                self.page_load_timeout, self.request_timeout
            )));
        }

        match url::Url::parse(&self.browserless_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
            Ok(parsed) => Err(GatewayError::Configuration(format!(
                "Backend URL must use http or https, got {}",
                parsed.scheme()
            ))),
            Err(e) => Err(GatewayError::Configuration(format!(
                "Invalid backend URL {}: {e}",
                self.browserless_url
            ))),
        }
    }
}

/// Rendering surface used by the backend when capturing a page
///
/// Serialized in the backend's camelCase wire format.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    /// Viewport width in pixels (default: 1280)
    pub width: u32,

    /// Viewport height in pixels (default: 800)
    pub height: u32,

    /// Device pixel ratio for high-DPI displays (default: 1.0)
    ///
    /// Values > 1.0 simulate high-density displays like Retina screens.
    pub device_scale_factor: f64,

    /// Whether to emulate a mobile device (default: false)
    pub is_mobile: bool,

    /// Whether touch events are supported (default: false)
    pub has_touch: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::desktop(1280, 800)
    }
}

impl Viewport {
    /// Non-mobile viewport at scale 1 with the given dimensions.
    pub const fn desktop(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            device_scale_factor: 1.0,
            is_mobile: false,
            has_touch: false,
        }
    }
}

/// Page-load event the backend waits for before taking the capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum WaitUntil {
    #[serde(rename = "load")]
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    /// No network connections for at least 500 ms
    #[default]
    #[serde(rename = "networkidle0")]
    NetworkIdle0,
    /// No more than two network connections for at least 500 ms
    #[serde(rename = "networkidle2")]
    NetworkIdle2,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle0 => "networkidle0",
            WaitUntil::NetworkIdle2 => "networkidle2",
        }
    }
}

impl fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaitUntil {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "load" => Ok(WaitUntil::Load),
            "domcontentloaded" => Ok(WaitUntil::DomContentLoaded),
            "networkidle0" => Ok(WaitUntil::NetworkIdle0),
            "networkidle2" => Ok(WaitUntil::NetworkIdle2),
            other => Err(format!(
                "unknown wait strategy '{other}' (expected load, domcontentloaded, networkidle0 or networkidle2)"
            )),
        }
    }
}

/// Image format requested from the backend
///
/// Captures are always PNG; the type also supplies the fallback content type
/// when the backend does not declare one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
        }
    }
}
