//! # screencurl
//!
//! A small HTTP gateway that forwards screenshot requests to a headless-browser
//! rendering backend (a browserless-compatible `/screenshot` endpoint).
//!
//! On top of the backend it adds:
//!
//! - **Per-URL cooldown**: the same URL string is captured at most once per
//!   window (10 seconds by default); repeats get `429 Too Many Requests`
//! - **Token authentication**: optional allow-list, checked in the `token`
//!   query parameter, the `X-API-Token` header and the `token` cookie
//! - **Device emulation**: named presets (`iphone13`, `desktop-hd`, ...) that
//!   set viewport, pixel density, touch/mobile flags and user agent
//! - **Request logging**: per-client access counts and one structured log
//!   event per attempt
//!
//! ## Endpoints
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /` | Status and usage hints |
//! | `GET /devices` | Known device presets |
//! | `GET /screenshot?url=..&width=..&height=..&device=..` | Capture a page |
//! | `GET /health` | Liveness probe |
//! | `GET /metrics` | Prometheus metrics (when enabled) |
//!
//! ## Quick Start
//!
//! ```bash
//! BROWSERLESS_URL=http://localhost:3000 TOKENS=secret screencurl
//! curl -H 'X-API-Token: secret' 'http://localhost:9898/screenshot?url=https://example.com&device=iphone13' -o shot.png
//! ```

/// Configuration and settings for the gateway
pub mod config;

/// Error types and HTTP error translation
pub mod error;

/// Device emulation presets
pub mod devices;

/// Per-URL cooldown rate limiting
pub mod rate_limit;

/// Per-client access counts and request logging
pub mod access_log;

/// API token authentication
pub mod auth;

/// Render request shaping
pub mod render;

/// Rendering backend transport
pub mod backend;

/// Backend invocation and outcome translation
pub mod screenshot_service;

/// Metrics recording and Prometheus export
pub mod metrics;

/// HTTP routes and request pipeline
pub mod server;

/// Command-line interface and logging setup
pub mod cli;

#[cfg(test)]
mod tests;

pub use access_log::*;
pub use auth::*;
pub use backend::*;
pub use cli::*;
pub use config::*;
pub use devices::*;
pub use error::*;
pub use rate_limit::*;
pub use render::*;
pub use screenshot_service::*;
pub use server::*;
