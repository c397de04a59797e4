use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;
use thiserror::Error;

/// Longest slice of a backend error body embedded in an upstream error.
pub const UPSTREAM_DETAIL_LIMIT: usize = 200;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("{0} parameter is required")]
    MissingParameter(&'static str),

    #[error("Invalid {name} parameter: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Unknown device '{device}'. Available devices: {}", .known.join(", "))]
    InvalidDevice { device: String, known: Vec<String> },

    #[error("Invalid or missing API token")]
    Unauthorized,

    #[error("Rate limit exceeded. Try again in {} seconds.", retry_after_secs(.retry_after))]
    RateLimited { retry_after: Duration },

    #[error("Error from browserless service ({status}): {detail}")]
    Upstream { status: u16, detail: String },

    #[error("Screenshot request error: {0}")]
    Transport(String),

    #[error("Screenshot request error: timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Builds an upstream error, keeping only the first characters of the body.
    pub fn upstream(status: u16, body: &str) -> Self {
        GatewayError::Upstream {
            status,
            detail: body.chars().take(UPSTREAM_DETAIL_LIMIT).collect(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingParameter(_)
            | GatewayError::InvalidParameter { .. }
            | GatewayError::InvalidDevice { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream { .. }
            | GatewayError::Transport(_)
            | GatewayError::Timeout(_)
            | GatewayError::Internal(_)
            | GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GatewayError::MissingParameter(_)
            | GatewayError::InvalidParameter { .. }
            | GatewayError::InvalidDevice { .. }
            | GatewayError::RateLimited { .. } => ErrorSeverity::Low,
            GatewayError::Unauthorized
            | GatewayError::Upstream { .. }
            | GatewayError::Transport(_)
            | GatewayError::Timeout(_) => ErrorSeverity::Medium,
            GatewayError::Internal(_) | GatewayError::Configuration(_) => ErrorSeverity::High,
        }
    }

    /// Label used for the `outcome` dimension of the request counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::MissingParameter(_)
            | GatewayError::InvalidParameter { .. }
            | GatewayError::InvalidDevice { .. } => "bad_request",
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::Upstream { .. } => "upstream_error",
            GatewayError::Transport(_) | GatewayError::Timeout(_) => "transport_error",
            GatewayError::Internal(_) | GatewayError::Configuration(_) => "internal_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

fn retry_after_secs(retry_after: &Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        match self.severity() {
            ErrorSeverity::Low => tracing::debug!(%detail, "request rejected"),
            ErrorSeverity::Medium => tracing::warn!(%detail, "request failed"),
            ErrorSeverity::High => tracing::error!(%detail, "request failed"),
        }

        let mut response =
            (self.status_code(), Json(serde_json::json!({ "detail": detail }))).into_response();

        if let GatewayError::RateLimited { retry_after } = &self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs(retry_after)),
            );
        }

        response
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}
