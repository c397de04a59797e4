use crate::config::Config;
use crate::error::GatewayError;
use crate::render::RenderRequest;
use async_trait::async_trait;
use std::time::Duration;

/// Raw reply from the rendering backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Transport to the headless-browser service.
///
/// Implementations report connection failures and timeouts as
/// [`GatewayError::Transport`] / [`GatewayError::Timeout`]; any HTTP status,
/// successful or not, comes back as a [`BackendResponse`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn post(
        &self,
        url: &str,
        body: &RenderRequest,
        timeout: Duration,
    ) -> Result<BackendResponse, GatewayError>;
}

/// [`RenderBackend`] over a shared `reqwest` connection pool.
#[derive(Debug, Clone, Default)]
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RenderBackend for HttpBackend {
    async fn post(
        &self,
        url: &str,
        body: &RenderRequest,
        timeout: Duration,
    ) -> Result<BackendResponse, GatewayError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, timeout))?
            .to_vec();

        Ok(BackendResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Builds the shared client used for every backend call.
pub fn build_http_backend(config: &Config) -> Result<HttpBackend, GatewayError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("screencurl/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(config.request_timeout)
        .build()
        .map_err(|e| GatewayError::Configuration(format!("Cannot build HTTP client: {e}")))?;
    Ok(HttpBackend::new(client))
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(timeout)
    } else {
        GatewayError::from(err)
    }
}
