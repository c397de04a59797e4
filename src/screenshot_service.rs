//! Screenshot pipeline: shape the render command, call the backend once,
//! translate its reply.
//!
//! No retries are attempted. Every backend failure is surfaced to the caller
//! as a [`GatewayError`].

use crate::backend::RenderBackend;
use crate::config::{Config, OutputFormat};
use crate::error::GatewayError;
use crate::metrics;
use crate::render::{RenderParams, RenderRequestBuilder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Image bytes ready to be returned to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Drives a single capture against the rendering backend
///
/// # Examples
///
/// ```rust,no_run
/// use screencurl::{Config, DeviceCatalog, HttpBackend, RenderParams, ScreenshotService};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let service = ScreenshotService::new(
///         &config,
///         Arc::new(DeviceCatalog::builtin()),
///         Arc::new(HttpBackend::default()),
///     );
///
///     let params = RenderParams { url: "https://example.com", ..Default::default() };
///     let screenshot = service.capture(&params).await?;
///     println!("Captured {} bytes", screenshot.data.len());
///     Ok(())
/// }
/// ```
pub struct ScreenshotService {
    builder: RenderRequestBuilder,
    backend: Arc<dyn RenderBackend>,
    render_url: String,
    request_timeout: Duration,
}

impl ScreenshotService {
    pub fn new(
        config: &Config,
        catalog: Arc<crate::devices::DeviceCatalog>,
        backend: Arc<dyn RenderBackend>,
    ) -> Self {
        Self {
            builder: RenderRequestBuilder::new(config, catalog),
            backend,
            render_url: config.render_url(),
            request_timeout: config.request_timeout,
        }
    }

    pub fn builder(&self) -> &RenderRequestBuilder {
        &self.builder
    }

    pub async fn capture(&self, params: &RenderParams<'_>) -> Result<Screenshot, GatewayError> {
        let request = self.builder.build(params)?;
        debug!(
            url = %request.url,
            width = request.viewport.width,
            height = request.viewport.height,
            "Sending render request to {}",
            self.render_url
        );

        let start_time = Instant::now();
        let result = timeout(
            self.request_timeout,
            self.backend.post(&self.render_url, &request, self.request_timeout),
        )
        .await;
        metrics::record_backend_call(start_time.elapsed());

        let response = match result {
            Ok(response) => response?,
            Err(_) => return Err(GatewayError::Timeout(self.request_timeout)),
        };

        if response.status != 200 {
            return Err(GatewayError::upstream(
                response.status,
                &String::from_utf8_lossy(&response.body),
            ));
        }

        Ok(Screenshot {
            data: response.body,
            content_type: response
                .content_type
                .filter(|ct| !ct.is_empty())
                .unwrap_or_else(|| OutputFormat::Png.content_type().to_string()),
        })
    }
}
