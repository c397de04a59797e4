//! Translation of inbound screenshot parameters into a backend render command
//!
//! The builder resolves the viewport (defaults, then device preset, then
//! explicit dimensions) and attaches the fixed capture and navigation options.
//! It never performs I/O; the resulting [`RenderRequest`] is handed to a
//! [`RenderBackend`](crate::backend::RenderBackend).

use crate::config::{Config, OutputFormat, Viewport, WaitUntil};
use crate::devices::DeviceCatalog;
use crate::error::GatewayError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Body of the backend's screenshot command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub url: String,
    pub options: CaptureOptions,
    pub goto_options: NavigationOptions,
    pub viewport: Viewport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOptions {
    pub full_page: bool,
    #[serde(rename = "type")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationOptions {
    pub wait_until: WaitUntil,
    /// Milliseconds
    pub timeout: u64,
}

/// Caller-supplied parameters, already parsed.
#[derive(Debug, Clone, Default)]
pub struct RenderParams<'a> {
    pub url: &'a str,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub device: Option<&'a str>,
}

pub struct RenderRequestBuilder {
    catalog: Arc<DeviceCatalog>,
    default_viewport: Viewport,
    wait_until: WaitUntil,
    page_load_timeout: Duration,
}

impl RenderRequestBuilder {
    pub fn new(config: &Config, catalog: Arc<DeviceCatalog>) -> Self {
        Self {
            catalog,
            default_viewport: config.default_viewport.clone(),
            wait_until: config.wait_until,
            page_load_timeout: config.page_load_timeout,
        }
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    pub fn build(&self, params: &RenderParams<'_>) -> Result<RenderRequest, GatewayError> {
        let mut viewport = self.default_viewport.clone();
        let mut user_agent = None;

        if let Some(device) = params.device {
            let preset = self
                .catalog
                .lookup(device)
                .ok_or_else(|| GatewayError::InvalidDevice {
                    device: device.to_string(),
                    known: self.catalog.identifiers(),
                })?;
            viewport = preset.viewport.clone();
            user_agent = preset.user_agent.clone();
        }

        if let Some(width) = params.width {
            viewport.width = positive("width", width)?;
        }
        if let Some(height) = params.height {
            viewport.height = positive("height", height)?;
        }

        Ok(RenderRequest {
            url: params.url.to_string(),
            options: CaptureOptions {
                full_page: true,
                format: OutputFormat::Png,
            },
            goto_options: NavigationOptions {
                wait_until: self.wait_until,
                timeout: self.page_load_timeout.as_millis() as u64,
            },
            viewport,
            user_agent,
        })
    }
}

fn positive(name: &'static str, value: u32) -> Result<u32, GatewayError> {
    if value == 0 {
        return Err(GatewayError::InvalidParameter {
            name,
            reason: "must be a positive integer".to_string(),
        });
    }
    Ok(value)
}

/// Parses a `width`/`height` query value.
pub fn parse_dimension(name: &'static str, raw: Option<&str>) -> Result<Option<u32>, GatewayError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let value = raw.parse::<u32>().map_err(|_| GatewayError::InvalidParameter {
        name,
        reason: format!("'{raw}' is not a positive integer"),
    })?;
    positive(name, value).map(Some)
}
