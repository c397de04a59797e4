//! HTTP gateway: routes, per-request wiring and response translation.
//!
//! A `/screenshot` request runs through authentication, access counting and
//! logging, the per-URL cooldown, render-request shaping and finally the
//! backend call. Each stage can short-circuit with a [`GatewayError`], which
//! renders as a JSON body with the matching status code.

use crate::access_log::{log_request, AccessCounter, LogClock, RequestEvent};
use crate::auth::{AuthOutcome, Authenticator};
use crate::backend::RenderBackend;
use crate::config::Config;
use crate::devices::{DeviceCatalog, DevicePreset};
use crate::error::GatewayError;
use crate::metrics;
use crate::rate_limit::{Admission, CooldownLimiter};
use crate::render::{parse_dimension, RenderParams};
use crate::screenshot_service::{Screenshot, ScreenshotService};
use axum::extract::{ConnectInfo, RawQuery, Request, State};
use axum::http::{header, Extensions, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::any::Any;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Client identifier used when the peer address is not available.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// State shared by every handler.
pub struct AppState {
    pub config: Config,
    pub authenticator: Authenticator,
    pub limiter: CooldownLimiter,
    pub access: AccessCounter,
    pub catalog: Arc<DeviceCatalog>,
    pub service: ScreenshotService,
    pub clock: LogClock,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn RenderBackend>) -> Self {
        let catalog = Arc::new(DeviceCatalog::builtin());
        let (clock, _) = LogClock::from_config(config.timezone.as_deref());

        Self {
            authenticator: Authenticator::new(config.tokens.iter().cloned()),
            limiter: CooldownLimiter::new(config.cooldown),
            access: AccessCounter::new(),
            service: ScreenshotService::new(&config, catalog.clone(), backend),
            catalog,
            clock,
            prometheus: None,
            config,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ScreenshotQuery {
    pub url: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub device: Option<String>,
    pub token: Option<String>,
}

impl ScreenshotQuery {
    /// Decodes a raw query string. The first occurrence of a repeated key
    /// wins and unknown keys are ignored, so decoding never fails.
    pub fn from_raw(raw: Option<&str>) -> Self {
        let mut query = Self::default();
        for (key, value) in url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
            let slot = match &*key {
                "url" => &mut query.url,
                "width" => &mut query.width,
                "height" => &mut query.height,
                "device" => &mut query.device,
                "token" => &mut query.token,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        query
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/devices", get(devices_handler))
        .route("/screenshot", get(screenshot_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
}

/// Serves the gateway until SIGINT/SIGTERM.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unexpected failure while handling request".to_string()
    };
    GatewayError::Internal(detail).into_response()
}

async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let viewport = &state.config.default_viewport;
    Json(serde_json::json!({
        "message": "Welcome to screencurl. Use /screenshot?url=https://example.com to get screenshots.",
        "auth_required": state.authenticator.is_enabled(),
        "default_resolution": format!("{}x{}", viewport.width, viewport.height),
        "wait_until": state.config.wait_until,
        "devices_hint": "Add &device=<name> to emulate a device. See /devices for the list.",
        "cooldown_seconds": state.limiter.cooldown().as_secs(),
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": state.clock.now_rfc3339(),
    }))
}

async fn devices_handler(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, DevicePreset>> {
    Json(
        state
            .catalog
            .list_all()
            .map(|(id, preset)| (id.to_string(), preset.clone()))
            .collect(),
    )
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": "Metrics are disabled" })),
        )
            .into_response(),
    }
}

async fn screenshot_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
    request: Request,
) -> Response {
    let client = client_id(request.extensions());
    let query = ScreenshotQuery::from_raw(raw.as_deref());

    match take_screenshot(&state, &query, request.headers(), &client).await {
        Ok(screenshot) => {
            metrics::record_request("ok");
            screenshot_response(screenshot, state.limiter.cooldown().as_secs())
        }
        Err(e) => {
            metrics::record_request(e.outcome());
            e.into_response()
        }
    }
}

async fn take_screenshot(
    state: &AppState,
    query: &ScreenshotQuery,
    headers: &HeaderMap,
    client: &str,
) -> Result<Screenshot, GatewayError> {
    if let AuthOutcome::Unauthorized = state
        .authenticator
        .authenticate_request(query.token.as_deref(), headers)
    {
        return Err(GatewayError::Unauthorized);
    }

    let count = state.access.record(client);
    let request_id = uuid::Uuid::new_v4().to_string();
    log_request(&RequestEvent {
        request_id: &request_id,
        client,
        count,
        url: query.url.as_deref(),
        device: query.device.as_deref(),
        width: query.width.as_deref(),
        height: query.height.as_deref(),
    });

    let url = query
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or(GatewayError::MissingParameter("url"))?;
    let width = parse_dimension("width", query.width.as_deref())?;
    let height = parse_dimension("height", query.height.as_deref())?;
    let device = query.device.as_deref().map(str::trim).filter(|d| !d.is_empty());

    // Devices resolve after admission: an unknown device still spends the cooldown.
    if let Admission::Rejected { retry_after } = state.limiter.try_admit(url, Instant::now()) {
        return Err(GatewayError::RateLimited { retry_after });
    }

    state
        .service
        .capture(&RenderParams {
            url,
            width,
            height,
            device,
        })
        .await
}

fn screenshot_response(screenshot: Screenshot, max_age: u64) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, screenshot.content_type),
            (header::CACHE_CONTROL, format!("public, max-age={max_age}")),
        ],
        screenshot.data,
    )
        .into_response()
}

fn client_id(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
