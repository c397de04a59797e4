use clap::Parser;
use screencurl::{build_http_backend, setup_logging, AppState, Cli, LogClock};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments (each option also reads its environment variable)
    let args = Cli::parse();

    let config = args.load_config().await?;

    let (clock, timezone_error) = LogClock::from_config(config.timezone.as_deref());
    setup_logging(args.verbose, clock)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;
    if let Some(e) = timezone_error {
        warn!("{}; falling back to UTC", e);
    }

    info!("Starting screencurl v{}", env!("CARGO_PKG_VERSION"));

    let backend = Arc::new(build_http_backend(&config)?);
    let mut state = AppState::new(config.clone(), backend);
    if config.metrics_enabled {
        let handle = screencurl::metrics::install_prometheus()?;
        state = state.with_prometheus(handle);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!("screencurl service listening at http://localhost:{}", config.port);
    info!("Using Browserless at {}", config.browserless_url);
    info!(
        "Authentication: {}",
        if config.auth_required() { "required" } else { "disabled" }
    );
    info!(
        "Default viewport: {}x{}, wait until: {}",
        config.default_viewport.width, config.default_viewport.height, config.wait_until
    );
    info!("Rate limit: one capture per URL every {:?}", config.cooldown);

    screencurl::serve(listener, Arc::new(state)).await?;

    info!("screencurl stopped");
    Ok(())
}
