use anyhow::Context;
use placement_api::config::{resolve_hostname, Config};
use placement_api::logging;
use placement_api::metadata::{HttpZoneLookup, MetadataCache, MetadataFetcher};
use placement_api::server::{
    bind, build_router, run_server, shutdown_channel, termination_signals, AppState,
    ShutdownCoordinator, Termination,
};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();

    // Initialize logging before anything can fail
    let filter = config
        .as_ref()
        .map(|c| c.log_filter.clone())
        .unwrap_or_else(|_| "info".to_string());
    if let Err(e) = logging::init(&filter) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    logging::install_panic_hook();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(termination) => ExitCode::from(termination.exit_code()),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Server failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<Termination> {
    let hostname = resolve_hostname();

    // Create shutdown channel for coordinated shutdown
    let (controller, _signal) = shutdown_channel();
    let mut coordinator = ShutdownCoordinator::new(controller, config.shutdown_timeout);

    // Resolve placement in the background; requests are served meanwhile
    let metadata = MetadataCache::new();
    let lookup = HttpZoneLookup::new(config.metadata_url.as_str())
        .context("Failed to build metadata client")?;
    let fetcher = MetadataFetcher::new(metadata.clone(), lookup, config.metadata_timeout);
    tokio::spawn(async move {
        fetcher.fetch().await;
    });

    let state = AppState::new(coordinator.state(), metadata, hostname.clone());
    let router = build_router(state);

    let signals = termination_signals().context("Failed to register signal handlers")?;
    let listener = bind(config.port)
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;

    info!(
        port = config.port,
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        pid = std::process::id(),
        hostname = %hostname,
        "Server started successfully"
    );

    Ok(run_server(listener, router, &mut coordinator, signals).await)
}
