use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use staybook::config::ServerConfig;
use staybook::directory::{Directories, HttpDirectory, StaticDirectory};
use staybook::http::{AppState, build_app_router};
use staybook::tenant::TenantManager;

const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(5);

fn directories(config: &ServerConfig) -> Result<Directories, Box<dyn std::error::Error>> {
    if let Some((apartments_url, users_url)) = config.remote_directory() {
        info!(apartments_url, users_url, "using HTTP directory");
        let http = HttpDirectory::new(apartments_url, users_url, DIRECTORY_TIMEOUT)?;
        return Ok(Directories::from_shared(Arc::new(http)));
    }
    let directory = match &config.directory_seed {
        Some(path) => {
            info!(seed = %path.display(), "using static directory");
            StaticDirectory::from_seed_json(&std::fs::read_to_string(path)?)?
        }
        None => {
            tracing::warn!("no directory configured; every apartment and renter lookup will miss");
            StaticDirectory::new()
        }
    };
    Ok(Directories::from_shared(Arc::new(directory)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
        }
    };
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c.await;
    info!("shutdown signal received, draining requests");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "staybook=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    staybook::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let tenants = Arc::new(TenantManager::new(
        config.data_dir.clone(),
        config.compact_threshold,
        directories(&config)?,
    ));
    let app = build_app_router(AppState { tenants }, &config);

    let addr = SocketAddr::new(config.bind, config.port);
    let listener = TcpListener::bind(addr).await?;
    info!("staybook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_in_flight: {}", config.max_in_flight);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("staybook stopped");
    Ok(())
}
