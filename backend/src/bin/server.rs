//! LGS HTTP Server Binary
//!
//! Starts the night supervisor and serves the status API.
//!
//! # Usage
//!
//! ```bash
//! # Simulated gateway, in-memory repository
//! cargo run --bin lgs-server
//!
//! # Explicit configuration file
//! LGS_CONFIG=/etc/lgs/lgs.toml cargo run --bin lgs-server
//! ```
//!
//! # Environment Variables
//!
//! - `LGS_CONFIG`: Configuration file (default: search `lgs.toml`)
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8080)
//! - `LGS_AUTO_SHUTTER`: Enable auto-shutter at startup
//! - `LGS_GATEWAY_ADDRESS`: Telescope-control gateway address
//! - `LGS_COLLISION_FEED_URL`: Collision feed URL
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use lgs_rust::db::{LocalRepository, NightRepository};
use lgs_rust::gateway::{SimulatedGateway, TelescopeGateway};
use lgs_rust::http::{create_router, AppState};
use lgs_rust::services::{
    CollisionFeedSource, HttpFeedSource, MonitorSettings, MonitorSupervisor,
};
use lgs_rust::LgsConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let config = LgsConfig::load().context("Failed to load configuration")?;
    info!(
        site = %config.site.name,
        observatory = %config.site.observatory,
        auto_shutter = config.safety.auto_shutter,
        "Starting LGS HTTP Server"
    );

    let repository: Arc<dyn NightRepository> = Arc::new(LocalRepository::new());

    // Only the simulated gateway is built in.
    if config.gateway.address != "simulated" {
        warn!(address = %config.gateway.address, "Using the simulated gateway");
    }
    let simulated = SimulatedGateway::new();
    simulated.set_live_telescope(true);
    let gateway: Arc<dyn TelescopeGateway> = Arc::new(simulated);

    let feed_source: Option<Arc<dyn CollisionFeedSource>> = if config.collision_feed.url.is_empty()
    {
        warn!("No collision feed URL configured");
        None
    } else {
        let source = HttpFeedSource::new(&config.collision_feed.url, config.collision_feed.timeout())
            .context("Failed to build collision feed client")?;
        info!(url = %source.url(), format = ?config.collision_feed.format, "Collision feed configured");
        Some(Arc::new(source))
    };

    let supervisor = Arc::new(MonitorSupervisor::new(
        repository,
        gateway,
        feed_source,
        MonitorSettings::from_config(&config),
    ));
    let app = create_router(AppState::new(supervisor.clone()));

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
        .parse()
        .context("Invalid HTTP bind address")?;
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    supervisor.stop().await;
    info!("Server stopped");
    Ok(())
}
