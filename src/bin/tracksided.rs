//! Trackside daemon.
//!
//! Wires the real transports together: rumqttc for the broker, blocking
//! reqwest for the train controller, and the axum RPC surface on top.
//! Initial configuration comes from the environment and is pushed through
//! the same change channel a live config store would use.
//!
//! # Environment
//!
//! ```text
//! TRACKSIDE_BROKER        MQTT broker address   (default tcp://localhost:1883)
//! TRACKSIDE_TOPICS        comma-separated topics (default sensors/#)
//! TRACKSIDE_CONTROLLER    train controller host:port (optional)
//! TRACKSIDE_DEFAULT_LOCO  default loco id        (default 1)
//! TRACKSIDE_WEB_ADDR      RPC bind address       (default 0.0.0.0:8080)
//! RUST_LOG                tracing filter         (default info)
//! ```
//!
//! # Run
//!
//! ```bash
//! cargo run --features daemon --bin tracksided
//! ```

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trackside::config::{BrokerSettings, ConfigWatcher, ControllerSettings};
use trackside::service::TracksideService;
use trackside::transport::{HttpControlApi, RumqttTransport};
use trackside::web::{build_router, serve, WebServerConfig};

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("starting tracksided");

    let broker = BrokerSettings::new(env_or(
        "TRACKSIDE_BROKER",
        trackside::config::DEFAULT_BROKER_ADDRESS,
    ))
    .with_topics(
        env_or("TRACKSIDE_TOPICS", trackside::config::DEFAULT_SENSOR_TOPIC)
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
    );
    let controller = std::env::var("TRACKSIDE_CONTROLLER")
        .ok()
        .map(|address| ControllerSettings::new(address, env_or("TRACKSIDE_DEFAULT_LOCO", "1")));

    let (watcher, events) = ConfigWatcher::channel();
    let service = TracksideService::new(RumqttTransport::new(), HttpControlApi::new());
    let _worker = service.spawn(events);

    // Seed the initial configuration through the normal change path.
    watcher.broker_changed(Some(broker));
    if let Some(controller) = controller {
        watcher.controller_changed(Some(controller));
    }

    let web_config = WebServerConfig {
        addr: env_or("TRACKSIDE_WEB_ADDR", "0.0.0.0:8080")
            .parse()
            .context("invalid TRACKSIDE_WEB_ADDR")?,
        ..Default::default()
    };
    let router = build_router(service.clone(), &web_config);

    serve(router, &web_config).await.context("web server failed")?;

    service.shutdown();
    Ok(())
}
