mod config;

use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ws_relay::Relay;

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load()?;

    tracing::info!(
        port = config.server.port,
        endpoint = %config.server.endpoint,
        send_queue_capacity = config.relay.send_queue_capacity,
        cleanup_interval_secs = config.relay.cleanup_interval_secs,
        status_page = config.relay.status_page,
        "Relay starting"
    );

    Relay::builder()
        .port(config.server.port)
        .endpoint(config.server.endpoint)
        .greeting(config.relay.greeting)
        .send_queue_capacity(config.relay.send_queue_capacity)
        .cleanup_interval(Duration::from_secs(config.relay.cleanup_interval_secs))
        .status_page(config.relay.status_page)
        .build()?
        .run()
        .await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=info,ws_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
