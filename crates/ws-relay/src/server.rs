//! Relay builder and runner

use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error::Error;
use crate::gateway::{GatewayConfig, DEFAULT_GREETING, DEFAULT_SEND_QUEUE_CAPACITY};
use crate::handler::{self, RelayState};
use crate::registry::Registry;
use crate::router::Router;

/// Default WebSocket path prefix
pub const DEFAULT_ENDPOINT: &str = "web-socket";

// Prefixes already taken by the built-in routes
const RESERVED_PREFIXES: [&str; 5] = ["health", "ready", "push", "api", "index"];

/// Relay server configuration and runner
pub struct Relay {
    port: u16,
    endpoint: String,
    registry: Registry,
    gateway_config: GatewayConfig,
    cleanup_interval: Duration,
    enable_status_page: bool,
}

impl Relay {
    /// Create a new relay builder
    pub fn builder() -> RelayBuilder {
        RelayBuilder::default()
    }

    /// The registry backing this relay, for server-side pushes
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Build the HTTP router
    pub fn router(&self) -> axum::Router {
        let state = RelayState {
            registry: self.registry.clone(),
            router: Router::new(self.registry.clone()),
            gateway_config: self.gateway_config.clone(),
            endpoint: self.endpoint.clone(),
        };

        let mut app = axum::Router::new()
            .route("/health", get(|| async { "OK" }))
            .route("/ready", get(|| async { "READY" }))
            .route(&format!("/{}/{{user_id}}", self.endpoint), get(handler::ws_connect))
            .route(
                "/push/{to_user_id}",
                get(handler::push).post(handler::push),
            )
            .route("/api/stats", get(handler::get_stats));

        if self.enable_status_page {
            tracing::info!("Status page enabled at /index");
            app = app.route("/index", get(handler::status_page));
        }

        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
    }

    /// Bind `0.0.0.0:port` and serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr).await?;

        let cancel = CancellationToken::new();
        let cancel_for_signal = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel_for_signal.cancel();
        });

        self.serve(listener, cancel).await
    }

    /// Serve on an already bound listener until `cancel` fires
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(
            addr = %listener.local_addr()?,
            endpoint = %self.endpoint,
            "Starting relay"
        );

        // Start cleanup task
        let cleanup_registry = self.registry.clone();
        let cleanup_cancel = cancel.clone();
        let cleanup_interval = self.cleanup_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);
            loop {
                tokio::select! {
                    _ = cleanup_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let cleaned = cleanup_registry.cleanup_dead_connections();
                        tracing::debug!(
                            online_count = cleanup_registry.online_count(),
                            cleaned,
                            "Connection cleanup"
                        );
                    }
                }
            }
        });

        let app = self.router();
        let shutdown = cancel.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        // Upgraded sockets outlive the HTTP server; wind their sessions down.
        for connection in self.registry.list_connections() {
            connection.close();
        }

        tracing::info!("Relay shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

/// Builder for Relay
pub struct RelayBuilder {
    port: u16,
    endpoint: String,
    registry: Option<Registry>,
    greeting: String,
    send_queue_capacity: usize,
    cleanup_interval: Duration,
    enable_status_page: bool,
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self {
            port: 8080,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            registry: None,
            greeting: DEFAULT_GREETING.to_string(),
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            cleanup_interval: Duration::from_secs(30),
            enable_status_page: true,
        }
    }
}

impl RelayBuilder {
    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the WebSocket path prefix (`/{endpoint}/{user_id}`)
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Share an existing registry, e.g. one the embedding app pushes through
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the acknowledgment sent when a session opens
    pub fn greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Set the per-connection outbound queue size
    pub fn send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }

    /// Set the dead connection sweep interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Enable or disable the status page
    pub fn status_page(mut self, enable: bool) -> Self {
        self.enable_status_page = enable;
        self
    }

    /// Build the relay
    pub fn build(self) -> anyhow::Result<Relay> {
        let endpoint = self.endpoint.trim_matches('/').to_string();
        if endpoint.is_empty()
            || endpoint.contains(['/', '{', '}'])
            || RESERVED_PREFIXES.contains(&endpoint.as_str())
        {
            return Err(Error::Config(format!("invalid endpoint: {:?}", self.endpoint)).into());
        }
        if self.send_queue_capacity == 0 {
            return Err(Error::Config("send queue capacity must be positive".to_string()).into());
        }
        if self.cleanup_interval.is_zero() {
            return Err(Error::Config("cleanup interval must be positive".to_string()).into());
        }

        Ok(Relay {
            port: self.port,
            endpoint,
            registry: self.registry.unwrap_or_default(),
            gateway_config: GatewayConfig {
                greeting: self.greeting,
                send_queue_capacity: self.send_queue_capacity,
            },
            cleanup_interval: self.cleanup_interval,
            enable_status_page: self.enable_status_page,
        })
    }
}
