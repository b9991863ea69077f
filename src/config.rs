use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// WebSocket path prefix, clients connect to `/{endpoint}/{user_id}`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Sent to every client right after it connects
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_status_page")]
    pub status_page: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            endpoint: default_endpoint(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            send_queue_capacity: default_send_queue_capacity(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            status_page: default_status_page(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_endpoint() -> String {
    ws_relay::DEFAULT_ENDPOINT.to_string()
}

fn default_greeting() -> String {
    ws_relay::gateway::DEFAULT_GREETING.to_string()
}

fn default_send_queue_capacity() -> usize {
    ws_relay::gateway::DEFAULT_SEND_QUEUE_CAPACITY
}

fn default_cleanup_interval_secs() -> u64 {
    30
}

fn default_status_page() -> bool {
    true
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config: AppConfig = if Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        // Environment variables take precedence over the file
        if let Ok(port) = std::env::var("PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a port number, got {port:?}"))?;
        }
        if let Ok(endpoint) = std::env::var("RELAY_ENDPOINT") {
            config.server.endpoint = endpoint;
        }
        if let Ok(greeting) = std::env::var("RELAY_GREETING") {
            config.relay.greeting = greeting;
        }
        if let Ok(capacity) = std::env::var("RELAY_QUEUE_CAPACITY") {
            config.relay.send_queue_capacity = capacity
                .parse()
                .map_err(|_| anyhow::anyhow!("RELAY_QUEUE_CAPACITY must be a number, got {capacity:?}"))?;
        }
        if let Ok(secs) = std::env::var("RELAY_CLEANUP_INTERVAL_SECS") {
            config.relay.cleanup_interval_secs = secs
                .parse()
                .map_err(|_| anyhow::anyhow!("RELAY_CLEANUP_INTERVAL_SECS must be a number, got {secs:?}"))?;
        }
        if let Ok(flag) = std::env::var("ENABLE_STATUS_PAGE") {
            config.relay.status_page = flag != "0" && flag != "false";
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.server.endpoint.trim_matches('/').is_empty() {
            anyhow::bail!("server.endpoint must not be empty");
        }
        if self.relay.send_queue_capacity == 0 {
            anyhow::bail!("relay.send_queue_capacity must be positive");
        }
        if self.relay.cleanup_interval_secs == 0 {
            anyhow::bail!("relay.cleanup_interval_secs must be positive");
        }
        Ok(())
    }
}
