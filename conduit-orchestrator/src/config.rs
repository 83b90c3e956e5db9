//! Orchestrator configuration
//!
//! Bind address, persistence backend, remote executor connection and
//! change-stream tuning.

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on
    pub bind_addr: String,

    /// Postgres connection string; the in-memory store is used when unset
    pub database_url: Option<String>,

    /// Maximum number of pooled database connections
    pub db_max_connections: u32,

    /// Build executor base URL (e.g., "http://localhost:9090")
    pub executor_url: String,

    /// Outbound buffer per live status subscriber
    pub subscriber_buffer: usize,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(executor_url: String) -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            db_max_connections: 10,
            executor_url,
            subscriber_buffer: 64,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - CONDUIT_BIND_ADDR (optional, default: 0.0.0.0:8080)
    /// - DATABASE_URL (optional, in-memory store when unset)
    /// - DB_MAX_CONNECTIONS (optional, default: 10)
    /// - EXECUTOR_URL (optional, default: http://localhost:9090)
    /// - SUBSCRIBER_BUFFER (optional, default: 64)
    pub fn from_env() -> anyhow::Result<Self> {
        let executor_url = std::env::var("EXECUTOR_URL")
            .unwrap_or_else(|_| "http://localhost:9090".to_string());

        let mut config = Self::new(executor_url);

        if let Ok(addr) = std::env::var("CONDUIT_BIND_ADDR") {
            config.bind_addr = addr;
        }

        config.database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        if let Ok(raw) = std::env::var("DB_MAX_CONNECTIONS") {
            config.db_max_connections = raw
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a number, got '{raw}'"))?;
        }

        if let Ok(raw) = std::env::var("SUBSCRIBER_BUFFER") {
            config.subscriber_buffer = raw
                .parse()
                .map_err(|_| anyhow::anyhow!("SUBSCRIBER_BUFFER must be a number, got '{raw}'"))?;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if !self.executor_url.starts_with("http://") && !self.executor_url.starts_with("https://") {
            anyhow::bail!("executor_url must start with http:// or https://");
        }

        if self.subscriber_buffer == 0 {
            anyhow::bail!("subscriber_buffer must be greater than 0");
        }

        if self.db_max_connections == 0 {
            anyhow::bail!("db_max_connections must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost:9090".to_string())
    }
}
