//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the PimStore server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Path of the SQLite database file.
    pub database_path: PathBuf,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Interval between notification flushes.
    pub flush_interval: Duration,
    /// Upper bound for one remote retrieval call.
    pub retrieval_timeout: Duration,
    /// How long a connection waits for a locked database.
    pub busy_timeout: Duration,
}

impl ServerConfig {
    /// Creates a configuration for the given address and database.
    pub fn new(bind_addr: SocketAddr, database_path: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr,
            database_path: database_path.into(),
            max_connections: 1000,
            flush_interval: Duration::from_millis(50),
            retrieval_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the database path.
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Sets the maximum concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the notification flush interval.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the retrieval timeout.
    pub fn with_retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout = timeout;
        self
    }

    /// Sets the database busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 4444)), "pimstore.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.flush_interval, Duration::from_millis(50));
        assert_eq!(config.bind_addr.port(), 4444);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::default()
            .with_bind_addr("0.0.0.0:9000".parse().unwrap())
            .with_database_path("/tmp/x.db")
            .with_max_connections(8)
            .with_flush_interval(Duration::from_millis(5))
            .with_retrieval_timeout(Duration::from_secs(1));

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.retrieval_timeout, Duration::from_secs(1));
    }
}
