//! Serve command implementation.

use crate::sink::JsonLogSink;
use pimstore_server::{OfflineRetrieval, PimServer, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Flags of the `serve` command.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Listen address.
    pub bind: SocketAddr,
    /// Database file.
    pub database: PathBuf,
    /// Connection limit.
    pub max_connections: usize,
    /// Flush interval in milliseconds.
    pub flush_interval_ms: u64,
    /// Retrieval timeout in seconds.
    pub retrieval_timeout_secs: u64,
    /// Attach the JSON logging subscriber.
    pub trace_notifications: bool,
}

impl ServeOptions {
    /// Maps the flags onto a server configuration.
    pub fn config(&self) -> ServerConfig {
        ServerConfig::new(self.bind, self.database.clone())
            .with_max_connections(self.max_connections.max(1))
            .with_flush_interval(Duration::from_millis(self.flush_interval_ms.max(1)))
            .with_retrieval_timeout(Duration::from_secs(self.retrieval_timeout_secs))
    }
}

/// Runs the server until Ctrl+C.
pub fn run(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let server = Arc::new(PimServer::new(options.config(), Arc::new(OfflineRetrieval)));
    if options.trace_notifications {
        server
            .hub()
            .subscribe_sink("pimstored-trace", Box::new(JsonLogSink));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server.run())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_config() {
        let options = ServeOptions {
            bind: "0.0.0.0:7000".parse().unwrap(),
            database: PathBuf::from("/tmp/p.db"),
            max_connections: 0,
            flush_interval_ms: 0,
            retrieval_timeout_secs: 3,
            trace_notifications: false,
        };
        let config = options.config();
        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.flush_interval, Duration::from_millis(1));
        assert_eq!(config.retrieval_timeout, Duration::from_secs(3));
    }
}
