//! TCP front end.
//!
//! Each accepted connection gets its own task, its own SQLite connection
//! and its own [`Session`]. Commands run on the blocking pool one at a time
//! per connection; connections run concurrently. The notification flush
//! loop runs independently of all connections.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::CommandTable;
use crate::hub::NotificationHub;
use crate::retrieval::{ItemRetriever, RetrievalService};
use crate::session::Session;
use pimstore_storage::{schema, SqliteBackend};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Greeting sent when a connection is accepted.
pub const GREETING: &str = "* OK PimStore ready";

/// The PimStore server.
///
/// Owns the process-wide [`NotificationHub`] and verb table.
///
/// # Example
///
/// ```no_run
/// use pimstore_server::{OfflineRetrieval, PimServer, ServerConfig};
/// use std::sync::Arc;
///
/// # async fn run() -> pimstore_server::ServerResult<()> {
/// let server = Arc::new(PimServer::new(ServerConfig::default(), Arc::new(OfflineRetrieval)));
/// server.run().await
/// # }
/// ```
pub struct PimServer {
    config: ServerConfig,
    hub: Arc<NotificationHub>,
    commands: Arc<CommandTable>,
    retriever: ItemRetriever,
}

impl PimServer {
    /// Creates a server fetching missing payload through `retrieval`.
    pub fn new(config: ServerConfig, retrieval: Arc<dyn RetrievalService>) -> Self {
        let retriever = ItemRetriever::new(retrieval, config.retrieval_timeout);
        Self {
            config,
            hub: Arc::new(NotificationHub::new()),
            commands: Arc::new(CommandTable::new()),
            retriever,
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The notification hub shared by all sessions.
    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    /// Creates the store tables if they do not exist.
    pub fn prepare_database(&self) -> ServerResult<()> {
        let backend = self.open_backend()?;
        schema::apply(&backend)?;
        Ok(())
    }

    fn open_backend(&self) -> ServerResult<SqliteBackend> {
        Ok(SqliteBackend::open_with_busy_timeout(
            &self.config.database_path,
            self.config.busy_timeout,
        )?)
    }

    /// Opens a session on a fresh database connection.
    pub fn open_session(&self) -> ServerResult<Session> {
        Ok(Session::new(
            Box::new(self.open_backend()?),
            Arc::clone(&self.hub),
            self.retriever.clone(),
            Arc::clone(&self.commands),
        ))
    }

    /// Accepts connections until the task is cancelled.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> ServerResult<()> {
        let limit = Arc::new(Semaphore::new(self.config.max_connections));
        loop {
            let permit = Arc::clone(&limit)
                .acquire_owned()
                .await
                .map_err(|e| ServerError::Internal(e.to_string()))?;
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            debug!(%peer, "connection accepted");
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    warn!(%peer, error = %e, "connection ended with error");
                }
                debug!(%peer, "connection closed");
                drop(permit);
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> ServerResult<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let mut session = self.open_session()?;
        writer.write_all(format!("{GREETING}\r\n").as_bytes()).await?;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let (returned, responses) = tokio::task::spawn_blocking(move || {
                let responses = session.handle_line(&line);
                (session, responses)
            })
            .await
            .map_err(|e| ServerError::Internal(format!("command task failed: {e}")))?;
            session = returned;

            let mut out = String::new();
            for response in responses {
                out.push_str(&response.to_string());
                out.push_str("\r\n");
            }
            // A client that went away is noticed here; the command already ran.
            writer.write_all(out.as_bytes()).await?;
            if session.is_closed() {
                break;
            }
        }
        writer.shutdown().await?;
        Ok(())
    }

    /// Binds, starts the flush loop and serves until Ctrl+C.
    pub async fn run(self: Arc<Self>) -> ServerResult<()> {
        self.prepare_database()?;
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, db = %self.config.database_path.display(), "listening");

        let flush = Arc::clone(&self.hub).spawn_flush_loop(self.config.flush_interval);
        let result = tokio::select! {
            result = Arc::clone(&self).serve(listener) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                Ok(())
            }
        };
        flush.abort();
        self.hub.flush();
        result
    }
}

impl std::fmt::Debug for PimServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PimServer")
            .field("config", &self.config)
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::OfflineRetrieval;
    use std::net::SocketAddr;

    fn server(dir: &tempfile::TempDir) -> PimServer {
        let config = ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)), dir.path().join("db.sqlite"));
        PimServer::new(config, Arc::new(OfflineRetrieval))
    }

    #[test]
    fn sessions_share_the_hub() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(&dir);
        server.prepare_database().unwrap();

        let rx = server.hub().subscribe("watcher");
        let mut a = server.open_session().unwrap();
        let mut b = server.open_session().unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.handle_line("1 CAPABILITY").last().unwrap().to_string().starts_with("1 OK"));
        assert!(b.handle_line("1 LIST 0 INF () ()").last().unwrap().to_string().starts_with("1 OK"));

        assert_eq!(server.hub().flush(), 0);
        assert!(rx.try_recv().is_err());
    }
}
