//! # PimStore Server
//!
//! Command protocol engine for the PimStore daemon.
//!
//! This crate provides:
//! - Per-connection [`Session`] state machines over a line protocol
//! - The [`CommandTable`] mapping verbs to handlers
//! - Scope resolution from uid sets, remote ids and remote id paths
//! - Transactional command execution with change notification collection
//! - The process-wide [`NotificationHub`] with periodic flush to subscribers
//! - Payload retrieval from resources before cross-resource moves
//!
//! # Architecture
//!
//! Every connection owns one [`Session`] and one database connection. A
//! command runs as:
//!
//! 1. Parse the tagged line
//! 2. Resolve its selector into entity ids
//! 3. Fetch missing payload if the command needs it
//! 4. Apply changes in a transaction, collecting notifications
//! 5. Commit, then hand the compressed notifications to the hub
//!
//! Nothing is published for a transaction that rolls back.
//!
//! # Example
//!
//! ```rust,ignore
//! use pimstore_server::{OfflineRetrieval, PimServer, ServerConfig};
//! use std::sync::Arc;
//!
//! let config = ServerConfig::default().with_database_path("/var/lib/pimstore/db.sqlite");
//! let server = Arc::new(PimServer::new(config, Arc::new(OfflineRetrieval)));
//! server.run().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod hub;
mod retrieval;
mod scope;
mod server;
mod session;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::CommandTable;
pub use hub::{ChannelSink, DeliveryError, NotificationHub, NotificationSink};
pub use retrieval::{
    store_parts, ItemRetriever, OfflineRetrieval, RetrievalError, RetrievalRequest,
    RetrievalService, RetrievedPart,
};
pub use scope::{ScopeContext, ScopeResolver, Target};
pub use server::{PimServer, GREETING};
pub use session::{Session, SessionState};
pub use store::{CachePolicy, Collection, DataStore, Item, MissingPart, Resource, Tristate};
