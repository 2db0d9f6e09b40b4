//! On-demand retrieval of payload parts not cached locally.
//!
//! A part whose `data` column is `NULL` lives only in the owning resource.
//! Before a command relies on the full payload (for example a move across
//! resources), [`ItemRetriever`] asks the [`RetrievalService`] for the
//! missing parts of every owning resource. Parts are written only after all
//! resources delivered, so a failing resource leaves nothing behind.

use crate::error::ServerResult;
use crate::store::DataStore;
use pimstore_storage::Transaction;
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors reported by a retrieval service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    /// The owning resource cannot be reached.
    #[error("resource {0} is not available")]
    ResourceUnavailable(String),

    /// The resource did not answer in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The resource answered with an error.
    #[error("{0}")]
    Failed(String),
}

/// What to fetch from one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    /// Name of the owning resource.
    pub resource: String,
    /// Items with missing parts.
    pub item_ids: Vec<i64>,
    /// Part names to fetch; ignored when `full_payload` is set.
    pub parts: Vec<String>,
    /// Fetch every part of every item.
    pub full_payload: bool,
}

/// One fetched part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedPart {
    /// Item the part belongs to.
    pub item_id: i64,
    /// Part name.
    pub name: String,
    /// Payload bytes.
    pub data: Vec<u8>,
}

/// Fetches payload from the resource that owns it.
///
/// Calls may block; the retriever bounds them with a timeout.
pub trait RetrievalService: Send + Sync {
    /// Fetches the requested parts.
    fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<RetrievedPart>, RetrievalError>;
}

/// Service used when no resource agents are attached.
///
/// Every request fails with [`RetrievalError::ResourceUnavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRetrieval;

impl RetrievalService for OfflineRetrieval {
    fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<RetrievedPart>, RetrievalError> {
        Err(RetrievalError::ResourceUnavailable(request.resource.clone()))
    }
}

/// Ensures payload is cached locally before a mutation.
#[derive(Clone)]
pub struct ItemRetriever {
    service: Arc<dyn RetrievalService>,
    timeout: Duration,
}

impl ItemRetriever {
    /// Creates a retriever bounded by `timeout` per resource call.
    pub fn new(service: Arc<dyn RetrievalService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Fetches and stores every missing part of `item_ids` in one
    /// transaction.
    ///
    /// Returns the number of parts stored. Nothing is written unless every
    /// resource delivered every missing part.
    pub fn retrieve_full_payload(&self, store: &DataStore<'_>, item_ids: &[i64]) -> ServerResult<usize> {
        let parts = self.fetch_full_payload(store, item_ids)?;
        if parts.is_empty() {
            return Ok(0);
        }
        let tx = Transaction::begin(store.backend())?;
        let stored = store_parts(store, &parts)?;
        tx.commit()?;
        Ok(stored)
    }

    /// Fetches every missing part of `item_ids` without writing anything.
    ///
    /// All owning resources are asked first. The result is returned only
    /// if each of them delivered every part it owns, so callers can store
    /// the parts inside their own transaction.
    pub fn fetch_full_payload(
        &self,
        store: &DataStore<'_>,
        item_ids: &[i64],
    ) -> ServerResult<Vec<RetrievedPart>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let missing = store.missing_parts(item_ids)?;
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_resource: BTreeMap<String, Vec<(i64, String)>> = BTreeMap::new();
        for part in missing {
            by_resource
                .entry(part.resource)
                .or_default()
                .push((part.item_id, part.name));
        }

        let mut fetched = Vec::new();
        for (resource, wanted) in by_resource {
            let mut item_ids: Vec<i64> = wanted.iter().map(|(id, _)| *id).collect();
            item_ids.dedup();
            let request = RetrievalRequest {
                resource,
                item_ids,
                parts: Vec::new(),
                full_payload: true,
            };
            debug!(resource = %request.resource, items = request.item_ids.len(), "retrieving payload");
            let parts = self.call(request.clone())?;

            for (item_id, name) in &wanted {
                if !parts.iter().any(|p| p.item_id == *item_id && &p.name == name) {
                    return Err(RetrievalError::Failed(format!(
                        "resource {} did not deliver part {name} of item {item_id}",
                        request.resource
                    ))
                    .into());
                }
            }
            fetched.extend(parts);
        }
        Ok(fetched)
    }

    fn call(&self, request: RetrievalRequest) -> Result<Vec<RetrievedPart>, RetrievalError> {
        let (tx, rx) = mpsc::channel();
        let service = Arc::clone(&self.service);
        let resource = request.resource.clone();
        thread::Builder::new()
            .name("pimstore-retrieval".into())
            .spawn(move || {
                // The receiver is gone once the caller timed out.
                let _ = tx.send(service.retrieve(&request));
            })
            .map_err(|e| RetrievalError::Failed(format!("cannot start retrieval: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(%resource, timeout = ?self.timeout, "retrieval timed out");
                Err(RetrievalError::Timeout(self.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(RetrievalError::Failed(format!("retrieval from {resource} aborted")))
            }
        }
    }
}

/// Writes fetched parts through `store`; returns how many rows changed.
///
/// Runs on whatever transaction the connection has open.
pub fn store_parts(store: &DataStore<'_>, parts: &[RetrievedPart]) -> ServerResult<usize> {
    let mut stored = 0;
    for part in parts {
        stored += store.store_part(part.item_id, &part.name, &part.data)?;
    }
    Ok(stored)
}

impl std::fmt::Debug for ItemRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemRetriever")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
