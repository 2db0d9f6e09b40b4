//! Scripted retrieval service.

use parking_lot::Mutex;
use pimstore_server::{RetrievalError, RetrievalRequest, RetrievalService, RetrievedPart};
use std::collections::BTreeMap;

/// A retrieval service that serves canned payload and records requests.
#[derive(Debug, Default)]
pub struct RecordingRetrieval {
    payload: Mutex<BTreeMap<(i64, String), Vec<u8>>>,
    requests: Mutex<Vec<RetrievalRequest>>,
    unavailable: bool,
}

impl RecordingRetrieval {
    /// Creates a service with no payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service that reports every resource as unavailable.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Makes `data` available as part `name` of `item`.
    pub fn with_part(self, item: i64, name: &str, data: &[u8]) -> Self {
        self.provide(item, name, data);
        self
    }

    /// Like [`with_part`](Self::with_part) on a shared service.
    pub fn provide(&self, item: i64, name: &str, data: &[u8]) {
        self.payload
            .lock()
            .insert((item, name.to_string()), data.to_vec());
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RetrievalRequest> {
        self.requests.lock().clone()
    }
}

impl RetrievalService for RecordingRetrieval {
    fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<RetrievedPart>, RetrievalError> {
        self.requests.lock().push(request.clone());
        if self.unavailable {
            return Err(RetrievalError::ResourceUnavailable(request.resource.clone()));
        }
        let payload = self.payload.lock();
        Ok(payload
            .iter()
            .filter(|((item, name), _)| {
                request.item_ids.contains(item)
                    && (request.full_payload || request.parts.contains(name))
            })
            .map(|((item, name), data)| RetrievedPart {
                item_id: *item,
                name: name.clone(),
                data: data.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(items: Vec<i64>) -> RetrievalRequest {
        RetrievalRequest {
            resource: "imap".into(),
            item_ids: items,
            parts: Vec::new(),
            full_payload: true,
        }
    }

    #[test]
    fn serves_requested_items_only() {
        let service = RecordingRetrieval::new()
            .with_part(1, "RFC822", b"body")
            .with_part(2, "RFC822", b"other");
        let parts = service.retrieve(&request(vec![1])).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].data, b"body");
        assert_eq!(service.requests().len(), 1);
    }

    #[test]
    fn unavailable_still_records() {
        let service = RecordingRetrieval::unavailable();
        assert!(service.retrieve(&request(vec![1])).is_err());
        assert_eq!(service.requests()[0].resource, "imap");
    }
}
