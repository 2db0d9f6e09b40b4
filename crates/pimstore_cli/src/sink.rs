//! Notification sink that writes batches to the log.

use pimstore_protocol::ChangeNotification;
use pimstore_server::{DeliveryError, NotificationSink};
use tracing::info;

/// Logs every flushed notification as one JSON object.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLogSink;

impl JsonLogSink {
    fn encode(batch: &[ChangeNotification]) -> Result<Vec<String>, DeliveryError> {
        batch
            .iter()
            .map(|n| serde_json::to_string(n).map_err(|e| DeliveryError::Failed(e.to_string())))
            .collect()
    }
}

impl NotificationSink for JsonLogSink {
    fn deliver(&self, batch: &[ChangeNotification]) -> Result<(), DeliveryError> {
        for line in Self::encode(batch)? {
            info!(target: "pimstore::notifications", "{line}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pimstore_protocol::{EntityKind, Operation};

    #[test]
    fn encodes_each_notification() {
        let batch = vec![
            ChangeNotification::new(EntityKind::Item, Operation::Add, 1).with_session("s"),
            ChangeNotification::new(EntityKind::Collection, Operation::Remove, 2),
        ];
        let lines = JsonLogSink::encode(&batch).unwrap();
        assert_eq!(lines.len(), 2);
        let back: ChangeNotification = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(back, batch[0]);
        assert!(JsonLogSink.deliver(&batch).is_ok());
    }
}
