//! Change notifications and per-transaction compression.
//!
//! A [`ChangeNotification`] describes one committed state change. Handlers
//! feed them into a [`Collector`] while a transaction runs; the collector
//! folds redundant or contradictory records for the same entity so that
//! subscribers only see the net transition.
//!
//! # Compression
//!
//! Records match when they share entity kind, id and session, and the
//! existing record's current resource (the destination for a move) equals
//! the new record's resource. Lifecycle records (`Add`, `Modify`, `Move`,
//! `Remove`) are compared against the last matching lifecycle record;
//! membership records (`Link`/`Unlink`, `Subscribe`/`Unsubscribe`) against
//! the last matching record of the same pair with the same parent collection.
//!
//! | new | last match | result |
//! |---|---|---|
//! | any | none | appended |
//! | `Add` | anything | appended |
//! | `Modify` | `Add` or `Modify` | parts merged into the match |
//! | `Modify` | `Remove` | dropped |
//! | `Modify` | `Move` | appended |
//! | `Move` | `Add` | the `Add` is rewritten to the destination |
//! | `Move` | `Move` ending at the new source | destination updated; dropped entirely if it returns to its origin |
//! | `Move` | `Remove` | dropped |
//! | `Move` | `Modify` or other `Move` | appended |
//! | `Remove` | `Remove` | dropped |
//! | `Remove` | anything else | every record of the entity removed, then appended |
//! | membership | same operation | dropped |
//! | membership | inverse operation | both cancelled |

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of entity a notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A collection.
    Collection,
    /// An item.
    Item,
}

/// The change that happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Entity created.
    Add,
    /// Entity fields changed.
    Modify,
    /// Entity moved to another parent collection.
    Move,
    /// Entity deleted.
    Remove,
    /// Item referenced from a virtual collection.
    Link,
    /// Item reference removed from a virtual collection.
    Unlink,
    /// Collection subscribed locally.
    Subscribe,
    /// Collection unsubscribed locally.
    Unsubscribe,
}

impl Operation {
    fn is_lifecycle(self) -> bool {
        matches!(
            self,
            Operation::Add | Operation::Modify | Operation::Move | Operation::Remove
        )
    }

    fn inverse(self) -> Option<Operation> {
        match self {
            Operation::Link => Some(Operation::Unlink),
            Operation::Unlink => Some(Operation::Link),
            Operation::Subscribe => Some(Operation::Unsubscribe),
            Operation::Unsubscribe => Some(Operation::Subscribe),
            _ => None,
        }
    }
}

/// One committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    entity_kind: EntityKind,
    operation: Operation,
    id: i64,
    session_id: String,
    resource: String,
    parent_collection: i64,
    destination_parent_collection: i64,
    destination_resource: String,
    mime_type: String,
    remote_id: String,
    changed_parts: BTreeSet<String>,
}

impl ChangeNotification {
    /// Creates a notification for entity `id`.
    pub fn new(entity_kind: EntityKind, operation: Operation, id: i64) -> Self {
        Self {
            entity_kind,
            operation,
            id,
            session_id: String::new(),
            resource: String::new(),
            parent_collection: 0,
            destination_parent_collection: 0,
            destination_resource: String::new(),
            mime_type: String::new(),
            remote_id: String::new(),
            changed_parts: BTreeSet::new(),
        }
    }

    /// Sets the originating session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Sets the owning resource.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Sets the parent collection.
    pub fn with_parent_collection(mut self, parent: i64) -> Self {
        self.parent_collection = parent;
        self
    }

    /// Sets the move destination.
    pub fn with_destination(mut self, parent: i64, resource: impl Into<String>) -> Self {
        self.destination_parent_collection = parent;
        self.destination_resource = resource.into();
        self
    }

    /// Sets the mime type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Sets the remote id.
    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = remote_id.into();
        self
    }

    /// Adds changed part names.
    pub fn with_parts<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_parts.extend(parts.into_iter().map(Into::into));
        self
    }

    /// Entity kind.
    pub fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    /// Operation.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Affected entity id.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Originating session.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Owning resource (the source resource for a move).
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Parent collection (the source parent for a move).
    pub fn parent_collection(&self) -> i64 {
        self.parent_collection
    }

    /// Destination parent collection of a move.
    pub fn destination_parent_collection(&self) -> i64 {
        self.destination_parent_collection
    }

    /// Destination resource of a move.
    pub fn destination_resource(&self) -> &str {
        &self.destination_resource
    }

    /// Mime type.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Remote id.
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    /// Names of the changed parts or fields.
    pub fn changed_parts(&self) -> &BTreeSet<String> {
        &self.changed_parts
    }

    /// Resource that owns the entity after this change.
    pub fn current_resource(&self) -> &str {
        if self.operation == Operation::Move {
            &self.destination_resource
        } else {
            &self.resource
        }
    }

    fn same_entity(&self, other: &ChangeNotification) -> bool {
        self.entity_kind == other.entity_kind
            && self.id == other.id
            && self.session_id == other.session_id
    }

    fn matches(&self, newer: &ChangeNotification) -> bool {
        self.same_entity(newer) && self.current_resource() == newer.resource
    }
}

/// Appends `msg` to `list`, folding it into existing records where possible.
///
/// Returns true if `msg` was appended as a new record.
pub fn append_and_compress(list: &mut Vec<ChangeNotification>, msg: ChangeNotification) -> bool {
    match msg.operation {
        Operation::Add => {
            list.push(msg);
            true
        }
        Operation::Modify => compress_modify(list, msg),
        Operation::Move => compress_move(list, msg),
        Operation::Remove => compress_remove(list, msg),
        Operation::Link | Operation::Unlink | Operation::Subscribe | Operation::Unsubscribe => {
            compress_membership(list, msg)
        }
    }
}

fn last_lifecycle_match(list: &[ChangeNotification], msg: &ChangeNotification) -> Option<usize> {
    list.iter()
        .rposition(|e| e.operation.is_lifecycle() && e.matches(msg))
}

fn compress_modify(list: &mut Vec<ChangeNotification>, msg: ChangeNotification) -> bool {
    let Some(index) = last_lifecycle_match(list, &msg) else {
        list.push(msg);
        return true;
    };
    let existing = &mut list[index];
    match existing.operation {
        Operation::Add | Operation::Modify => {
            existing.changed_parts.extend(msg.changed_parts);
            if !msg.remote_id.is_empty() {
                existing.remote_id = msg.remote_id;
            }
            if !msg.mime_type.is_empty() {
                existing.mime_type = msg.mime_type;
            }
            false
        }
        Operation::Remove => false,
        _ => {
            list.push(msg);
            true
        }
    }
}

fn compress_move(list: &mut Vec<ChangeNotification>, msg: ChangeNotification) -> bool {
    let Some(index) = last_lifecycle_match(list, &msg) else {
        list.push(msg);
        return true;
    };
    let existing = &mut list[index];
    match existing.operation {
        Operation::Add => {
            existing.parent_collection = msg.destination_parent_collection;
            existing.resource = msg.destination_resource;
            false
        }
        Operation::Move if existing.destination_parent_collection == msg.parent_collection => {
            existing.destination_parent_collection = msg.destination_parent_collection;
            existing.destination_resource = msg.destination_resource;
            if existing.parent_collection == existing.destination_parent_collection
                && existing.resource == existing.destination_resource
            {
                list.remove(index);
            }
            false
        }
        Operation::Remove => false,
        _ => {
            list.push(msg);
            true
        }
    }
}

fn compress_remove(list: &mut Vec<ChangeNotification>, msg: ChangeNotification) -> bool {
    let last = list
        .iter()
        .rposition(|e| e.operation.is_lifecycle() && e.same_entity(&msg));
    if let Some(index) = last {
        if list[index].operation == Operation::Remove {
            return false;
        }
    }
    list.retain(|e| !e.same_entity(&msg));
    list.push(msg);
    true
}

fn compress_membership(list: &mut Vec<ChangeNotification>, msg: ChangeNotification) -> bool {
    let inverse = msg.operation.inverse();
    let found = list.iter().rposition(|e| {
        e.matches(&msg)
            && e.parent_collection == msg.parent_collection
            && (e.operation == msg.operation || Some(e.operation) == inverse)
    });
    match found {
        Some(index) if list[index].operation == msg.operation => false,
        Some(index) => {
            list.remove(index);
            false
        }
        None => {
            list.push(msg);
            true
        }
    }
}

/// Accumulates the notifications of one transaction.
#[derive(Debug, Clone, Default)]
pub struct Collector {
    notifications: Vec<ChangeNotification>,
}

impl Collector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends with compression; returns true if appended as new.
    pub fn append(&mut self, notification: ChangeNotification) -> bool {
        append_and_compress(&mut self.notifications, notification)
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    /// Returns true if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Collected records in output order.
    pub fn notifications(&self) -> &[ChangeNotification] {
        &self.notifications
    }

    /// Consumes the collector.
    pub fn into_notifications(self) -> Vec<ChangeNotification> {
        self.notifications
    }
}
