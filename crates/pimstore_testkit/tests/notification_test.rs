//! Notification delivery across sessions.

use pimstore_protocol::{ChangeNotification, Operation};
use pimstore_server::{DeliveryError, NotificationSink};
use pimstore_testkit::prelude::*;
use std::collections::BTreeSet;
use std::thread;

struct Refusing;

impl NotificationSink for Refusing {
    fn deliver(&self, _batch: &[ChangeNotification]) -> Result<(), DeliveryError> {
        Err(DeliveryError::Failed("peer gone".into()))
    }
}

#[test]
fn concurrent_sessions_publish_into_one_batch() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    let collections: Vec<_> = (0..4)
        .map(|i| init.create_collection(&format!("col{i}"), None))
        .collect();
    let rx = server.hub().subscribe("observer");

    thread::scope(|scope| {
        for (i, collection) in collections.iter().enumerate() {
            let mut session = server.session();
            scope.spawn(move || {
                let login = session.handle_line(&format!("1 LOGIN session{i}"));
                assert_eq!(login[0].to_string(), "1 OK User logged in");
                for round in 0..5 {
                    let reply = session.handle_line(&format!(
                        "2 MODIFY {} NAME \"col{i}-{round}\"",
                        collection.id
                    ));
                    assert_eq!(reply[0].to_string(), "2 OK MODIFY done");
                }
            });
        }
    });

    // Renames of one collection by one session fold together.
    assert_eq!(server.hub().pending_len(), 4);
    assert_eq!(server.hub().flush(), 4);
    let batch = rx.try_recv().unwrap();
    assert!(rx.try_recv().is_err());

    let sessions: BTreeSet<_> = batch.iter().map(|n| n.session_id().to_string()).collect();
    assert_eq!(sessions.len(), 4);
    for (i, collection) in collections.iter().enumerate() {
        let mine: Vec<_> = batch
            .iter()
            .filter(|n| n.session_id() == format!("session{i}"))
            .collect();
        assert_eq!(mine.len(), 1);
        assert!(mine[0].changed_parts().contains("NAME"));
        assert!(mine.iter().all(|n| n.id() == collection.id && n.operation() == Operation::Modify));
        let name = server.store().collection(collection.id).unwrap().unwrap().name;
        assert_eq!(name, format!("col{i}-4"));
    }
}

#[test]
fn failing_subscriber_is_dropped_others_still_receive() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    let col = init.create_collection("col", None);

    let first = server.hub().subscribe("first");
    let closed = server.hub().subscribe("closed");
    drop(closed);
    server.hub().subscribe_sink("refusing", Box::new(Refusing));
    let last = server.hub().subscribe("last");
    assert_eq!(server.hub().subscriber_count(), 4);

    let mut session = server.session();
    let mut lines = default_scenario();
    lines.push(format!("C: 2 SUBSCRIBE {}", col.id));
    lines.push("S: 2 OK Completed".into());
    assert_scenario(&mut session, &lines);

    assert_eq!(server.hub().flush(), 1);
    assert_eq!(server.hub().subscriber_count(), 2);
    assert_eq!(first.try_recv().unwrap()[0].operation(), Operation::Subscribe);
    assert_eq!(last.try_recv().unwrap()[0].operation(), Operation::Subscribe);
}

#[test]
fn nothing_is_published_without_a_commit() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    init.create_collection("col1", None);
    let col2 = init.create_collection("col2", None);
    let rx = server.hub().subscribe("observer");

    let mut session = server.session();
    let mut lines = default_scenario();
    lines.extend([
        format!("C: 3 MODIFY {} NAME \"col1\"", col2.id),
        "S: 3 NO Collection with the same name exists already".to_string(),
        format!("C: 4 UNSUBSCRIBE {}", col2.id),
        "S: 4 OK Completed".to_string(),
    ]);
    assert_scenario(&mut session, &lines);

    assert_eq!(server.hub().flush(), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn flush_loop_delivers_periodically() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    let col = init.create_collection("col", None);
    let rx = server.hub().subscribe("observer");

    let handle = std::sync::Arc::clone(server.hub())
        .spawn_flush_loop(std::time::Duration::from_millis(5));
    let mut session = server.session();
    let reply = session.handle_line(&format!("1 SUBSCRIBE {}", col.id));
    assert_eq!(reply[0].to_string(), "1 OK Completed");

    let mut received = None;
    for _ in 0..200 {
        if let Ok(batch) = rx.try_recv() {
            received = Some(batch);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    handle.abort();
    let batch = received.expect("batch delivered by the flush loop");
    assert_eq!(batch[0].id(), col.id);
}
