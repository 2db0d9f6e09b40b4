//! SELECT, STORE, MOVE, REMOVE, LINK and SUBSCRIBE scenarios.

use pimstore_protocol::{EntityKind, Operation};
use pimstore_server::{Collection, Item};
use pimstore_testkit::prelude::*;
use std::sync::Arc;

struct Mailbox {
    server: TestServer,
    service: Arc<RecordingRetrieval>,
    inbox: Collection,
    archive: Collection,
    remote: Collection,
    search: Collection,
    m1: Item,
    m2: Item,
}

fn mailbox() -> Mailbox {
    let service = Arc::new(RecordingRetrieval::new());
    let server = TestServer::with_retrieval(service.clone());
    let mut init = server.initializer();
    init.create_resource("imap");
    let inbox = init.create_collection("inbox", None);
    let archive = init.create_collection("archive", None);
    let m1 = init.create_item(&inbox, "m1", "message/rfc822");
    let m2 = init.create_item(&inbox, "m2", "message/rfc822");
    init.add_flags(&m1, &["\\SEEN"]);
    init.add_part(&m1, "RFC822", None);
    init.create_resource("local");
    let remote = init.create_collection("local-inbox", None);
    let search = init.create_virtual_collection("search");
    Mailbox {
        server,
        service,
        inbox,
        archive,
        remote,
        search,
        m1,
        m2,
    }
}

#[test]
fn select_reports_item_count() {
    let mb = mailbox();
    let mut session = mb.server.session();
    let mut lines = default_scenario();
    lines.extend([
        format!("C: 2 SELECT {}", mb.inbox.id),
        "S: * 2 EXISTS".to_string(),
        "S: 2 OK Completed".to_string(),
        format!("C: 3 SELECT {}", mb.archive.id),
        "S: * 0 EXISTS".to_string(),
        "S: 3 OK Completed".to_string(),
    ]);
    assert_scenario(&mut session, &lines);
    assert_eq!(session.selected_collection(), Some(mb.archive.id));
}

#[test]
fn failed_select_keeps_previous_selection() {
    let mb = mailbox();
    let mut session = mb.server.session();
    let mut lines = default_scenario();
    lines.extend([
        format!("C: 2 SELECT {}", mb.inbox.id),
        "S: * 2 EXISTS".to_string(),
        "S: 2 OK Completed".to_string(),
        "C: 3 SELECT 999".to_string(),
        "S: 3 NO No such collection: 999".to_string(),
    ]);
    assert_scenario(&mut session, &lines);
    assert_eq!(session.selected_collection(), Some(mb.inbox.id));
}

#[test]
fn store_flags() {
    let mb = mailbox();
    let rx = mb.server.hub().subscribe("observer");
    let mut session = mb.server.session();
    let mut lines = default_scenario();
    lines.extend([
        format!("C: 2 SELECT {}", mb.inbox.id),
        "S: * 2 EXISTS".to_string(),
        "S: 2 OK Completed".to_string(),
        format!("C: 3 STORE {}:{} +FLAGS (\\FLAGGED)", mb.m1.id, mb.m2.id),
        format!("S: * {} FETCH (FLAGS (\\FLAGGED \\SEEN))", mb.m1.id),
        format!("S: * {} FETCH (FLAGS (\\FLAGGED))", mb.m2.id),
        "S: 3 OK STORE completed".to_string(),
        format!("C: 4 UID STORE {} -FLAGS.SILENT (\\SEEN)", mb.m1.id),
        "S: 4 OK STORE completed".to_string(),
        // Replacing with the current set changes nothing.
        format!("C: 5 STORE {} FLAGS (\\FLAGGED)", mb.m2.id),
        format!("S: * {} FETCH (FLAGS (\\FLAGGED))", mb.m2.id),
        "S: 5 OK STORE completed".to_string(),
    ]);
    assert_scenario(&mut session, &lines);

    let store = mb.server.store();
    assert_eq!(
        store.item_flags(mb.m1.id).unwrap().into_iter().collect::<Vec<_>>(),
        vec!["\\FLAGGED".to_string()]
    );
    assert_eq!(store.item(mb.m1.id).unwrap().unwrap().rev, 2);
    assert_eq!(store.item(mb.m2.id).unwrap().unwrap().rev, 1);

    mb.server.hub().flush();
    let notifications: Vec<_> = rx.try_iter().flatten().collect();
    // Both STOREs on m1 land in one record.
    let ids: Vec<_> = notifications.iter().map(|n| n.id()).collect();
    assert_eq!(ids, vec![mb.m1.id, mb.m2.id]);
    assert!(notifications.iter().all(|n| n.entity_kind() == EntityKind::Item
        && n.operation() == Operation::Modify
        && n.changed_parts().contains("FLAGS")
        && n.mime_type() == "message/rfc822"));
}

#[test]
fn changes_before_removal_collapse_into_the_removal() {
    let mb = mailbox();
    let rx = mb.server.hub().subscribe("observer");
    let mut lines = default_scenario();
    lines.extend([
        format!("C: 2 STORE {} +FLAGS.SILENT (\\FLAGGED)", mb.m1.id),
        "S: 2 OK STORE completed".to_string(),
        format!("C: 3 STORE {} +FLAGS.SILENT (\\ANSWERED)", mb.m1.id),
        "S: 3 OK STORE completed".to_string(),
        format!("C: 4 REMOVE {}", mb.m1.id),
        "S: 4 OK REMOVE completed".to_string(),
    ]);
    assert_scenario(&mut mb.server.session(), &lines);

    assert_eq!(mb.server.hub().flush(), 1);
    let batch = rx.try_recv().unwrap();
    let ops: Vec<_> = batch.iter().map(|n| (n.id(), n.operation())).collect();
    assert_eq!(ops, vec![(mb.m1.id, Operation::Remove)]);
}

#[test]
fn store_with_stale_revision_is_rejected() {
    let mb = mailbox();
    let mut lines = default_scenario();
    lines.extend([
        format!("C: 2 STORE {} REV 0 +FLAGS.SILENT (\\FLAGGED)", mb.m2.id),
        "S: 2 OK STORE completed".to_string(),
        format!("C: 3 STORE {} REV 0 +FLAGS.SILENT (\\SEEN)", mb.m2.id),
        "S: 3 NO Item was modified elsewhere, aborting STORE.".to_string(),
        // One stale item aborts the whole set.
        format!("C: 4 STORE {}:{} REV 0 -FLAGS.SILENT (\\SEEN)", mb.m1.id, mb.m2.id),
        "S: 4 NO Item was modified elsewhere, aborting STORE.".to_string(),
        format!("C: 5 STORE {} REV 1 REMOTEID \"m2-new\"", mb.m2.id),
        "S: 5 OK STORE completed".to_string(),
    ]);
    assert_scenario(&mut mb.server.session(), &lines);

    let store = mb.server.store();
    assert!(store.item_flags(mb.m1.id).unwrap().contains("\\SEEN"));
    let m2 = store.item(mb.m2.id).unwrap().unwrap();
    assert_eq!(m2.rev, 2);
    assert_eq!(m2.remote_id, "m2-new");
    assert_eq!(
        store.item_flags(mb.m2.id).unwrap().into_iter().collect::<Vec<_>>(),
        vec!["\\FLAGGED".to_string()]
    );
}

#[test]
fn store_remote_identifiers_by_rid() {
    let mb = mailbox();
    let mut session = mb.server.session();
    let mut lines = default_scenario();
    lines.extend([
        "C: 2 RID STORE m2 REMOTEID \"m2-new\"".to_string(),
        "S: 2 NO Remote id selectors need a selected resource".to_string(),
        "C: 3 RESSELECT imap".to_string(),
        "S: 3 OK imap selected".to_string(),
        "C: 4 RID STORE m2 REMOTEID \"m2-new\" REMOTEREVISION \"5\"".to_string(),
        "S: 4 OK STORE completed".to_string(),
        "C: 5 RID STORE m2 REMOTEID \"x\"".to_string(),
        "S: 5 NO No such item: m2".to_string(),
    ]);
    assert_scenario(&mut session, &lines);

    let item = mb.server.store().item(mb.m2.id).unwrap().unwrap();
    assert_eq!(item.remote_id, "m2-new");
    assert_eq!(item.remote_revision, "5");
}

#[test]
fn hrid_walks_remote_id_paths() {
    let mb = mailbox();
    let mut session = mb.server.session();
    let mut lines = resource_scenario("imap");
    lines.extend([
        "C: 3 HRID STORE \"inbox/m1\" +FLAGS.SILENT (\\ANSWERED)".to_string(),
        "S: 3 OK STORE completed".to_string(),
        "C: 4 HRID SELECT \"archive\"".to_string(),
        "S: * 0 EXISTS".to_string(),
        "S: 4 OK Completed".to_string(),
        "C: 5 HRID SELECT \"nowhere/deep\"".to_string(),
        "S: 5 NO No such collection: nowhere/deep".to_string(),
    ]);
    assert_scenario(&mut session, &lines);
    assert!(mb.server.store().item_flags(mb.m1.id).unwrap().contains("\\ANSWERED"));
}

#[test]
fn move_within_resource() {
    let mb = mailbox();
    let rx = mb.server.hub().subscribe("observer");
    let mut lines = default_scenario();
    lines.extend([
        format!("C: 2 MOVE {} {}", mb.m2.id, mb.archive.id),
        "S: 2 OK MOVE completed".to_string(),
    ]);
    assert_scenario(&mut mb.server.session(), &lines);

    assert!(mb.service.requests().is_empty());
    assert_eq!(mb.server.store().item(mb.m2.id).unwrap().unwrap().collection_id, mb.archive.id);
    mb.server.hub().flush();
    let batch = rx.try_recv().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].operation(), Operation::Move);
    assert_eq!(batch[0].parent_collection(), mb.inbox.id);
    assert_eq!(batch[0].destination_parent_collection(), mb.archive.id);
    assert_eq!(batch[0].destination_resource(), "imap");
}

#[test]
fn move_across_resources_retrieves_payload() {
    let mb = mailbox();
    mb.service.provide(mb.m1.id, "RFC822", b"From: a@b");
    let mut lines = default_scenario();
    lines.extend([
        format!("C: 2 MOVE {}:{} {}", mb.m1.id, mb.m2.id, mb.remote.id),
        "S: 2 OK MOVE completed".to_string(),
    ]);
    assert_scenario(&mut mb.server.session(), &lines);

    let requests = mb.service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].resource, "imap");
    assert!(requests[0].full_payload);
    let store = mb.server.store();
    assert!(store.missing_parts(&[mb.m1.id]).unwrap().is_empty());
    assert_eq!(store.item(mb.m1.id).unwrap().unwrap().collection_id, mb.remote.id);
}

#[test]
fn move_fails_cleanly_without_payload() {
    let mb = mailbox();
    let mut session = mb.server.session();
    assert_scenario(&mut session, &default_scenario());
    let reply = session.handle_line(&format!("2 MOVE {} {}", mb.m1.id, mb.remote.id));
    assert_eq!(reply.len(), 1);
    assert!(reply[0].to_string().starts_with("2 NO Retrieval failed: "), "{reply:?}");
    assert_eq!(mb.server.store().item(mb.m1.id).unwrap().unwrap().collection_id, mb.inbox.id);
    assert_eq!(mb.server.hub().pending_len(), 0);

    assert_scenario(
        &mut session,
        &[
            format!("C: 3 MOVE {} {}", mb.m2.id, mb.search.id),
            "S: 3 NO Cannot move items into a virtual collection".to_string(),
            format!("C: 4 MOVE {} 999", mb.m2.id),
            "S: 4 NO No such collection: 999".to_string(),
        ],
    );
}

#[test]
fn move_from_two_resources_stores_nothing_when_one_fails() {
    let mb = mailbox();
    let mut init = mb.server.initializer();
    init.create_resource("other");
    let elsewhere = init.create_collection("other-inbox", None);
    let m3 = init.create_item(&elsewhere, "m3", "message/rfc822");
    init.add_part(&m3, "RFC822", None);
    // imap delivers, other does not.
    mb.service.provide(mb.m1.id, "RFC822", b"From: a@b");

    let mut lines = default_scenario();
    lines.extend([
        format!("C: 2 MOVE {},{} {}", mb.m1.id, m3.id, mb.remote.id),
        format!(
            "S: 2 NO Retrieval failed: resource other did not deliver part RFC822 of item {}",
            m3.id
        ),
    ]);
    assert_scenario(&mut mb.server.session(), &lines);

    let requests = mb.service.requests();
    let resources: Vec<_> = requests.iter().map(|r| r.resource.as_str()).collect();
    assert_eq!(resources, vec!["imap", "other"]);
    let store = mb.server.store();
    assert_eq!(store.missing_parts(&[mb.m1.id, m3.id]).unwrap().len(), 2);
    assert_eq!(store.item(mb.m1.id).unwrap().unwrap().collection_id, mb.inbox.id);
    assert_eq!(store.item(m3.id).unwrap().unwrap().collection_id, elsewhere.id);
    assert_eq!(mb.server.hub().pending_len(), 0);
}

#[test]
fn remove_items() {
    let mb = mailbox();
    let rx = mb.server.hub().subscribe("observer");
    let mut lines = default_scenario();
    lines.extend([
        format!("C: 2 REMOVE {}", mb.m1.id),
        "S: 2 OK REMOVE completed".to_string(),
        format!("C: 3 REMOVE {}", mb.m1.id),
        format!("S: 3 NO No such item: {}", mb.m1.id),
    ]);
    assert_scenario(&mut mb.server.session(), &lines);

    let store = mb.server.store();
    assert!(store.item(mb.m1.id).unwrap().is_none());
    assert!(store.item_flags(mb.m1.id).unwrap().is_empty());
    mb.server.hub().flush();
    let batch = rx.try_recv().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].operation(), Operation::Remove);
    assert_eq!(batch[0].remote_id(), "m1");
}

#[test]
fn link_and_unlink() {
    let mb = mailbox();
    let rx = mb.server.hub().subscribe("observer");
    let mut session = mb.server.session();
    let mut lines = default_scenario();
    lines.extend([
        format!("C: 2 SELECT {}", mb.archive.id),
        "S: * 0 EXISTS".to_string(),
        "S: 2 OK Completed".to_string(),
        // Linked items need not be in the selected collection.
        format!("C: 3 LINK {} {}:{}", mb.search.id, mb.m1.id, mb.m2.id),
        "S: 3 OK LINK completed".to_string(),
        format!("C: 4 LINK {} {}", mb.search.id, mb.m1.id),
        "S: 4 OK LINK completed".to_string(),
        format!("C: 5 UNLINK {} {}", mb.search.id, mb.m2.id),
        "S: 5 OK UNLINK completed".to_string(),
        format!("C: 6 LINK {} {}", mb.inbox.id, mb.m1.id),
        "S: 6 NO Can't link items to non-virtual collections".to_string(),
    ]);
    assert_scenario(&mut session, &lines);

    let store = mb.server.store();
    assert!(store.is_linked(mb.search.id, mb.m1.id).unwrap());
    assert!(!store.is_linked(mb.search.id, mb.m2.id).unwrap());

    // Linking then unlinking m2 cancels out within the batch.
    mb.server.hub().flush();
    let notifications: Vec<_> = rx.try_iter().flatten().collect();
    let ops: Vec<_> = notifications.iter().map(|n| (n.id(), n.operation())).collect();
    assert_eq!(ops, vec![(mb.m1.id, Operation::Link)]);
    assert_eq!(notifications[0].parent_collection(), mb.search.id);
}

#[test]
fn subscribe_only_notifies_real_changes() {
    let mb = mailbox();
    let mut session = mb.server.session();
    let mut lines = default_scenario();
    lines.extend([
        format!("C: 2 SUBSCRIBE {} {}", mb.inbox.id, mb.archive.id),
        "S: 2 OK Completed".to_string(),
        format!("C: 3 SUBSCRIBE {}", mb.inbox.id),
        "S: 3 OK Completed".to_string(),
        format!("C: 4 UNSUBSCRIBE {}", mb.archive.id),
        "S: 4 OK Completed".to_string(),
    ]);
    assert_scenario(&mut session, &lines);

    assert!(mb.server.store().collection(mb.inbox.id).unwrap().unwrap().subscribed);
    assert!(!mb.server.store().collection(mb.archive.id).unwrap().unwrap().subscribed);
    // Subscribing and unsubscribing archive cancels out.
    assert_eq!(mb.server.hub().pending_len(), 1);
}
