//! LIST scenarios.

use pimstore_server::Tristate;
use pimstore_storage::Value;
use pimstore_testkit::prelude::*;

fn scenario(server: &TestServer, command: &str, responses: Vec<String>) {
    let mut lines = default_scenario();
    lines.push(format!("C: {command}"));
    lines.extend(responses);
    lines.push("S: 2 OK List completed".to_string());
    assert_scenario(&mut server.session(), &lines);
}

#[test]
fn list_depths() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    let col1 = init.create_collection("col1", None);
    let col2 = init.create_collection("col2", Some(&col1));
    let col3 = init.create_collection("col3", Some(&col2));
    let col4 = init.create_collection("col4", None);

    // Recursive from the root, parents before children.
    scenario(
        &server,
        "2 LIST 0 INF () ()",
        vec![
            init.list_response(&col1, false),
            init.list_response(&col2, false),
            init.list_response(&col3, false),
            init.list_response(&col4, false),
        ],
    );
    scenario(
        &server,
        &format!("2 LIST {} 0 () ()", col1.id),
        vec![init.list_response(&col1, false)],
    );
    scenario(
        &server,
        &format!("2 LIST {} 1 () ()", col1.id),
        vec![init.list_response(&col2, false)],
    );
    scenario(
        &server,
        &format!("2 LIST {} INF () ()", col1.id),
        vec![init.list_response(&col2, false), init.list_response(&col3, false)],
    );
    scenario(
        &server,
        "2 LIST 0 1 () ()",
        vec![init.list_response(&col1, false), init.list_response(&col4, false)],
    );
}

#[test]
fn list_ancestors() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    let col1 = init.create_collection("col1", None);
    let col2 = init.create_collection("col2", Some(&col1));
    let col3 = init.create_collection("col3", Some(&col2));

    scenario(
        &server,
        &format!("2 LIST {} 0 () (ANCESTORS INF)", col2.id),
        vec![init.list_response(&col2, true)],
    );
    scenario(
        &server,
        &format!("2 LIST {} 1 () (ANCESTORS INF)", col1.id),
        vec![init.list_response(&col2, true)],
    );
    scenario(
        &server,
        &format!("2 LIST {} INF () (ANCESTORS INF)", col1.id),
        vec![init.list_response(&col2, true), init.list_response(&col3, true)],
    );
    scenario(
        &server,
        &format!("2 LIST {} 0 () (ANCESTORS (DEPTH INF type NAME REMOTEID))", col2.id),
        vec![init.list_response(&col2, true)],
    );
}

#[test]
fn list_filtered_by_mime_type_includes_ancestors() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    let col1 = init.create_collection("col1", None);
    let col2 = init.create_collection("col2", Some(&col1));
    let col3 = init.create_collection("col3", None);
    init.set_mime_types(&col2, &["text/calendar"]);
    init.set_mime_types(&col3, &["message/rfc822"]);

    scenario(
        &server,
        "2 LIST 0 INF (MIMETYPE (text/calendar)) ()",
        vec![init.list_response(&col1, false), init.list_response(&col2, false)],
    );
}

#[test]
fn list_filtered_by_resource() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    let col1 = init.create_collection("col1", None);
    init.create_resource("testresource2");
    let col2 = init.create_collection("col2", None);

    scenario(
        &server,
        "2 LIST 0 INF (RESOURCE \"testresource\") ()",
        vec![init.list_response(&col1, false)],
    );
    scenario(
        &server,
        "2 LIST 0 INF (RESOURCE \"testresource2\") ()",
        vec![init.list_response(&col2, false)],
    );
}

#[test]
fn list_enabled() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    let col1 = init.create_collection("col1", None);
    let col2 = init.create_collection("col2", Some(&col1));
    let col3 = init.create_collection("col3", Some(&col2));
    let col4 = init.create_collection("col4", None);
    for col in [&col2, &col4] {
        server
            .store()
            .update_collection(col.id, &[("enabled", Value::from(false))])
            .unwrap();
    }

    // Filters do not apply to a base listing.
    scenario(
        &server,
        &format!("2 LIST {} 0 (ENABLED) ()", col2.id),
        vec![init.list_response(&col2, false)],
    );
    // A disabled collection is still listed above an enabled descendant.
    scenario(
        &server,
        "2 LIST 0 INF (ENABLED) ()",
        vec![
            init.list_response(&col1, false),
            init.list_response(&col2, false),
            init.list_response(&col3, false),
        ],
    );
}

#[test]
fn list_preferences_override_enabled() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    let col1 = init.create_collection("col1", None);
    let col2 = init.create_collection("col2", Some(&col1));
    init.set_preferences(&col2, false, Tristate::True, Tristate::True, Tristate::True);
    let col3 = init.create_collection("col3", Some(&col2));
    init.set_preferences(&col3, true, Tristate::False, Tristate::False, Tristate::False);

    let line = init.list_response(&col3, false);
    assert!(line.contains("ENABLED TRUE DISPLAY FALSE SYNC FALSE INDEX FALSE"), "{line}");
    // Base listing of a hidden collection still works.
    scenario(
        &server,
        &format!("2 LIST {} 0 (DISPLAY) ()", col3.id),
        vec![line],
    );
    for filter in ["DISPLAY", "SYNC", "INDEX"] {
        scenario(
            &server,
            &format!("2 LIST 0 INF ({filter}) ()"),
            vec![init.list_response(&col1, false), init.list_response(&col2, false)],
        );
    }
    // A local override counts as enabled.
    scenario(
        &server,
        "2 LIST 0 INF (ENABLED) ()",
        vec![
            init.list_response(&col1, false),
            init.list_response(&col2, false),
            init.list_response(&col3, false),
        ],
    );
}

#[test]
fn list_attributes() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    let col1 = init.create_collection("col1", None);
    let col2 = init.create_collection("col2", None);
    init.set_attribute(&col1, "type", "value");
    init.set_attribute(&col2, "type", "Umlautäöü");

    let line = init.list_response(&col2, false);
    assert!(line.ends_with("type \"Umlautäöü\")"), "{line}");
    scenario(
        &server,
        &format!("2 LIST {} 0 () ()", col1.id),
        vec![init.list_response(&col1, false)],
    );
    scenario(&server, &format!("2 LIST {} 0 () ()", col2.id), vec![line]);
}

#[test]
fn list_errors() {
    let server = TestServer::new();
    let mut session = server.session();
    assert_scenario(
        &mut session,
        &[
            "C: 1 LIST 999 0 () ()",
            "S: 1 NO No such collection: 999",
            "C: 2 LIST 0 2 () ()",
            "S: 2 BAD unexpected token for depth: 2",
            "C: 3 LIST 0 INF (RESOURCE \"nope\") ()",
            "S: 3 NO No such resource: nope",
        ],
    );
}
