//! Session-level protocol behavior.

use pimstore_testkit::prelude::*;

#[test]
fn unknown_verb_keeps_connection_usable() {
    let server = TestServer::new();
    let mut session = server.session();
    assert_scenario(
        &mut session,
        &[
            "C: 1 FETCH 1:* (FLAGS)",
            "S: 1 BAD Unknown command FETCH",
            "C: 2 LOGIN testsession",
            "S: 2 OK User logged in",
            "C: 3 LIST 0 INF () ()",
            "S: 3 OK List completed",
        ],
    );
}

#[test]
fn malformed_lines_get_bad() {
    let server = TestServer::new();
    let mut session = server.session();
    assert_scenario(
        &mut session,
        &[
            "C: 1 LOGIN \"unterminated",
            "S: 1 BAD unterminated quoted string",
            "C: 2 LIST 0 INF (() ()",
            "S: 2 BAD unbalanced parenthesis",
            "C: 3 LOGIN",
            "S: 3 BAD missing argument: session id",
            "C: 4 LOGIN a b",
            "S: 4 BAD unexpected token for end of line: b",
        ],
    );
}

#[test]
fn selectors_fail_with_no() {
    let server = TestServer::new();
    let mut init = server.initializer();
    init.create_resource("testresource");
    let col = init.create_collection("col", None);
    let mut session = server.session();

    let reply = session.handle_line("1 SELECT x:y");
    assert!(reply[0].to_string().starts_with("1 NO Invalid selector: "), "{reply:?}");
    let reply = session.handle_line(&format!("2 SELECT {}:{}", col.id, col.id + 5));
    assert_eq!(
        reply[0].to_string(),
        format!("2 NO No such collection: {}:{}", col.id, col.id + 5)
    );
    // An open interval takes whatever exists.
    let reply = session.handle_line(&format!("3 SUBSCRIBE {}:*", col.id));
    assert_eq!(reply[0].to_string(), "3 OK Completed");
    let reply = session.handle_line("4 HRID SELECT \"col\"");
    assert_eq!(
        reply[0].to_string(),
        "4 NO Remote id selectors need a selected resource"
    );
    let reply = session.handle_line("5 RESSELECT nope");
    assert_eq!(reply[0].to_string(), "5 NO No such resource: nope");
}

#[test]
fn prefixes_apply_to_scoped_verbs_only() {
    let server = TestServer::new();
    let mut session = server.session();
    let reply = session.handle_line("1 RID LOGIN me");
    assert!(reply[0].to_string().starts_with("1 BAD "), "{reply:?}");
    let reply = session.handle_line("2 HRID");
    assert!(reply[0].to_string().starts_with("2 BAD "), "{reply:?}");
}

#[test]
fn capability_and_logout() {
    let server = TestServer::new();
    let mut session = server.session();
    let reply = session.handle_line("1 CAPABILITY");
    let verbs = reply[0].to_string();
    for verb in ["LIST", "MODIFY", "STORE", "MOVE", "REMOVE", "LINK", "SUBSCRIBE", "UID"] {
        assert!(verbs.split(' ').any(|v| v == verb), "{verb} missing from {verbs}");
    }
    assert_scenario(
        &mut session,
        &[
            "C: 2 LOGOUT",
            "S: * BYE PimStore server logging out",
            "S: 2 OK Logout completed",
        ],
    );
    assert!(session.is_closed());
}
