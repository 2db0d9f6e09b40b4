//! End-to-end tests over TCP.

use pimstore_protocol::{EntityKind, Operation};
use pimstore_server::{Collection, DataStore, OfflineRetrieval, PimServer, ServerConfig, GREETING};
use pimstore_storage::{schema, SqliteBackend};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let (reader, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut client = Self {
            lines: BufReader::new(reader).lines(),
            writer,
        };
        assert_eq!(client.line().await, GREETING);
        client
    }

    async fn line(&mut self) -> String {
        self.lines.next_line().await.unwrap().expect("connection closed")
    }

    /// Sends one command and collects lines up to its tagged reply.
    async fn command(&mut self, line: &str) -> Vec<String> {
        let tag = line.split(' ').next().unwrap().to_string();
        self.writer.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
        let mut out = Vec::new();
        loop {
            let reply = self.line().await;
            let done = reply.starts_with(&format!("{tag} "));
            out.push(reply);
            if done {
                return out;
            }
        }
    }
}

async fn start(dir: &tempfile::TempDir) -> (Arc<PimServer>, SocketAddr, i64) {
    let path = dir.path().join("pimstore.db");
    let collection = {
        let backend = SqliteBackend::open(&path).unwrap();
        schema::apply(&backend).unwrap();
        let store = DataStore::new(&backend);
        let resource = store.create_resource("imap", false).unwrap();
        store
            .create_collection(&Collection {
                name: "Inbox".into(),
                remote_id: "inbox".into(),
                resource_id: resource,
                enabled: true,
                ..Collection::default()
            })
            .unwrap()
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig::new(addr, path);
    let server = Arc::new(PimServer::new(config, Arc::new(OfflineRetrieval)));
    server.prepare_database().unwrap();
    tokio::spawn(Arc::clone(&server).serve(listener));
    (server, addr, collection)
}

#[tokio::test]
async fn commands_over_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let (_server, addr, collection) = start(&dir).await;

    let mut client = Client::connect(addr).await;
    assert_eq!(client.command("1 LOGIN tester").await, vec!["1 OK User logged in"]);
    let listed = client.command("2 LIST 0 INF () ()").await;
    assert_eq!(listed.len(), 2, "{listed:?}");
    assert!(listed[0].starts_with(&format!("* {collection} 0 (NAME \"Inbox\"")));
    assert_eq!(listed[1], "2 OK List completed");

    assert_eq!(client.command("3 FROB").await, vec!["3 BAD Unknown command FROB"]);
    let logout = client.command("4 LOGOUT").await;
    assert_eq!(logout, vec!["* BYE PimStore server logging out", "4 OK Logout completed"]);
    assert!(client.lines.next_line().await.unwrap().is_none());
}

#[tokio::test]
async fn changes_reach_subscribers_after_flush() {
    let dir = tempfile::tempdir().unwrap();
    let (server, addr, collection) = start(&dir).await;
    let watcher = server.hub().subscribe("watcher");

    let mut first = Client::connect(addr).await;
    let mut second = Client::connect(addr).await;
    first.command("1 LOGIN first").await;
    second.command("1 LOGIN second").await;

    let reply = first
        .command(&format!("2 MODIFY {collection} NAME \"Archive\""))
        .await;
    assert_eq!(reply, vec!["2 OK MODIFY done"]);
    let reply = second.command(&format!("2 SUBSCRIBE {collection}")).await;
    assert_eq!(reply, vec!["2 OK Completed"]);

    // Nothing is delivered before the flush.
    assert!(watcher.try_recv().is_err());
    assert_eq!(server.hub().flush(), 2);

    let batch = watcher.try_recv().unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].entity_kind(), EntityKind::Collection);
    assert_eq!(batch[0].operation(), Operation::Modify);
    assert_eq!(batch[0].session_id(), "first");
    assert!(batch[0].changed_parts().contains("NAME"));
    assert_eq!(batch[1].operation(), Operation::Subscribe);
    assert_eq!(batch[1].session_id(), "second");

    let listed = second.command("3 LIST 0 INF () ()").await;
    assert!(listed[0].contains("NAME \"Archive\""), "{listed:?}");
}
