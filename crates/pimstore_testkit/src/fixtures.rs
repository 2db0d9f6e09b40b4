//! Test fixtures and database helpers.
//!
//! [`TestServer`] owns a temporary database file and a [`PimServer`] over
//! it, so tests can open as many sessions as they need against shared
//! state. [`DbInitializer`] seeds entities and renders the `LIST` lines a
//! client should see for them.

use pimstore_protocol::{list, quote};
use pimstore_server::{
    Collection, DataStore, Item, NotificationHub, OfflineRetrieval, PimServer, Resource,
    RetrievalService, ServerConfig, Session, Tristate,
};
use pimstore_storage::{schema, SqliteBackend};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A server over a temporary database with automatic cleanup.
pub struct TestServer {
    /// The server instance.
    pub server: PimServer,
    /// Connection used for seeding and inspection.
    backend: SqliteBackend,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestServer {
    /// Creates a server whose resources are all offline.
    pub fn new() -> Self {
        Self::with_retrieval(Arc::new(OfflineRetrieval))
    }

    /// Creates a server fetching missing payload through `retrieval`.
    pub fn with_retrieval(retrieval: Arc<dyn RetrievalService>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("pimstore.db");
        let config = ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)), path.clone());
        let server = PimServer::new(config, retrieval);
        server.prepare_database().expect("Failed to create schema");
        let backend = SqliteBackend::open(&path).expect("Failed to open database");
        Self {
            server,
            backend,
            temp_dir,
        }
    }

    /// Store access on the fixture's own connection.
    pub fn store(&self) -> DataStore<'_> {
        DataStore::new(&self.backend)
    }

    /// Seeding helper on the fixture's own connection.
    pub fn initializer(&self) -> DbInitializer<'_> {
        DbInitializer::new(self.store())
    }

    /// Opens a new session on its own connection.
    pub fn session(&self) -> Session {
        self.server.open_session().expect("Failed to open session")
    }

    /// The hub shared by all sessions.
    pub fn hub(&self) -> &Arc<NotificationHub> {
        self.server.hub()
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a temporary server.
///
/// # Example
///
/// ```rust,ignore
/// use pimstore_testkit::with_test_server;
///
/// with_test_server(|server| {
///     let mut session = server.session();
///     session.handle_line("1 LOGIN tester");
/// });
/// ```
pub fn with_test_server<F, R>(f: F) -> R
where
    F: FnOnce(&TestServer) -> R,
{
    let server = TestServer::new();
    f(&server)
}

/// Creates an in-memory backend with the schema applied.
pub fn memory_backend() -> SqliteBackend {
    let backend = SqliteBackend::open_in_memory().expect("Failed to open in-memory database");
    schema::apply(&backend).expect("Failed to create schema");
    backend
}

/// Seeds resources, collections and items.
///
/// Collections are created in the most recently created resource, with
/// their name as remote id, enabled and unsubscribed.
pub struct DbInitializer<'a> {
    store: DataStore<'a>,
    resource: Option<Resource>,
}

impl<'a> DbInitializer<'a> {
    /// Creates an initializer over `store`.
    pub fn new(store: DataStore<'a>) -> Self {
        Self {
            store,
            resource: None,
        }
    }

    /// Creates a resource and makes it current.
    pub fn create_resource(&mut self, name: &str) -> Resource {
        let id = self
            .store
            .create_resource(name, false)
            .expect("Failed to create resource");
        let resource = Resource {
            id,
            name: name.to_string(),
            is_virtual: false,
        };
        self.resource = Some(resource.clone());
        resource
    }

    fn current_resource(&self) -> i64 {
        self.resource
            .as_ref()
            .map(|r| r.id)
            .expect("create_resource must be called first")
    }

    fn insert_collection(&self, collection: Collection) -> Collection {
        let id = self
            .store
            .create_collection(&collection)
            .expect("Failed to create collection");
        Collection { id, ..collection }
    }

    /// Creates a collection below `parent` (the root if `None`).
    pub fn create_collection(&self, name: &str, parent: Option<&Collection>) -> Collection {
        self.insert_collection(Collection {
            remote_id: name.to_string(),
            name: name.to_string(),
            parent_id: parent.map(|p| p.id),
            resource_id: self.current_resource(),
            enabled: true,
            ..Collection::default()
        })
    }

    /// Creates a virtual collection at the root.
    pub fn create_virtual_collection(&self, name: &str) -> Collection {
        self.insert_collection(Collection {
            remote_id: name.to_string(),
            name: name.to_string(),
            resource_id: self.current_resource(),
            enabled: true,
            is_virtual: true,
            ..Collection::default()
        })
    }

    /// Creates an item with the given remote id and mime type.
    pub fn create_item(&self, collection: &Collection, remote_id: &str, mime_type: &str) -> Item {
        let mime_type_id = self
            .store
            .mime_type_id(mime_type)
            .expect("Failed to create mime type");
        let item = Item {
            remote_id: remote_id.to_string(),
            collection_id: collection.id,
            mime_type_id,
            ..Item::default()
        };
        let id = self.store.create_item(&item).expect("Failed to create item");
        self.store
            .item(id)
            .expect("Failed to load item")
            .expect("Item vanished")
    }

    /// Attaches flags to an item.
    pub fn add_flags(&self, item: &Item, flags: &[&str]) {
        let flags: BTreeSet<String> = flags.iter().map(|f| f.to_string()).collect();
        self.store
            .add_item_flags(item.id, &flags)
            .expect("Failed to add flags");
    }

    /// Adds a payload part; `None` leaves it for the resource to deliver.
    pub fn add_part(&self, item: &Item, name: &str, data: Option<&[u8]>) {
        let size = data.map_or(0, |d| i64::try_from(d.len()).unwrap_or(i64::MAX));
        self.store
            .add_part(item.id, name, data, size)
            .expect("Failed to add part");
    }

    /// Sets the content mime types of a collection.
    pub fn set_mime_types(&self, collection: &Collection, types: &[&str]) {
        let types: Vec<String> = types.iter().map(|t| t.to_string()).collect();
        self.store
            .set_collection_mime_types(collection.id, &types)
            .expect("Failed to set mime types");
    }

    /// Sets a collection attribute.
    pub fn set_attribute(&self, collection: &Collection, key: &str, value: &str) {
        self.store
            .set_collection_attribute(collection.id, key.as_bytes(), value.as_bytes())
            .expect("Failed to set attribute");
    }

    /// Sets the enabled flag and the display, sync and index preferences.
    pub fn set_preferences(
        &self,
        collection: &Collection,
        enabled: bool,
        display: Tristate,
        sync: Tristate,
        index: Tristate,
    ) {
        self.store
            .update_collection(
                collection.id,
                &[
                    ("enabled", enabled.into()),
                    ("display_pref", display.into()),
                    ("sync_pref", sync.into()),
                    ("index_pref", index.into()),
                ],
            )
            .expect("Failed to update preferences");
    }

    /// Reloads a collection.
    pub fn collection(&self, id: i64) -> Collection {
        self.store
            .collection(id)
            .expect("Failed to load collection")
            .expect("No such collection")
    }

    /// Renders the `S:` line `LIST` sends for `collection`.
    pub fn list_response(&self, collection: &Collection, ancestors: bool) -> String {
        let collection = self.collection(collection.id);
        let mime_types = self
            .store
            .collection_mime_types(collection.id)
            .expect("Failed to load mime types");
        let resource = self
            .store
            .resource_name(collection.resource_id)
            .expect("Failed to load resource");
        let atom = |b: bool| if b { "TRUE" } else { "FALSE" };
        let pref = |t: Tristate| match t {
            Tristate::True => "TRUE",
            Tristate::False => "FALSE",
            Tristate::Undefined => "DEFAULT",
        };
        let policy = &collection.cache_policy;
        let cache_policy = list([
            format!("INHERIT {}", atom(policy.inherit)),
            format!("INTERVAL {}", policy.check_interval),
            format!("CACHETIMEOUT {}", policy.cache_timeout),
            format!("SYNCONDEMAND {}", atom(policy.sync_on_demand)),
            format!("LOCALPARTS {}", list(&policy.local_parts)),
        ]);

        let mut fields = vec![
            format!("NAME {}", quote(&collection.name)),
            format!("MIMETYPE {}", list(mime_types)),
            format!("REMOTEID {}", quote(&collection.remote_id)),
            format!("RESOURCE {}", quote(&resource)),
            format!("ENABLED {}", atom(collection.enabled)),
            format!("DISPLAY {}", pref(collection.display_pref)),
            format!("SYNC {}", pref(collection.sync_pref)),
            format!("INDEX {}", pref(collection.index_pref)),
            format!("SUBSCRIBED {}", atom(collection.subscribed)),
            format!("VIRTUAL {}", atom(collection.is_virtual)),
            format!("CACHEPOLICY {cache_policy}"),
        ];
        for (key, value) in self
            .store
            .collection_attributes(collection.id)
            .expect("Failed to load attributes")
        {
            fields.push(format!(
                "{} {}",
                String::from_utf8_lossy(&key),
                quote(&String::from_utf8_lossy(&value))
            ));
        }
        if ancestors {
            let mut chain = Vec::new();
            let mut parent = collection.parent_id;
            while let Some(id) = parent {
                let ancestor = self.collection(id);
                chain.push(format!("({} {})", ancestor.id, quote(&ancestor.remote_id)));
                parent = ancestor.parent_id;
            }
            chain.push("(0 \"\")".to_string());
            fields.push(format!("ANCESTORS {}", list(chain)));
        }
        format!(
            "S: * {} {} {}",
            collection.id,
            collection.parent_id.unwrap_or(0),
            list(fields)
        )
    }
}
