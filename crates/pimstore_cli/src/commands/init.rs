//! Init command implementation.

use pimstore_server::DataStore;
use pimstore_storage::{schema, SqliteBackend};
use std::path::Path;
use tracing::info;

/// Creates the schema and registers `resources` that do not exist yet.
///
/// Returns the number of resources created.
pub fn run(
    path: &Path,
    resources: &[String],
    is_virtual: bool,
) -> Result<usize, Box<dyn std::error::Error>> {
    let backend = SqliteBackend::open(path)?;
    schema::apply(&backend)?;
    let store = DataStore::new(&backend);

    let mut created = 0;
    for name in resources {
        if name.is_empty() {
            return Err("resource names must not be empty".into());
        }
        if store.resource_by_name(name)?.is_some() {
            println!("resource {name} exists");
            continue;
        }
        let id = store.create_resource(name, is_virtual)?;
        info!(resource = %name, id, "resource registered");
        println!("resource {name} registered as {id}");
        created += 1;
    }
    println!("database ready at {}", path.display());
    Ok(created)
}
