//! MODIFY: change fields of one collection.
//!
//! ```text
//! tag [UID|RID|HRID] MODIFY scope field value [field value …]
//! ```
//!
//! `CACHEPOLICY (INHERIT b INTERVAL n CACHETIMEOUT n SYNCONDEMAND b
//! LOCALPARTS (…))` updates only the keys it names. `DISPLAY`, `SYNC` and
//! `INDEX` take `TRUE`, `FALSE` or `DEFAULT`.

use super::{collection_change, parse_bool, parse_tristate, CommandContext, Mutation, Reply};
use crate::error::{ServerError, ServerResult};
use crate::retrieval::store_parts;
use crate::session::SessionState;
use crate::store::{CachePolicy, Collection, Tristate};
use pimstore_protocol::{string_list, Args, Operation, ProtocolError, Token};
use pimstore_storage::Value;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    Name(String),
    Parent(Option<i64>),
    RemoteId(String),
    RemoteRevision(String),
    MimeTypes(Vec<String>),
    Enabled(bool),
    Preference(Preference, Tristate),
    CachePolicy(PolicyChange),
    SetAttribute(String, String),
    RemoveAttribute(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Preference {
    Display,
    Sync,
    Index,
}

impl Preference {
    fn column(self) -> &'static str {
        match self {
            Preference::Display => "display_pref",
            Preference::Sync => "sync_pref",
            Preference::Index => "index_pref",
        }
    }

    fn part(self) -> &'static str {
        match self {
            Preference::Display => "DISPLAY",
            Preference::Sync => "SYNC",
            Preference::Index => "INDEX",
        }
    }

    fn slot(self, collection: &mut Collection) -> &mut Tristate {
        match self {
            Preference::Display => &mut collection.display_pref,
            Preference::Sync => &mut collection.sync_pref,
            Preference::Index => &mut collection.index_pref,
        }
    }
}

/// Cache policy keys named by one MODIFY; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PolicyChange {
    inherit: Option<bool>,
    check_interval: Option<i64>,
    cache_timeout: Option<i64>,
    sync_on_demand: Option<bool>,
    local_parts: Option<Vec<String>>,
}

impl PolicyChange {
    fn parse(tokens: Vec<Token>) -> ServerResult<Self> {
        let mut fields = Args::new(tokens);
        let mut change = Self::default();
        while !fields.is_empty() {
            let key = fields.next_atom("cache policy field")?;
            match key.to_ascii_uppercase().as_str() {
                "INHERIT" => {
                    change.inherit = Some(parse_bool("inherit", &fields.next_atom("inherit")?)?)
                }
                "INTERVAL" => change.check_interval = Some(minutes(&fields.next_atom("interval")?)?),
                "CACHETIMEOUT" => {
                    change.cache_timeout = Some(minutes(&fields.next_atom("cache timeout")?)?)
                }
                "SYNCONDEMAND" => {
                    let atom = fields.next_atom("sync on demand")?;
                    change.sync_on_demand = Some(parse_bool("sync on demand", &atom)?)
                }
                "LOCALPARTS" => {
                    change.local_parts =
                        Some(string_list("local part", fields.next_list("local parts")?)?)
                }
                _ => return Err(ProtocolError::unexpected("cache policy field", key).into()),
            }
        }
        Ok(change)
    }

    fn apply_to(self, policy: &CachePolicy) -> CachePolicy {
        CachePolicy {
            inherit: self.inherit.unwrap_or(policy.inherit),
            check_interval: self.check_interval.unwrap_or(policy.check_interval),
            cache_timeout: self.cache_timeout.unwrap_or(policy.cache_timeout),
            sync_on_demand: self.sync_on_demand.unwrap_or(policy.sync_on_demand),
            local_parts: self.local_parts.unwrap_or_else(|| policy.local_parts.clone()),
        }
    }
}

/// Signed minutes; `-1` disables the interval.
fn minutes(text: &str) -> ServerResult<i64> {
    text.parse()
        .map_err(|_| ProtocolError::InvalidNumber(text.to_string()).into())
}

fn parse_changes(args: &mut Args) -> ServerResult<Vec<Change>> {
    let mut changes = Vec::new();
    while !args.is_empty() {
        let key = args.next_atom("field")?;
        let change = match key.to_ascii_uppercase().as_str() {
            "NAME" => Change::Name(args.next_string("name")?),
            "PARENT" => {
                let parent = args.next_number("parent")?;
                let parent = i64::try_from(parent)
                    .map_err(|_| ProtocolError::InvalidNumber(parent.to_string()))?;
                Change::Parent((parent != 0).then_some(parent))
            }
            "REMOTEID" => Change::RemoteId(args.next_string("remote id")?),
            "REMOTEREVISION" => Change::RemoteRevision(args.next_string("remote revision")?),
            "MIMETYPE" => Change::MimeTypes(string_list("mime type", args.next_list("mime types")?)?),
            "ENABLED" => Change::Enabled(parse_bool("enabled", &args.next_atom("enabled")?)?),
            "DISPLAY" => Change::Preference(
                Preference::Display,
                parse_tristate("display", &args.next_atom("display")?)?,
            ),
            "SYNC" => Change::Preference(
                Preference::Sync,
                parse_tristate("sync", &args.next_atom("sync")?)?,
            ),
            "INDEX" => Change::Preference(
                Preference::Index,
                parse_tristate("index", &args.next_atom("index")?)?,
            ),
            "CACHEPOLICY" => Change::CachePolicy(PolicyChange::parse(args.next_list("cache policy")?)?),
            "VIRTUAL" => {
                return Err(ServerError::Rejected(
                    "Can't modify VIRTUAL collection flag".into(),
                ))
            }
            _ => match key.strip_prefix('-') {
                Some(attribute) if !attribute.is_empty() => {
                    Change::RemoveAttribute(attribute.to_string())
                }
                _ => match args.next_token("attribute value")? {
                    Token::Atom(value) | Token::Quoted(value) => Change::SetAttribute(key, value),
                    other => {
                        return Err(ProtocolError::unexpected("attribute value", other.to_string()).into())
                    }
                },
            },
        };
        changes.push(change);
    }
    Ok(changes)
}

/// `[UID|RID|HRID] MODIFY scope changes…`
pub(super) fn modify(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    let scope = ctx.next_scope(args)?;
    let changes = parse_changes(args)?;
    let collection = ctx.resolve_collection(&scope)?;
    let owner = ctx
        .session
        .resource
        .as_ref()
        .is_some_and(|r| r.id == collection.resource_id);

    // Payload must be local before a subtree leaves its resource.
    let new_parent = changes.iter().rev().find_map(|c| match c {
        Change::Parent(parent) => Some(*parent),
        _ => None,
    });
    let mut payload = Vec::new();
    if let Some(Some(parent)) = new_parent.filter(|p| *p != collection.parent_id) {
        let store = ctx.store();
        let target = store
            .collection(parent)?
            .ok_or_else(|| ServerError::not_found("collection", parent.to_string()))?;
        if target.resource_id != collection.resource_id {
            ctx.enter(SessionState::Retrieving);
            let subtree = store.descendants(collection.id)?;
            let items = store.item_ids_in_collections(&subtree)?;
            payload = ctx.retriever.fetch_full_payload(&store, &items)?;
        }
    }

    ctx.execute(|m| {
        store_parts(&m.store, &payload)?;
        apply(m, collection, changes, owner)
    })?;
    Ok(Reply::ok("MODIFY done"))
}

fn apply(
    m: &mut Mutation<'_>,
    mut collection: Collection,
    changes: Vec<Change>,
    owner: bool,
) -> ServerResult<()> {
    let store = m.store;
    let mut parts: BTreeSet<String> = BTreeSet::new();
    let mut columns: Vec<(&str, Value)> = Vec::new();

    for change in changes {
        match change {
            Change::Name(name) => {
                if name == collection.name {
                    continue;
                }
                if store.sibling_name_taken(collection.parent_id, &name, collection.id)? {
                    return Err(ServerError::Rejected(
                        "Collection with the same name exists already".into(),
                    ));
                }
                columns.push(("name", Value::from(name.as_str())));
                collection.name = name;
                parts.insert("NAME".into());
            }
            Change::Parent(parent) => {
                if parent == collection.parent_id {
                    continue;
                }
                move_collection(m, &mut collection, parent)?;
                parts.insert("PARENT".into());
            }
            Change::RemoteId(remote_id) => {
                if remote_id == collection.remote_id {
                    continue;
                }
                if !owner {
                    return Err(ServerError::Rejected(
                        "Only resources can modify remote identifiers".into(),
                    ));
                }
                columns.push(("remote_id", Value::from(remote_id.as_str())));
                collection.remote_id = remote_id;
                parts.insert("REMOTEID".into());
            }
            Change::RemoteRevision(revision) => {
                if revision == collection.remote_revision {
                    continue;
                }
                columns.push(("remote_revision", Value::from(revision.as_str())));
                collection.remote_revision = revision;
                parts.insert("REMOTEREVISION".into());
            }
            Change::MimeTypes(types) => {
                let current: BTreeSet<String> =
                    store.collection_mime_types(collection.id)?.into_iter().collect();
                let wanted: BTreeSet<String> = types.iter().cloned().collect();
                if current != wanted {
                    store.set_collection_mime_types(collection.id, &types)?;
                    parts.insert("MIMETYPE".into());
                }
            }
            Change::Enabled(enabled) => {
                if enabled == collection.enabled {
                    continue;
                }
                columns.push(("enabled", Value::from(enabled)));
                collection.enabled = enabled;
                parts.insert("ENABLED".into());
            }
            Change::Preference(preference, value) => {
                let slot = preference.slot(&mut collection);
                if *slot == value {
                    continue;
                }
                *slot = value;
                columns.push((preference.column(), value.into()));
                parts.insert(preference.part().into());
            }
            Change::CachePolicy(change) => {
                let policy = change.apply_to(&collection.cache_policy);
                if policy == collection.cache_policy {
                    continue;
                }
                columns.extend(policy.columns());
                collection.cache_policy = policy;
                parts.insert("CACHEPOLICY".into());
            }
            Change::SetAttribute(key, value) => {
                if store.set_collection_attribute(collection.id, key.as_bytes(), value.as_bytes())? {
                    parts.insert(key);
                }
            }
            Change::RemoveAttribute(key) => {
                if store.remove_collection_attribute(collection.id, key.as_bytes())? {
                    parts.insert(key);
                }
            }
        }
    }

    if parts.is_empty() {
        debug!(collection = collection.id, "modify changed nothing");
        return Ok(());
    }
    store.update_collection(collection.id, &columns)?;
    let notification = collection_change(&store, Operation::Modify, &collection)?.with_parts(parts);
    m.notify(notification);
    Ok(())
}

fn move_collection(
    m: &mut Mutation<'_>,
    collection: &mut Collection,
    parent: Option<i64>,
) -> ServerResult<()> {
    let store = m.store;
    let resource_id = match parent {
        Some(parent) => {
            let target = store
                .collection(parent)?
                .ok_or_else(|| ServerError::not_found("collection", parent.to_string()))?;
            let subtree = store.descendants(collection.id)?;
            if subtree.contains(&parent) {
                return Err(ServerError::Rejected(
                    "Cannot move a collection into its own subtree".into(),
                ));
            }
            target.resource_id
        }
        None => collection.resource_id,
    };
    if store.sibling_name_taken(parent, &collection.name, collection.id)? {
        return Err(ServerError::Rejected(
            "Collection with the same name exists already".into(),
        ));
    }

    let source = collection_change(&store, Operation::Move, collection)?;
    store.update_collection(collection.id, &[("parent_id", Value::from(parent))])?;
    if resource_id != collection.resource_id {
        let subtree = store.descendants(collection.id)?;
        store.set_collections_resource(&subtree, resource_id)?;
    }
    collection.parent_id = parent;
    collection.resource_id = resource_id;

    let destination = store.resource_name(resource_id)?;
    m.notify(source.with_destination(parent.unwrap_or(0), destination));
    Ok(())
}
