//! Command handlers.
//!
//! Every verb maps to one [`HandlerFn`] in the [`CommandTable`], which is
//! built once at startup and shared by all sessions. A handler parses its
//! arguments, resolves its scope and runs its mutation through
//! [`CommandContext::execute`], which owns the transaction and publishes the
//! collected notifications after commit.

mod connection;
mod item;
mod link;
mod list;
mod modify;
mod select;
mod store;
mod subscribe;

use crate::error::{ServerError, ServerResult};
use crate::hub::NotificationHub;
use crate::retrieval::ItemRetriever;
use crate::scope::{ScopeContext, ScopeResolver, Target};
use crate::session::{SessionData, SessionState};
use crate::store::{Collection, DataStore, Item, Tristate};
use pimstore_protocol::{
    Args, ChangeNotification, Collector, EntityKind, Operation, ProtocolError, Scope, ScopeKind,
};
use pimstore_storage::{Backend, Transaction};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Signature shared by all verb handlers.
pub(crate) type HandlerFn = fn(&mut CommandContext<'_>, &mut Args) -> ServerResult<Reply>;

#[derive(Clone, Copy)]
struct CommandEntry {
    handler: HandlerFn,
    /// Accepts a `UID`/`RID`/`HRID` prefix.
    scoped: bool,
}

/// Verb lookup table.
pub struct CommandTable {
    commands: HashMap<&'static str, CommandEntry>,
}

impl CommandTable {
    /// Builds the table of every supported verb.
    pub fn new() -> Self {
        let mut table = Self {
            commands: HashMap::new(),
        };
        table.register("LOGIN", connection::login, false);
        table.register("LOGOUT", connection::logout, false);
        table.register("CAPABILITY", connection::capability, false);
        table.register("RESSELECT", connection::resselect, false);
        table.register("SELECT", select::select, true);
        table.register("LIST", list::list, false);
        table.register("MODIFY", modify::modify, true);
        table.register("STORE", store::store, true);
        table.register("MOVE", item::move_items, true);
        table.register("REMOVE", item::remove, true);
        table.register("LINK", link::link, true);
        table.register("UNLINK", link::unlink, true);
        table.register("SUBSCRIBE", subscribe::subscribe, true);
        table.register("UNSUBSCRIBE", subscribe::unsubscribe, true);
        table.register("UID", uid_prefix, false);
        table.register("RID", rid_prefix, false);
        table.register("HRID", hrid_prefix, false);
        table
    }

    fn register(&mut self, verb: &'static str, handler: HandlerFn, scoped: bool) {
        self.commands.insert(verb, CommandEntry { handler, scoped });
    }

    pub(crate) fn handler(&self, verb: &str) -> Option<HandlerFn> {
        self.commands.get(verb).map(|entry| entry.handler)
    }

    /// Supported verbs, sorted.
    pub fn verbs(&self) -> Vec<&'static str> {
        let mut verbs: Vec<_> = self.commands.keys().copied().collect();
        verbs.sort_unstable();
        verbs
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTable")
            .field("verbs", &self.verbs())
            .finish()
    }
}

fn uid_prefix(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    scoped(ctx, args, ScopeKind::Uid)
}

fn rid_prefix(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    scoped(ctx, args, ScopeKind::Rid)
}

fn hrid_prefix(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    scoped(ctx, args, ScopeKind::HierarchicalRid)
}

/// Runs the sub-command with its selector read as `kind`.
fn scoped(ctx: &mut CommandContext<'_>, args: &mut Args, kind: ScopeKind) -> ServerResult<Reply> {
    let verb = args.next_atom("command")?.to_ascii_uppercase();
    let entry = ctx
        .commands
        .commands
        .get(verb.as_str())
        .copied()
        .ok_or_else(|| ServerError::UnknownCommand(verb.clone()))?;
    if !entry.scoped {
        return Err(ProtocolError::unexpected("scoped command", verb).into());
    }
    ctx.scope_kind = kind;
    (entry.handler)(ctx, args)
}

/// Successful outcome of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Reply {
    /// Untagged lines sent before the final response, without `* `.
    pub untagged: Vec<String>,
    /// Text of the tagged `OK` line.
    pub text: String,
    /// Close the connection after responding.
    pub close: bool,
}

impl Reply {
    pub(crate) fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub(crate) fn with_lines(mut self, lines: Vec<String>) -> Self {
        self.untagged = lines;
        self
    }
}

/// The open transaction of a mutating command.
pub(crate) struct Mutation<'t> {
    pub store: DataStore<'t>,
    collector: Collector,
    session_id: &'t str,
}

impl Mutation<'_> {
    /// Records a change, stamped with the issuing session.
    pub fn notify(&mut self, notification: ChangeNotification) {
        self.collector
            .append(notification.with_session(self.session_id));
    }
}

/// Everything a handler may touch while running one command.
pub(crate) struct CommandContext<'a> {
    pub backend: &'a dyn Backend,
    pub hub: &'a NotificationHub,
    pub retriever: &'a ItemRetriever,
    pub commands: &'a CommandTable,
    pub session: &'a mut SessionData,
    /// How selectors of this command are read.
    pub scope_kind: ScopeKind,
}

impl<'a> CommandContext<'a> {
    /// Moves the session state machine.
    pub fn enter(&mut self, state: SessionState) {
        self.session.enter(state);
    }

    pub fn store(&self) -> DataStore<'a> {
        DataStore::new(self.backend)
    }

    pub fn scope_context(&self) -> ScopeContext {
        ScopeContext {
            resource_id: self.session.resource.as_ref().map(|r| r.id),
            collection_id: self.session.collection,
        }
    }

    /// Reads the next argument as a selector of this command's kind.
    pub fn next_scope(&self, args: &mut Args) -> ServerResult<Scope> {
        let token = args.next_token("scope")?;
        Ok(Scope::parse(self.scope_kind, &token)?)
    }

    /// Resolves a selector against the session's selection state.
    pub fn resolve(&mut self, scope: &Scope, target: Target) -> ServerResult<BTreeSet<i64>> {
        let context = self.scope_context();
        self.resolve_in(scope, target, context)
    }

    pub fn resolve_in(
        &mut self,
        scope: &Scope,
        target: Target,
        context: ScopeContext,
    ) -> ServerResult<BTreeSet<i64>> {
        self.enter(SessionState::ResolvingScope);
        ScopeResolver::new(self.store()).resolve(scope, target, context)
    }

    /// Resolves a selector that must name exactly one collection.
    pub fn resolve_collection(&mut self, scope: &Scope) -> ServerResult<Collection> {
        let context = self.scope_context();
        self.resolve_collection_in(scope, context)
    }

    /// Like [`resolve_collection`](Self::resolve_collection) with an
    /// explicit context.
    pub fn resolve_collection_in(
        &mut self,
        scope: &Scope,
        context: ScopeContext,
    ) -> ServerResult<Collection> {
        self.enter(SessionState::ResolvingScope);
        let id = ScopeResolver::new(self.store()).resolve_one(scope, Target::Collection, context)?;
        self.store()
            .collection(id)?
            .ok_or_else(|| ServerError::not_found("collection", id.to_string()))
    }

    /// Runs `f` in a transaction and publishes what it recorded.
    ///
    /// The transaction commits only if `f` succeeds and recorded at least one
    /// change; otherwise it is rolled back and nothing is published.
    pub fn execute<T>(
        &mut self,
        f: impl FnOnce(&mut Mutation<'_>) -> ServerResult<T>,
    ) -> ServerResult<T> {
        self.enter(SessionState::Mutating);
        let session_id = self.session.id.clone();
        let transaction = Transaction::begin(self.backend)?;
        let mut mutation = Mutation {
            store: DataStore::new(transaction.backend()),
            collector: Collector::new(),
            session_id: &session_id,
        };
        let value = f(&mut mutation)?;
        let notifications = mutation.collector.into_notifications();

        if notifications.is_empty() {
            transaction.rollback()?;
            debug!(session = %session_id, "nothing changed");
            return Ok(value);
        }
        self.enter(SessionState::Committing);
        transaction.commit()?;
        debug!(session = %session_id, count = notifications.len(), "publishing changes");
        self.hub.publish(notifications);
        Ok(value)
    }
}

/// Describes a change of `collection` in its current state.
pub(crate) fn collection_change(
    store: &DataStore<'_>,
    operation: Operation,
    collection: &Collection,
) -> ServerResult<ChangeNotification> {
    Ok(
        ChangeNotification::new(EntityKind::Collection, operation, collection.id)
            .with_resource(store.resource_name(collection.resource_id)?)
            .with_parent_collection(collection.parent_id.unwrap_or(0))
            .with_remote_id(collection.remote_id.as_str()),
    )
}

/// Describes a change of `item` in its current state.
pub(crate) fn item_change(
    store: &DataStore<'_>,
    operation: Operation,
    item: &Item,
) -> ServerResult<ChangeNotification> {
    Ok(ChangeNotification::new(EntityKind::Item, operation, item.id)
        .with_resource(item_resource(store, item)?)
        .with_parent_collection(item.collection_id)
        .with_mime_type(store.mime_type_name(item.mime_type_id)?)
        .with_remote_id(item.remote_id.as_str()))
}

/// Name of the resource owning `item`.
pub(crate) fn item_resource(store: &DataStore<'_>, item: &Item) -> ServerResult<String> {
    match store.collection(item.collection_id)? {
        Some(collection) => Ok(store.resource_name(collection.resource_id)?),
        None => Ok(String::new()),
    }
}

/// Items named by `ids`, failing if any vanished since resolution.
pub(crate) fn load_items(store: &DataStore<'_>, ids: &BTreeSet<i64>) -> ServerResult<Vec<Item>> {
    let wanted: Vec<i64> = ids.iter().copied().collect();
    let items = store.items(&wanted)?;
    if items.len() != wanted.len() {
        let missing = wanted
            .iter()
            .find(|id| !items.iter().any(|item| item.id == **id))
            .copied()
            .unwrap_or_default();
        return Err(ServerError::not_found("item", missing.to_string()));
    }
    Ok(items)
}

/// Reads `TRUE`/`FALSE`.
pub(crate) fn parse_bool(name: &'static str, text: &str) -> ServerResult<bool> {
    match text.to_ascii_uppercase().as_str() {
        "TRUE" => Ok(true),
        "FALSE" => Ok(false),
        _ => Err(ProtocolError::unexpected(name, text).into()),
    }
}

pub(crate) fn bool_atom(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// `TRUE`, `FALSE` or `DEFAULT` (follow `enabled`).
pub(crate) fn parse_tristate(name: &'static str, text: &str) -> ServerResult<Tristate> {
    match text.to_ascii_uppercase().as_str() {
        "TRUE" => Ok(Tristate::True),
        "FALSE" => Ok(Tristate::False),
        "DEFAULT" => Ok(Tristate::Undefined),
        _ => Err(ProtocolError::unexpected(name, text).into()),
    }
}

pub(crate) fn tristate_atom(value: Tristate) -> &'static str {
    match value {
        Tristate::True => "TRUE",
        Tristate::False => "FALSE",
        Tristate::Undefined => "DEFAULT",
    }
}
