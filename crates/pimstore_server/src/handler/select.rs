//! SELECT: choose the collection that item selectors are scoped to.

use super::{CommandContext, Reply};
use crate::error::ServerResult;
use crate::scope::ScopeContext;
use pimstore_protocol::Args;

/// `[UID|RID|HRID] SELECT scope`
pub(super) fn select(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    let scope = ctx.next_scope(args)?;
    args.finish()?;

    // Resolved from the resource root, not the old selection, which stays
    // in place until the new one is known.
    let context = ScopeContext {
        collection_id: None,
        ..ctx.scope_context()
    };
    let collection = ctx.resolve_collection_in(&scope, context)?;
    let items = ctx.store().item_ids_in_collections(&[collection.id])?;
    ctx.session.collection = Some(collection.id);

    Ok(Reply::ok("Completed").with_lines(vec![format!("{} EXISTS", items.len())]))
}
