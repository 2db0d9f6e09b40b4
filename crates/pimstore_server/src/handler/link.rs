//! LINK and UNLINK: reference items from a virtual collection.

use super::{item_change, load_items, CommandContext, Reply};
use crate::error::{ServerError, ServerResult};
use crate::scope::{ScopeContext, Target};
use pimstore_protocol::{Args, Operation};

/// `[UID|RID|HRID] LINK collection-id item-set`
pub(super) fn link(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    change_links(ctx, args, Operation::Link)
}

/// `[UID|RID|HRID] UNLINK collection-id item-set`
pub(super) fn unlink(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    change_links(ctx, args, Operation::Unlink)
}

fn change_links(
    ctx: &mut CommandContext<'_>,
    args: &mut Args,
    operation: Operation,
) -> ServerResult<Reply> {
    let collection = args.next_number("collection")?;
    let scope = ctx.next_scope(args)?;
    args.finish()?;

    let collection = i64::try_from(collection)
        .ok()
        .and_then(|id| ctx.store().collection(id).transpose())
        .transpose()?
        .ok_or_else(|| ServerError::not_found("collection", collection.to_string()))?;
    if !collection.is_virtual {
        return Err(ServerError::Rejected(
            "Can't link items to non-virtual collections".into(),
        ));
    }

    // Linked items live anywhere, so the selected collection does not apply.
    let context = ScopeContext {
        collection_id: None,
        ..ctx.scope_context()
    };
    let ids = ctx.resolve_in(&scope, Target::Item, context)?;

    ctx.execute(|m| {
        let store = m.store;
        for item in load_items(&store, &ids)? {
            let linked = store.is_linked(collection.id, item.id)?;
            match operation {
                Operation::Link if !linked => store.link(collection.id, item.id)?,
                Operation::Unlink if linked => {
                    store.unlink(collection.id, item.id)?;
                }
                _ => continue,
            }
            let notification =
                item_change(&store, operation, &item)?.with_parent_collection(collection.id);
            m.notify(notification);
        }
        Ok(())
    })?;
    Ok(Reply::ok(format!(
        "{} completed",
        if operation == Operation::Link { "LINK" } else { "UNLINK" }
    )))
}
