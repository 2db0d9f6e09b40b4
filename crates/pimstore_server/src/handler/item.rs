//! MOVE and REMOVE of items.

use super::{item_change, item_resource, load_items, CommandContext, Reply};
use crate::error::{ServerError, ServerResult};
use crate::retrieval::store_parts;
use crate::scope::Target;
use crate::session::SessionState;
use pimstore_protocol::{Args, Operation};
use tracing::debug;

/// `[UID|RID|HRID] MOVE set destination`
pub(super) fn move_items(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    let scope = ctx.next_scope(args)?;
    let destination = args.next_number("destination")?;
    args.finish()?;

    let ids = ctx.resolve(&scope, Target::Item)?;
    let store = ctx.store();
    let destination = i64::try_from(destination)
        .ok()
        .and_then(|id| store.collection(id).transpose())
        .transpose()?
        .ok_or_else(|| ServerError::not_found("collection", destination.to_string()))?;
    if destination.is_virtual {
        return Err(ServerError::Rejected(
            "Cannot move items into a virtual collection".into(),
        ));
    }
    let destination_resource = store.resource_name(destination.resource_id)?;

    // Items changing resource need their full payload first.
    let mut leaving = Vec::new();
    for item in load_items(&store, &ids)? {
        if item.collection_id != destination.id
            && item_resource(&store, &item)? != destination_resource
        {
            leaving.push(item.id);
        }
    }
    let mut payload = Vec::new();
    if !leaving.is_empty() {
        ctx.enter(SessionState::Retrieving);
        payload = ctx.retriever.fetch_full_payload(&store, &leaving)?;
    }

    ctx.execute(|m| {
        let store = m.store;
        store_parts(&store, &payload)?;
        for item in load_items(&store, &ids)? {
            if item.collection_id == destination.id {
                debug!(item = item.id, "already in destination");
                continue;
            }
            let notification = item_change(&store, Operation::Move, &item)?
                .with_destination(destination.id, destination_resource.as_str());
            store.update_item(&item, &[("collection_id", destination.id.into())])?;
            m.notify(notification);
        }
        Ok(())
    })?;
    Ok(Reply::ok("MOVE completed"))
}

/// `[UID|RID|HRID] REMOVE set`
pub(super) fn remove(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    let scope = ctx.next_scope(args)?;
    args.finish()?;
    let ids = ctx.resolve(&scope, Target::Item)?;

    ctx.execute(|m| {
        let store = m.store;
        let items = load_items(&store, &ids)?;
        let mut notifications = Vec::with_capacity(items.len());
        for item in &items {
            notifications.push(item_change(&store, Operation::Remove, item)?);
        }
        let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
        store.remove_items(&ids)?;
        for notification in notifications {
            m.notify(notification);
        }
        Ok(())
    })?;
    Ok(Reply::ok("REMOVE completed"))
}
