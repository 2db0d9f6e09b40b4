//! SUBSCRIBE and UNSUBSCRIBE: toggle local subscription of collections.

use super::{collection_change, CommandContext, Reply};
use crate::error::{ServerError, ServerResult};
use crate::scope::Target;
use pimstore_protocol::{Args, Operation, ProtocolError, Scope};
use pimstore_storage::Value;
use std::collections::BTreeSet;

/// `[UID|RID|HRID] SUBSCRIBE collection…`
pub(super) fn subscribe(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    set_subscribed(ctx, args, true)
}

/// `[UID|RID|HRID] UNSUBSCRIBE collection…`
pub(super) fn unsubscribe(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    set_subscribed(ctx, args, false)
}

fn set_subscribed(
    ctx: &mut CommandContext<'_>,
    args: &mut Args,
    subscribed: bool,
) -> ServerResult<Reply> {
    let scopes = args
        .rest()
        .iter()
        .map(|token| Scope::parse(ctx.scope_kind, token))
        .collect::<Result<Vec<_>, _>>()?;
    if scopes.is_empty() {
        return Err(ProtocolError::MissingArgument("collection").into());
    }

    let mut ids = BTreeSet::new();
    for scope in &scopes {
        ids.extend(ctx.resolve(scope, Target::Collection)?);
    }

    let operation = if subscribed {
        Operation::Subscribe
    } else {
        Operation::Unsubscribe
    };
    ctx.execute(|m| {
        let store = m.store;
        for id in &ids {
            let mut collection = store
                .collection(*id)?
                .ok_or_else(|| ServerError::not_found("collection", id.to_string()))?;
            if collection.subscribed == subscribed {
                continue;
            }
            store.update_collection(*id, &[("subscribed", Value::from(subscribed))])?;
            collection.subscribed = subscribed;
            m.notify(collection_change(&store, operation, &collection)?);
        }
        Ok(())
    })?;
    Ok(Reply::ok("Completed"))
}
