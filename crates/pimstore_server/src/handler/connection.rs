//! Session-level verbs: LOGIN, LOGOUT, CAPABILITY, RESSELECT.

use super::{CommandContext, Reply};
use crate::error::{ServerError, ServerResult};
use pimstore_protocol::Args;
use tracing::info;

/// `LOGIN session-id`
pub(super) fn login(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    let session_id = args.next_string("session id")?;
    args.finish()?;
    if session_id.is_empty() {
        return Err(ServerError::Rejected("Empty session id".into()));
    }
    info!(old = %ctx.session.id, new = %session_id, "session logged in");
    ctx.session.id = session_id;
    Ok(Reply::ok("User logged in"))
}

/// `LOGOUT`
pub(super) fn logout(_ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    args.finish()?;
    let mut reply = Reply::ok("Logout completed")
        .with_lines(vec!["BYE PimStore server logging out".to_string()]);
    reply.close = true;
    Ok(reply)
}

/// `CAPABILITY`
pub(super) fn capability(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    args.finish()?;
    let line = format!("CAPABILITY {}", ctx.commands.verbs().join(" "));
    Ok(Reply::ok("CAPABILITY completed").with_lines(vec![line]))
}

/// `RESSELECT resource-name`
pub(super) fn resselect(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    let name = args.next_string("resource")?;
    args.finish()?;
    let resource = ctx
        .store()
        .resource_by_name(&name)?
        .ok_or_else(|| ServerError::not_found("resource", name))?;
    ctx.session.resource = Some(resource);
    Ok(Reply::ok(format!("{} selected", ctx.session.resource_name())))
}
