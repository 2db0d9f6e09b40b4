//! STORE: change flags and remote identifiers of items.
//!
//! ```text
//! tag [UID|RID|HRID] STORE set FLAGS[.SILENT] (flags…)
//! tag [UID|RID|HRID] STORE set +FLAGS[.SILENT] (flags…)
//! tag [UID|RID|HRID] STORE set -FLAGS[.SILENT] (flags…)
//! tag [UID|RID|HRID] STORE set REMOTEID "rid" REMOTEREVISION "rev"
//! tag [UID|RID|HRID] STORE set REV n operations…
//! ```
//!
//! With `REV n` the command fails unless every item is still at revision
//! `n`.

use super::{item_change, load_items, CommandContext, Reply};
use crate::error::{ServerError, ServerResult};
use crate::scope::Target;
use pimstore_protocol::{list, string_list, Args, Operation, ProtocolError};
use pimstore_storage::Value;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    ReplaceFlags(BTreeSet<String>),
    AddFlags(BTreeSet<String>),
    RemoveFlags(BTreeSet<String>),
    RemoteId(String),
    RemoteRevision(String),
    Revision(i64),
}

/// Parsed operations and whether flag echo lines are suppressed.
fn parse_ops(args: &mut Args) -> ServerResult<(Vec<Op>, bool)> {
    let mut ops = Vec::new();
    let mut silent = false;
    while !args.is_empty() {
        let key = args.next_atom("store operation")?.to_ascii_uppercase();
        let (name, is_silent) = match key.strip_suffix(".SILENT") {
            Some(name) => (name.to_string(), true),
            None => (key.clone(), false),
        };
        let op = match name.as_str() {
            "FLAGS" | "+FLAGS" | "-FLAGS" => {
                silent |= is_silent;
                let flags: BTreeSet<String> =
                    string_list("flag", args.next_list("flags")?)?.into_iter().collect();
                match name.as_str() {
                    "FLAGS" => Op::ReplaceFlags(flags),
                    "+FLAGS" => Op::AddFlags(flags),
                    _ => Op::RemoveFlags(flags),
                }
            }
            "REMOTEID" if !is_silent => Op::RemoteId(args.next_string("remote id")?),
            "REMOTEREVISION" if !is_silent => Op::RemoteRevision(args.next_string("remote revision")?),
            "REV" if !is_silent => {
                let rev = args.next_number("revision")?;
                Op::Revision(i64::try_from(rev).unwrap_or(i64::MAX))
            }
            _ => return Err(ProtocolError::unexpected("store operation", key).into()),
        };
        ops.push(op);
    }
    if ops.is_empty() {
        return Err(ProtocolError::MissingArgument("store operation").into());
    }
    Ok((ops, silent))
}

/// `[UID|RID|HRID] STORE set operations…`
pub(super) fn store(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    let scope = ctx.next_scope(args)?;
    let (ops, silent) = parse_ops(args)?;
    let ids = ctx.resolve(&scope, Target::Item)?;
    let touches_flags = ops
        .iter()
        .any(|op| matches!(op, Op::ReplaceFlags(_) | Op::AddFlags(_) | Op::RemoveFlags(_)));
    let expected_rev = ops.iter().rev().find_map(|op| match op {
        Op::Revision(rev) => Some(*rev),
        _ => None,
    });

    let flags = ctx.execute(|m| {
        let store = m.store;
        let items = load_items(&store, &ids)?;
        if let Some(rev) = expected_rev {
            if let Some(stale) = items.iter().find(|item| item.rev != rev) {
                debug!(item = stale.id, expected = rev, actual = stale.rev, "stale revision");
                return Err(ServerError::Rejected(
                    "Item was modified elsewhere, aborting STORE.".into(),
                ));
            }
        }
        let mut echoed = Vec::new();
        for item in items {
            let before = store.item_flags(item.id)?;
            let mut after = before.clone();
            let mut parts = BTreeSet::new();
            let mut columns: Vec<(&str, Value)> = Vec::new();

            for op in &ops {
                match op {
                    Op::ReplaceFlags(flags) => after = flags.clone(),
                    Op::AddFlags(flags) => after.extend(flags.iter().cloned()),
                    Op::RemoveFlags(flags) => after.retain(|f| !flags.contains(f)),
                    Op::RemoteId(remote_id) if *remote_id != item.remote_id => {
                        columns.push(("remote_id", Value::from(remote_id.as_str())));
                        parts.insert("REMOTEID");
                    }
                    Op::RemoteRevision(revision) if *revision != item.remote_revision => {
                        columns.push(("remote_revision", Value::from(revision.as_str())));
                        parts.insert("REMOTEREVISION");
                    }
                    Op::RemoteId(_) | Op::RemoteRevision(_) | Op::Revision(_) => {}
                }
            }

            if after != before {
                let removed: BTreeSet<String> = before.difference(&after).cloned().collect();
                let added: BTreeSet<String> = after.difference(&before).cloned().collect();
                store.remove_item_flags(item.id, &removed)?;
                store.add_item_flags(item.id, &added)?;
                parts.insert("FLAGS");
            }
            if !parts.is_empty() {
                store.update_item(&item, &columns)?;
                let mut updated = item.clone();
                for (column, value) in &columns {
                    if let Value::Text(text) = value {
                        match *column {
                            "remote_id" => updated.remote_id = text.clone(),
                            _ => updated.remote_revision = text.clone(),
                        }
                    }
                }
                let notification =
                    item_change(&store, Operation::Modify, &updated)?.with_parts(parts);
                m.notify(notification);
            }
            echoed.push((item.id, after));
        }
        Ok(echoed)
    })?;

    let lines = if touches_flags && !silent {
        flags
            .into_iter()
            .map(|(id, flags)| format!("{id} FETCH (FLAGS {})", list(flags)))
            .collect()
    } else {
        Vec::new()
    };
    Ok(Reply::ok("STORE completed").with_lines(lines))
}
