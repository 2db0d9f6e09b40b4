//! Resolution of client selectors into internal ids.

use crate::error::{ServerError, ServerResult};
use crate::store::DataStore;
use pimstore_protocol::{Id, RangeSet, Scope};
use pimstore_storage::{CompareOperator, Condition, LogicOperator};
use std::collections::BTreeSet;
use tracing::debug;

/// Entity kind a selector refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Collections.
    Collection,
    /// Items.
    Item,
}

impl Target {
    /// Lowercase name used in error texts.
    pub fn name(self) -> &'static str {
        match self {
            Target::Collection => "collection",
            Target::Item => "item",
        }
    }

    fn column(self, column: &str) -> String {
        match self {
            Target::Collection => format!("collections.{column}"),
            Target::Item => format!("pim_items.{column}"),
        }
    }
}

/// The selection state a selector is resolved against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeContext {
    /// Resource chosen with `RESSELECT`.
    pub resource_id: Option<i64>,
    /// Collection chosen with `SELECT`.
    pub collection_id: Option<i64>,
}

/// Turns a [`Scope`] into the set of internal ids it names.
///
/// Resolution only reads, so resolving the same selector twice inside one
/// transaction yields the same set.
#[derive(Clone, Copy)]
pub struct ScopeResolver<'a> {
    store: DataStore<'a>,
}

impl<'a> ScopeResolver<'a> {
    /// Creates a resolver reading through `store`.
    pub fn new(store: DataStore<'a>) -> Self {
        Self { store }
    }

    /// Resolves `scope` to a non-empty id set.
    pub fn resolve(
        &self,
        scope: &Scope,
        target: Target,
        context: ScopeContext,
    ) -> ServerResult<BTreeSet<i64>> {
        let ids = match scope {
            Scope::Uid(set) => self.resolve_uids(set, target, context)?,
            Scope::Rid(rids) => self.resolve_rids(rids, target, context)?,
            Scope::HierarchicalRid(path) => self.resolve_path(path, target, context)?,
        };
        debug!(target = target.name(), kind = ?scope.kind(), count = ids.len(), "scope resolved");
        Ok(ids)
    }

    /// Resolves `scope` and requires exactly one match.
    pub fn resolve_one(&self, scope: &Scope, target: Target, context: ScopeContext) -> ServerResult<i64> {
        let ids = self.resolve(scope, target, context)?;
        match (ids.first(), ids.len()) {
            (Some(id), 1) => Ok(*id),
            _ => Err(ServerError::InvalidSelector(format!(
                "expected a single {}, got {}",
                target.name(),
                ids.len()
            ))),
        }
    }

    fn refs(
        &self,
        target: Target,
        filter: Condition,
        context: ScopeContext,
    ) -> ServerResult<Vec<(i64, String)>> {
        Ok(match target {
            Target::Collection => self.store.collection_refs(filter, context.resource_id)?,
            Target::Item => {
                self.store
                    .item_refs(filter, context.collection_id, context.resource_id)?
            }
        })
    }

    fn resolve_uids(
        &self,
        set: &RangeSet,
        target: Target,
        context: ScopeContext,
    ) -> ServerResult<BTreeSet<i64>> {
        if set.is_empty() {
            return Err(ServerError::InvalidSelector("empty range set".into()));
        }
        let column = target.column("id");
        let mut filter = Condition::new(LogicOperator::Or);
        for interval in set.intervals() {
            let Some(begin) = db_id(interval.begin()) else {
                return Err(ServerError::not_found(target.name(), interval.to_sequence()));
            };
            if interval.size() == 1 {
                filter.add_value_condition(column.as_str(), CompareOperator::Equals, begin);
                continue;
            }
            let mut range = Condition::new(LogicOperator::And);
            range.add_value_condition(column.as_str(), CompareOperator::GreaterOrEqual, begin);
            if interval.has_defined_end() {
                let end = db_id(interval.end()).unwrap_or(i64::MAX);
                range.add_value_condition(column.as_str(), CompareOperator::LessOrEqual, end);
            }
            filter.add_condition(range);
        }

        let found: BTreeSet<i64> = self
            .refs(target, filter, context)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        // Every explicitly named id must exist in context.
        for interval in set.intervals().iter().filter(|i| i.has_defined_end()) {
            let covered = match (db_id(interval.begin()), db_id(interval.end())) {
                (Some(begin), Some(end)) => found.range(begin..=end).count() as u64,
                _ => 0,
            };
            if covered != interval.size() {
                return Err(ServerError::not_found(target.name(), interval.to_sequence()));
            }
        }
        if found.is_empty() {
            return Err(ServerError::not_found(target.name(), set.encode()));
        }
        Ok(found)
    }

    fn resolve_rids(
        &self,
        rids: &[String],
        target: Target,
        context: ScopeContext,
    ) -> ServerResult<BTreeSet<i64>> {
        if context.resource_id.is_none() {
            return Err(ServerError::Rejected(
                "Remote id selectors need a selected resource".into(),
            ));
        }
        let mut filter = Condition::new(LogicOperator::And);
        filter.add_value_list_condition(
            target.column("remote_id"),
            CompareOperator::In,
            rids.iter().map(String::as_str),
        );
        let found = self.refs(target, filter, context)?;

        if let Some(missing) = rids
            .iter()
            .find(|rid| !found.iter().any(|(_, remote_id)| remote_id == *rid))
        {
            return Err(ServerError::not_found(target.name(), missing.clone()));
        }
        Ok(found.into_iter().map(|(id, _)| id).collect())
    }

    fn resolve_path(
        &self,
        path: &[String],
        target: Target,
        context: ScopeContext,
    ) -> ServerResult<BTreeSet<i64>> {
        let Some(resource_id) = context.resource_id else {
            return Err(ServerError::Rejected(
                "Remote id selectors need a selected resource".into(),
            ));
        };
        let (collection_path, leaf) = match target {
            Target::Collection => (path, None),
            Target::Item => match path.split_last() {
                Some((leaf, parents)) => (parents, Some(leaf)),
                None => (path, None),
            },
        };

        let mut current = context.collection_id;
        for segment in collection_path {
            current = Some(
                self.store
                    .child_by_remote_id(resource_id, current, segment)?
                    .ok_or_else(|| ServerError::not_found("collection", path.join("/")))?,
            );
        }

        match (target, leaf, current) {
            (Target::Collection, _, Some(id)) => Ok(BTreeSet::from([id])),
            (Target::Item, Some(leaf), Some(collection_id)) => {
                let mut filter = Condition::new(LogicOperator::And);
                filter.add_value_condition("pim_items.remote_id", CompareOperator::Equals, leaf.as_str());
                let found: BTreeSet<i64> = self
                    .store
                    .item_refs(filter, Some(collection_id), None)?
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect();
                if found.is_empty() {
                    return Err(ServerError::not_found("item", path.join("/")));
                }
                Ok(found)
            }
            _ => Err(ServerError::not_found(target.name(), path.join("/"))),
        }
    }
}

fn db_id(id: Id) -> Option<i64> {
    i64::try_from(id).ok()
}
