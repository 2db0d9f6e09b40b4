//! Typed access to the store tables.
//!
//! Every statement is built with [`QueryBuilder`]; nothing here renders SQL
//! by hand. A [`DataStore`] borrows one backend connection and runs inside
//! whatever transaction that connection has open.

use pimstore_storage::{
    Backend, CompareOperator, Condition, QueryBuilder, Row, RowExt, SortOrder, StorageResult,
    Value,
};
use std::collections::{BTreeSet, VecDeque};

use CompareOperator::{Equals, In};

/// A resource owning a subtree of collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resource {
    /// Internal id.
    pub id: i64,
    /// Unique name.
    pub name: String,
    /// Whether the resource only hosts virtual collections.
    pub is_virtual: bool,
}

/// A collection row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    /// Internal id.
    pub id: i64,
    /// Id assigned by the owning resource.
    pub remote_id: String,
    /// Revision assigned by the owning resource.
    pub remote_revision: String,
    /// Display name, unique among siblings.
    pub name: String,
    /// Parent collection; `None` at the root.
    pub parent_id: Option<i64>,
    /// Owning resource.
    pub resource_id: i64,
    /// Whether the collection is enabled.
    pub enabled: bool,
    /// Whether the collection is subscribed locally.
    pub subscribed: bool,
    /// Whether the collection only holds links to items.
    pub is_virtual: bool,
    /// Whether clients show the collection.
    pub display_pref: Tristate,
    /// Whether the resource synchronizes the collection.
    pub sync_pref: Tristate,
    /// Whether the collection is indexed for search.
    pub index_pref: Tristate,
    /// How long payload stays cached.
    pub cache_policy: CachePolicy,
}

/// A per-collection preference that may defer to the `enabled` flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tristate {
    /// Explicitly off.
    False,
    /// Explicitly on.
    True,
    /// Follows `enabled`.
    #[default]
    Undefined,
}

impl Tristate {
    /// Decodes the stored integer; unknown values are `Undefined`.
    pub fn from_db(value: i64) -> Self {
        match value {
            0 => Tristate::False,
            1 => Tristate::True,
            _ => Tristate::Undefined,
        }
    }

    /// Integer stored in the database.
    pub fn to_db(self) -> i64 {
        match self {
            Tristate::False => 0,
            Tristate::True => 1,
            Tristate::Undefined => 2,
        }
    }

    /// Effective value for a collection with the given `enabled` flag.
    pub fn resolve(self, enabled: bool) -> bool {
        match self {
            Tristate::False => false,
            Tristate::True => true,
            Tristate::Undefined => enabled,
        }
    }
}

impl From<Tristate> for Value {
    fn from(value: Tristate) -> Self {
        Value::Integer(value.to_db())
    }
}

/// Cache policy of a collection.
///
/// Intervals are minutes; `-1` means never.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Use the parent's policy instead of this one.
    pub inherit: bool,
    /// Minutes between checks for new content.
    pub check_interval: i64,
    /// Minutes until cached payload expires.
    pub cache_timeout: i64,
    /// Synchronize when the collection is opened.
    pub sync_on_demand: bool,
    /// Parts that are always kept locally.
    pub local_parts: Vec<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            inherit: true,
            check_interval: -1,
            cache_timeout: -1,
            sync_on_demand: false,
            local_parts: Vec::new(),
        }
    }
}

impl CachePolicy {
    /// Column values for an insert or update.
    pub fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("cache_policy_inherit", self.inherit.into()),
            ("cache_policy_check_interval", self.check_interval.into()),
            ("cache_policy_cache_timeout", self.cache_timeout.into()),
            ("cache_policy_sync_on_demand", self.sync_on_demand.into()),
            ("cache_policy_local_parts", self.local_parts.join(" ").into()),
        ]
    }
}

/// An item row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    /// Internal id.
    pub id: i64,
    /// Revision, bumped on every change.
    pub rev: i64,
    /// Id assigned by the owning resource.
    pub remote_id: String,
    /// Revision assigned by the owning resource.
    pub remote_revision: String,
    /// Parent collection.
    pub collection_id: i64,
    /// Mime type id.
    pub mime_type_id: i64,
    /// Payload size in bytes.
    pub size: i64,
}

/// A part whose payload is not cached locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPart {
    /// Item the part belongs to.
    pub item_id: i64,
    /// Part name.
    pub name: String,
    /// Name of the resource owning the item.
    pub resource: String,
}

const COLLECTION_COLUMNS: [&str; 17] = [
    "collections.id",
    "collections.remote_id",
    "collections.remote_revision",
    "collections.name",
    "collections.parent_id",
    "collections.resource_id",
    "collections.enabled",
    "collections.subscribed",
    "collections.is_virtual",
    "collections.display_pref",
    "collections.sync_pref",
    "collections.index_pref",
    "collections.cache_policy_inherit",
    "collections.cache_policy_check_interval",
    "collections.cache_policy_cache_timeout",
    "collections.cache_policy_sync_on_demand",
    "collections.cache_policy_local_parts",
];

const ITEM_COLUMNS: [&str; 7] = [
    "pim_items.id",
    "pim_items.rev",
    "pim_items.remote_id",
    "pim_items.remote_revision",
    "pim_items.collection_id",
    "pim_items.mime_type_id",
    "pim_items.size",
];

fn collection_from_row(row: &[Value]) -> StorageResult<Collection> {
    Ok(Collection {
        id: row.int(0)?,
        remote_id: row.text(1)?,
        remote_revision: row.text(2)?,
        name: row.text(3)?,
        parent_id: row.opt_int(4)?,
        resource_id: row.int(5)?,
        enabled: row.boolean(6)?,
        subscribed: row.boolean(7)?,
        is_virtual: row.boolean(8)?,
        display_pref: Tristate::from_db(row.int(9)?),
        sync_pref: Tristate::from_db(row.int(10)?),
        index_pref: Tristate::from_db(row.int(11)?),
        cache_policy: CachePolicy {
            inherit: row.boolean(12)?,
            check_interval: row.int(13)?,
            cache_timeout: row.int(14)?,
            sync_on_demand: row.boolean(15)?,
            local_parts: row.text(16)?.split_whitespace().map(String::from).collect(),
        },
    })
}

fn item_from_row(row: &[Value]) -> StorageResult<Item> {
    Ok(Item {
        id: row.int(0)?,
        rev: row.int(1)?,
        remote_id: row.text(2)?,
        remote_revision: row.text(3)?,
        collection_id: row.int(4)?,
        mime_type_id: row.int(5)?,
        size: row.int(6)?,
    })
}

fn parent_condition(qb: &mut QueryBuilder, column: &str, parent: Option<i64>) {
    qb.add_value_condition(column, Equals, Value::from(parent));
}

/// Store access bound to one backend connection.
#[derive(Clone, Copy)]
pub struct DataStore<'a> {
    backend: &'a dyn Backend,
}

impl<'a> DataStore<'a> {
    /// Wraps a backend connection.
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// The wrapped connection.
    pub fn backend(&self) -> &'a dyn Backend {
        self.backend
    }

    fn rows(&self, mut qb: QueryBuilder) -> StorageResult<Vec<Row>> {
        qb.exec(self.backend)?;
        Ok(qb.into_rows())
    }

    fn run(&self, mut qb: QueryBuilder) -> StorageResult<usize> {
        qb.exec(self.backend)?;
        Ok(qb.affected_rows())
    }

    fn insert(&self, mut qb: QueryBuilder) -> StorageResult<i64> {
        qb.exec(self.backend)?;
        Ok(qb.insert_id())
    }

    fn ids(&self, qb: QueryBuilder) -> StorageResult<Vec<i64>> {
        self.rows(qb)?.iter().map(|row| row.int(0)).collect()
    }

    // Resources

    /// Creates a resource.
    pub fn create_resource(&self, name: &str, is_virtual: bool) -> StorageResult<i64> {
        let mut qb = QueryBuilder::insert("resources");
        qb.set_column_value("name", name)
            .set_column_value("is_virtual", is_virtual);
        self.insert(qb)
    }

    fn resource_where(&self, column: &str, value: Value) -> StorageResult<Option<Resource>> {
        let mut qb = QueryBuilder::select("resources");
        qb.add_columns(["id", "name", "is_virtual"])
            .add_value_condition(column, Equals, value);
        self.rows(qb)?
            .first()
            .map(|row| {
                Ok(Resource {
                    id: row.int(0)?,
                    name: row.text(1)?,
                    is_virtual: row.boolean(2)?,
                })
            })
            .transpose()
    }

    /// Looks up a resource by id.
    pub fn resource(&self, id: i64) -> StorageResult<Option<Resource>> {
        self.resource_where("id", Value::Integer(id))
    }

    /// Looks up a resource by name.
    pub fn resource_by_name(&self, name: &str) -> StorageResult<Option<Resource>> {
        self.resource_where("name", Value::from(name))
    }

    /// Name of a resource; empty if it does not exist.
    pub fn resource_name(&self, id: i64) -> StorageResult<String> {
        Ok(self.resource(id)?.map(|r| r.name).unwrap_or_default())
    }

    // Collections

    /// Creates a collection; `collection.id` is ignored.
    pub fn create_collection(&self, collection: &Collection) -> StorageResult<i64> {
        let mut qb = QueryBuilder::insert("collections");
        qb.set_column_value("remote_id", collection.remote_id.as_str())
            .set_column_value("remote_revision", collection.remote_revision.as_str())
            .set_column_value("name", collection.name.as_str())
            .set_column_value("parent_id", collection.parent_id)
            .set_column_value("resource_id", collection.resource_id)
            .set_column_value("enabled", collection.enabled)
            .set_column_value("subscribed", collection.subscribed)
            .set_column_value("is_virtual", collection.is_virtual)
            .set_column_value("display_pref", collection.display_pref)
            .set_column_value("sync_pref", collection.sync_pref)
            .set_column_value("index_pref", collection.index_pref);
        for (column, value) in collection.cache_policy.columns() {
            qb.set_column_value(column, value);
        }
        self.insert(qb)
    }

    fn select_collections(&self) -> QueryBuilder {
        let mut qb = QueryBuilder::select("collections");
        qb.add_columns(COLLECTION_COLUMNS);
        qb
    }

    fn collections_where(&self, qb: QueryBuilder) -> StorageResult<Vec<Collection>> {
        self.rows(qb)?
            .iter()
            .map(|row| collection_from_row(row))
            .collect()
    }

    /// Looks up a collection by id.
    pub fn collection(&self, id: i64) -> StorageResult<Option<Collection>> {
        let mut qb = self.select_collections();
        qb.add_value_condition("collections.id", Equals, id);
        Ok(self.collections_where(qb)?.into_iter().next())
    }

    /// All collections ordered by id, optionally of one resource.
    pub fn collections(&self, resource_id: Option<i64>) -> StorageResult<Vec<Collection>> {
        let mut qb = self.select_collections();
        if let Some(resource_id) = resource_id {
            qb.add_value_condition("collections.resource_id", Equals, resource_id);
        }
        qb.add_sort_column("collections.id", SortOrder::Ascending);
        self.collections_where(qb)
    }

    /// Direct children of `parent` (`None` for the root) ordered by id.
    pub fn children(&self, parent: Option<i64>) -> StorageResult<Vec<Collection>> {
        let mut qb = self.select_collections();
        parent_condition(&mut qb, "collections.parent_id", parent);
        qb.add_sort_column("collections.id", SortOrder::Ascending);
        self.collections_where(qb)
    }

    /// `collection` and all its descendants, parents first.
    pub fn descendants(&self, collection: i64) -> StorageResult<Vec<i64>> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([collection]);
        while let Some(id) = queue.pop_front() {
            out.push(id);
            queue.extend(self.children(Some(id))?.into_iter().map(|c| c.id));
        }
        Ok(out)
    }

    /// `(id, remote_id)` of collections matching `filter`.
    pub fn collection_refs(
        &self,
        filter: Condition,
        resource_id: Option<i64>,
    ) -> StorageResult<Vec<(i64, String)>> {
        let mut qb = QueryBuilder::select("collections");
        qb.add_columns(["collections.id", "collections.remote_id"])
            .add_condition(filter)
            .add_sort_column("collections.id", SortOrder::Ascending);
        if let Some(resource_id) = resource_id {
            qb.add_value_condition("collections.resource_id", Equals, resource_id);
        }
        self.rows(qb)?
            .iter()
            .map(|row| Ok((row.int(0)?, row.text(1)?)))
            .collect()
    }

    /// Child of `parent` with the given remote id within a resource.
    pub fn child_by_remote_id(
        &self,
        resource_id: i64,
        parent: Option<i64>,
        remote_id: &str,
    ) -> StorageResult<Option<i64>> {
        let mut qb = QueryBuilder::select("collections");
        qb.add_column("id")
            .add_value_condition("resource_id", Equals, resource_id)
            .add_value_condition("remote_id", Equals, remote_id);
        parent_condition(&mut qb, "parent_id", parent);
        Ok(self.ids(qb)?.first().copied())
    }

    /// Returns true if a sibling other than `exclude` already uses `name`.
    pub fn sibling_name_taken(
        &self,
        parent: Option<i64>,
        name: &str,
        exclude: i64,
    ) -> StorageResult<bool> {
        let mut qb = QueryBuilder::select("collections");
        qb.add_column("id")
            .add_value_condition("name", Equals, name)
            .add_value_condition("id", CompareOperator::NotEquals, exclude)
            .set_limit(1);
        parent_condition(&mut qb, "parent_id", parent);
        Ok(!self.ids(qb)?.is_empty())
    }

    /// Assigns column values of one collection.
    pub fn update_collection(&self, id: i64, changes: &[(&str, Value)]) -> StorageResult<usize> {
        if changes.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::update("collections");
        for (column, value) in changes {
            qb.set_column_value(*column, value.clone());
        }
        qb.add_value_condition("id", Equals, id);
        self.run(qb)
    }

    /// Moves a set of collections to another resource.
    pub fn set_collections_resource(&self, ids: &[i64], resource_id: i64) -> StorageResult<usize> {
        let mut qb = QueryBuilder::update("collections");
        qb.set_column_value("resource_id", resource_id)
            .add_value_list_condition("id", In, ids.iter().copied());
        self.run(qb)
    }

    // Mime types

    /// Id of a mime type, created on first use.
    pub fn mime_type_id(&self, name: &str) -> StorageResult<i64> {
        let mut qb = QueryBuilder::select("mime_types");
        qb.add_column("id").add_value_condition("name", Equals, name);
        if let Some(id) = self.ids(qb)?.first() {
            return Ok(*id);
        }
        let mut insert = QueryBuilder::insert("mime_types");
        insert.set_column_value("name", name);
        self.insert(insert)
    }

    /// Name of a mime type; empty if unknown.
    pub fn mime_type_name(&self, id: i64) -> StorageResult<String> {
        let mut qb = QueryBuilder::select("mime_types");
        qb.add_column("name").add_value_condition("id", Equals, id);
        match self.rows(qb)?.first() {
            Some(row) => row.text(0),
            None => Ok(String::new()),
        }
    }

    /// Content mime types of a collection, sorted by name.
    pub fn collection_mime_types(&self, collection: i64) -> StorageResult<Vec<String>> {
        let mut qb = QueryBuilder::select("mime_types");
        qb.add_table("collection_mime_types")
            .add_column("mime_types.name")
            .add_column_condition(
                "collection_mime_types.mime_type_id",
                Equals,
                "mime_types.id",
            )
            .add_value_condition("collection_mime_types.collection_id", Equals, collection)
            .add_sort_column("mime_types.name", SortOrder::Ascending);
        self.rows(qb)?.iter().map(|row| row.text(0)).collect()
    }

    /// Replaces the content mime types of a collection.
    pub fn set_collection_mime_types(&self, collection: i64, names: &[String]) -> StorageResult<()> {
        let mut clear = QueryBuilder::delete("collection_mime_types");
        clear.add_value_condition("collection_id", Equals, collection);
        self.run(clear)?;

        let unique: BTreeSet<&String> = names.iter().collect();
        for name in unique {
            let mime_type = self.mime_type_id(name)?;
            let mut qb = QueryBuilder::insert("collection_mime_types");
            qb.set_column_value("collection_id", collection)
                .set_column_value("mime_type_id", mime_type);
            self.run(qb)?;
        }
        Ok(())
    }

    // Attributes

    /// `(type, value)` attributes of a collection, sorted by type.
    pub fn collection_attributes(&self, collection: i64) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut qb = QueryBuilder::select("collection_attributes");
        qb.add_columns(["type", "value"])
            .add_value_condition("collection_id", Equals, collection)
            .add_sort_column("type", SortOrder::Ascending);
        self.rows(qb)?
            .iter()
            .map(|row| {
                Ok((
                    row.blob(0)?.unwrap_or_default(),
                    row.blob(1)?.unwrap_or_default(),
                ))
            })
            .collect()
    }

    /// Sets an attribute; returns false if it already had this value.
    pub fn set_collection_attribute(
        &self,
        collection: i64,
        key: &[u8],
        value: &[u8],
    ) -> StorageResult<bool> {
        let mut qb = QueryBuilder::select("collection_attributes");
        qb.add_columns(["id", "value"])
            .add_value_condition("collection_id", Equals, collection)
            .add_value_condition("type", Equals, key);
        let existing = self.rows(qb)?;

        match existing.first() {
            Some(row) if row.blob(1)?.as_deref() == Some(value) => Ok(false),
            Some(row) => {
                let mut update = QueryBuilder::update("collection_attributes");
                update
                    .set_column_value("value", value)
                    .add_value_condition("id", Equals, row.int(0)?);
                self.run(update)?;
                Ok(true)
            }
            None => {
                let mut insert = QueryBuilder::insert("collection_attributes");
                insert
                    .set_column_value("collection_id", collection)
                    .set_column_value("type", key)
                    .set_column_value("value", value);
                self.insert(insert)?;
                Ok(true)
            }
        }
    }

    /// Removes an attribute; returns false if it was not set.
    pub fn remove_collection_attribute(&self, collection: i64, key: &[u8]) -> StorageResult<bool> {
        let mut qb = QueryBuilder::delete("collection_attributes");
        qb.add_value_condition("collection_id", Equals, collection)
            .add_value_condition("type", Equals, key);
        Ok(self.run(qb)? > 0)
    }

    // Items

    /// Creates an item; `item.id` is ignored.
    pub fn create_item(&self, item: &Item) -> StorageResult<i64> {
        let mut qb = QueryBuilder::insert("pim_items");
        qb.set_column_value("rev", item.rev)
            .set_column_value("remote_id", item.remote_id.as_str())
            .set_column_value("remote_revision", item.remote_revision.as_str())
            .set_column_value("collection_id", item.collection_id)
            .set_column_value("mime_type_id", item.mime_type_id)
            .set_column_value("size", item.size);
        self.insert(qb)
    }

    /// Items with the given ids, ordered by id.
    pub fn items(&self, ids: &[i64]) -> StorageResult<Vec<Item>> {
        let mut qb = QueryBuilder::select("pim_items");
        qb.add_columns(ITEM_COLUMNS)
            .add_value_list_condition("pim_items.id", In, ids.iter().copied())
            .add_sort_column("pim_items.id", SortOrder::Ascending);
        self.rows(qb)?.iter().map(|row| item_from_row(row)).collect()
    }

    /// Looks up an item by id.
    pub fn item(&self, id: i64) -> StorageResult<Option<Item>> {
        Ok(self.items(&[id])?.into_iter().next())
    }

    /// `(id, remote_id)` of items matching `filter`.
    ///
    /// `filter` refers to item columns as `pim_items.<column>`.
    pub fn item_refs(
        &self,
        filter: Condition,
        collection_id: Option<i64>,
        resource_id: Option<i64>,
    ) -> StorageResult<Vec<(i64, String)>> {
        let mut qb = QueryBuilder::select("pim_items");
        qb.add_columns(["pim_items.id", "pim_items.remote_id"])
            .add_condition(filter)
            .add_sort_column("pim_items.id", SortOrder::Ascending);
        if let Some(collection_id) = collection_id {
            qb.add_value_condition("pim_items.collection_id", Equals, collection_id);
        }
        if let Some(resource_id) = resource_id {
            qb.add_table("collections")
                .add_column_condition("pim_items.collection_id", Equals, "collections.id")
                .add_value_condition("collections.resource_id", Equals, resource_id);
        }
        self.rows(qb)?
            .iter()
            .map(|row| Ok((row.int(0)?, row.text(1)?)))
            .collect()
    }

    /// Ids of the items stored in any of `collections`.
    pub fn item_ids_in_collections(&self, collections: &[i64]) -> StorageResult<Vec<i64>> {
        let mut qb = QueryBuilder::select("pim_items");
        qb.add_column("id")
            .add_value_list_condition("collection_id", In, collections.iter().copied())
            .add_sort_column("id", SortOrder::Ascending);
        self.ids(qb)
    }

    /// Assigns column values of one item and bumps its revision.
    pub fn update_item(&self, item: &Item, changes: &[(&str, Value)]) -> StorageResult<usize> {
        let mut qb = QueryBuilder::update("pim_items");
        for (column, value) in changes {
            qb.set_column_value(*column, value.clone());
        }
        qb.set_column_value("rev", item.rev + 1)
            .add_value_condition("id", Equals, item.id);
        self.run(qb)
    }

    /// Deletes items with their flags, parts and links.
    pub fn remove_items(&self, ids: &[i64]) -> StorageResult<usize> {
        for (table, column) in [
            ("pim_item_flags", "pim_item_id"),
            ("parts", "pim_item_id"),
            ("collection_pim_items", "pim_item_id"),
        ] {
            let mut qb = QueryBuilder::delete(table);
            qb.add_value_list_condition(column, In, ids.iter().copied());
            self.run(qb)?;
        }
        let mut qb = QueryBuilder::delete("pim_items");
        qb.add_value_list_condition("id", In, ids.iter().copied());
        self.run(qb)
    }

    // Flags

    /// Id of a flag, created on first use.
    pub fn flag_id(&self, name: &str) -> StorageResult<i64> {
        let mut qb = QueryBuilder::select("flags");
        qb.add_column("id").add_value_condition("name", Equals, name);
        if let Some(id) = self.ids(qb)?.first() {
            return Ok(*id);
        }
        let mut insert = QueryBuilder::insert("flags");
        insert.set_column_value("name", name);
        self.insert(insert)
    }

    /// Flag names of an item.
    pub fn item_flags(&self, item: i64) -> StorageResult<BTreeSet<String>> {
        let mut qb = QueryBuilder::select("flags");
        qb.add_table("pim_item_flags")
            .add_column("flags.name")
            .add_column_condition("pim_item_flags.flag_id", Equals, "flags.id")
            .add_value_condition("pim_item_flags.pim_item_id", Equals, item);
        self.rows(qb)?.iter().map(|row| row.text(0)).collect()
    }

    /// Attaches flags to an item.
    pub fn add_item_flags(&self, item: i64, names: &BTreeSet<String>) -> StorageResult<()> {
        for name in names {
            let flag = self.flag_id(name)?;
            let mut qb = QueryBuilder::insert("pim_item_flags");
            qb.set_column_value("pim_item_id", item)
                .set_column_value("flag_id", flag);
            self.run(qb)?;
        }
        Ok(())
    }

    /// Detaches flags from an item.
    pub fn remove_item_flags(&self, item: i64, names: &BTreeSet<String>) -> StorageResult<usize> {
        let mut flags = QueryBuilder::select("flags");
        flags
            .add_column("id")
            .add_value_list_condition("name", In, names.iter().map(String::as_str));
        let flag_ids = self.ids(flags)?;

        let mut qb = QueryBuilder::delete("pim_item_flags");
        qb.add_value_condition("pim_item_id", Equals, item)
            .add_value_list_condition("flag_id", In, flag_ids);
        self.run(qb)
    }

    // Virtual collection links

    /// Returns true if `item` is linked into `collection`.
    pub fn is_linked(&self, collection: i64, item: i64) -> StorageResult<bool> {
        let mut qb = QueryBuilder::select("collection_pim_items");
        qb.add_column("pim_item_id")
            .add_value_condition("collection_id", Equals, collection)
            .add_value_condition("pim_item_id", Equals, item);
        Ok(!self.rows(qb)?.is_empty())
    }

    /// Links `item` into `collection`.
    pub fn link(&self, collection: i64, item: i64) -> StorageResult<()> {
        let mut qb = QueryBuilder::insert("collection_pim_items");
        qb.set_column_value("collection_id", collection)
            .set_column_value("pim_item_id", item);
        self.run(qb)?;
        Ok(())
    }

    /// Unlinks `item` from `collection`.
    pub fn unlink(&self, collection: i64, item: i64) -> StorageResult<usize> {
        let mut qb = QueryBuilder::delete("collection_pim_items");
        qb.add_value_condition("collection_id", Equals, collection)
            .add_value_condition("pim_item_id", Equals, item);
        self.run(qb)
    }

    // Parts

    /// Adds a part; `None` data marks it as not cached locally.
    pub fn add_part(&self, item: i64, name: &str, data: Option<&[u8]>, size: i64) -> StorageResult<i64> {
        let mut qb = QueryBuilder::insert("parts");
        qb.set_column_value("pim_item_id", item)
            .set_column_value("name", name)
            .set_column_value("data", data)
            .set_column_value("data_size", size);
        self.insert(qb)
    }

    /// Parts of `items` whose payload is not cached, with the owning resource.
    pub fn missing_parts(&self, items: &[i64]) -> StorageResult<Vec<MissingPart>> {
        let mut qb = QueryBuilder::select("parts");
        qb.add_table("pim_items")
            .add_table("collections")
            .add_table("resources")
            .add_columns(["parts.pim_item_id", "parts.name", "resources.name"])
            .add_column_condition("parts.pim_item_id", Equals, "pim_items.id")
            .add_column_condition("pim_items.collection_id", Equals, "collections.id")
            .add_column_condition("collections.resource_id", Equals, "resources.id")
            .add_value_condition("parts.data", Equals, Value::Null)
            .add_value_list_condition("parts.pim_item_id", In, items.iter().copied())
            .add_sort_column("parts.pim_item_id", SortOrder::Ascending);
        self.rows(qb)?
            .iter()
            .map(|row| {
                Ok(MissingPart {
                    item_id: row.int(0)?,
                    name: row.text(1)?,
                    resource: row.text(2)?,
                })
            })
            .collect()
    }

    /// Caches the payload of a part.
    pub fn store_part(&self, item: i64, name: &str, data: &[u8]) -> StorageResult<usize> {
        let size = i64::try_from(data.len()).unwrap_or(i64::MAX);
        let mut qb = QueryBuilder::update("parts");
        qb.set_column_value("data", data)
            .set_column_value("data_size", size)
            .add_value_condition("pim_item_id", Equals, item)
            .add_value_condition("name", Equals, name);
        self.run(qb)
    }
}
