//! LIST: enumerate collections below a base.
//!
//! ```text
//! tag LIST base depth (filters) (options)
//! ```
//!
//! `depth` is `0` (the base itself, filters ignored), `1` (direct children)
//! or `INF` (every descendant). The base is never listed for depths `1` and
//! `INF`; base `0` stands for the root. Filters are `MIMETYPE (types…)`,
//! `RESOURCE "name"`, `ENABLED`, `DISPLAY`, `SYNC` and `INDEX`. `DISPLAY`,
//! `SYNC` and `INDEX` keep collections whose preference is `TRUE`, or
//! `DEFAULT` while enabled. `ENABLED` keeps collections that are enabled or
//! have any preference set to `TRUE`. Collections passing the selective
//! filters are listed together with their ancestors inside the listed
//! subtree, so clients can always rebuild the tree. The only option
//! is `ANCESTORS depth` (or `ANCESTORS (DEPTH depth …)`), which appends the
//! ancestor chain of every listed collection.

use super::{bool_atom, tristate_atom, CommandContext, Reply};
use crate::error::{ServerError, ServerResult};
use crate::store::{CachePolicy, Collection, DataStore, Tristate};
use pimstore_protocol::{list as paren_list, quote, string_list, Args, ProtocolError, Token};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    Base,
    Children,
    All,
}

impl Depth {
    fn parse(text: &str) -> ServerResult<Self> {
        match text.to_ascii_uppercase().as_str() {
            "0" => Ok(Depth::Base),
            "1" => Ok(Depth::Children),
            "INF" => Ok(Depth::All),
            _ => Err(ProtocolError::unexpected("depth", text).into()),
        }
    }
}

#[derive(Debug, Default)]
struct Filters {
    mime_types: Option<BTreeSet<String>>,
    resource: Option<String>,
    enabled: bool,
    display: bool,
    sync: bool,
    index: bool,
}

impl Filters {
    fn parse(tokens: Vec<Token>) -> ServerResult<Self> {
        let mut filters = Filters::default();
        let mut args = Args::new(tokens);
        while !args.is_empty() {
            let key = args.next_atom("filter")?;
            match key.to_ascii_uppercase().as_str() {
                "MIMETYPE" => {
                    let types = string_list("mime type", args.next_list("mime types")?)?;
                    filters.mime_types = Some(types.into_iter().collect());
                }
                "RESOURCE" => filters.resource = Some(args.next_string("resource")?),
                "ENABLED" => filters.enabled = true,
                "DISPLAY" => filters.display = true,
                "SYNC" => filters.sync = true,
                "INDEX" => filters.index = true,
                _ => return Err(ProtocolError::unexpected("filter", key).into()),
            }
        }
        Ok(filters)
    }

    fn is_selective(&self) -> bool {
        self.enabled || self.display || self.sync || self.index || self.mime_types.is_some()
    }

    /// Whether `collection` passes the enabled and preference filters.
    fn accepts(&self, collection: &Collection) -> bool {
        let prefs = [
            (self.display, collection.display_pref),
            (self.sync, collection.sync_pref),
            (self.index, collection.index_pref),
        ];
        if self.enabled
            && !collection.enabled
            && !prefs.iter().any(|(_, pref)| *pref == Tristate::True)
        {
            return false;
        }
        prefs
            .iter()
            .filter(|(wanted, _)| *wanted)
            .all(|(_, pref)| pref.resolve(collection.enabled))
    }
}

/// How many ancestors to append; `None` means all of them.
fn parse_options(tokens: Vec<Token>) -> ServerResult<Option<Option<usize>>> {
    let mut ancestors = None;
    let mut args = Args::new(tokens);
    while !args.is_empty() {
        let key = args.next_atom("option")?;
        if !key.eq_ignore_ascii_case("ANCESTORS") {
            return Err(ProtocolError::unexpected("option", key).into());
        }
        let depth = match args.next_token("ancestor depth")? {
            Token::Atom(depth) => depth,
            Token::List(items) => {
                // Attribute names after DEPTH select fields; every field is sent.
                let mut scope = Args::new(items);
                let key = scope.next_atom("DEPTH")?;
                if !key.eq_ignore_ascii_case("DEPTH") {
                    return Err(ProtocolError::unexpected("DEPTH", key).into());
                }
                scope.next_atom("ancestor depth")?
            }
            other => return Err(ProtocolError::unexpected("ancestor depth", other.to_string()).into()),
        };
        ancestors = Some(if depth.eq_ignore_ascii_case("INF") {
            None
        } else {
            let depth = pimstore_protocol::parse_number(&depth)?;
            Some(usize::try_from(depth).unwrap_or(usize::MAX))
        });
    }
    Ok(ancestors)
}

fn optional_list(args: &mut Args, name: &'static str) -> ServerResult<Vec<Token>> {
    match args.peek() {
        Some(Token::List(_)) => Ok(args.next_list(name)?),
        _ => Ok(Vec::new()),
    }
}

/// `LIST base depth (filters) (options)`
pub(super) fn list(ctx: &mut CommandContext<'_>, args: &mut Args) -> ServerResult<Reply> {
    let base = args.next_number("base")?;
    let depth = Depth::parse(&args.next_atom("depth")?)?;
    let filters = Filters::parse(optional_list(args, "filters")?)?;
    let ancestors = parse_options(optional_list(args, "options")?)?;
    args.finish()?;

    let store = ctx.store();
    let tree = Tree::load(&store)?;
    let base = match base {
        0 => None,
        id => {
            let id = i64::try_from(id).unwrap_or(i64::MAX);
            if !tree.collections.contains_key(&id) {
                return Err(ServerError::not_found("collection", id.to_string()));
            }
            Some(id)
        }
    };

    let listed = match depth {
        Depth::Base => base.into_iter().collect(),
        Depth::Children => tree.children(base).to_vec(),
        Depth::All => tree.descendants(base),
    };
    let listed = if depth == Depth::Base {
        listed
    } else {
        apply_filters(&store, &tree, listed, &filters)?
    };

    let lines = listed
        .iter()
        .filter_map(|id| tree.collections.get(id))
        .map(|collection| list_line(&store, &tree, collection, ancestors))
        .collect::<ServerResult<Vec<_>>>()?;
    Ok(Reply::ok("List completed").with_lines(lines))
}

struct Tree {
    collections: BTreeMap<i64, Collection>,
    children: BTreeMap<Option<i64>, Vec<i64>>,
}

impl Tree {
    fn load(store: &DataStore<'_>) -> ServerResult<Self> {
        let mut collections = BTreeMap::new();
        let mut children: BTreeMap<Option<i64>, Vec<i64>> = BTreeMap::new();
        for collection in store.collections(None)? {
            children
                .entry(collection.parent_id)
                .or_default()
                .push(collection.id);
            collections.insert(collection.id, collection);
        }
        Ok(Self {
            collections,
            children,
        })
    }

    fn children(&self, parent: Option<i64>) -> &[i64] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Descendants of `base`, parents first, siblings by ascending id.
    fn descendants(&self, base: Option<i64>) -> Vec<i64> {
        let mut out = Vec::new();
        let mut stack: Vec<i64> = self.children(base).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(Some(id)).iter().rev());
        }
        out
    }

    fn parent(&self, id: i64) -> Option<i64> {
        self.collections.get(&id).and_then(|c| c.parent_id)
    }
}

fn apply_filters(
    store: &DataStore<'_>,
    tree: &Tree,
    candidates: Vec<i64>,
    filters: &Filters,
) -> ServerResult<Vec<i64>> {
    let mut candidates = candidates;
    if let Some(name) = &filters.resource {
        let resource = store
            .resource_by_name(name)?
            .ok_or_else(|| ServerError::not_found("resource", name.clone()))?;
        candidates.retain(|id| {
            tree.collections
                .get(id)
                .is_some_and(|c| c.resource_id == resource.id)
        });
    }
    if !filters.is_selective() {
        return Ok(candidates);
    }

    let in_range: BTreeSet<i64> = candidates.iter().copied().collect();
    let mut included = BTreeSet::new();
    for id in &candidates {
        let Some(collection) = tree.collections.get(id) else {
            continue;
        };
        if !filters.accepts(collection) {
            continue;
        }
        if let Some(wanted) = &filters.mime_types {
            let types = store.collection_mime_types(*id)?;
            if !types.iter().any(|t| wanted.contains(t)) {
                continue;
            }
        }
        included.insert(*id);
        let mut parent = collection.parent_id;
        while let Some(pid) = parent.filter(|p| in_range.contains(p)) {
            if !included.insert(pid) {
                break;
            }
            parent = tree.parent(pid);
        }
    }
    candidates.retain(|id| included.contains(id));
    Ok(candidates)
}

fn list_line(
    store: &DataStore<'_>,
    tree: &Tree,
    collection: &Collection,
    ancestors: Option<Option<usize>>,
) -> ServerResult<String> {
    let mut fields = vec![
        format!("NAME {}", quote(&collection.name)),
        format!("MIMETYPE {}", paren_list(store.collection_mime_types(collection.id)?)),
        format!("REMOTEID {}", quote(&collection.remote_id)),
        format!("RESOURCE {}", quote(&store.resource_name(collection.resource_id)?)),
        format!("ENABLED {}", bool_atom(collection.enabled)),
        format!("DISPLAY {}", tristate_atom(collection.display_pref)),
        format!("SYNC {}", tristate_atom(collection.sync_pref)),
        format!("INDEX {}", tristate_atom(collection.index_pref)),
        format!("SUBSCRIBED {}", bool_atom(collection.subscribed)),
        format!("VIRTUAL {}", bool_atom(collection.is_virtual)),
        format!("CACHEPOLICY {}", cache_policy(&collection.cache_policy)),
    ];
    for (key, value) in store.collection_attributes(collection.id)? {
        fields.push(format!(
            "{} {}",
            String::from_utf8_lossy(&key),
            quote(&String::from_utf8_lossy(&value))
        ));
    }
    if let Some(limit) = ancestors {
        fields.push(format!("ANCESTORS {}", paren_list(ancestor_chain(tree, collection, limit))));
    }
    Ok(format!(
        "{} {} {}",
        collection.id,
        collection.parent_id.unwrap_or(0),
        paren_list(fields)
    ))
}

fn cache_policy(policy: &CachePolicy) -> String {
    paren_list([
        format!("INHERIT {}", bool_atom(policy.inherit)),
        format!("INTERVAL {}", policy.check_interval),
        format!("CACHETIMEOUT {}", policy.cache_timeout),
        format!("SYNCONDEMAND {}", bool_atom(policy.sync_on_demand)),
        format!("LOCALPARTS {}", paren_list(&policy.local_parts)),
    ])
}

/// `(id "remote id")` per ancestor, ending with `(0 "")` at the root.
fn ancestor_chain(tree: &Tree, collection: &Collection, limit: Option<usize>) -> Vec<String> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut chain = Vec::new();
    let mut parent = collection.parent_id;
    while chain.len() < limit {
        match parent.and_then(|id| tree.collections.get(&id)) {
            Some(ancestor) => {
                chain.push(format!("({} {})", ancestor.id, quote(&ancestor.remote_id)));
                parent = ancestor.parent_id;
            }
            None => {
                chain.push("(0 \"\")".to_string());
                break;
            }
        }
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_values() {
        assert_eq!(Depth::parse("0").unwrap(), Depth::Base);
        assert_eq!(Depth::parse("inf").unwrap(), Depth::All);
        assert!(Depth::parse("2").is_err());
    }

    #[test]
    fn filter_syntax() {
        let filters = Filters::parse(vec![
            Token::Atom("MIMETYPE".into()),
            Token::List(vec![Token::Atom("text/calendar".into())]),
            Token::Atom("ENABLED".into()),
        ])
        .unwrap();
        assert!(filters.enabled);
        assert!(filters.mime_types.unwrap().contains("text/calendar"));

        let filters = Filters::parse(vec![Token::Atom("display".into()), Token::Atom("INDEX".into())])
            .unwrap();
        assert!(filters.display && filters.index && !filters.sync);
        assert!(filters.is_selective());
        assert!(Filters::parse(vec![Token::Atom("VISIBLE".into())]).is_err());
    }

    #[test]
    fn preference_filters() {
        let display = Filters {
            display: true,
            ..Filters::default()
        };
        let enabled = Filters {
            enabled: true,
            ..Filters::default()
        };
        let default_on = Collection {
            enabled: true,
            ..Collection::default()
        };
        let disabled_override = Collection {
            enabled: false,
            display_pref: Tristate::True,
            ..Collection::default()
        };
        let enabled_hidden = Collection {
            enabled: true,
            display_pref: Tristate::False,
            ..Collection::default()
        };
        let disabled = Collection::default();

        assert!(display.accepts(&default_on));
        assert!(display.accepts(&disabled_override));
        assert!(!display.accepts(&enabled_hidden));
        assert!(!display.accepts(&disabled));
        assert!(enabled.accepts(&disabled_override));
        assert!(enabled.accepts(&enabled_hidden));
        assert!(!enabled.accepts(&disabled));
    }

    #[test]
    fn ancestor_options() {
        let inf = parse_options(vec![Token::Atom("ANCESTORS".into()), Token::Atom("INF".into())]);
        assert_eq!(inf.unwrap(), Some(None));
        let scoped = parse_options(vec![
            Token::Atom("ANCESTORS".into()),
            Token::List(vec![
                Token::Atom("DEPTH".into()),
                Token::Atom("1".into()),
                Token::Atom("NAME".into()),
            ]),
        ]);
        assert_eq!(scoped.unwrap(), Some(Some(1)));
        assert_eq!(parse_options(Vec::new()).unwrap(), None);
    }
}
