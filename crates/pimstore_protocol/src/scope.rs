//! Client selection scopes.
//!
//! A scope names target entities by internal id ([`ScopeKind::Uid`]), by
//! remote id within the selected resource ([`ScopeKind::Rid`]) or by a
//! `/`-delimited path of remote ids ([`ScopeKind::HierarchicalRid`]).

use crate::error::{ProtocolError, ProtocolResult};
use crate::parser::{string_list, Token};
use crate::range::RangeSet;

/// How a selector is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Internal numeric ids as a range set.
    #[default]
    Uid,
    /// Remote ids, unique within a resource.
    Rid,
    /// Path of remote ids from a starting collection.
    HierarchicalRid,
}

impl ScopeKind {
    /// Maps a command prefix (`UID`, `RID`, `HRID`) to a kind.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_uppercase().as_str() {
            "UID" => Some(ScopeKind::Uid),
            "RID" => Some(ScopeKind::Rid),
            "HRID" => Some(ScopeKind::HierarchicalRid),
            _ => None,
        }
    }

    /// Returns the command prefix for this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            ScopeKind::Uid => "UID",
            ScopeKind::Rid => "RID",
            ScopeKind::HierarchicalRid => "HRID",
        }
    }
}

/// A decoded selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Internal ids.
    Uid(RangeSet),
    /// Remote ids.
    Rid(Vec<String>),
    /// Remote id path segments, outermost first.
    HierarchicalRid(Vec<String>),
}

impl Scope {
    /// Decodes a selector token according to `kind`.
    ///
    /// A `Uid` selector is a range set atom. A `Rid` selector is a string or
    /// a list of strings. A `HierarchicalRid` selector is a string path.
    pub fn parse(kind: ScopeKind, token: &Token) -> ProtocolResult<Self> {
        match kind {
            ScopeKind::Uid => {
                let text = token
                    .as_atom()
                    .ok_or_else(|| ProtocolError::InvalidRange(token.to_string()))?;
                Ok(Scope::Uid(RangeSet::parse(text)?))
            }
            ScopeKind::Rid => {
                let rids = match token {
                    Token::List(items) => string_list("remote id", items.clone())?,
                    other => vec![other
                        .as_str()
                        .ok_or_else(|| ProtocolError::unexpected("remote id", other.to_string()))?
                        .to_string()],
                };
                if rids.is_empty() || rids.iter().any(String::is_empty) {
                    return Err(ProtocolError::InvalidPath(token.to_string()));
                }
                Ok(Scope::Rid(rids))
            }
            ScopeKind::HierarchicalRid => {
                let path = token
                    .as_str()
                    .ok_or_else(|| ProtocolError::unexpected("remote id path", token.to_string()))?;
                Ok(Scope::HierarchicalRid(split_path(path)?))
            }
        }
    }

    /// Returns the kind of this selector.
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Uid(_) => ScopeKind::Uid,
            Scope::Rid(_) => ScopeKind::Rid,
            Scope::HierarchicalRid(_) => ScopeKind::HierarchicalRid,
        }
    }
}

fn split_path(path: &str) -> ProtocolResult<Vec<String>> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(ProtocolError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}
