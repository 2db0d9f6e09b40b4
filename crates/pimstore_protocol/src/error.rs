//! Error types for protocol parsing.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while decoding a command line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The command line contained no tokens.
    #[error("empty command line")]
    EmptyLine,

    /// The command line had a tag but no verb.
    #[error("missing command verb")]
    MissingVerb,

    /// A quoted string was not terminated.
    #[error("unterminated quoted string")]
    UnterminatedString,

    /// Parentheses were not balanced.
    #[error("unbalanced parenthesis")]
    UnbalancedParenthesis,

    /// A required argument was missing.
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    /// An argument had the wrong shape.
    #[error("unexpected token for {name}: {found}")]
    UnexpectedToken {
        /// Name of the argument being parsed.
        name: &'static str,
        /// Rendering of the offending token.
        found: String,
    },

    /// A numeric argument could not be parsed.
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// A range set did not match the range grammar.
    #[error("invalid range set: {0}")]
    InvalidRange(String),

    /// A hierarchical remote-id path was malformed.
    #[error("invalid remote id path: {0}")]
    InvalidPath(String),
}

impl ProtocolError {
    /// Creates an unexpected token error.
    pub fn unexpected(name: &'static str, found: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            name,
            found: found.into(),
        }
    }

    /// Returns true if this error concerns an entity selector rather than
    /// the command syntax itself.
    pub fn is_selector_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidRange(_) | ProtocolError::InvalidPath(_)
        )
    }
}
