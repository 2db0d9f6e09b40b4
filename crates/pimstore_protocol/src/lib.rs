//! # PimStore Protocol
//!
//! Wire-level types for the PimStore command protocol.
//!
//! This crate provides:
//! - `RangeSet` for compact id selectors
//! - A tokenizer for `tag verb arguments…` command lines
//! - `Response` lines and quoting helpers
//! - `Scope` selectors (uid, remote id, remote id path)
//! - `ChangeNotification` and the compressing `Collector`
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod notification;
mod parser;
mod range;
mod response;
mod scope;

pub use error::{ProtocolError, ProtocolResult};
pub use notification::{append_and_compress, ChangeNotification, Collector, EntityKind, Operation};
pub use parser::{parse_number, string_list, tokenize, Args, CommandLine, Token};
pub use range::{Id, Interval, RangeSet};
pub use response::{list, quote, Response, Status};
pub use scope::{Scope, ScopeKind};
