//! # PimStore Testkit
//!
//! Test utilities for PimStore.
//!
//! This crate provides:
//! - A temporary server fixture and a database seeding helper
//! - Property-based test generators using proptest
//! - A `C:`/`S:` transcript runner driving real sessions
//! - A scripted retrieval service that records requests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pimstore_testkit::prelude::*;
//!
//! #[test]
//! fn list_root() {
//!     let server = TestServer::new();
//!     let mut init = server.initializer();
//!     init.create_resource("testresource");
//!     let col = init.create_collection("col1", None);
//!
//!     let mut scenario = default_scenario();
//!     scenario.push("C: 2 LIST 0 INF () ()".into());
//!     scenario.push(init.list_response(&col, false));
//!     scenario.push("S: 2 OK List completed".into());
//!     assert_scenario(&mut server.session(), &scenario);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod retrieval;
pub mod scenario;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::retrieval::*;
    pub use crate::scenario::*;
}

pub use fixtures::*;
pub use generators::*;
pub use retrieval::*;
pub use scenario::*;
