//! # KestrelDB Testkit
//!
//! Test utilities for KestrelDB.
//!
//! This crate provides:
//! - Test fixtures and database helpers, including JSON seed data
//! - Property-based test generators using proptest
//! - A fault-injecting record store
//! - Contention stress runners with bounded retries
//!
//! ## Usage
//!
//! ```rust
//! use kestrel_testkit::prelude::*;
//!
//! with_people_db(|db| {
//!     let mut session = db.session();
//!     let ada = insert_person(&mut session, "ada@example.org", 36);
//!     assert_eq!(session.index_get(EMAIL_INDEX, "ada@example.org").unwrap(), vec![ada.rid()]);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
