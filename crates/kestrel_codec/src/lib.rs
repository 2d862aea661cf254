//! # Kestrel Codec
//!
//! Property values and record body encoding for KestrelDB.
//!
//! This crate provides:
//! - [`Value`]: the dynamic property value, with the total order index keys use
//! - [`Document`]: an ordered property map
//! - Deterministic CBOR record bodies via `ciborium`
//!
//! ## Usage
//!
//! ```
//! use kestrel_codec::{Document, Value};
//!
//! let mut doc = Document::new();
//! doc.set("name", "Alice");
//! doc.set("age", 30i64);
//!
//! let body = doc.to_bytes().unwrap();
//! let decoded = Document::from_bytes(&body).unwrap();
//! assert_eq!(decoded.get("age"), Some(&Value::Integer(30)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod value;

pub use document::{Document, BODY_FORMAT_VERSION};
pub use error::{CodecError, CodecResult};
pub use value::Value;
