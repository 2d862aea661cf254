//! CLI command implementations.

pub mod scenario;
pub mod seed;
pub mod stress;
