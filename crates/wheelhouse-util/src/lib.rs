//! Shared utilities for wheelhouse.
//!
//! Cross-cutting concerns used by every other wheelhouse crate: the error
//! type, filesystem helpers, SHA-256 hashing and terminal status output.

pub mod errors;
pub mod fs;
pub mod hash;
pub mod progress;
