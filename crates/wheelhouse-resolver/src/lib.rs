//! Closure resolution engine: per-target fixed-point selection of one
//! version per package, a single-flight index lookup cache, re-selection
//! reporting and the closure graph used for diagnostics.

pub mod cache;
pub mod conflict;
pub mod graph;
pub mod resolver;

pub use resolver::{Closure, ClosureResolver, ResolvedPackage, TargetClosure};
