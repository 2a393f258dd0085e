//! High-level operations tying configuration, collaborators, index and
//! resolver together.

pub mod collaborators;
pub mod ops_closure;
pub mod ops_tree;
