//! External tools the closure build delegates to.
//!
//! Only the interfaces live here. Callers plug in a VCS client and a wheel
//! build backend of their choice.

use std::path::{Path, PathBuf};

use wheelhouse_core::config::WheelSource;

/// Where a checkout takes its sources from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutKind {
    /// `source.url` is a remote git repository.
    Git,
    /// `source.url` is a clone already on disk, synchronized as plain files.
    LocalClone,
}

/// Checks out a source tree.
pub trait SourceCheckout {
    /// Bring `dest` up to date with `source.url` at `source.revision` and
    /// return the directory holding the project. `dest` may already hold a
    /// checkout from an earlier run.
    fn checkout(
        &self,
        source: &WheelSource,
        kind: CheckoutKind,
        dest: &Path,
    ) -> miette::Result<PathBuf>;
}

/// Builds a wheel from a checked out project.
pub trait WheelBuilder {
    /// Build the project in `source_dir`, write the wheel into `dest_dir` and
    /// return its path.
    fn build(&self, source_dir: &Path, dest_dir: &Path) -> miette::Result<PathBuf>;
}
