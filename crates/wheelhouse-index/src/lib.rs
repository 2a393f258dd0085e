//! Package index access: where candidates and their metadata come from.
//!
//! The resolver only sees the [`PackageIndex`] trait. [`pypi::PypiIndex`]
//! talks to the PyPI JSON API, [`memory::StaticIndex`] serves a fixed set of
//! candidates, and [`wheel::LocalWheel`] turns a built `.whl` into a
//! candidate for local overrides.

use async_trait::async_trait;

use wheelhouse_core::{PackageCandidate, PackageName, Requirement, Target};
use wheelhouse_util::errors::WheelhouseError;

pub mod cache;
pub mod download;
pub mod memory;
pub mod metadata;
pub mod pypi;
pub mod wheel;

/// A source of package candidates.
#[async_trait]
pub trait PackageIndex: Send + Sync {
    /// Every candidate of `name` installable on `target`, in any order.
    ///
    /// An unknown package yields an empty list, not an error.
    async fn query(
        &self,
        name: &PackageName,
        target: &Target,
    ) -> Result<Vec<PackageCandidate>, WheelhouseError>;

    /// Dependencies declared by `candidate`.
    ///
    /// Indexes that fill [`PackageCandidate::requirements`] up front keep the
    /// default; indexes that fetch metadata lazily override it.
    async fn requirements(
        &self,
        candidate: &PackageCandidate,
    ) -> Result<Vec<Requirement>, WheelhouseError> {
        Ok(candidate.requirements.clone())
    }
}
