use std::collections::HashMap;

use async_trait::async_trait;

use wheelhouse_core::{PackageCandidate, PackageName, Target};
use wheelhouse_util::errors::WheelhouseError;

use crate::PackageIndex;

/// An in-memory index over a fixed candidate set.
#[derive(Debug, Clone, Default)]
pub struct StaticIndex {
    packages: HashMap<PackageName, Vec<PackageCandidate>>,
}

impl StaticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, candidate: PackageCandidate) {
        self.packages
            .entry(candidate.name.clone())
            .or_default()
            .push(candidate);
    }

    #[must_use]
    pub fn with(mut self, candidate: PackageCandidate) -> Self {
        self.add(candidate);
        self
    }

    pub fn len(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[async_trait]
impl PackageIndex for StaticIndex {
    async fn query(
        &self,
        name: &PackageName,
        target: &Target,
    ) -> Result<Vec<PackageCandidate>, WheelhouseError> {
        Ok(self
            .packages
            .get(name)
            .map(|all| all.iter().filter(|c| c.is_compatible(target)).cloned().collect())
            .unwrap_or_default())
    }
}
