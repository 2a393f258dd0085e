//! Resolution session cache for index lookups.
//!
//! Every `(package, target)` query and every per-file requirement lookup is
//! issued at most once for the lifetime of the cache. Concurrent callers of
//! the same key wait for the first one instead of issuing their own request.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

use wheelhouse_core::{PackageCandidate, PackageName, Requirement, Target};
use wheelhouse_index::PackageIndex;
use wheelhouse_util::errors::WheelhouseError;

type Slot<T> = Arc<OnceCell<Arc<T>>>;

/// Single-flight memo table: one [`OnceCell`] per key.
struct Memo<K, T> {
    slots: Mutex<HashMap<K, Slot<T>>>,
}

impl<K: Eq + Hash, T> Memo<K, T> {
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: K) -> Slot<T> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }
}

/// Hit/miss counters of a [`LookupCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

pub struct LookupCache {
    index: Arc<dyn PackageIndex>,
    queries: Memo<(PackageName, Target), Vec<PackageCandidate>>,
    requirements: Memo<String, Vec<Requirement>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl LookupCache {
    pub fn new(index: Arc<dyn PackageIndex>) -> Self {
        Self {
            index,
            queries: Memo::new(),
            requirements: Memo::new(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Candidates of `name` installable on `target`.
    pub async fn query(
        &self,
        name: &PackageName,
        target: &Target,
    ) -> Result<Arc<Vec<PackageCandidate>>, WheelhouseError> {
        let slot = self.queries.slot((name.clone(), *target));
        let mut fetched = false;
        let candidates = slot
            .get_or_try_init(|| {
                fetched = true;
                let lookup = self.index.query(name, target);
                async move { lookup.await.map(Arc::new) }
            })
            .await?;

        if fetched {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("{name} on {target}: {} candidate(s)", candidates.len());
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Arc::clone(candidates))
    }

    /// Declared dependencies of `candidate`, keyed by its filename.
    pub async fn requirements(
        &self,
        candidate: &PackageCandidate,
    ) -> Result<Arc<Vec<Requirement>>, WheelhouseError> {
        let slot = self.requirements.slot(candidate.file.filename.clone());
        let requirements = slot
            .get_or_try_init(|| {
                let lookup = self.index.requirements(candidate);
                async move { lookup.await.map(Arc::new) }
            })
            .await?;
        Ok(Arc::clone(requirements))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use wheelhouse_core::{Platform, PythonVersion};

    struct CountingIndex {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PackageIndex for CountingIndex {
        async fn query(
            &self,
            _name: &PackageName,
            _target: &Target,
        ) -> Result<Vec<PackageCandidate>, WheelhouseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn concurrent_queries_share_one_lookup() {
        let index = Arc::new(CountingIndex {
            calls: AtomicUsize::new(0),
        });
        let cache = LookupCache::new(index.clone());
        let name = PackageName::new("six");
        let target = Target::new(Platform::parse("x86_64-linux").unwrap(), PythonVersion::new(10));

        let lookups = (0..5).map(|_| cache.query(&name, &target));
        futures_util::future::try_join_all(lookups).await.unwrap();

        assert_eq!(index.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 4, misses: 1 });
    }

    #[tokio::test]
    async fn targets_are_separate_keys() {
        let index = Arc::new(CountingIndex {
            calls: AtomicUsize::new(0),
        });
        let cache = LookupCache::new(index.clone());
        let name = PackageName::new("six");
        let linux = Target::new(Platform::parse("x86_64-linux").unwrap(), PythonVersion::new(10));
        let windows =
            Target::new(Platform::parse("x86_64-windows").unwrap(), PythonVersion::new(10));

        cache.query(&name, &linux).await.unwrap();
        cache.query(&name, &windows).await.unwrap();
        cache.query(&name, &linux).await.unwrap();
        assert_eq!(index.calls.load(Ordering::SeqCst), 2);
    }
}
