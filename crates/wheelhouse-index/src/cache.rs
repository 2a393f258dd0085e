//! On-disk cache of index responses under `<cache_dir>/pypi/`.
//!
//! Project listings change over time and are refreshed whenever the index is
//! reachable. Per-version metadata never changes once published, so it is
//! read from the cache first.

use std::fs;
use std::path::{Path, PathBuf};

use wheelhouse_core::{PackageName, Version};
use wheelhouse_util::errors::WheelhouseError;

use crate::metadata::CoreMetadata;

#[derive(Debug, Clone)]
pub struct MetadataCache {
    root: PathBuf,
}

impl MetadataCache {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            root: cache_dir.join("pypi"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_path(&self, name: &PackageName) -> PathBuf {
        self.root.join(name.as_str()).join("project.json")
    }

    fn version_path(&self, name: &PackageName, version: &Version) -> PathBuf {
        self.root.join(name.as_str()).join(format!("{version}.json"))
    }

    /// Raw JSON of the last fetched project listing.
    pub fn get_project(&self, name: &PackageName) -> Option<String> {
        fs::read_to_string(self.project_path(name)).ok()
    }

    pub fn put_project(&self, name: &PackageName, json: &str) -> Result<PathBuf, WheelhouseError> {
        let path = self.project_path(name);
        wheelhouse_util::fs::write_atomic(&path, json.as_bytes())?;
        Ok(path)
    }

    pub fn get_version(&self, name: &PackageName, version: &Version) -> Option<CoreMetadata> {
        let path = self.version_path(name, version);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!("discarding corrupt cache entry {}: {e}", path.display());
                None
            }
        }
    }

    pub fn put_version(
        &self,
        name: &PackageName,
        version: &Version,
        meta: &CoreMetadata,
    ) -> Result<PathBuf, WheelhouseError> {
        let path = self.version_path(name, version);
        let json = serde_json::to_vec_pretty(meta).map_err(|e| WheelhouseError::Generic {
            message: format!("Failed to serialize metadata for {name} {version}: {e}"),
        })?;
        wheelhouse_util::fs::write_atomic(&path, &json)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_metadata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::new(dir.path());
        let name = PackageName::new("Requests");
        let version = Version::parse("2.31.0").unwrap();
        assert!(cache.get_version(&name, &version).is_none());

        let meta = CoreMetadata {
            name: "requests".into(),
            version: "2.31.0".into(),
            requires_python: Some(">=3.7".into()),
            requires_dist: vec!["idna<4,>=2.5".into()],
        };
        let path = cache.put_version(&name, &version, &meta).unwrap();
        assert!(path.starts_with(dir.path().join("pypi").join("requests")));
        assert_eq!(cache.get_version(&name, &version), Some(meta));
    }

    #[test]
    fn corrupt_entries_read_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::new(dir.path());
        let name = PackageName::new("pkg");
        let version = Version::parse("1.0").unwrap();
        let path = dir.path().join("pypi").join("pkg").join("1.0.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(cache.get_version(&name, &version).is_none());
    }

    #[test]
    fn project_listing_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::new(dir.path());
        let name = PackageName::new("six");
        cache.put_project(&name, "{\"releases\":{}}").unwrap();
        assert_eq!(cache.get_project(&name).as_deref(), Some("{\"releases\":{}}"));
    }
}
