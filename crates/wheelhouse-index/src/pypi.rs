//! PyPI JSON API client.
//!
//! `GET <base>/<name>/json` lists every release file of a project;
//! `GET <base>/<name>/<version>/json` carries the `requires_dist` of one
//! version. Release listings are fetched once per project per run; version
//! metadata is fetched lazily, only for candidates the resolver selects.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::{OnceCell, Semaphore};

use wheelhouse_core::candidate::ParsedFilename;
use wheelhouse_core::{
    DistributionFile, FileLocation, PackageCandidate, PackageName, Requirement, Target, Version,
};
use wheelhouse_util::errors::WheelhouseError;

use crate::cache::MetadataCache;
use crate::download;
use crate::metadata::{parse_requires_python, CoreMetadata};
use crate::PackageIndex;

/// Default PyPI JSON API base URL.
pub const PYPI_URL: &str = "https://pypi.org/pypi";

/// Maximum number of concurrent requests to the index.
const MAX_CONCURRENT_FETCHES: usize = 8;

type Listing = Arc<Vec<PackageCandidate>>;

pub struct PypiIndex {
    client: Client,
    base_url: String,
    cache: MetadataCache,
    offline: bool,
    fetch_limit: Arc<Semaphore>,
    listings: Mutex<HashMap<PackageName, Arc<OnceCell<Listing>>>>,
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    #[serde(default)]
    releases: BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    filename: String,
    url: String,
    #[serde(default)]
    digests: Digests,
    #[serde(default)]
    requires_python: Option<String>,
    #[serde(default)]
    yanked: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Digests {
    #[serde(default)]
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    info: VersionInfo,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    name: String,
    version: String,
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
    #[serde(default)]
    requires_python: Option<String>,
}

impl PypiIndex {
    pub fn new(base_url: &str, cache_dir: &Path, offline: bool) -> Result<Self, WheelhouseError> {
        Ok(Self::with_client(download::build_client()?, base_url, cache_dir, offline))
    }

    pub fn with_client(client: Client, base_url: &str, cache_dir: &Path, offline: bool) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: MetadataCache::new(cache_dir),
            offline,
            fetch_limit: Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES)),
            listings: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn listing(&self, name: &PackageName) -> Result<Listing, WheelhouseError> {
        let cell = {
            let mut listings = self.listings.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(listings.entry(name.clone()).or_default())
        };
        cell.get_or_try_init(|| self.fetch_listing(name)).await.cloned()
    }

    async fn fetch_listing(&self, name: &PackageName) -> Result<Listing, WheelhouseError> {
        let json = if self.offline {
            self.cache.get_project(name).ok_or_else(|| WheelhouseError::CandidateLookup {
                package: name.to_string(),
                message: "not in the metadata cache and the index is offline".into(),
            })?
        } else {
            match self.download_json(&format!("{}/{name}/json", self.base_url)).await {
                Ok(Some(json)) => {
                    if let Err(e) = self.cache.put_project(name, &json) {
                        tracing::warn!("could not cache listing of {name}: {e}");
                    }
                    json
                }
                Ok(None) => {
                    tracing::debug!("{name} is not on the index");
                    return Ok(Arc::new(Vec::new()));
                }
                Err(e) => match self.cache.get_project(name) {
                    Some(json) => {
                        tracing::warn!("using cached listing of {name}: {e}");
                        json
                    }
                    None => {
                        return Err(WheelhouseError::CandidateLookup {
                            package: name.to_string(),
                            message: e.to_string(),
                        })
                    }
                },
            }
        };
        Ok(Arc::new(parse_listing(name, &json)?))
    }

    async fn download_json(&self, url: &str) -> Result<Option<String>, WheelhouseError> {
        let _permit = self
            .fetch_limit
            .acquire()
            .await
            .map_err(|e| WheelhouseError::Generic {
                message: format!("fetch limiter closed: {e}"),
            })?;
        tracing::debug!("GET {url}");
        Ok(download::download_bytes(&self.client, url)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn version_metadata(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<CoreMetadata, WheelhouseError> {
        if let Some(meta) = self.cache.get_version(name, version) {
            return Ok(meta);
        }
        let lookup_error = |message: String| WheelhouseError::CandidateLookup {
            package: name.to_string(),
            message,
        };
        if self.offline {
            return Err(lookup_error(format!(
                "metadata of {version} is not cached and the index is offline"
            )));
        }
        let url = format!("{}/{name}/{version}/json", self.base_url);
        let json = self
            .download_json(&url)
            .await
            .map_err(|e| lookup_error(e.to_string()))?
            .ok_or_else(|| lookup_error(format!("{url} not found")))?;
        let response: VersionResponse = serde_json::from_str(&json)
            .map_err(|e| lookup_error(format!("malformed metadata: {e}")))?;
        let meta = CoreMetadata {
            name: response.info.name,
            version: response.info.version,
            requires_python: response.info.requires_python,
            requires_dist: response.info.requires_dist.unwrap_or_default(),
        };
        if let Err(e) = self.cache.put_version(name, version, &meta) {
            tracing::warn!("could not cache metadata of {name} {version}: {e}");
        }
        Ok(meta)
    }
}

/// Turn a project listing into candidates. Yanked files, files whose names
/// are not wheels or sdists, and unparsable versions are skipped.
fn parse_listing(
    name: &PackageName,
    json: &str,
) -> Result<Vec<PackageCandidate>, WheelhouseError> {
    let response: ProjectResponse =
        serde_json::from_str(json).map_err(|e| WheelhouseError::CandidateLookup {
            package: name.to_string(),
            message: format!("malformed project listing: {e}"),
        })?;

    let mut candidates = Vec::new();
    for (version, files) in response.releases {
        let Ok(version) = Version::parse(&version) else {
            tracing::debug!("skipping {name} {version}: not a PEP 440 version");
            continue;
        };
        for file in files.into_iter().filter(|f| !f.yanked) {
            let Some(parsed) = ParsedFilename::parse(&file.filename) else {
                continue;
            };
            candidates.push(PackageCandidate {
                name: name.clone(),
                version: version.clone(),
                file: DistributionFile {
                    filename: file.filename,
                    location: FileLocation::Url(file.url),
                    sha256: file.digests.sha256,
                },
                compatibility: parsed.compatibility,
                requires_python: parse_requires_python(file.requires_python.as_deref()),
                requirements: Vec::new(),
            });
        }
    }
    Ok(candidates)
}

#[async_trait]
impl PackageIndex for PypiIndex {
    async fn query(
        &self,
        name: &PackageName,
        target: &Target,
    ) -> Result<Vec<PackageCandidate>, WheelhouseError> {
        let listing = self.listing(name).await?;
        Ok(listing.iter().filter(|c| c.is_compatible(target)).cloned().collect())
    }

    async fn requirements(
        &self,
        candidate: &PackageCandidate,
    ) -> Result<Vec<Requirement>, WheelhouseError> {
        if matches!(candidate.file.location, FileLocation::Path(_)) {
            return Ok(candidate.requirements.clone());
        }
        let meta = self.version_metadata(&candidate.name, &candidate.version).await?;
        meta.requirements()
    }
}
