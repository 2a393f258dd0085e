use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use wheelhouse_util::errors::WheelhouseError;

use crate::name::PackageName;
use crate::requirement::Requirement;
use crate::target::{Platform, PythonVersion, Target};

/// Closure description loaded from a TOML file.
///
/// ```toml
/// platforms = ["x86_64-linux", "x86_64-windows"]
/// requirements = ["requests>=2.28"]
/// discard_from_closure = "^internal-"
///
/// [wheels]
/// e3-core = "https://github.com/AdaCore/e3-core.git#main"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureConfig {
    /// Wheels built from source: package name to `url[#revision]`.
    #[serde(default)]
    pub wheels: BTreeMap<String, String>,

    #[serde(default)]
    pub requirements: Vec<String>,

    #[serde(default)]
    pub discard_from_closure: Option<String>,

    #[serde(default = "default_frozen_requirement_file")]
    pub frozen_requirement_file: String,

    pub platforms: Vec<String>,

    #[serde(default = "default_python3_version")]
    pub python3_version: u32,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default = "default_index_url")]
    pub index_url: String,

    #[serde(default)]
    pub offline: bool,
}

fn default_frozen_requirement_file() -> String {
    "requirements.txt".to_string()
}

fn default_python3_version() -> u32 {
    10
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_index_url() -> String {
    "https://pypi.org/pypi".to_string()
}

/// A wheel to check out and build: `url#revision`, revision defaulting to `master`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelSource {
    pub name: PackageName,
    pub url: String,
    pub revision: String,
}

impl WheelSource {
    pub fn parse(name: &str, spec: &str) -> Self {
        let (url, revision) = match spec.split_once('#') {
            Some((url, rev)) if !rev.is_empty() => (url, rev),
            Some((url, _)) => (url, "master"),
            None => (spec, "master"),
        };
        Self {
            name: PackageName::new(name),
            url: url.to_string(),
            revision: revision.to_string(),
        }
    }

    /// The same source read from a clone in `dir`, found under the last
    /// segment of the URL (`.../e3-core.git` -> `<dir>/e3-core.git`).
    pub fn in_local_clones(&self, dir: &Path) -> Self {
        let repo = self.url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
        Self {
            name: self.name.clone(),
            url: dir.join(repo).to_string_lossy().into_owned(),
            revision: self.revision.clone(),
        }
    }
}

impl ClosureConfig {
    /// Load and validate a closure configuration file.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WheelhouseError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Ok(Self::parse_toml(&content)?)
    }

    pub fn parse_toml(content: &str) -> Result<Self, WheelhouseError> {
        let config: Self = toml::from_str(content).map_err(|e| WheelhouseError::Config {
            message: format!("Failed to parse closure configuration: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), WheelhouseError> {
        if self.platforms.is_empty() {
            return Err(WheelhouseError::Config {
                message: "`platforms` must list at least one platform".into(),
            });
        }
        self.targets()?;
        self.discard_pattern()?;
        for req in &self.requirements {
            Requirement::parse(req)?;
        }
        Ok(())
    }

    /// Every configured platform paired with the configured interpreter.
    pub fn targets(&self) -> Result<Vec<Target>, WheelhouseError> {
        let python = PythonVersion::new(self.python3_version);
        let mut targets = self
            .platforms
            .iter()
            .map(|p| Platform::parse(p).map(|platform| Target::new(platform, python)))
            .collect::<Result<Vec<_>, _>>()?;
        targets.sort();
        targets.dedup();
        Ok(targets)
    }

    /// Persistent checkouts of the `wheels` sources, one directory per name.
    pub fn vcs_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("vcs")
    }

    /// Wheels built from the `wheels` sources.
    pub fn wheel_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("wheels")
    }

    pub fn wheel_sources(&self) -> Vec<WheelSource> {
        self.wheels
            .iter()
            .map(|(name, spec)| WheelSource::parse(name, spec))
            .collect()
    }

    /// Built wheel names plus the explicit requirement strings.
    pub fn toplevel_requirements(&self) -> Result<Vec<Requirement>, WheelhouseError> {
        let mut reqs: Vec<Requirement> = self
            .wheels
            .keys()
            .map(|name| Requirement::any(PackageName::new(name)))
            .collect();
        for text in &self.requirements {
            reqs.push(Requirement::parse(text)?);
        }
        Ok(reqs)
    }

    pub fn discard_pattern(&self) -> Result<Option<Regex>, WheelhouseError> {
        self.discard_from_closure
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| WheelhouseError::Config {
                    message: format!("invalid discard_from_closure pattern `{pattern}`: {e}"),
                })
            })
            .transpose()
    }
}
