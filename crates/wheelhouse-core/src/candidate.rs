//! Concrete distributions a requirement can resolve to.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use crate::name::PackageName;
use crate::requirement::Requirement;
use crate::specifier::Constraint;
use crate::target::Target;
use crate::version::Version;

/// Where a distribution file can be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileLocation {
    Path(PathBuf),
    Url(String),
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// A wheel or source distribution file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistributionFile {
    pub filename: String,
    pub location: FileLocation,
    /// Hex digest advertised by the index, when known.
    pub sha256: Option<String>,
}

/// Tag triple sets of a wheel filename. Dot-compressed tags are expanded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WheelTags {
    pub python: Vec<String>,
    pub abi: Vec<String>,
    pub platform: Vec<String>,
}

impl WheelTags {
    pub fn supports(&self, target: &Target) -> bool {
        self.platform.iter().any(|p| target.platform.supports_tag(p))
            && self
                .python
                .iter()
                .any(|py| self.abi.iter().any(|abi| target.python.supports(py, abi)))
    }
}

/// What a file is built for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Compatibility {
    /// Source distribution: builds anywhere.
    Source,
    Wheel(WheelTags),
}

/// The pieces of a distribution filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    pub name: PackageName,
    pub version: Version,
    pub compatibility: Compatibility,
}

const SDIST_SUFFIXES: [&str; 4] = [".tar.gz", ".zip", ".tar.bz2", ".tgz"];

impl ParsedFilename {
    /// Parse a wheel (`name-ver[-build]-py-abi-plat.whl`) or sdist
    /// (`name-ver.tar.gz`) filename. Returns `None` for anything else.
    pub fn parse(filename: &str) -> Option<Self> {
        if let Some(stem) = filename.strip_suffix(".whl") {
            let parts: Vec<&str> = stem.split('-').collect();
            if parts.len() != 5 && parts.len() != 6 {
                return None;
            }
            let n = parts.len();
            let split = |s: &str| s.split('.').map(str::to_string).collect::<Vec<_>>();
            return Some(Self {
                name: PackageName::new(parts[0]),
                version: Version::parse(parts[1]).ok()?,
                compatibility: Compatibility::Wheel(WheelTags {
                    python: split(parts[n - 3]),
                    abi: split(parts[n - 2]),
                    platform: split(parts[n - 1]),
                }),
            });
        }
        let stem = SDIST_SUFFIXES.iter().find_map(|s| filename.strip_suffix(s))?;
        let (name, version) = stem.rsplit_once('-')?;
        Some(Self {
            name: PackageName::new(name),
            version: Version::parse(version).ok()?,
            compatibility: Compatibility::Source,
        })
    }
}

/// A concrete (name, version, file) the index offers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageCandidate {
    pub name: PackageName,
    pub version: Version,
    pub file: DistributionFile,
    pub compatibility: Compatibility,
    pub requires_python: Option<Constraint>,
    pub requirements: Vec<Requirement>,
}

impl PackageCandidate {
    /// Build a candidate from a distribution filename, with no dependencies.
    pub fn from_file(file: DistributionFile) -> Option<Self> {
        let parsed = ParsedFilename::parse(&file.filename)?;
        Some(Self {
            name: parsed.name,
            version: parsed.version,
            file,
            compatibility: parsed.compatibility,
            requires_python: None,
            requirements: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_requirements(mut self, requirements: Vec<Requirement>) -> Self {
        self.requirements = requirements;
        self
    }

    #[must_use]
    pub fn with_requires_python(mut self, requires_python: Option<Constraint>) -> Self {
        self.requires_python = requires_python;
        self
    }

    pub fn is_wheel(&self) -> bool {
        matches!(self.compatibility, Compatibility::Wheel(_))
    }

    /// Installable on `target`: tags match and `requires_python` admits the interpreter.
    pub fn is_compatible(&self, target: &Target) -> bool {
        let tags_ok = match &self.compatibility {
            Compatibility::Source => true,
            Compatibility::Wheel(tags) => tags.supports(target),
        };
        tags_ok
            && self
                .requires_python
                .as_ref()
                .map_or(true, |rp| rp.contains(&target.python.as_version()))
    }

    /// Selection order: newer versions first, then wheels before sdists,
    /// then by filename.
    pub fn preference(&self, other: &Self) -> Ordering {
        other
            .version
            .cmp(&self.version)
            .then_with(|| other.is_wheel().cmp(&self.is_wheel()))
            .then_with(|| self.file.filename.cmp(&other.file.filename))
    }
}

impl fmt::Display for PackageCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.name, self.version, self.file.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Platform, PythonVersion};

    fn file(name: &str) -> DistributionFile {
        DistributionFile {
            filename: name.into(),
            location: FileLocation::Url(format!("https://files.example/{name}")),
            sha256: None,
        }
    }

    fn target(platform: &str, minor: u32) -> Target {
        Target::new(Platform::parse(platform).unwrap(), PythonVersion::new(minor))
    }

    #[test]
    fn wheel_filename_with_compressed_tags() {
        let parsed = ParsedFilename::parse("six-1.16.0-py2.py3-none-any.whl").unwrap();
        assert_eq!(parsed.name.as_str(), "six");
        match parsed.compatibility {
            Compatibility::Wheel(tags) => assert_eq!(tags.python, vec!["py2", "py3"]),
            Compatibility::Source => panic!("expected wheel"),
        }
    }

    #[test]
    fn build_tag_is_skipped() {
        let parsed = ParsedFilename::parse("pkg-1.0-1build-cp310-cp310-win_amd64.whl").unwrap();
        assert_eq!(parsed.version.to_string(), "1.0");
    }

    #[test]
    fn sdist_filename() {
        let parsed = ParsedFilename::parse("zope.interface-5.4.0.tar.gz").unwrap();
        assert_eq!(parsed.name.as_str(), "zope-interface");
        assert_eq!(parsed.compatibility, Compatibility::Source);
        assert!(ParsedFilename::parse("README.md").is_none());
    }

    #[test]
    fn compatibility_by_target() {
        let native =
            PackageCandidate::from_file(file("ext-1.0-cp310-cp310-manylinux2014_x86_64.whl"))
                .unwrap();
        assert!(native.is_compatible(&target("x86_64-linux", 10)));
        assert!(!native.is_compatible(&target("x86_64-windows", 10)));
        assert!(!native.is_compatible(&target("x86_64-linux", 9)));

        let sdist = PackageCandidate::from_file(file("ext-1.0.tar.gz")).unwrap();
        assert!(sdist.is_compatible(&target("x86_64-windows", 9)));
    }

    #[test]
    fn requires_python_filters() {
        let cand = PackageCandidate::from_file(file("new-2.0-py3-none-any.whl"))
            .unwrap()
            .with_requires_python(Some(Constraint::parse(">=3.11").unwrap()));
        assert!(!cand.is_compatible(&target("x86_64-linux", 10)));
        assert!(cand.is_compatible(&target("x86_64-linux", 12)));
    }

    #[test]
    fn preference_order() {
        let wheel = PackageCandidate::from_file(file("pkg-1.0-py3-none-any.whl")).unwrap();
        let sdist = PackageCandidate::from_file(file("pkg-1.0.tar.gz")).unwrap();
        let newer = PackageCandidate::from_file(file("pkg-1.1.tar.gz")).unwrap();
        let mut all = vec![sdist.clone(), wheel.clone(), newer.clone()];
        all.sort_by(PackageCandidate::preference);
        assert_eq!(all, vec![newer, wheel, sdist]);
    }
}
