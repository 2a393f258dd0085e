//! Reading locally built wheels.

use std::fs;
use std::io::Read;
use std::path::Path;

use wheelhouse_core::candidate::ParsedFilename;
use wheelhouse_core::{DistributionFile, FileLocation, PackageCandidate, PackageName, Version};
use wheelhouse_util::errors::WheelhouseError;

use crate::metadata::CoreMetadata;

/// A `.whl` file on disk.
pub struct LocalWheel;

impl LocalWheel {
    /// Read the wheel's `*.dist-info/METADATA` into a candidate whose file
    /// location is the wheel itself.
    pub fn open(path: &Path) -> Result<PackageCandidate, WheelhouseError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| WheelhouseError::Generic {
                message: format!("{} is not a wheel file", path.display()),
            })?;
        let parsed = ParsedFilename::parse(filename)
            .filter(|_| filename.ends_with(".whl"))
            .ok_or_else(|| WheelhouseError::Generic {
                message: format!("`{filename}` is not a valid wheel filename"),
            })?;

        let meta = read_metadata(path)?;
        let name = if meta.name.is_empty() {
            parsed.name
        } else {
            PackageName::new(&meta.name)
        };
        let version = if meta.version.is_empty() {
            parsed.version
        } else {
            Version::parse(&meta.version).map_err(|e| WheelhouseError::Generic {
                message: format!("{}: invalid version `{}`: {e}", path.display(), meta.version),
            })?
        };

        tracing::debug!("read local wheel {name} {version} from {}", path.display());
        Ok(PackageCandidate {
            name,
            version,
            file: DistributionFile {
                filename: filename.to_string(),
                location: FileLocation::Path(path.to_path_buf()),
                sha256: Some(wheelhouse_util::hash::sha256_file(path)?),
            },
            compatibility: parsed.compatibility,
            requires_python: meta.requires_python_constraint(),
            requirements: meta.requirements()?,
        })
    }
}

fn read_metadata(path: &Path) -> Result<CoreMetadata, WheelhouseError> {
    let zip_error = |e: zip::result::ZipError| WheelhouseError::Generic {
        message: format!("Failed to read wheel {}: {e}", path.display()),
    };
    let file = fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_error)?;

    let entry_name = archive
        .file_names()
        .find(|name| {
            name.strip_suffix("/METADATA")
                .is_some_and(|dir| dir.ends_with(".dist-info") && !dir.contains('/'))
        })
        .map(str::to_string)
        .ok_or_else(|| WheelhouseError::Generic {
            message: format!("{} has no .dist-info/METADATA", path.display()),
        })?;

    let mut entry = archive.by_name(&entry_name).map_err(zip_error)?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(CoreMetadata::parse(&content))
}
