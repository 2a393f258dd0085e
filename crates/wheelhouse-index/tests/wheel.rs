use std::io::Write;
use std::path::{Path, PathBuf};

use wheelhouse_core::{Compatibility, FileLocation, Platform, PythonVersion, Target};
use wheelhouse_index::wheel::LocalWheel;
use zip::write::SimpleFileOptions;

fn build_wheel(dir: &Path, filename: &str, metadata: &str) -> PathBuf {
    let path = dir.join(filename);
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
    zip.start_file("e3_core/__init__.py", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"").unwrap();
    zip.start_file("e3_core-22.1.0.dist-info/METADATA", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(metadata.as_bytes()).unwrap();
    zip.finish().unwrap();
    path
}

#[test]
fn reads_metadata_into_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_wheel(
        dir.path(),
        "e3_core-22.1.0-py3-none-any.whl",
        "Metadata-Version: 2.1\nName: e3-core\nVersion: 22.1.0\nRequires-Python: >=3.9\n\
         Requires-Dist: colorama\nRequires-Dist: pywin32 ; sys_platform == 'win32'\n\nBody\n",
    );

    let candidate = LocalWheel::open(&path).unwrap();
    assert_eq!(candidate.name.as_str(), "e3-core");
    assert_eq!(candidate.version.to_string(), "22.1.0");
    assert_eq!(candidate.requirements.len(), 2);
    assert!(candidate.file.sha256.is_some());
    assert_eq!(candidate.file.location, FileLocation::Path(path.clone()));
    assert!(matches!(candidate.compatibility, Compatibility::Wheel(_)));

    let linux = Target::new(Platform::parse("x86_64-linux").unwrap(), PythonVersion::new(10));
    let old = Target::new(Platform::parse("x86_64-linux").unwrap(), PythonVersion::new(8));
    assert!(candidate.is_compatible(&linux));
    assert!(!candidate.is_compatible(&old));
}

#[test]
fn missing_metadata_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pkg-1.0-py3-none-any.whl");
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
    zip.start_file("pkg/__init__.py", SimpleFileOptions::default()).unwrap();
    zip.finish().unwrap();

    assert!(LocalWheel::open(&path).is_err());
}

#[test]
fn non_wheel_filename_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pkg-1.0.tar.gz");
    std::fs::write(&path, b"").unwrap();
    assert!(LocalWheel::open(&path).is_err());
}
