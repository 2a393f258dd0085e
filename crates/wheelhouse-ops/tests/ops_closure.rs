use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use wheelhouse_core::config::{ClosureConfig, WheelSource};
use wheelhouse_core::{DistributionFile, FileLocation, PackageCandidate, PackageName, Requirement};
use wheelhouse_index::memory::StaticIndex;
use wheelhouse_index::PackageIndex;
use wheelhouse_ops::collaborators::{CheckoutKind, SourceCheckout, WheelBuilder};
use wheelhouse_ops::ops_closure::{build_closure, open_index, ClosureOptions};
use wheelhouse_ops::ops_tree::{render_trees, TreeOptions};
use wheelhouse_resolver::ClosureResolver;
use zip::write::SimpleFileOptions;

/// Records checkouts and leaves the package name in the checkout dir.
#[derive(Default)]
struct FakeCheckout {
    calls: Mutex<Vec<(String, String, CheckoutKind)>>,
}

impl FakeCheckout {
    fn calls(&self) -> Vec<(String, String, CheckoutKind)> {
        self.calls.lock().unwrap().clone()
    }
}

impl SourceCheckout for FakeCheckout {
    fn checkout(
        &self,
        source: &WheelSource,
        kind: CheckoutKind,
        dest: &Path,
    ) -> miette::Result<PathBuf> {
        std::fs::create_dir_all(dest).unwrap();
        std::fs::write(dest.join("NAME"), source.name.as_str()).unwrap();
        self.calls
            .lock()
            .unwrap()
            .push((source.url.clone(), source.revision.clone(), kind));
        Ok(dest.to_path_buf())
    }
}

/// Produces a 22.1.0 wheel depending on `colorama`.
struct FakeBuilder;

impl WheelBuilder for FakeBuilder {
    fn build(&self, source_dir: &Path, dest_dir: &Path) -> miette::Result<PathBuf> {
        let name = std::fs::read_to_string(source_dir.join("NAME")).unwrap();
        let dist_name = name.replace('-', "_");
        std::fs::create_dir_all(dest_dir).unwrap();
        let path = dest_dir.join(format!("{dist_name}-22.1.0-py3-none-any.whl"));
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        zip.start_file(
            format!("{dist_name}-22.1.0.dist-info/METADATA"),
            SimpleFileOptions::default(),
        )
        .unwrap();
        write!(
            zip,
            "Metadata-Version: 2.1\nName: {name}\nVersion: 22.1.0\nRequires-Dist: colorama\n"
        )
        .unwrap();
        zip.finish().unwrap();
        Ok(path)
    }
}

/// A pure-Python wheel stored in `dir`, with its digest.
fn local_wheel(dir: &Path, name: &str, version: &str, deps: &[&str]) -> PackageCandidate {
    let filename = format!("{name}-{version}-py3-none-any.whl");
    let path = dir.join(&filename);
    std::fs::write(&path, format!("{name} {version}")).unwrap();
    PackageCandidate::from_file(DistributionFile {
        filename,
        location: FileLocation::Path(path.clone()),
        sha256: Some(wheelhouse_util::hash::sha256_file(&path).unwrap()),
    })
    .unwrap()
    .with_requirements(deps.iter().map(|d| d.parse::<Requirement>().unwrap()).collect())
}

fn index(dir: &Path) -> Arc<StaticIndex> {
    Arc::new(
        StaticIndex::new()
            .with(local_wheel(dir, "colorama", "0.4.6", &[]))
            .with(local_wheel(dir, "six", "1.16.0", &["internal_helper"]))
            .with(local_wheel(dir, "internal_helper", "0.1", &[])),
    )
}

fn config(cache: &Path, extra: &str) -> ClosureConfig {
    ClosureConfig::parse_toml(&format!(
        r#"
platforms = ["x86_64-linux", "x86_64-windows"]
requirements = ["six"]
cache_dir = '{}'
{extra}

[wheels]
e3-core = "https://github.com/AdaCore/e3-core.git#main"
"#,
        cache.display()
    ))
    .unwrap()
}

#[tokio::test]
async fn builds_closure_and_frozen_file() {
    let files = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let checkout = FakeCheckout::default();

    let summary = build_closure(
        &config(cache.path(), ""),
        target.path(),
        &ClosureOptions::default(),
        &checkout,
        &FakeBuilder,
        index(files.path()),
    )
    .await
    .unwrap();

    assert_eq!(summary.target_count, 2);
    assert_eq!(summary.pinned, 4);
    assert_eq!(summary.files.len(), 4);
    assert_eq!(
        checkout.calls(),
        [(
            "https://github.com/AdaCore/e3-core.git".to_string(),
            "main".to_string(),
            CheckoutKind::Git
        )]
    );
    assert!(cache.path().join("vcs/e3-core/NAME").is_file());
    assert!(cache.path().join("wheels/e3_core-22.1.0-py3-none-any.whl").is_file());
    for name in [
        "colorama-0.4.6-py3-none-any.whl",
        "e3_core-22.1.0-py3-none-any.whl",
        "six-1.16.0-py3-none-any.whl",
        "internal_helper-0.1-py3-none-any.whl",
    ] {
        assert!(target.path().join(name).is_file(), "missing {name}");
    }

    let frozen = std::fs::read_to_string(target.path().join("requirements.txt")).unwrap();
    assert_eq!(
        frozen,
        "colorama==0.4.6\ne3-core==22.1.0\ninternal-helper==0.1\nsix==1.16.0\n"
    );
}

#[tokio::test]
async fn discard_pattern_filters_outputs() {
    let files = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let config = config(
        cache.path(),
        r#"discard_from_closure = "internal-.*"
frozen_requirement_file = "frozen.txt""#,
    );

    let summary = build_closure(
        &config,
        target.path(),
        &ClosureOptions::default(),
        &FakeCheckout::default(),
        &FakeBuilder,
        index(files.path()),
    )
    .await
    .unwrap();

    assert_eq!(summary.frozen_file, target.path().join("frozen.txt"));
    let frozen = std::fs::read_to_string(&summary.frozen_file).unwrap();
    assert!(!frozen.contains("internal"));
    assert!(!target.path().join("internal_helper-0.1-py3-none-any.whl").exists());
}

#[tokio::test]
async fn unsatisfiable_closure_writes_nothing() {
    let files = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let config = ClosureConfig::parse_toml(&format!(
        r#"
platforms = ["x86_64-linux"]
requirements = ["six>=2"]
cache_dir = '{}'
"#,
        cache.path().display()
    ))
    .unwrap();

    let err = build_closure(
        &config,
        target.path(),
        &ClosureOptions::default(),
        &FakeCheckout::default(),
        &FakeBuilder,
        index(files.path()),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("six"));
    assert!(!target.path().join("requirements.txt").exists());
}

#[tokio::test]
async fn skip_files_only_writes_frozen_file() {
    let files = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let summary = build_closure(
        &config(cache.path(), ""),
        target.path(),
        &ClosureOptions {
            verbose: true,
            skip_files: true,
            ..ClosureOptions::default()
        },
        &FakeCheckout::default(),
        &FakeBuilder,
        index(files.path()),
    )
    .await
    .unwrap();

    assert!(summary.files.is_empty());
    let entries = std::fs::read_dir(target.path()).unwrap().count();
    assert_eq!(entries, 1);
}

async fn build_into(
    target: &Path,
    config: &ClosureConfig,
    opts: &ClosureOptions,
    checkout: &FakeCheckout,
    files: &Path,
) -> usize {
    build_closure(config, target, opts, checkout, &FakeBuilder, index(files))
        .await
        .unwrap()
        .pinned
}

#[tokio::test]
async fn skip_repo_updates_reuses_cached_checkout() {
    let files = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let config = config(cache.path(), "");

    let first = FakeCheckout::default();
    build_into(target.path(), &config, &ClosureOptions::default(), &first, files.path()).await;
    assert_eq!(first.calls().len(), 1);

    let second = FakeCheckout::default();
    let opts = ClosureOptions {
        skip_repo_updates: true,
        ..ClosureOptions::default()
    };
    let pinned = build_into(target.path(), &config, &opts, &second, files.path()).await;
    assert!(second.calls().is_empty());
    assert_eq!(pinned, 4);
}

#[tokio::test]
async fn skip_repo_updates_still_clones_missing_checkout() {
    let files = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let checkout = FakeCheckout::default();
    let opts = ClosureOptions {
        skip_repo_updates: true,
        ..ClosureOptions::default()
    };

    build_into(target.path(), &config(cache.path(), ""), &opts, &checkout, files.path()).await;
    assert_eq!(checkout.calls().len(), 1);
    assert_eq!(checkout.calls()[0].2, CheckoutKind::Git);
}

#[tokio::test]
async fn local_clones_replace_remote_urls() {
    let files = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let clones = tempfile::tempdir().unwrap();
    let checkout = FakeCheckout::default();
    let opts = ClosureOptions {
        local_clones: Some(clones.path().to_path_buf()),
        skip_repo_updates: true,
        ..ClosureOptions::default()
    };

    build_into(target.path(), &config(cache.path(), ""), &opts, &checkout, files.path()).await;
    let expected = clones.path().join("e3-core.git").to_string_lossy().into_owned();
    assert_eq!(
        checkout.calls(),
        [(expected, "main".to_string(), CheckoutKind::LocalClone)]
    );
    assert!(cache.path().join("vcs/e3-core/NAME").is_file());
}

#[tokio::test]
async fn trees_render_per_target() {
    let files = tempfile::tempdir().unwrap();
    let mut resolver = ClosureResolver::new(index(files.path()));
    resolver.add_requirement_str("six").unwrap();
    let targets = config(files.path(), "").targets().unwrap();
    let closure = resolver.resolve(&targets).await.unwrap();

    let trees = render_trees(closure, &TreeOptions::default());
    assert!(trees.contains(
        "x86_64-linux-py3.10\n└── six==1.16.0\n    └── internal-helper==0.1\n"
    ));
    assert!(trees.contains("x86_64-windows-py3.10"));

    let why = render_trees(
        closure,
        &TreeOptions {
            why: Some("internal_helper".into()),
            ..TreeOptions::default()
        },
    );
    assert!(why.contains(
        "x86_64-linux-py3.10: path to internal_helper\n  six==1.16.0\n    internal-helper==0.1\n"
    ));

    let inverted = render_trees(
        closure,
        &TreeOptions {
            why: Some("six".into()),
            inverted: true,
            ..TreeOptions::default()
        },
    );
    assert!(inverted.contains("six==1.16.0\n└── x86_64-linux-py3.10\n"));

    let missing = render_trees(
        closure,
        &TreeOptions {
            why: Some("numpy".into()),
            ..TreeOptions::default()
        },
    );
    assert!(missing.contains("`numpy` is not in the closure"));
}

#[tokio::test]
async fn offline_index_without_cache_reports_lookup_failure() {
    let cache = tempfile::tempdir().unwrap();
    let config = ClosureConfig::parse_toml(&format!(
        r#"
platforms = ["x86_64-linux"]
offline = true
cache_dir = '{}'
"#,
        cache.path().display()
    ))
    .unwrap();
    let target = config.targets().unwrap()[0];

    let index = open_index(&config).unwrap();
    let err = index
        .query(&PackageName::new("six"), &target)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("six"));
}
