//! Operation: build a wheel closure into a target directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use wheelhouse_core::config::ClosureConfig;
use wheelhouse_core::frozen::FrozenRequirements;
use wheelhouse_core::FileLocation;
use wheelhouse_index::pypi::PypiIndex;
use wheelhouse_index::wheel::LocalWheel;
use wheelhouse_index::{download, PackageIndex};
use wheelhouse_resolver::conflict::ReselectionReport;
use wheelhouse_resolver::ClosureResolver;
use wheelhouse_util::errors::WheelhouseError;
use wheelhouse_util::progress::{spinner, status, status_warn};

use crate::collaborators::{CheckoutKind, SourceCheckout, WheelBuilder};

/// Options for [`build_closure`].
#[derive(Debug, Default, Clone)]
pub struct ClosureOptions {
    /// Print re-selections made during resolution.
    pub verbose: bool,
    /// Resolve and write the frozen file, but do not copy distribution files.
    pub skip_files: bool,
    /// Build from the checkouts already in the cache without updating them.
    pub skip_repo_updates: bool,
    /// Check wheel sources out of `<dir>/<last url segment>` instead of
    /// their remote URL.
    pub local_clones: Option<PathBuf>,
}

/// What [`build_closure`] produced.
#[derive(Debug)]
pub struct ClosureSummary {
    pub target_count: usize,
    /// Distinct pinned `name==version` entries written to the frozen file.
    pub pinned: usize,
    pub files: Vec<PathBuf>,
    pub frozen_file: PathBuf,
    pub reselections: ReselectionReport,
}

/// The PyPI index described by `config`.
pub fn open_index(config: &ClosureConfig) -> miette::Result<Arc<dyn PackageIndex>> {
    let index = PypiIndex::new(&config.index_url, &config.cache_dir, config.offline)?;
    Ok(Arc::new(index))
}

/// Build the configured wheels, resolve the closure on every configured
/// platform, place every distribution file in `target_dir` and write the
/// frozen requirement file next to them.
pub async fn build_closure(
    config: &ClosureConfig,
    target_dir: &Path,
    opts: &ClosureOptions,
    checkout: &dyn SourceCheckout,
    builder: &dyn WheelBuilder,
    index: Arc<dyn PackageIndex>,
) -> miette::Result<ClosureSummary> {
    let targets = config.targets()?;
    let mut resolver = ClosureResolver::new(index);
    if let Some(pattern) = config.discard_pattern()? {
        resolver.set_discard_pattern(pattern);
    }

    let vcs_dir = config.vcs_cache_dir();
    let wheel_dir = config.wheel_cache_dir();
    wheelhouse_util::fs::ensure_dir(&vcs_dir).map_err(WheelhouseError::Io)?;
    wheelhouse_util::fs::ensure_dir(&wheel_dir).map_err(WheelhouseError::Io)?;

    for source in config.wheel_sources() {
        let checkout_dir = vcs_dir.join(source.name.as_str());
        let sp = spinner(&format!("Fetching {} sources...", source.name));
        let project_dir = match &opts.local_clones {
            Some(clones) => checkout.checkout(
                &source.in_local_clones(clones),
                CheckoutKind::LocalClone,
                &checkout_dir,
            )?,
            None if opts.skip_repo_updates && checkout_dir.is_dir() => {
                tracing::info!("reusing checkout of {} in {}", source.name, checkout_dir.display());
                checkout_dir
            }
            None => {
                if opts.skip_repo_updates {
                    tracing::warn!("no checkout of {} in the cache yet, cloning", source.name);
                }
                checkout.checkout(&source, CheckoutKind::Git, &checkout_dir)?
            }
        };
        sp.set_message(format!("Building {}...", source.name));
        let wheel_path = builder.build(&project_dir, &wheel_dir)?;
        sp.finish_and_clear();

        let candidate = LocalWheel::open(&wheel_path)?;
        if candidate.name != source.name {
            status_warn(
                "Warning",
                &format!("{} built a wheel named {}", source.name, candidate.name),
            );
        }
        status("Built", &candidate.file.filename);
        resolver.add_local_candidate(candidate);
    }

    for requirement in config.toplevel_requirements()? {
        resolver.add_requirement(requirement);
    }

    let sp = spinner(&format!("Resolving closure for {} target(s)...", targets.len()));
    let resolved = resolver.resolve(&targets).await;
    sp.finish_and_clear();
    resolved?;

    let reselections = resolver.reselections().clone();
    if opts.verbose && !reselections.is_empty() {
        eprint!("{reselections}");
    }
    let pinned: Vec<_> = resolver.closure_as_requirements().collect();
    status(
        "Resolved",
        &format!("{} package(s) on {} target(s)", pinned.len(), targets.len()),
    );
    tracing::debug!("lookup cache: {:?}", resolver.cache_stats());

    wheelhouse_util::fs::ensure_dir(target_dir).map_err(WheelhouseError::Io)?;
    let mut files = Vec::new();
    if !opts.skip_files {
        let client = download::build_client()?;
        let sp = spinner("Collecting distribution files...");
        for file in resolver.file_closure() {
            sp.set_message(format!("Collecting {}...", file.filename));
            if config.offline && matches!(file.location, FileLocation::Url(_)) {
                let existing = target_dir.join(&file.filename);
                if existing.is_file() {
                    files.push(existing);
                    continue;
                }
                return Err(WheelhouseError::Network {
                    message: format!("{} is not available offline", file.filename),
                }
                .into());
            }
            files.push(download::fetch_file(&client, file, target_dir).await?);
        }
        sp.finish_and_clear();
        status("Collected", &format!("{} file(s) in {}", files.len(), target_dir.display()));
    }

    let frozen_file = target_dir.join(&config.frozen_requirement_file);
    FrozenRequirements::new(pinned.iter().cloned()).write_to(&frozen_file)?;
    status("Wrote", &frozen_file.display().to_string());

    Ok(ClosureSummary {
        target_count: targets.len(),
        pinned: pinned.len(),
        files,
        frozen_file,
        reselections,
    })
}
