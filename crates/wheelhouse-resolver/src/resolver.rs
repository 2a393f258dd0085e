//! Multi-target closure resolution.
//!
//! For every target a work list of package names is driven to a fixed point.
//! Each name keeps the demands made of it, tagged with who made them; its
//! constraint is the intersection and its extras the union over those
//! demands. A name is revisited when either changes, and a selection is
//! revised only when it stops satisfying the constraint. Revising a selection
//! withdraws every demand the old version made and rules that version out for
//! the name, so each name is revised at most once per candidate and the loop
//! terminates. A name that nothing satisfies is only an error if it is still
//! reachable from the top-level requirements once the loop settles.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use futures_util::future::try_join_all;
use regex::Regex;

use wheelhouse_core::marker::MarkerEnvironment;
use wheelhouse_core::{
    Constraint, DistributionFile, PackageCandidate, PackageName, Requirement, Target, Version,
};
use wheelhouse_index::PackageIndex;
use wheelhouse_util::errors::WheelhouseError;

use crate::cache::{CacheStats, LookupCache};
use crate::conflict::{Reselection, ReselectionReport};
use crate::graph::ClosureGraph;

/// A package chosen for one target.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub candidate: PackageCandidate,
    /// Extras requested of this package anywhere in the closure.
    pub extras: BTreeSet<String>,
    /// The intersected constraint the selection satisfies.
    pub constraint: Constraint,
    /// Selected from a local override rather than the index.
    pub local: bool,
    /// Requirements of the selection that apply on this target.
    pub dependencies: Vec<Requirement>,
}

impl ResolvedPackage {
    pub fn name(&self) -> &PackageName {
        &self.candidate.name
    }

    pub fn version(&self) -> &Version {
        &self.candidate.version
    }
}

/// The resolved closure of a single target.
#[derive(Debug, Clone)]
pub struct TargetClosure {
    pub target: Target,
    pub packages: BTreeMap<PackageName, ResolvedPackage>,
    pub graph: ClosureGraph,
}

impl TargetClosure {
    pub fn get(&self, name: &str) -> Option<&ResolvedPackage> {
        self.packages.get(wheelhouse_core::name::normalize(name).as_str())
    }

    pub fn version_of(&self, name: &str) -> Option<&Version> {
        self.get(name).map(ResolvedPackage::version)
    }

    pub fn packages(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Resolved closures keyed by target.
#[derive(Debug, Clone, Default)]
pub struct Closure {
    targets: BTreeMap<Target, TargetClosure>,
}

impl Closure {
    pub fn get(&self, target: &Target) -> Option<&TargetClosure> {
        self.targets.get(target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Target, &TargetClosure)> {
        self.targets.iter()
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.keys()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Computes dependency closures of a set of top-level requirements over
/// several targets.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use wheelhouse_index::PackageIndex;
/// # use wheelhouse_util::errors::WheelhouseError;
/// # async fn demo(index: Arc<dyn PackageIndex>) -> Result<(), WheelhouseError> {
/// use wheelhouse_core::{Platform, PythonVersion, Target};
/// use wheelhouse_resolver::resolver::ClosureResolver;
///
/// let mut resolver = ClosureResolver::new(index);
/// resolver.add_requirement_str("requests>=2.28")?;
/// let linux = Target::new(Platform::parse("x86_64-linux")?, PythonVersion::new(10));
/// resolver.resolve(&[linux]).await?;
/// for file in resolver.file_closure() {
///     println!("{}", file.filename);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ClosureResolver {
    cache: LookupCache,
    toplevel: Vec<Requirement>,
    local: BTreeMap<PackageName, PackageCandidate>,
    discard: Option<Regex>,
    closure: Option<Closure>,
    reselections: ReselectionReport,
}

impl ClosureResolver {
    pub fn new(index: Arc<dyn PackageIndex>) -> Self {
        Self {
            cache: LookupCache::new(index),
            toplevel: Vec::new(),
            local: BTreeMap::new(),
            discard: None,
            closure: None,
            reselections: ReselectionReport::new(),
        }
    }

    /// Register a locally built distribution. It is selected for its name on
    /// every target regardless of what the index offers. A later registration
    /// for the same name replaces an earlier one.
    pub fn add_local_candidate(&mut self, candidate: PackageCandidate) {
        tracing::debug!("local override {candidate}");
        self.local.insert(candidate.name.clone(), candidate);
    }

    pub fn add_requirement(&mut self, requirement: Requirement) {
        self.toplevel.push(requirement);
    }

    pub fn add_requirement_str(&mut self, requirement: &str) -> Result<(), WheelhouseError> {
        self.add_requirement(Requirement::parse(requirement)?);
        Ok(())
    }

    /// Leave packages whose normalized name matches `pattern` out of
    /// [`file_closure`](Self::file_closure) and
    /// [`closure_as_requirements`](Self::closure_as_requirements).
    /// Resolution itself still includes them.
    pub fn set_discard_pattern(&mut self, pattern: Regex) {
        self.discard = Some(pattern);
    }

    pub fn toplevel(&self) -> &[Requirement] {
        &self.toplevel
    }

    /// Resolve the top-level requirements on every target.
    ///
    /// Either every target resolves or an error is returned and no closure
    /// is kept.
    pub async fn resolve(&mut self, targets: &[Target]) -> Result<&Closure, WheelhouseError> {
        self.closure = None;
        self.reselections = ReselectionReport::new();

        let mut unique: Vec<Target> = targets.to_vec();
        unique.sort();
        unique.dedup();

        let results = {
            let this = &*self;
            try_join_all(unique.iter().map(|target| this.resolve_target(*target))).await?
        };

        let mut closure = Closure::default();
        for (target_closure, reselections) in results {
            tracing::info!(
                "resolved {} package(s) for {}",
                target_closure.len(),
                target_closure.target
            );
            self.reselections.extend(reselections);
            closure.targets.insert(target_closure.target, target_closure);
        }
        Ok(self.closure.insert(closure))
    }

    /// The last successfully resolved closure.
    pub fn closure(&self) -> Option<&Closure> {
        self.closure.as_ref()
    }

    pub fn reselections(&self) -> &ReselectionReport {
        &self.reselections
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn is_discarded(&self, name: &PackageName) -> bool {
        self.discard.as_ref().is_some_and(|re| re.is_match(name.as_str()))
    }

    fn kept_packages(&self) -> impl Iterator<Item = &ResolvedPackage> + '_ {
        self.closure
            .iter()
            .flat_map(|closure| closure.targets.values())
            .flat_map(|target| target.packages.values())
            .filter(move |pkg| !self.is_discarded(pkg.name()))
    }

    /// Distribution files of every selected package on every target, each
    /// filename once, discarded packages left out.
    pub fn file_closure(&self) -> impl Iterator<Item = &DistributionFile> + '_ {
        let mut seen = HashSet::new();
        self.kept_packages()
            .map(|pkg| &pkg.candidate.file)
            .filter(move |file| seen.insert(file.filename.clone()))
    }

    /// `name==version` for each distinct selected (name, version),
    /// discarded packages left out.
    pub fn closure_as_requirements(&self) -> impl Iterator<Item = Requirement> + '_ {
        let mut seen = HashSet::new();
        self.kept_packages()
            .filter(move |pkg| seen.insert((pkg.name().clone(), pkg.version().clone())))
            .map(|pkg| Requirement::pinned(pkg.name().clone(), pkg.version().clone()))
    }

    async fn resolve_target(
        &self,
        target: Target,
    ) -> Result<(TargetClosure, Vec<Reselection>), WheelhouseError> {
        let env = target.marker_environment();
        let mut state = TargetState::new(target);

        let none = BTreeSet::new();
        let toplevel: Vec<Requirement> = self
            .toplevel
            .iter()
            .filter(|r| r.applies_to(&env, &none))
            .cloned()
            .collect();
        state.replace_demands(&Demand::TopLevel, &toplevel);

        while let Some(name) = state.queue.pop_front() {
            state.queued.remove(&name);
            self.visit(&mut state, &env, &name).await?;
        }

        let closure = state.finish(&env)?;
        Ok((closure, state.reselections))
    }

    /// (Re)select `name` if needed, then publish its applicable requirements
    /// as its demands.
    async fn visit(
        &self,
        state: &mut TargetState,
        env: &MarkerEnvironment,
        name: &PackageName,
    ) -> Result<(), WheelhouseError> {
        let target = state.target;
        let Some(entry) = state.packages.get(name) else {
            return Ok(());
        };
        if entry.demands.is_empty() {
            return Ok(());
        }
        let still_valid = entry
            .selected
            .as_ref()
            .is_some_and(|sel| entry.constraint.contains(&sel.candidate.version));

        if !still_valid {
            let previous = state.deselect(name);
            let Some(selection) = self.choose(state, name).await? else {
                return Ok(());
            };
            let entry = state.entry(name);
            match previous {
                Some(from) => {
                    tracing::debug!(
                        "{name} on {target}: {from} no longer satisfies `{}`, selecting {}",
                        entry.constraint,
                        selection.candidate.version
                    );
                    let reselection = Reselection {
                        package: name.clone(),
                        target,
                        from,
                        to: selection.candidate.version.clone(),
                        constraint: entry.constraint.clone(),
                    };
                    entry.selected = Some(selection);
                    state.reselections.push(reselection);
                }
                None => {
                    tracing::trace!("{name} on {target}: selected {}", selection.candidate.version);
                    entry.selected = Some(selection);
                }
            }
        }

        let Some(entry) = state.packages.get(name) else {
            return Ok(());
        };
        let Some(selection) = &entry.selected else {
            return Ok(());
        };
        let source = Demand::Package(name.clone(), selection.candidate.version.clone());
        let applicable: Vec<Requirement> = selection
            .requirements
            .iter()
            .filter(|req| req.applies_to(env, &entry.extras))
            .cloned()
            .collect();
        state.replace_demands(&source, &applicable);
        Ok(())
    }

    /// The selection for `name` under its current demands, if any candidate
    /// fits. A local override is the only candidate for its name.
    async fn choose(
        &self,
        state: &TargetState,
        name: &PackageName,
    ) -> Result<Option<Selection>, WheelhouseError> {
        let target = state.target;
        let Some(entry) = state.packages.get(name) else {
            return Ok(None);
        };
        if entry.demands.is_empty() {
            return Ok(None);
        }

        if let Some(local) = self.local.get(name) {
            if !entry.constraint.contains(&local.version) {
                tracing::debug!(
                    "{name} on {target}: local {} does not satisfy `{}`",
                    local.version,
                    entry.constraint
                );
                return Ok(None);
            }
            return Ok(Some(Selection {
                candidate: local.clone(),
                requirements: local.requirements.clone(),
                local: true,
            }));
        }

        let candidates = self.cache.query(name, &target).await?;
        let Some(best) = select(&candidates, &entry.constraint, &target, &entry.ruled_out) else {
            tracing::debug!("{name} on {target}: nothing satisfies `{}` yet", entry.constraint);
            return Ok(None);
        };
        let requirements = self.cache.requirements(best).await?;
        Ok(Some(Selection {
            candidate: best.clone(),
            requirements: requirements.as_ref().clone(),
            local: false,
        }))
    }
}

/// Pick the preferred candidate satisfying `constraint`, skipping versions
/// already ruled out.
///
/// Pre-releases are considered only when the constraint names one or when
/// nothing else satisfies it.
fn select<'a>(
    candidates: &'a [PackageCandidate],
    constraint: &Constraint,
    target: &Target,
    ruled_out: &BTreeSet<Version>,
) -> Option<&'a PackageCandidate> {
    let matching: Vec<&PackageCandidate> = candidates
        .iter()
        .filter(|c| c.is_compatible(target) && constraint.contains(&c.version))
        .filter(|c| !ruled_out.contains(&c.version))
        .collect();
    let finals_only = !constraint.allows_prereleases()
        && matching.iter().any(|c| !c.version.is_prerelease());
    matching
        .into_iter()
        .filter(|c| !finals_only || !c.version.is_prerelease())
        .min_by(|a, b| a.preference(b))
}

/// Who asked for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Demand {
    TopLevel,
    Package(PackageName, Version),
}

impl std::fmt::Display for Demand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TopLevel => f.write_str("top-level"),
            Self::Package(name, version) => write!(f, "{name} {version}"),
        }
    }
}

/// One requirement placed on a package by `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DemandRecord {
    source: Demand,
    constraint: Constraint,
    extras: BTreeSet<String>,
}

impl DemandRecord {
    fn new(source: &Demand, req: &Requirement) -> Self {
        Self {
            source: source.clone(),
            constraint: req.constraint.clone(),
            extras: req.extras.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Selection {
    candidate: PackageCandidate,
    requirements: Vec<Requirement>,
    local: bool,
}

#[derive(Debug, Default)]
struct PackageEntry {
    constraint: Constraint,
    extras: BTreeSet<String>,
    demands: Vec<DemandRecord>,
    /// Versions given up after they stopped satisfying the constraint.
    ruled_out: BTreeSet<Version>,
    selected: Option<Selection>,
}

impl PackageEntry {
    /// Recompute constraint and extras from the live demands. Returns whether
    /// either changed.
    fn refresh(&mut self) -> bool {
        let constraint = self
            .demands
            .iter()
            .fold(Constraint::any(), |acc, d| acc.intersect(&d.constraint));
        let extras: BTreeSet<String> = self
            .demands
            .iter()
            .flat_map(|d| d.extras.iter().cloned())
            .collect();
        let changed = constraint != self.constraint || extras != self.extras;
        self.constraint = constraint;
        self.extras = extras;
        changed
    }
}

struct TargetState {
    target: Target,
    packages: BTreeMap<PackageName, PackageEntry>,
    queue: VecDeque<PackageName>,
    queued: HashSet<PackageName>,
    reselections: Vec<Reselection>,
}

impl TargetState {
    fn new(target: Target) -> Self {
        Self {
            target,
            packages: BTreeMap::new(),
            queue: VecDeque::new(),
            queued: HashSet::new(),
            reselections: Vec::new(),
        }
    }

    fn entry(&mut self, name: &PackageName) -> &mut PackageEntry {
        self.packages.entry(name.clone()).or_default()
    }

    fn enqueue(&mut self, name: &PackageName) {
        if self.queued.insert(name.clone()) {
            self.queue.push_back(name.clone());
        }
    }

    /// Make `requirements` the complete set of demands `source` places.
    fn replace_demands(&mut self, source: &Demand, requirements: &[Requirement]) {
        let wanted: Vec<(PackageName, DemandRecord)> = requirements
            .iter()
            .map(|req| (req.name.clone(), DemandRecord::new(source, req)))
            .collect();
        let mut touched = self.retain_demands(source, &wanted);
        for (name, record) in wanted {
            let entry = self.entry(&name);
            if !entry.demands.contains(&record) {
                entry.demands.push(record);
                touched.insert(name);
            }
        }
        self.settle(touched);
    }

    /// Remove the demands of `source` that are not in `keep`. Returns the
    /// names that lost a demand.
    fn retain_demands(
        &mut self,
        source: &Demand,
        keep: &[(PackageName, DemandRecord)],
    ) -> BTreeSet<PackageName> {
        let mut touched = BTreeSet::new();
        for (name, entry) in &mut self.packages {
            let before = entry.demands.len();
            entry
                .demands
                .retain(|d| &d.source != source || keep.iter().any(|(n, k)| n == name && k == d));
            if entry.demands.len() != before {
                touched.insert(name.clone());
            }
        }
        touched
    }

    /// Bring `touched` entries in line with their demands. A package left
    /// without demands loses its selection, and the demands that selection
    /// made are withdrawn in turn.
    fn settle(&mut self, mut touched: BTreeSet<PackageName>) {
        while let Some(name) = touched.pop_first() {
            let Some(entry) = self.packages.get_mut(&name) else {
                continue;
            };
            let changed = entry.refresh();
            if entry.demands.is_empty() {
                if let Some(orphan) = entry.selected.take() {
                    tracing::trace!("{name} on {}: no longer required", self.target);
                    let source = Demand::Package(name.clone(), orphan.candidate.version);
                    touched.extend(self.retain_demands(&source, &[]));
                }
                continue;
            }
            if changed || entry.selected.is_none() {
                self.enqueue(&name);
            }
        }
    }

    /// Drop the selection of `name`, rule its version out and withdraw its
    /// demands. Returns the dropped version.
    fn deselect(&mut self, name: &PackageName) -> Option<Version> {
        let entry = self.packages.get_mut(name)?;
        let previous = entry.selected.take()?;
        let version = previous.candidate.version;
        entry.ruled_out.insert(version.clone());
        let touched = self.retain_demands(&Demand::Package(name.clone(), version.clone()), &[]);
        self.settle(touched);
        Some(version)
    }

    /// A demand counts while its source is reached and still selected at the
    /// version that made it.
    fn is_live(&self, source: &Demand, reached: &BTreeSet<PackageName>) -> bool {
        match source {
            Demand::TopLevel => true,
            Demand::Package(name, version) => {
                reached.contains(name)
                    && self
                        .packages
                        .get(name)
                        .and_then(|e| e.selected.as_ref())
                        .is_some_and(|s| &s.candidate.version == version)
            }
        }
    }

    /// Extras requested of each package by live demands.
    fn live_extras(
        &self,
        reached: &BTreeSet<PackageName>,
    ) -> BTreeMap<PackageName, BTreeSet<String>> {
        self.packages
            .iter()
            .map(|(name, entry)| {
                let extras: BTreeSet<String> = entry
                    .demands
                    .iter()
                    .filter(|d| self.is_live(&d.source, reached))
                    .flat_map(|d| d.extras.iter().cloned())
                    .collect();
                (name.clone(), extras)
            })
            .collect()
    }

    fn roots(&self) -> Vec<PackageName> {
        self.packages
            .iter()
            .filter(|(_, e)| e.demands.iter().any(|d| d.source == Demand::TopLevel))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names reachable from the top-level requirements through the current
    /// selections, with markers evaluated against `extras`.
    fn reach(
        &self,
        env: &MarkerEnvironment,
        extras: &BTreeMap<PackageName, BTreeSet<String>>,
    ) -> BTreeSet<PackageName> {
        let none = BTreeSet::new();
        let mut reached: BTreeSet<PackageName> = self.roots().into_iter().collect();
        let mut queue: VecDeque<PackageName> = reached.iter().cloned().collect();
        while let Some(name) = queue.pop_front() {
            let Some(selection) = self.packages.get(&name).and_then(|e| e.selected.as_ref()) else {
                continue;
            };
            let requested = extras.get(&name).unwrap_or(&none);
            for dep in selection.requirements.iter().filter(|r| r.applies_to(env, requested)) {
                if reached.insert(dep.name.clone()) {
                    queue.push_back(dep.name.clone());
                }
            }
        }
        reached
    }

    fn unsatisfiable(
        &self,
        name: &PackageName,
        reached: &BTreeSet<PackageName>,
    ) -> WheelhouseError {
        let (constraint, sources) = match self.packages.get(name) {
            Some(entry) => (
                entry.constraint.clone(),
                entry
                    .demands
                    .iter()
                    .filter(|d| self.is_live(&d.source, reached))
                    .map(|d| {
                        if d.constraint.is_any() {
                            d.source.to_string()
                        } else {
                            format!("{} ({})", d.source, d.constraint)
                        }
                    })
                    .collect(),
            ),
            None => (Constraint::any(), Vec::new()),
        };
        WheelhouseError::UnsatisfiableConstraint {
            package: name.to_string(),
            target: self.target.to_string(),
            constraint: if constraint.is_any() {
                "any version".to_string()
            } else {
                constraint.to_string()
            },
            sources,
        }
    }

    /// Keep what the top-level requirements reach through the final
    /// selections, fail on a reached package without one, and build the
    /// graph.
    ///
    /// Reachability and the extras in force depend on each other: start from
    /// every known package and shrink both until neither changes.
    fn finish(&self, env: &MarkerEnvironment) -> Result<TargetClosure, WheelhouseError> {
        let mut reached: BTreeSet<PackageName> = self.packages.keys().cloned().collect();
        let extras = loop {
            let extras = self.live_extras(&reached);
            let next: BTreeSet<PackageName> =
                self.reach(env, &extras).intersection(&reached).cloned().collect();
            if next == reached {
                break extras;
            }
            reached = next;
        };

        let none = BTreeSet::new();
        let mut packages = BTreeMap::new();
        for name in &reached {
            let Some(entry) = self.packages.get(name) else {
                continue;
            };
            let Some(selection) = &entry.selected else {
                return Err(self.unsatisfiable(name, &reached));
            };
            let requested = extras.get(name).unwrap_or(&none);
            let dependencies: Vec<Requirement> = selection
                .requirements
                .iter()
                .filter(|r| r.applies_to(env, requested))
                .cloned()
                .collect();
            packages.insert(
                name.clone(),
                ResolvedPackage {
                    candidate: selection.candidate.clone(),
                    extras: requested.clone(),
                    constraint: entry.constraint.clone(),
                    local: selection.local,
                    dependencies,
                },
            );
        }

        let mut graph = ClosureGraph::new(self.target.to_string());
        for pkg in packages.values() {
            graph.add_package(pkg.name(), pkg.version());
        }
        let root = graph.root();
        for name in self.roots() {
            if let Some(idx) = graph.find(name.as_str()) {
                graph.add_edge(root, idx);
            }
        }
        for pkg in packages.values() {
            let Some(from) = graph.find(pkg.name().as_str()) else {
                continue;
            };
            for dep in &pkg.dependencies {
                if let Some(to) = graph.find(dep.name.as_str()) {
                    graph.add_edge(from, to);
                }
            }
        }

        let dropped = self.packages.len() - packages.len();
        if dropped > 0 {
            tracing::debug!("{}: dropped {dropped} unreachable package(s)", self.target);
        }

        Ok(TargetClosure {
            target: self.target,
            packages,
            graph,
        })
    }
}
