//! The module loader: tracks loaded units and drives their lifecycle.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::registry::SharedRegistry;

use super::error::LoadError;
use super::event::{EventBus, LoaderEvent, Priority};
use super::namespace::Namespace;
use super::project::{PackageRoot, ProjectKind, ProjectLayout};
use super::restart::{ExecRestarter, Restarter};
use super::runner::{RunnerProducer, UnitRunner};

/// How a project change is brought back in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadPolicy {
    /// Unload and re-execute only what changed.
    Incremental,
    /// Restart the whole host process once a project has been loaded.
    Full,
}

/// What kind of unit a tracked entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Single,
    /// The root-marker unit of a package.
    PackageRoot,
}

/// One currently-loaded code unit. Created on successful load, removed
/// on unload; a unit that failed to load is simply absent.
#[derive(Debug, Clone)]
pub struct TrackedUnit {
    pub source_path: PathBuf,
    pub namespace_name: String,
    pub kind: UnitKind,
    pub loaded_at: SystemTime,
}

/// Result of loading one unit. Execution failures are isolated here
/// rather than propagated, so a broken file never stops a package load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    /// Already tracked (or already bound transitively) and not forced.
    Skipped,
    /// Flat package directory: nothing to execute for the root itself.
    NoRootUnit,
    /// The unit's top-level code failed; a diagnostic was emitted and no
    /// tracked state survives.
    Failed,
}

/// Tally of a package-wide load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl LoadSummary {
    fn record(&mut self, status: LoadStatus) {
        match status {
            LoadStatus::Loaded => self.loaded += 1,
            LoadStatus::Skipped | LoadStatus::NoRootUnit => self.skipped += 1,
            LoadStatus::Failed => self.failed += 1,
        }
    }
}

/// Loads, unloads and reloads units, tracking the path -> namespace-name
/// mapping. Sole mutator of the process-wide [`Namespace`].
pub struct ModuleLoader {
    layout: ProjectLayout,
    runner: UnitRunner,
    registry: SharedRegistry,
    namespace: Namespace,
    tracked: BTreeMap<PathBuf, TrackedUnit>,
    /// Names brought in transitively by unit execution; evicted wholesale
    /// on `unload_all` so a full reload re-executes them.
    extra_bound: BTreeSet<String>,
    events: EventBus,
    restarter: Box<dyn Restarter>,
    last_loaded: Option<PathBuf>,
}

impl ModuleLoader {
    pub fn new(layout: ProjectLayout, runner: UnitRunner, registry: SharedRegistry) -> Self {
        let restarter: Box<dyn Restarter> = match ExecRestarter::from_current_process() {
            Ok(restarter) => Box::new(restarter),
            Err(e) => {
                tracing::warn!("[loader] cannot capture process image for hard reload: {e}");
                Box::new(FailingRestarter)
            }
        };
        Self {
            layout,
            runner,
            registry,
            namespace: Namespace::new(),
            tracked: BTreeMap::new(),
            extra_bound: BTreeSet::new(),
            events: EventBus::new(),
            restarter,
            last_loaded: None,
        }
    }

    /// Replace the hard-reload side effect (tests use a recording double).
    pub fn set_restarter(&mut self, restarter: Box<dyn Restarter>) {
        self.restarter = restarter;
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&mut self, priority: Priority, callback: impl FnMut(&LoaderEvent) + 'static) {
        self.events.subscribe(priority, callback);
    }

    pub fn resolve_project_kind(&self, path: &Path) -> ProjectKind {
        self.layout.resolve_kind(path)
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.lookup_tracked(path).is_some()
    }

    pub fn tracked_unit(&self, path: &Path) -> Option<&TrackedUnit> {
        self.lookup_tracked(path)
            .and_then(|key| self.tracked.get(&key))
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Whether any project has been loaded during this process lifetime.
    pub fn has_loaded_project(&self) -> bool {
        self.last_loaded.is_some()
    }

    fn lookup_tracked(&self, path: &Path) -> Option<PathBuf> {
        if self.tracked.contains_key(path) {
            return Some(path.to_path_buf());
        }
        let canonical = path.canonicalize().ok()?;
        self.tracked
            .contains_key(&canonical)
            .then_some(canonical)
    }

    /// Load one unit.
    ///
    /// Packages given as a directory resolve to their root unit; a flat
    /// package directory has none. Execution failures are isolated: the
    /// diagnostic is logged, partial state is unloaded, and
    /// [`LoadStatus::Failed`] is returned.
    pub fn load(&mut self, path: &Path, force_reload: bool) -> LoadStatus {
        let path = if path.is_dir() {
            match self.layout.package_root(path) {
                Some(PackageRoot::Marker(marker)) => marker,
                _ => {
                    crate::log_event!(
                        "loader",
                        "resolved as flat (no root unit)",
                        "{}",
                        path.display()
                    );
                    return LoadStatus::NoRootUnit;
                }
            }
        } else {
            path.to_path_buf()
        };

        let path = match path.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("[loader] cannot resolve '{}': {e}", path.display());
                return LoadStatus::Failed;
            }
        };
        let module = self.layout.module_name(&path);
        let kind = if self.layout.is_root_marker(&path) {
            UnitKind::PackageRoot
        } else {
            UnitKind::Single
        };

        if self.tracked.contains_key(&path) {
            if !force_reload {
                return LoadStatus::Skipped;
            }
            self.unload(&path);
        } else if !force_reload && self.extra_bound.contains(&module) {
            // Execution already happened as a side effect of another load
            crate::debug_event!("loader", "already loaded, skipping", "{module}");
            self.namespace.bind(module.clone(), path.clone());
            self.extra_bound.remove(&module);
            self.tracked.insert(
                path.clone(),
                TrackedUnit {
                    source_path: path,
                    namespace_name: module,
                    kind,
                    loaded_at: SystemTime::now(),
                },
            );
            return LoadStatus::Skipped;
        }

        crate::log_event!("loader", "loading", "{module}");
        if let Some(prior) = self.namespace.bind(module.clone(), path.clone()) {
            if prior != path {
                crate::debug_event!("loader", "superseded binding", "{module}");
            }
        }

        match self.runner.execute_load(&path, &module) {
            Ok(outcome) => {
                for name in outcome.bindings {
                    if !self.namespace.contains(&name) {
                        self.namespace.bind(name.clone(), path.clone());
                        self.extra_bound.insert(name);
                    }
                }

                let mut registered = 0usize;
                for registration in outcome.registrations {
                    let key = match &registration.name {
                        Some(name) => format!("{module}.{}:{name}", registration.symbol),
                        None => format!("{module}.{}", registration.symbol),
                    };
                    let producer = RunnerProducer::new(
                        self.runner.clone(),
                        path.clone(),
                        module.clone(),
                        key.clone(),
                    );
                    let result = self.registry.write().add(
                        key,
                        &path,
                        Box::new(producer),
                        registration.group,
                        registration.window,
                    );
                    match result {
                        Ok(()) => registered += 1,
                        Err(e) => {
                            tracing::warn!("[loader] registration from '{module}' rejected: {e}");
                        }
                    }
                }

                self.tracked.insert(
                    path.clone(),
                    TrackedUnit {
                        source_path: path.clone(),
                        namespace_name: module.clone(),
                        kind,
                        loaded_at: SystemTime::now(),
                    },
                );
                crate::debug_event!("loader", "loaded", "{module} ({registered} previews)");
                self.events.emit(&LoaderEvent::UnitLoaded(path));
                LoadStatus::Loaded
            }
            Err(e) => {
                tracing::error!("[loader] can't load unit '{module}': {e}");
                // No partial state survives a failed load: the unit was
                // bound before execution and is not tracked, so the
                // binding must be evicted here
                self.namespace.unbind(&module);
                self.unload(&path);
                LoadStatus::Failed
            }
        }
    }

    /// Load whatever `path` denotes: the whole package (root unit first,
    /// then every source file under it) or a single unit.
    pub fn load_any(&mut self, path: &Path) -> Result<LoadSummary, LoadError> {
        let mut summary = LoadSummary::default();

        match self.layout.resolve_kind(path) {
            ProjectKind::Invalid => {
                return Err(LoadError::InvalidProject {
                    path: path.to_path_buf(),
                });
            }
            ProjectKind::Single => {
                summary.record(self.load(path, false));
            }
            ProjectKind::Package => {
                let root = self
                    .layout
                    .package_root(path)
                    .ok_or_else(|| LoadError::NoPackageRoot {
                        path: path.to_path_buf(),
                    })?;

                let root_file = match &root {
                    PackageRoot::Marker(marker) => {
                        summary.record(self.load(marker, false));
                        Some(marker.canonicalize().unwrap_or_else(|_| marker.clone()))
                    }
                    PackageRoot::Flat(dir) => {
                        crate::log_event!(
                            "loader",
                            "resolved as flat (no root unit)",
                            "{}",
                            dir.display()
                        );
                        None
                    }
                };

                for entry in WalkDir::new(root.dir())
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                {
                    let candidate = entry.path();
                    if !entry.file_type().is_file() || !self.layout.is_source_file(candidate) {
                        continue;
                    }
                    let canonical = candidate
                        .canonicalize()
                        .unwrap_or_else(|_| candidate.to_path_buf());
                    if Some(&canonical) == root_file.as_ref() {
                        continue;
                    }
                    summary.record(self.load(candidate, false));
                }
            }
        }

        Ok(summary)
    }

    /// Remove the tracked unit for `path`, evict its namespace binding,
    /// and emit `UnitUnloaded`. The event fires even for untracked paths
    /// so dependent purges are unconditional.
    pub fn unload(&mut self, path: &Path) {
        let key = self.lookup_tracked(path);
        if let Some(key) = key {
            if let Some(unit) = self.tracked.remove(&key) {
                self.namespace.unbind(&unit.namespace_name);
                crate::log_event!("loader", "unloaded", "{}", unit.namespace_name);
            }
        }
        self.events.emit(&LoaderEvent::UnitUnloaded(path.to_path_buf()));
    }

    /// Unload every tracked unit and evict transitive bindings, so a
    /// later full reload re-executes them instead of reusing stale state.
    pub fn unload_all(&mut self) {
        let paths: Vec<PathBuf> = self.tracked.keys().cloned().collect();
        for path in paths {
            self.unload(&path);
        }
        for name in std::mem::take(&mut self.extra_bound) {
            self.namespace.unbind(&name);
        }
    }

    /// Bring the whole project back in sync.
    ///
    /// With [`ReloadPolicy::Full`] and a previously loaded project this
    /// restarts the host process instead of reloading incrementally;
    /// otherwise it unloads everything and loads `path` afresh.
    pub fn reload_all(&mut self, path: &Path, policy: ReloadPolicy) -> Result<LoadSummary, LoadError> {
        self.events
            .emit(&LoaderEvent::ReloadStarted(path.to_path_buf()));

        if policy == ReloadPolicy::Full && self.last_loaded.is_some() {
            return match self.restarter.restart() {
                // Only reachable with a substituted restarter; the real
                // one replaces the process image
                Ok(()) => Ok(LoadSummary::default()),
                Err(source) => Err(LoadError::Restart { source }),
            };
        }

        self.unload_all();
        let summary = self.load_any(path)?;
        self.last_loaded = Some(path.to_path_buf());
        self.events.emit(&LoaderEvent::ReloadEnded(path.to_path_buf()));
        crate::log_event!(
            "loader",
            "reloaded",
            "{} loaded, {} failed",
            summary.loaded,
            summary.failed
        );
        Ok(summary)
    }
}

/// Used when the current process image cannot be captured; hard reload
/// then degrades to an error instead of a restart.
struct FailingRestarter;

impl Restarter for FailingRestarter {
    fn restart(&mut self) -> Result<(), std::io::Error> {
        Err(std::io::Error::other(
            "process image unavailable, hard reload disabled",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::registry::PreviewRegistry;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn make_loader(registry: SharedRegistry) -> ModuleLoader {
        ModuleLoader::new(
            ProjectLayout::from_config(&ProjectConfig::default()),
            UnitRunner::new(vec!["/bin/sh".to_string()]),
            registry,
        )
    }

    fn registering_unit(dir: &std::path::Path, name: &str, symbol: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(
            &path,
            format!("echo '{{\"register\": {{\"symbol\": \"{symbol}\"}}}}'\n"),
        )
        .unwrap();
        path
    }

    struct RecordingRestarter(Arc<AtomicUsize>);

    impl Restarter for RecordingRestarter {
        fn restart(&mut self) -> Result<(), std::io::Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_load_tracks_unit_and_registers_previews() {
        let temp = TempDir::new().unwrap();
        let unit = registering_unit(temp.path(), "a.pv", "x");
        let registry = PreviewRegistry::new("pv").into_shared();
        let mut loader = make_loader(registry.clone());

        let events = Rc::new(RefCell::new(Vec::new()));
        let seen = events.clone();
        loader.subscribe(Priority::Normal, move |e| seen.borrow_mut().push(e.clone()));

        assert_eq!(loader.load(&unit, false), LoadStatus::Loaded);
        assert!(loader.is_tracked(&unit));
        assert_eq!(registry.read().list_keys(None), vec!["a.x".to_string()]);

        let canonical = unit.canonicalize().unwrap();
        assert_eq!(*events.borrow(), vec![LoaderEvent::UnitLoaded(canonical)]);
    }

    #[test]
    fn test_load_skips_tracked_unless_forced() {
        let temp = TempDir::new().unwrap();
        let unit = registering_unit(temp.path(), "a.pv", "x");
        let registry = PreviewRegistry::new("pv").into_shared();
        let mut loader = make_loader(registry.clone());

        assert_eq!(loader.load(&unit, false), LoadStatus::Loaded);
        assert_eq!(loader.load(&unit, false), LoadStatus::Skipped);
        assert_eq!(loader.load(&unit, true), LoadStatus::Loaded);
        assert_eq!(loader.tracked_count(), 1);
        assert_eq!(registry.read().len(), 1);
    }

    #[test]
    fn test_failed_unit_leaves_no_state_behind() {
        let temp = TempDir::new().unwrap();
        let unit = temp.path().join("broken.pv");
        fs::write(&unit, "echo 'oops' >&2\nexit 1\n").unwrap();
        let registry = PreviewRegistry::new("pv").into_shared();
        let mut loader = make_loader(registry.clone());

        let unloads = Rc::new(RefCell::new(0usize));
        let seen = unloads.clone();
        loader.subscribe(Priority::Normal, move |e| {
            if matches!(e, LoaderEvent::UnitUnloaded(_)) {
                *seen.borrow_mut() += 1;
            }
        });

        assert_eq!(loader.load(&unit, false), LoadStatus::Failed);
        assert!(!loader.is_tracked(&unit));
        assert!(registry.read().is_empty());
        assert_eq!(*unloads.borrow(), 1);
        // The pre-execution binding is evicted too
        assert!(!loader.namespace.contains("broken"));
        assert!(loader.namespace.is_empty());
    }

    #[test]
    fn test_failed_unit_can_still_be_bound_transitively_later() {
        let temp = TempDir::new().unwrap();
        let unit = temp.path().join("helper.pv");
        fs::write(&unit, "exit 1\n").unwrap();
        let registry = PreviewRegistry::new("pv").into_shared();
        let mut loader = make_loader(registry);

        assert_eq!(loader.load(&unit, false), LoadStatus::Failed);

        // A sibling that claims to have executed helper itself; the
        // failed attempt must not shadow the transitive binding
        let root = temp.path().join("main.pv");
        fs::write(&root, "echo '{\"bind\": \"helper\"}'\n").unwrap();
        assert_eq!(loader.load(&root, false), LoadStatus::Loaded);
        assert!(loader.namespace.contains("helper"));

        loader.unload_all();
        assert!(loader.namespace.is_empty());
    }

    #[test]
    fn test_load_any_package_executes_root_first() {
        let temp = TempDir::new().unwrap();
        let proj = temp.path().join("proj");
        fs::create_dir(&proj).unwrap();
        registering_unit(&proj, "__root__.pv", "banner");
        registering_unit(&proj, "a.pv", "x");
        registering_unit(&proj, "b.pv", "y");

        let registry = PreviewRegistry::new("pv").into_shared();
        let mut loader = make_loader(registry.clone());

        let order = Rc::new(RefCell::new(Vec::new()));
        let seen = order.clone();
        loader.subscribe(Priority::Normal, move |e| {
            if let LoaderEvent::UnitLoaded(path) = e {
                seen.borrow_mut().push(path.clone());
            }
        });

        let summary = loader.load_any(&proj).unwrap();
        assert_eq!(summary.loaded, 3);
        assert_eq!(summary.failed, 0);

        let loaded = order.borrow();
        assert_eq!(loaded.len(), 3);
        assert!(loaded[0].ends_with("__root__.pv"));
        assert_eq!(
            registry.read().list_keys(None),
            vec!["proj.__root__.banner", "proj.a.x", "proj.b.y"]
        );
    }

    #[test]
    fn test_load_any_package_isolates_broken_units() {
        let temp = TempDir::new().unwrap();
        let proj = temp.path().join("proj");
        fs::create_dir(&proj).unwrap();
        fs::write(proj.join("__root__.pv"), "exit 0\n").unwrap();
        registering_unit(&proj, "a.pv", "x");
        fs::write(proj.join("b.pv"), "exit 7\n").unwrap();

        let registry = PreviewRegistry::new("pv").into_shared();
        let mut loader = make_loader(registry.clone());

        let summary = loader.load_any(&proj).unwrap();
        assert_eq!(summary.loaded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(registry.read().list_keys(None), vec!["proj.a.x"]);
    }

    #[test]
    fn test_load_any_rejects_non_project() {
        let temp = TempDir::new().unwrap();
        let other = temp.path().join("notes.txt");
        fs::write(&other, "").unwrap();

        let registry = PreviewRegistry::new("pv").into_shared();
        let mut loader = make_loader(registry);

        assert!(matches!(
            loader.load_any(&other),
            Err(LoadError::InvalidProject { .. })
        ));
    }

    #[test]
    fn test_unload_emits_even_when_untracked() {
        let registry = PreviewRegistry::new("pv").into_shared();
        let mut loader = make_loader(registry);

        let events = Rc::new(RefCell::new(Vec::new()));
        let seen = events.clone();
        loader.subscribe(Priority::Normal, move |e| seen.borrow_mut().push(e.clone()));

        let ghost = PathBuf::from("/nowhere/ghost.pv");
        loader.unload(&ghost);
        assert_eq!(*events.borrow(), vec![LoaderEvent::UnitUnloaded(ghost)]);
    }

    #[test]
    fn test_incremental_reload_replaces_everything() {
        let temp = TempDir::new().unwrap();
        let unit = registering_unit(temp.path(), "a.pv", "x");
        let registry = PreviewRegistry::new("pv").into_shared();
        let mut loader = make_loader(registry.clone());

        loader.reload_all(&unit, ReloadPolicy::Incremental).unwrap();
        assert!(loader.has_loaded_project());

        // The unit now registers a different symbol; stale entries go
        registering_unit(temp.path(), "a.pv", "renamed");
        loader.reload_all(&unit, ReloadPolicy::Incremental).unwrap();

        assert_eq!(registry.read().list_keys(None), vec!["a.renamed"]);
    }

    #[test]
    fn test_full_reload_restarts_once_after_first_load() {
        let temp = TempDir::new().unwrap();
        let unit = registering_unit(temp.path(), "a.pv", "x");
        let registry = PreviewRegistry::new("pv").into_shared();
        let mut loader = make_loader(registry);

        let restarts = Arc::new(AtomicUsize::new(0));
        loader.set_restarter(Box::new(RecordingRestarter(restarts.clone())));

        // Nothing loaded yet: the full policy still performs a real load
        loader.reload_all(&unit, ReloadPolicy::Full).unwrap();
        assert_eq!(restarts.load(Ordering::SeqCst), 0);

        loader.reload_all(&unit, ReloadPolicy::Full).unwrap();
        assert_eq!(restarts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_directory_without_root_unit_yields_no_root_status() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("flat");
        fs::create_dir(&dir).unwrap();
        registering_unit(&dir, "a.pv", "x");

        let registry = PreviewRegistry::new("pv").into_shared();
        let mut loader = make_loader(registry);

        assert_eq!(loader.load(&dir, false), LoadStatus::NoRootUnit);
    }
}
