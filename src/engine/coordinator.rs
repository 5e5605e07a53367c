//! Orchestration of the watch -> reload -> registry pipeline.
//!
//! The engine owns the loader and the observer and is driven from one
//! foreground thread: the notify callback only queues paths, and
//! [`Engine::step`] drains that queue and performs all loading. Nothing
//! but the loader's event listeners ever mutates the registry, so
//! consumers observing the catalog between steps always see a state
//! where every group is non-empty and no stale source lingers.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Settings;
use crate::loader::{
    LoadError, LoadSummary, LoaderEvent, ModuleLoader, Priority, ProjectKind, ProjectLayout,
    ReloadPolicy, UnitRunner,
};
use crate::registry::{PreviewRegistry, SharedRegistry};
use crate::watcher::{FilesObserver, WatchError};

/// Errors from engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("'{path}' is neither a source file nor a package, keeping previous project")]
    InvalidProject { path: PathBuf },

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

struct ActiveProject {
    root: PathBuf,
    kind: ProjectKind,
    /// Directory handed to the observer; the parent for a single file.
    watch_root: PathBuf,
}

/// The hot-reload engine: one active project, watched and kept in sync.
pub struct Engine {
    settings: Settings,
    registry: SharedRegistry,
    loader: ModuleLoader,
    observer: Option<FilesObserver>,
    project: Option<ActiveProject>,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        let registry = PreviewRegistry::new(&settings.project.source_extension).into_shared();
        let layout = ProjectLayout::from_config(&settings.project);
        let runner = UnitRunner::new(settings.runner.command.clone());
        let mut loader = ModuleLoader::new(layout, runner, registry.clone());

        // Registry cleanup runs before any other listener reacts, so a
        // consumer subscribed at Normal never sees stale entries
        let catalog = registry.clone();
        loader.subscribe(Priority::High, move |event| match event {
            LoaderEvent::UnitUnloaded(path) => catalog.write().remove_by_source(path),
            LoaderEvent::ReloadStarted(_) => catalog.write().clear(),
            _ => {}
        });

        Self {
            settings,
            registry,
            loader,
            observer: None,
            project: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn loader_mut(&mut self) -> &mut ModuleLoader {
        &mut self.loader
    }

    pub fn current_project(&self) -> Option<&Path> {
        self.project.as_ref().map(|p| p.root.as_path())
    }

    fn policy(&self) -> ReloadPolicy {
        if self.settings.reload_all {
            ReloadPolicy::Full
        } else {
            ReloadPolicy::Incremental
        }
    }

    /// Switch to (or re-open) a project: validate, rewire the watch, and
    /// load everything.
    ///
    /// Validation failures leave the previous project and its watch
    /// untouched. A watch that cannot be established aborts the switch
    /// before anything is loaded.
    pub fn set_project(&mut self, path: &Path) -> Result<LoadSummary, EngineError> {
        let kind = self.loader.resolve_project_kind(path);
        if kind == ProjectKind::Invalid {
            return Err(EngineError::InvalidProject {
                path: path.to_path_buf(),
            });
        }

        let root = path.canonicalize().map_err(|source| {
            EngineError::Load(LoadError::Io {
                path: path.to_path_buf(),
                source,
            })
        })?;
        let watch_root = match kind {
            ProjectKind::Single => root
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.clone()),
            _ => root.clone(),
        };

        // Tear down the old watch and drop changes queued for it
        if let Some(mut old) = self.observer.take() {
            old.stop();
            while old.try_next().is_some() {}
        }

        let mut observer = FilesObserver::new(
            &watch_root,
            &self.settings.project.source_extension,
            self.settings.watcher.cooldown_ms,
        );
        observer.start()?;
        self.observer = Some(observer);

        crate::log_event!("engine", "project selected", "{}", root.display());
        self.project = Some(ActiveProject {
            root: root.clone(),
            kind,
            watch_root,
        });

        // Under the full policy a switch away from a loaded project
        // restarts the host; the very first load is always incremental
        let summary = self.loader.reload_all(&root, self.policy())?;
        Ok(summary)
    }

    /// Load a project once, without watching it. For one-shot commands.
    pub fn load_once(&mut self, path: &Path) -> Result<LoadSummary, EngineError> {
        let kind = self.loader.resolve_project_kind(path);
        if kind == ProjectKind::Invalid {
            return Err(EngineError::InvalidProject {
                path: path.to_path_buf(),
            });
        }
        Ok(self.loader.reload_all(path, ReloadPolicy::Incremental)?)
    }

    /// Drain queued file changes and react to each. Returns how many
    /// changes were handled. Never blocks.
    ///
    /// Under the full policy the first relevant change restarts the host
    /// process; incrementally, each changed unit is force-reloaded on its
    /// own, so one broken file leaves its siblings' artifacts in place.
    pub fn step(&mut self) -> Result<usize, EngineError> {
        let mut changed = Vec::new();
        if let Some(observer) = &self.observer {
            while let Some(path) = observer.try_next() {
                changed.push(path);
            }
        }

        let Some(project) = &self.project else {
            return Ok(0);
        };
        let root = project.root.clone();
        let policy = self.policy();

        let mut handled = 0usize;
        for path in changed {
            if !self.belongs_to_project(&path) {
                continue;
            }
            crate::log_event!("engine", "change detected", "{}", path.display());
            handled += 1;

            match policy {
                ReloadPolicy::Full => {
                    self.loader.reload_all(&root, ReloadPolicy::Full)?;
                    // Only reachable with a substituted restarter
                    return Ok(handled);
                }
                ReloadPolicy::Incremental => {
                    self.loader.load(&path, true);
                }
            }
        }
        Ok(handled)
    }

    fn belongs_to_project(&self, path: &Path) -> bool {
        let Some(project) = &self.project else {
            return false;
        };
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        match project.kind {
            ProjectKind::Single => canonical == project.root,
            _ => canonical.starts_with(&project.watch_root),
        }
    }

    /// Whether the file watch is currently established.
    pub fn is_watching(&self) -> bool {
        self.observer.as_ref().is_some_and(FilesObserver::is_running)
    }

    /// Stop watching and unload everything.
    pub fn shutdown(&mut self) {
        if let Some(mut observer) = self.observer.take() {
            observer.stop();
        }
        self.loader.unload_all();
        self.project = None;
    }
}
