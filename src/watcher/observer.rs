//! Recursive project watcher delivering debounced source-file changes.

use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::{Event, EventKind, RecursiveMode, Watcher};

use super::debouncer::Debouncer;
use super::error::WatchError;

/// Watches one directory tree and queues changed source-file paths.
///
/// Events are filtered by extension and debounced on the notify thread;
/// the foreground loop drains them with [`FilesObserver::try_next`],
/// which never blocks. Stopping only tears down the OS-level watch and
/// is safe to call while a load is in progress.
pub struct FilesObserver {
    root: PathBuf,
    extension: String,
    cooldown_ms: u64,
    tx: Sender<PathBuf>,
    rx: Receiver<PathBuf>,
    watcher: Option<notify::RecommendedWatcher>,
}

impl FilesObserver {
    /// Create an observer for `root`. Monitoring starts on [`start`].
    ///
    /// `extension` is the recognized source extension without the dot.
    ///
    /// [`start`]: FilesObserver::start
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, cooldown_ms: u64) -> Self {
        let (tx, rx) = unbounded();
        Self {
            root: root.into(),
            extension: extension.into(),
            cooldown_ms,
            tx,
            rx,
            watcher: None,
        }
    }

    /// Begin recursive monitoring of the root directory.
    ///
    /// Fails with [`WatchError::SetupFailed`] when the root cannot be
    /// monitored (missing directory, permissions). No-op if already
    /// running.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.watcher.is_some() {
            return Ok(());
        }

        let tx = self.tx.clone();
        let extension = self.extension.clone();
        let mut debouncer = Debouncer::new(self.cooldown_ms);

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) != Some(extension.as_str()) {
                            continue;
                        }
                        if debouncer.should_emit(&path) {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => {
                    let err = WatchError::Event {
                        details: e.to_string(),
                    };
                    tracing::error!("[watcher] {err}");
                }
            })
            .map_err(|source| WatchError::SetupFailed {
                path: self.root.clone(),
                source,
            })?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::SetupFailed {
                path: self.root.clone(),
                source,
            })?;

        self.watcher = Some(watcher);
        crate::log_event!("watcher", "watching", "{}", self.root.display());
        Ok(())
    }

    /// Halt monitoring and release the underlying OS resources.
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            crate::log_event!("watcher", "stopped", "{}", self.root.display());
        }
    }

    /// Whether monitoring is currently established.
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// The watched root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Take the next queued change, if any. Never blocks.
    pub fn try_next(&self) -> Option<PathBuf> {
        self.rx.try_recv().ok()
    }
}

impl Drop for FilesObserver {
    fn drop(&mut self) {
        self.stop();
    }
}
