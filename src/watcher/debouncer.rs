//! Per-path cooldown suppression for file change events.
//!
//! Editors and the OS often deliver several write notifications for a
//! single logical save. The debouncer emits the first event for a path
//! immediately and suppresses followers that arrive within the cooldown
//! window, measured from the last *emitted* event for that path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Debounces file change events by path.
#[derive(Debug)]
pub struct Debouncer {
    /// Last emitted timestamp per path.
    last_emitted: HashMap<PathBuf, Instant>,
    /// Suppression window after an emitted event.
    cooldown: Duration,
}

impl Debouncer {
    /// Create a new debouncer with the given cooldown in milliseconds.
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            last_emitted: HashMap::new(),
            cooldown: Duration::from_millis(cooldown_ms),
        }
    }

    /// Record an event for `path` and decide whether it should be emitted.
    ///
    /// Returns `false` while a previously emitted event for the same path
    /// is still within the cooldown window.
    pub fn should_emit(&mut self, path: &Path) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_emitted.get(path) {
            if now.duration_since(*last) < self.cooldown {
                return false;
            }
        }
        self.last_emitted.insert(path.to_path_buf(), now);
        true
    }

    /// Drop the suppression state for a path (e.g. when it is deleted).
    pub fn forget(&mut self, path: &Path) {
        self.last_emitted.remove(path);
    }

    /// Number of paths with recorded emissions.
    pub fn tracked_count(&self) -> usize {
        self.last_emitted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_first_event_emitted_followers_suppressed() {
        let mut debouncer = Debouncer::new(50);
        let path = PathBuf::from("/test/file.pv");

        assert!(debouncer.should_emit(&path));
        // Burst of duplicate notifications for the same save
        assert!(!debouncer.should_emit(&path));
        assert!(!debouncer.should_emit(&path));
    }

    #[test]
    fn test_emits_again_after_cooldown() {
        let mut debouncer = Debouncer::new(30);
        let path = PathBuf::from("/test/file.pv");

        assert!(debouncer.should_emit(&path));
        assert!(!debouncer.should_emit(&path));

        sleep(Duration::from_millis(40));

        assert!(debouncer.should_emit(&path));
    }

    #[test]
    fn test_paths_are_independent() {
        let mut debouncer = Debouncer::new(50);
        let path1 = PathBuf::from("/test/file1.pv");
        let path2 = PathBuf::from("/test/file2.pv");

        assert!(debouncer.should_emit(&path1));
        // A different path is not affected by path1's cooldown
        assert!(debouncer.should_emit(&path2));
        assert!(!debouncer.should_emit(&path1));
        assert!(!debouncer.should_emit(&path2));
        assert_eq!(debouncer.tracked_count(), 2);
    }

    #[test]
    fn test_forget_resets_suppression() {
        let mut debouncer = Debouncer::new(1000);
        let path = PathBuf::from("/test/file.pv");

        assert!(debouncer.should_emit(&path));
        assert!(!debouncer.should_emit(&path));

        debouncer.forget(&path);
        assert!(debouncer.should_emit(&path));
    }
}
