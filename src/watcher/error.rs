//! Error types for the file watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    /// Monitoring could not be established. Fatal to startup: loading
    /// anything from an unwatched root would silently miss changes.
    #[error("cannot watch {path}: {source}")]
    SetupFailed {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("file system event error: {details}")]
    Event { details: String },
}
