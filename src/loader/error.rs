//! Error types for unit loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loader operations.
///
/// Unit execution failures are isolated per unit and reported through the
/// log and [`LoadStatus::Failed`](super::LoadStatus); these variants cover
/// the non-isolatable cases.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("'{path}' is not a loadable project (neither a source file nor a package)")]
    InvalidProject { path: PathBuf },

    #[error("no package root found under '{path}', can't load anything")]
    NoPackageRoot { path: PathBuf },

    #[error("failed to spawn runner for '{path}': {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unit '{unit}' failed: {reason}")]
    Execution { unit: String, reason: String },

    #[error("cannot resolve path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to restart host process: {source}")]
    Restart {
        #[source]
        source: std::io::Error,
    },
}
