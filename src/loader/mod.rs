//! Unit lifecycle management.
//!
//! The loader owns the process-wide [`Namespace`] of loaded units and is
//! its sole mutator. Units are executed in short-lived child processes
//! that report their registrations back over a pipe (see [`runner`]),
//! which trades true in-process unload for process-level isolation while
//! keeping the external contract: load, unload, reload, and lifecycle
//! events.
//!
//! # Architecture
//!
//! ```text
//! ModuleLoader
//!   - ProjectLayout (kind resolution, dotted names)
//!   - Namespace     (name -> source binding table)
//!   - UnitRunner    (child process + JSON-line protocol)
//!   - EventBus      (priority-ordered lifecycle listeners)
//! ```

mod error;
mod event;
#[allow(clippy::module_inception)]
mod loader;
mod namespace;
mod project;
mod restart;
pub mod runner;

pub use error::LoadError;
pub use event::{EventBus, LoaderEvent, Priority};
pub use loader::{LoadStatus, LoadSummary, ModuleLoader, ReloadPolicy, TrackedUnit, UnitKind};
pub use namespace::Namespace;
pub use project::{PackageRoot, ProjectKind, ProjectLayout};
pub use restart::{ExecRestarter, Restarter};
pub use runner::{Registration, UnitRunner};
