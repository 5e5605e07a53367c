pub mod config;
pub mod engine;
pub mod loader;
pub mod logging;
pub mod registry;
pub mod watcher;

pub use config::Settings;
pub use engine::{Engine, EngineError};
pub use loader::{LoadError, LoaderEvent, ModuleLoader, ProjectKind, ReloadPolicy};
pub use registry::{
    Preview, PreviewRegistry, RegistryError, RenderError, SharedRegistry, shorten_preview_names,
};
pub use watcher::{FilesObserver, WatchError};
