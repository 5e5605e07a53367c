//! The coordinator tying watcher, loader and registry together.

mod coordinator;

pub use coordinator::{Engine, EngineError};
