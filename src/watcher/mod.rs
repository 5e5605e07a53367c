//! Debounced recursive file watching.
//!
//! A [`FilesObserver`] monitors one project root on a background thread
//! (owned by `notify`) and forwards coalesced change events for source
//! files to a thread-safe queue. The foreground loop drains the queue at
//! its own pace; the watcher never touches the loader or the registry.
//!
//! ```text
//! notify thread                     foreground loop
//!   fs event -> filter -> debounce -> queue -> Engine::step()
//! ```

mod debouncer;
mod error;
mod observer;

pub use debouncer::Debouncer;
pub use error::WatchError;
pub use observer::FilesObserver;
