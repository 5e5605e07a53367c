//! The live catalog of preview artifacts and its display naming.

mod manager;
mod naming;
mod preview;

pub use manager::{PreviewRegistry, RegistryError, SharedRegistry, NAME_SEP};
pub use naming::shorten_preview_names;
pub use preview::{Layout, LayoutProducer, Preview, RenderError, WindowOptions};
