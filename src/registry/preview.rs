//! The preview artifact: a named, lazily-callable layout producer.

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A renderable layout, as reported by a unit. Opaque to the engine;
/// the consumer decides how to turn it into pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout(pub serde_json::Value);

/// Window options a unit may attach to an artifact for the consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_on_top: Option<bool>,
}

/// Errors from invoking a producer. Contained at the call site; the
/// consumer displays them instead of crashing.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to start renderer for '{key}': {source}")]
    Spawn {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("render of '{key}' failed: {stderr}")]
    Failed { key: String, stderr: String },

    #[error("unit produced no layout for '{key}'")]
    NoLayout { key: String },
}

impl RenderError {
    /// Displayable error payload for the consumer boundary.
    pub fn to_layout(&self) -> Layout {
        Layout(serde_json::json!({ "error": self.to_string() }))
    }
}

/// Zero-argument, lazily-invoked, possibly-failing layout source.
pub trait LayoutProducer: Send + Sync {
    fn produce(&self) -> Result<Layout, RenderError>;
}

impl<F> LayoutProducer for F
where
    F: Fn() -> Result<Layout, RenderError> + Send + Sync,
{
    fn produce(&self) -> Result<Layout, RenderError> {
        self()
    }
}

/// One catalog entry. Owned by the registry; destroyed when the owning
/// unit is unloaded.
pub struct Preview {
    pub key: String,
    /// Canonical path of the declaring unit; the purge match key.
    pub source_path: PathBuf,
    pub created_at: SystemTime,
    pub group: Option<String>,
    pub window: Option<WindowOptions>,
    producer: Box<dyn LayoutProducer>,
}

impl Preview {
    pub fn new(
        key: String,
        source_path: PathBuf,
        producer: Box<dyn LayoutProducer>,
        group: Option<String>,
        window: Option<WindowOptions>,
    ) -> Self {
        Self {
            key,
            source_path,
            created_at: SystemTime::now(),
            group,
            window,
            producer,
        }
    }

    /// Invoke the producer. Failure is returned, never propagated further.
    pub fn produce(&self) -> Result<Layout, RenderError> {
        self.producer.produce()
    }
}

impl fmt::Debug for Preview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preview")
            .field("key", &self.key)
            .field("source_path", &self.source_path)
            .field("created_at", &self.created_at)
            .field("group", &self.group)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
