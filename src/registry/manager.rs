//! The preview catalog: keyed artifacts plus a group index.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use super::preview::{LayoutProducer, Preview, WindowOptions};

/// Separator between the qualified name and the user-supplied suffix.
pub const NAME_SEP: char = ':';

/// Handle shared between the loader (writes registrations) and the
/// consumer (reads). All mutation happens on the foreground thread.
pub type SharedRegistry = Arc<RwLock<PreviewRegistry>>;

/// Errors from registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("'{path}' is not an existing source file, registration rejected")]
    InvalidSource { path: PathBuf },
}

/// Catalog of preview artifacts contributed by loaded units.
///
/// Keys are unique at any instant; a duplicate registration overwrites
/// with a warning (the most recently loaded source wins). Group
/// membership is a secondary index; `None` everywhere means the implicit
/// all-artifacts pseudo-group. Iteration order is the key order, stable
/// within a call for paired use with the name shortener.
#[derive(Debug)]
pub struct PreviewRegistry {
    previews: BTreeMap<String, Preview>,
    groups: BTreeMap<String, BTreeSet<String>>,
    source_extension: String,
}

impl PreviewRegistry {
    /// `source_extension` is the recognized extension, without the dot.
    pub fn new(source_extension: impl Into<String>) -> Self {
        Self {
            previews: BTreeMap::new(),
            groups: BTreeMap::new(),
            source_extension: source_extension.into(),
        }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Register an artifact.
    ///
    /// The source path must denote an existing, real source file. A
    /// duplicate key overwrites the previous entry with a non-fatal
    /// warning.
    pub fn add(
        &mut self,
        key: impl Into<String>,
        source_path: &Path,
        producer: Box<dyn LayoutProducer>,
        group: Option<String>,
        window: Option<WindowOptions>,
    ) -> Result<(), RegistryError> {
        let key = key.into();

        if !source_path.is_file()
            || source_path.extension().and_then(|e| e.to_str())
                != Some(self.source_extension.as_str())
        {
            return Err(RegistryError::InvalidSource {
                path: source_path.to_path_buf(),
            });
        }
        let canonical = source_path
            .canonicalize()
            .map_err(|_| RegistryError::InvalidSource {
                path: source_path.to_path_buf(),
            })?;

        if let Some(old) = self.previews.remove(&key) {
            tracing::warn!("[registry] preview with key '{key}' already exists (overwrite applied)");
            self.remove_from_groups(&old.key);
        }

        if let Some(group_key) = &group {
            self.groups
                .entry(group_key.clone())
                .or_default()
                .insert(key.clone());
        }
        self.previews
            .insert(key.clone(), Preview::new(key, canonical, producer, group, window));

        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Preview> {
        self.previews.get(key)
    }

    /// Remove every artifact whose source refers to the same file as
    /// `path`, pruning any group left empty.
    pub fn remove_by_source(&mut self, path: &Path) {
        let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let stale: Vec<String> = self
            .previews
            .values()
            .filter(|p| p.source_path == target || p.source_path == path)
            .map(|p| p.key.clone())
            .collect();

        for key in &stale {
            self.previews.remove(key);
            self.remove_from_groups(key);
        }

        if !stale.is_empty() {
            crate::debug_event!(
                "registry",
                "purged",
                "{} previews of {}",
                stale.len(),
                path.display()
            );
        }
    }

    fn remove_from_groups(&mut self, key: &str) {
        for members in self.groups.values_mut() {
            members.remove(key);
        }
        self.groups.retain(|_, members| !members.is_empty());
    }

    /// Empty the catalog and all groups.
    pub fn clear(&mut self) {
        self.previews.clear();
        self.groups.clear();
    }

    /// Keys of a group, or of the implicit all-artifacts pseudo-group.
    pub fn list_keys(&self, group: Option<&str>) -> Vec<String> {
        match group {
            None => self.previews.keys().cloned().collect(),
            Some(group_key) => self
                .groups
                .get(group_key)
                .map(|members| members.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }

    /// Deterministic default selection for a group.
    pub fn first_key(&self, group: Option<&str>) -> Option<String> {
        self.list_keys(group).into_iter().next()
    }

    /// Declared group keys, in deterministic order.
    pub fn groups(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.previews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previews.is_empty()
    }

    /// Split a key into its qualified name and optional suffix.
    pub fn split_name(key: &str) -> (&str, Option<&str>) {
        match key.split_once(NAME_SEP) {
            Some((qualified, suffix)) => (qualified, Some(suffix)),
            None => (key, None),
        }
    }

    /// Display name of a key: the suffix if present, the whole key otherwise.
    pub fn name_of(key: &str) -> &str {
        match Self::split_name(key) {
            (_, Some(suffix)) => suffix,
            (qualified, None) => qualified,
        }
    }
}
