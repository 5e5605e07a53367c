//! Project kind resolution and deterministic unit naming.
//!
//! A *package* is a directory of units sharing one namespace prefix,
//! marked by a root file (`__root__.pv` by default). In flat mode a
//! directory with source files but no marker is still treated as a
//! package; see `DESIGN.md` for why that heuristic is switchable.

use std::path::{Path, PathBuf};

use crate::config::ProjectConfig;

/// What a project path denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    /// One standalone source file.
    Single,
    /// A directory of units loaded and unloaded together.
    Package,
    /// Neither; rejected at the engine boundary.
    Invalid,
}

/// The resolved root of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageRoot {
    /// The root-marker unit; executed first when the package loads.
    Marker(PathBuf),
    /// A flat package directory without a root unit.
    Flat(PathBuf),
}

impl PackageRoot {
    /// Directory the package's units live under.
    pub fn dir(&self) -> &Path {
        match self {
            PackageRoot::Marker(file) => file.parent().unwrap_or(Path::new("")),
            PackageRoot::Flat(dir) => dir,
        }
    }
}

/// Filesystem conventions of a project: source filter, marker lookup,
/// and the dotted-name derivation used for namespace bindings.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    source_extension: String,
    root_marker: String,
    flat_packages: bool,
}

impl ProjectLayout {
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            source_extension: config.source_extension.clone(),
            root_marker: config.root_marker.clone(),
            flat_packages: config.flat_packages,
        }
    }

    /// The recognized source extension, without the dot.
    pub fn source_extension(&self) -> &str {
        &self.source_extension
    }

    /// File name of the package root marker, e.g. `__root__.pv`.
    pub fn marker_name(&self) -> String {
        format!("{}.{}", self.root_marker, self.source_extension)
    }

    /// Whether `path` passes the source-file filter.
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(self.source_extension.as_str())
    }

    /// Whether `path` is the root-marker unit of a package.
    pub fn is_root_marker(&self, path: &Path) -> bool {
        path.file_name().and_then(|n| n.to_str()) == Some(self.marker_name().as_str())
    }

    fn dir_has_marker(&self, dir: &Path) -> bool {
        dir.join(self.marker_name()).is_file()
    }

    fn dir_has_source(&self, dir: &Path) -> bool {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .any(|e| e.path().is_file() && self.is_source_file(&e.path()))
            })
            .unwrap_or(false)
    }

    /// Resolve what kind of project `path` denotes.
    pub fn resolve_kind(&self, path: &Path) -> ProjectKind {
        if path.is_file() {
            if self.is_root_marker(path) {
                return ProjectKind::Package;
            }
            if self.is_source_file(path) {
                return ProjectKind::Single;
            }
            return ProjectKind::Invalid;
        }
        if path.is_dir() {
            if self.dir_has_marker(path) {
                return ProjectKind::Package;
            }
            if self.flat_packages && self.dir_has_source(path) {
                return ProjectKind::Package;
            }
        }
        ProjectKind::Invalid
    }

    /// Find the package root for `path`: the topmost ancestor directory
    /// that still carries a root marker, or the directory itself for a
    /// flat package.
    pub fn package_root(&self, path: &Path) -> Option<PackageRoot> {
        let start = if path.is_dir() {
            path
        } else {
            path.parent()?
        };

        if self.dir_has_marker(start) {
            let mut root = start;
            while let Some(parent) = root.parent() {
                if self.dir_has_marker(parent) {
                    root = parent;
                } else {
                    break;
                }
            }
            return Some(PackageRoot::Marker(root.join(self.marker_name())));
        }

        if self.flat_packages && self.dir_has_source(start) {
            return Some(PackageRoot::Flat(start.to_path_buf()));
        }

        None
    }

    /// Derive the unit's dotted namespace name from its position in the
    /// directory tree: ancestor directory names are prepended while each
    /// ancestor is itself a package root, then the file stem is appended.
    ///
    /// `/proj/__root__.pv` -> `proj.__root__` and `/proj/a.pv` -> `proj.a`
    /// when `/proj` carries the marker; a flat package yields bare stems.
    pub fn module_name(&self, unit: &Path) -> String {
        let mut parts = Vec::new();

        let mut dir = unit.parent();
        while let Some(d) = dir {
            if !self.dir_has_marker(d) {
                break;
            }
            if let Some(name) = d.file_name().and_then(|n| n.to_str()) {
                parts.push(name.to_string());
            }
            dir = d.parent();
        }
        parts.reverse();

        if let Some(stem) = unit.file_stem().and_then(|s| s.to_str()) {
            parts.push(stem.to_string());
        }

        parts.join(".")
    }
}
