//! Resource path resolution.

use std::path::{Path, PathBuf};

/// Environment variable holding extra search roots, separated by `:` or `;`.
pub const RESOURCE_PATH_ENV: &str = "PRISM_RESOURCE_PATH";

/// Resolves resource references (textures, shaders) to files on disk.
pub trait ResourceLocator {
    fn resolve(&self, reference: &str) -> Option<PathBuf>;
}

/// Ordered list of directories searched for relative references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPaths {
    roots: Vec<PathBuf>,
}

impl SearchPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search roots taken from [`RESOURCE_PATH_ENV`].
    pub fn from_env() -> Self {
        let mut paths = Self::new();
        if let Ok(value) = std::env::var(RESOURCE_PATH_ENV) {
            paths.extend_from_list(&value);
        }
        paths
    }

    /// Append every non-empty entry of a `:`/`;` separated list.
    pub fn extend_from_list(&mut self, list: &str) {
        for entry in list.split([':', ';']) {
            let entry = entry.trim();
            if !entry.is_empty() {
                self.add(entry);
            }
        }
    }

    pub fn add(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl ResourceLocator for SearchPaths {
    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let reference = reference.strip_prefix("file://").unwrap_or(reference);
        if reference.is_empty() {
            return None;
        }
        let path = Path::new(reference);
        if path.is_absolute() || path.exists() {
            return path.exists().then(|| path.to_path_buf());
        }
        self.roots
            .iter()
            .map(|root| root.join(path))
            .find(|candidate| candidate.exists())
    }
}
