//! Root registry.
//!
//! Roots come from configuration and are fixed for the lifetime of the
//! process. The registry is an immutable value passed explicitly to every
//! operation.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use protocol::RootInfo;

use super::containment::{self, ResolvedPath};
use super::error::FileError;
use crate::config::RootConfig;

/// An administrator-configured directory that scopes file operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRoot {
    /// Identifier used by clients.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Canonical absolute path, symlinks resolved.
    pub absolute_path: PathBuf,
}

impl FileRoot {
    /// Create a root from an already canonical path.
    pub fn new(id: impl Into<String>, label: impl Into<String>, absolute_path: PathBuf) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            absolute_path,
        }
    }

    /// Client-facing summary.
    pub fn info(&self) -> RootInfo {
        RootInfo {
            id: self.id.clone(),
            label: self.label.clone(),
        }
    }
}

/// Read-only lookup over the configured roots.
#[derive(Debug, Clone, Default)]
pub struct RootRegistry {
    roots: Vec<Arc<FileRoot>>,
}

impl RootRegistry {
    /// Build a registry from roots whose paths are already canonical.
    pub fn new(roots: Vec<FileRoot>) -> Self {
        Self {
            roots: roots.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load roots from configuration.
    ///
    /// Each root directory is created if it does not exist yet, then
    /// canonicalized once so that containment checks compare stable paths.
    pub fn load(configs: &[RootConfig]) -> Result<Self> {
        let mut roots = Vec::with_capacity(configs.len());

        for config in configs {
            fs::create_dir_all(&config.path).with_context(|| {
                format!(
                    "Failed to create root directory for {:?}: {}",
                    config.id,
                    config.path.display()
                )
            })?;

            let absolute_path = fs::canonicalize(&config.path).with_context(|| {
                format!(
                    "Failed to canonicalize root {:?}: {}",
                    config.id,
                    config.path.display()
                )
            })?;

            tracing::info!(
                root = %config.id,
                path = %absolute_path.display(),
                "Registered file root"
            );

            roots.push(FileRoot::new(
                config.id.clone(),
                config.display_label(),
                absolute_path,
            ));
        }

        Ok(Self::new(roots))
    }

    /// Whether no roots are configured.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of configured roots.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// All roots in configuration order.
    pub fn roots(&self) -> impl Iterator<Item = &Arc<FileRoot>> {
        self.roots.iter()
    }

    /// Look up a root by id, or the first root when `id` is `None`.
    pub fn resolve(&self, id: Option<&str>) -> Result<Arc<FileRoot>, FileError> {
        match id.filter(|id| !id.is_empty()) {
            None => self
                .roots
                .first()
                .cloned()
                .ok_or(FileError::NoRootsConfigured),
            Some(id) => {
                if self.roots.is_empty() {
                    return Err(FileError::NoRootsConfigured);
                }
                self.roots
                    .iter()
                    .find(|root| root.id == id)
                    .cloned()
                    .ok_or_else(|| FileError::RootNotFound(id.to_string()))
            }
        }
    }

    /// Resolve a root and then a relative path inside it.
    pub fn resolve_path(
        &self,
        root_id: Option<&str>,
        relative: &str,
    ) -> Result<ResolvedPath, FileError> {
        let root = self.resolve(root_id)?;
        containment::resolve(&root, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> RootRegistry {
        RootRegistry::new(vec![
            FileRoot::new("charts", "Charts", PathBuf::from("/srv/charts")),
            FileRoot::new("tracks", "Tracks", PathBuf::from("/srv/tracks")),
        ])
    }

    #[test]
    fn test_default_is_first_root() {
        let registry = registry();
        assert_eq!(registry.resolve(None).unwrap().id, "charts");
        assert_eq!(registry.resolve(Some("")).unwrap().id, "charts");
    }

    #[test]
    fn test_resolve_by_id() {
        let registry = registry();
        let root = registry.resolve(Some("tracks")).unwrap();
        assert_eq!(root.label, "Tracks");
        assert_eq!(root.absolute_path, PathBuf::from("/srv/tracks"));
    }

    #[test]
    fn test_unknown_root() {
        let registry = registry();
        let result = registry.resolve(Some("photos"));
        assert!(matches!(result, Err(FileError::RootNotFound(ref id)) if id == "photos"));
    }

    #[test]
    fn test_empty_registry() {
        let registry = RootRegistry::default();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.resolve(None),
            Err(FileError::NoRootsConfigured)
        ));
        assert!(matches!(
            registry.resolve(Some("charts")),
            Err(FileError::NoRootsConfigured)
        ));
    }

    #[test]
    fn test_resolve_path_uses_root() {
        let registry = registry();
        let resolved = registry.resolve_path(Some("tracks"), "2024/a.gpx").unwrap();
        assert_eq!(resolved.root.id, "tracks");
        assert_eq!(
            resolved.absolute_path,
            PathBuf::from("/srv/tracks/2024/a.gpx")
        );

        let result = registry.resolve_path(Some("tracks"), "../charts/x");
        assert!(matches!(result, Err(FileError::PathTraversal(_))));
    }

    #[test]
    fn test_load_creates_and_canonicalizes() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("new-root").join("nested");

        let configs = vec![
            RootConfig {
                id: "main".to_string(),
                label: None,
                path: missing.clone(),
            },
            RootConfig {
                id: "other".to_string(),
                label: Some("Other files".to_string()),
                path: temp_dir.path().to_path_buf(),
            },
        ];

        let registry = RootRegistry::load(&configs).unwrap();
        assert!(missing.is_dir());
        assert_eq!(registry.len(), 2);

        let main = registry.resolve(Some("main")).unwrap();
        assert_eq!(main.label, "main");
        assert_eq!(main.absolute_path, fs::canonicalize(&missing).unwrap());

        let other = registry.resolve(Some("other")).unwrap();
        assert_eq!(other.label, "Other files");
    }

    #[cfg(unix)]
    #[test]
    fn test_load_resolves_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("target");
        fs::create_dir_all(&target).unwrap();
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let registry = RootRegistry::load(&[RootConfig {
            id: "linked".to_string(),
            label: None,
            path: link,
        }])
        .unwrap();

        let root = registry.resolve(None).unwrap();
        assert_eq!(root.absolute_path, fs::canonicalize(&target).unwrap());
    }
}
