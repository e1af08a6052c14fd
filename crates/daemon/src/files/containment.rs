//! Path containment guard.
//!
//! Every client-supplied path is resolved here before any filesystem access.
//! Resolution is purely lexical: separators are normalized, leading
//! separators are stripped, `.` and `..` are applied segment by segment, and
//! any `..` that would climb above the root is rejected outright.

use std::path::PathBuf;
use std::sync::Arc;

use super::error::{display_path, FileError};
use super::roots::FileRoot;

/// A client path resolved against a root.
///
/// `absolute_path` is always the root directory itself or a strict
/// descendant of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Root the path was resolved against.
    pub root: Arc<FileRoot>,
    /// Normalized path relative to the root, `/`-separated, no leading slash.
    pub relative_path: String,
    /// Absolute filesystem path.
    pub absolute_path: PathBuf,
}

impl ResolvedPath {
    /// Whether this path names the root directory itself.
    pub fn is_root(&self) -> bool {
        self.relative_path.is_empty()
    }

    /// Last segment of the relative path, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.relative_path.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Relative path of a child entry of this directory.
    pub fn child_relative(&self, name: &str) -> String {
        if self.relative_path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.relative_path, name)
        }
    }

    /// Client-facing form of the path, used in error messages.
    pub fn display(&self) -> String {
        display_path(&self.relative_path)
    }
}

/// Resolve `relative` against `root`.
///
/// Never touches the filesystem and never panics. The empty string resolves
/// to the root itself.
pub fn resolve(root: &Arc<FileRoot>, relative: &str) -> Result<ResolvedPath, FileError> {
    let normalized = relative.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(FileError::PathTraversal(relative.to_string()));
                }
            }
            name => {
                if name.contains('\0') || is_drive_prefix(name) {
                    return Err(FileError::PathTraversal(relative.to_string()));
                }
                segments.push(name);
            }
        }
    }

    let mut absolute_path = root.absolute_path.clone();
    absolute_path.extend(&segments);

    if !absolute_path.starts_with(&root.absolute_path) {
        return Err(FileError::PathTraversal(relative.to_string()));
    }

    Ok(ResolvedPath {
        root: Arc::clone(root),
        relative_path: segments.join("/"),
        absolute_path,
    })
}

/// `C:` style prefixes would replace the root when joined on Windows.
fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
