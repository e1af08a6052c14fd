//! Directory listing and creation.
//!
//! Listing a directory that does not exist yet creates it, so a freshly
//! configured root can be browsed before anything has been stored in it.

use std::cmp::Ordering;
use std::fs::Metadata;
use std::io;
use std::time::SystemTime;

use protocol::{EntryKind, FileEntry};
use tokio::fs;
use tracing::debug;

use super::containment::ResolvedPath;
use super::error::FileError;

/// A directory entry with metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Size in bytes, files only.
    pub size: Option<u64>,
    /// Last modified time, when the platform reports one.
    pub modified: Option<SystemTime>,
}

impl DirectoryEntry {
    fn from_metadata(name: String, metadata: &Metadata) -> Self {
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        Self {
            name,
            kind,
            size: (kind == EntryKind::File).then(|| metadata.len()),
            modified: metadata.modified().ok(),
        }
    }

    /// Convert to the wire representation.
    pub fn to_protocol(&self) -> FileEntry {
        let modified = self.modified.and_then(|time| {
            time.duration_since(SystemTime::UNIX_EPOCH)
                .ok()
                .map(|d| d.as_millis() as u64)
        });

        FileEntry {
            name: self.name.clone(),
            kind: self.kind,
            size: self.size,
            modified,
        }
    }
}

/// List the immediate children of a directory.
///
/// Directories sort before files; within each group names compare
/// case-sensitively. Entries that vanish between `readdir` and `stat` are
/// skipped.
pub async fn list_directory(dir: &ResolvedPath) -> Result<Vec<DirectoryEntry>, FileError> {
    match fs::metadata(&dir.absolute_path).await {
        Ok(metadata) if !metadata.is_dir() => {
            return Err(FileError::NotADirectory(dir.display()));
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(root = %dir.root.id, path = %dir.relative_path, "Creating missing directory for listing");
            create_directory(dir).await?;
        }
        Err(e) => return Err(FileError::from_io(e, &dir.relative_path)),
    }

    let mut read_dir = fs::read_dir(&dir.absolute_path)
        .await
        .map_err(|e| FileError::from_io(e, &dir.relative_path))?;

    let mut entries = Vec::new();

    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();

        // Follow symlinks; fall back to the link itself when the target is gone.
        let metadata = match fs::metadata(entry.path()).await {
            Ok(m) => m,
            Err(_) => match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    debug!(name = %name, error = %e, "Skipping entry that could not be read");
                    continue;
                }
            },
        };

        entries.push(DirectoryEntry::from_metadata(name, &metadata));
    }

    sort_entries(&mut entries);
    Ok(entries)
}

/// Create a directory and any missing ancestors. Succeeds if it already exists.
pub async fn create_directory(dir: &ResolvedPath) -> Result<(), FileError> {
    match fs::create_dir_all(&dir.absolute_path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(FileError::NotADirectory(dir.display()))
        }
        Err(e) => {
            // create_dir_all reports a file in the way as a generic error
            if fs::metadata(&dir.absolute_path)
                .await
                .map(|m| !m.is_dir())
                .unwrap_or(false)
            {
                return Err(FileError::NotADirectory(dir.display()));
            }
            Err(FileError::from_io(e, &dir.relative_path))
        }
    }
}

fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(|a, b| match (a.kind, b.kind) {
        (EntryKind::Directory, EntryKind::File) => Ordering::Less,
        (EntryKind::File, EntryKind::Directory) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
}
