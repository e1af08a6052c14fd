//! Writes, renames and deletes.
//!
//! None of these operations lock: two concurrent requests on the same path
//! race at the filesystem level.

use std::io;

use base64::Engine;
use protocol::ContentEncoding;
use tokio::fs;
use tracing::{debug, info};

use super::containment::ResolvedPath;
use super::error::FileError;

/// Decode request content into the bytes to store.
pub fn decode_content(content: &str, encoding: ContentEncoding) -> Result<Vec<u8>, FileError> {
    match encoding {
        ContentEncoding::Utf8 => Ok(content.as_bytes().to_vec()),
        ContentEncoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(content.trim())
            .map_err(|e| FileError::InvalidEncoding(e.to_string())),
    }
}

/// Create or overwrite a file with decoded content, creating parent directories.
pub async fn write_file(
    target: &ResolvedPath,
    content: &str,
    encoding: ContentEncoding,
) -> Result<(), FileError> {
    let bytes = decode_content(content, encoding)?;

    if target.is_root() {
        return Err(FileError::NotAFile(target.display()));
    }
    if let Ok(metadata) = fs::metadata(&target.absolute_path).await {
        if metadata.is_dir() {
            return Err(FileError::NotAFile(target.display()));
        }
    }

    ensure_parent(target).await?;

    fs::write(&target.absolute_path, &bytes)
        .await
        .map_err(|e| FileError::from_io(e, &target.relative_path))?;

    debug!(root = %target.root.id, path = %target.relative_path, bytes = bytes.len(), "Wrote file");
    Ok(())
}

/// Move a file or directory, possibly into another root.
pub async fn rename(source: &ResolvedPath, destination: &ResolvedPath) -> Result<(), FileError> {
    if source.is_root() {
        return Err(FileError::InvalidPath("cannot move a root directory".to_string()));
    }
    if destination.is_root() {
        return Err(FileError::InvalidPath(
            "cannot replace a root directory".to_string(),
        ));
    }

    let metadata = fs::symlink_metadata(&source.absolute_path)
        .await
        .map_err(|e| FileError::from_io(e, &source.relative_path))?;

    if metadata.is_dir()
        && destination.absolute_path != source.absolute_path
        && destination.absolute_path.starts_with(&source.absolute_path)
    {
        return Err(FileError::InvalidPath(format!(
            "cannot move {} into itself",
            source.display()
        )));
    }

    ensure_parent(destination).await?;

    match fs::rename(&source.absolute_path, &destination.absolute_path).await {
        Ok(()) => {}
        Err(e) if is_cross_device(&e) && metadata.is_file() => {
            fs::copy(&source.absolute_path, &destination.absolute_path)
                .await
                .map_err(|e| FileError::from_io(e, &destination.relative_path))?;
            fs::remove_file(&source.absolute_path)
                .await
                .map_err(|e| FileError::from_io(e, &source.relative_path))?;
        }
        Err(e) => return Err(FileError::from_io(e, &source.relative_path)),
    }

    info!(
        from_root = %source.root.id,
        from = %source.relative_path,
        to_root = %destination.root.id,
        to = %destination.relative_path,
        "Renamed entry"
    );
    Ok(())
}

/// Delete a file, or a directory if it is empty.
pub async fn delete(target: &ResolvedPath) -> Result<(), FileError> {
    if target.is_root() {
        return Err(FileError::InvalidPath("cannot delete a root directory".to_string()));
    }

    let metadata = fs::symlink_metadata(&target.absolute_path)
        .await
        .map_err(|e| FileError::from_io(e, &target.relative_path))?;

    if metadata.is_dir() {
        let mut read_dir = fs::read_dir(&target.absolute_path)
            .await
            .map_err(|e| FileError::from_io(e, &target.relative_path))?;
        if read_dir.next_entry().await?.is_some() {
            return Err(FileError::DirectoryNotEmpty(target.display()));
        }
        fs::remove_dir(&target.absolute_path)
            .await
            .map_err(|e| FileError::from_io(e, &target.relative_path))?;
    } else {
        fs::remove_file(&target.absolute_path)
            .await
            .map_err(|e| FileError::from_io(e, &target.relative_path))?;
    }

    info!(root = %target.root.id, path = %target.relative_path, "Deleted entry");
    Ok(())
}

async fn ensure_parent(target: &ResolvedPath) -> Result<(), FileError> {
    let Some(parent) = target.absolute_path.parent() else {
        return Ok(());
    };
    match fs::create_dir_all(parent).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(FileError::NotADirectory(parent_display(target)))
        }
        Err(e) => {
            if fs::metadata(parent).await.map(|m| !m.is_dir()).unwrap_or(false) {
                return Err(FileError::NotADirectory(parent_display(target)));
            }
            Err(FileError::from_io(e, &target.relative_path))
        }
    }
}

fn parent_display(target: &ResolvedPath) -> String {
    let parent = target
        .relative_path
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .unwrap_or("");
    super::error::display_path(parent)
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    // EXDEV
    err.raw_os_error() == Some(18)
}

#[cfg(not(unix))]
fn is_cross_device(_err: &io::Error) -> bool {
    false
}
