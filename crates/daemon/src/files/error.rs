//! Error taxonomy for file operations.

use std::io;

use protocol::ErrorCode;
use thiserror::Error;

/// Errors returned by the file services.
///
/// Every variant maps to an [`ErrorCode`], which the HTTP layer turns into a
/// status code. Nothing here is retried internally.
#[derive(Debug, Error)]
pub enum FileError {
    /// The client-supplied path escapes its root.
    #[error("path escapes the configured root: {0}")]
    PathTraversal(String),

    /// No roots are configured, so file operations are unavailable.
    #[error("no file roots are configured")]
    NoRootsConfigured,

    /// The requested root identifier is unknown.
    #[error("unknown root: {0}")]
    RootNotFound(String),

    /// The target entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation needs a file but the path names a directory.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// The operation needs a directory but the path names a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The file exceeds the inline preview ceiling.
    #[error("file too large to preview: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// An uploaded part exceeds the per-file limit.
    #[error("upload exceeds limit of {limit} bytes")]
    PartTooLarge { limit: u64 },

    /// Deleting a directory that still has entries.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The path is syntactically acceptable but not valid for the operation.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Write content could not be decoded.
    #[error("invalid content encoding: {0}")]
    InvalidEncoding(String),

    /// The archiver could not be started or failed before producing output.
    #[error("archive failed: {0}")]
    ArchiveFailed(String),

    /// Any other filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FileError {
    /// Map an I/O error for `path`, singling out missing entries and paths
    /// that run through a file.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        if is_not_a_directory(&err) {
            return FileError::NotADirectory(display_path(path));
        }
        match err.kind() {
            io::ErrorKind::NotFound => FileError::NotFound(display_path(path)),
            _ => FileError::Io(err),
        }
    }

    /// Client-facing category of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            FileError::PathTraversal(_) => ErrorCode::PathTraversal,
            FileError::NoRootsConfigured
            | FileError::RootNotFound(_)
            | FileError::NotFound(_) => ErrorCode::NotFound,
            FileError::NotAFile(_)
            | FileError::NotADirectory(_)
            | FileError::DirectoryNotEmpty(_)
            | FileError::InvalidPath(_)
            | FileError::InvalidEncoding(_) => ErrorCode::InvalidRequest,
            FileError::FileTooLarge { .. } | FileError::PartTooLarge { .. } => {
                ErrorCode::PayloadTooLarge
            }
            FileError::ArchiveFailed(_) | FileError::Io(_) => ErrorCode::InternalError,
        }
    }
}

/// Relative paths are shown with a leading slash so the root itself reads as `/`.
pub(crate) fn display_path(relative: &str) -> String {
    format!("/{}", relative)
}

#[cfg(unix)]
fn is_not_a_directory(err: &io::Error) -> bool {
    // ENOTDIR
    err.raw_os_error() == Some(20)
}

#[cfg(not(unix))]
fn is_not_a_directory(_err: &io::Error) -> bool {
    false
}

/// A single multipart part that could not be saved.
///
/// Logged and skipped; the rest of the upload continues.
#[derive(Debug, Error)]
#[error("upload of {file_name:?} failed: {source}")]
pub struct UploadPartError {
    /// Declared filename of the part.
    pub file_name: String,
    /// Why the part was discarded.
    #[source]
    pub source: FileError,
}
