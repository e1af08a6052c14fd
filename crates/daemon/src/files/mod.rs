//! Root-scoped file management.
//!
//! Every operation takes a [`ResolvedPath`] produced by
//! [`RootRegistry::resolve_path`], which applies the containment guard before
//! anything touches the filesystem:
//!
//! - [`browser`]: listing and directory creation
//! - [`content`]: inline previews and downloads
//! - [`archive`]: streaming directory archives through an external archiver
//! - [`mutation`]: writes, renames and deletes
//! - [`upload`]: multipart uploads
//!
//! # Security
//!
//! Containment is lexical. Client paths cannot climb above their root with
//! `..`, but a symlink placed inside a root by other means is followed.

pub mod archive;
pub mod browser;
pub mod containment;
pub mod content;
pub mod error;
pub mod mutation;
pub mod roots;
pub mod upload;

pub use archive::{ArchiveStream, Archiver, EMPTY_ZIP};
pub use browser::{create_directory, list_directory, DirectoryEntry};
pub use containment::{resolve, ResolvedPath};
pub use content::{
    classify, mime_for_path, open_download, read_preview, ContentPreview, Download, DownloadBody,
    PreviewPayload,
};
pub use error::{FileError, UploadPartError};
pub use mutation::{delete, rename, write_file};
pub use roots::{FileRoot, RootRegistry};
pub use upload::{basename, UploadSession};
