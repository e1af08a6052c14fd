//! Request and response bodies for the NavFiles HTTP API.
//!
//! Every JSON response carries an `ok` flag. Successful responses set it to
//! `true`; failures use [`ErrorResponse`](crate::error::ErrorResponse).
//! Field names follow the browser client's camelCase conventions where they
//! differ from Rust naming (`newPath`, `newRoot`).

use serde::{Deserialize, Serialize};

/// A configured root as presented to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootInfo {
    /// Identifier used in the `root` parameter of every request.
    pub id: String,
    /// Human-readable label.
    pub label: String,
}

/// Response for `GET /files/roots`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootsResponse {
    pub ok: bool,
    pub roots: Vec<RootInfo>,
}

impl RootsResponse {
    pub fn new(roots: Vec<RootInfo>) -> Self {
        Self { ok: true, roots }
    }
}

/// Query string for `GET /files/list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Directory relative to the root. Empty or absent means the root.
    #[serde(default)]
    pub path: Option<String>,
    /// Root identifier. Absent means the first configured root.
    #[serde(default)]
    pub root: Option<String>,
}

/// Query string for `GET /files/read` and `GET /files/download`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathQuery {
    pub path: String,
    #[serde(default)]
    pub root: Option<String>,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file (or anything that is not a directory).
    File,
    /// Directory.
    Directory,
}

/// A single entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Size in bytes, present for files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last modification time in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,
}

/// Response for `GET /files/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    pub ok: bool,
    /// Normalized relative path that was listed.
    pub path: String,
    pub entries: Vec<FileEntry>,
    /// Identifier of the root the listing belongs to.
    pub root: String,
}

impl ListResponse {
    pub fn new(root: impl Into<String>, path: impl Into<String>, entries: Vec<FileEntry>) -> Self {
        Self {
            ok: true,
            path: path.into(),
            entries,
            root: root.into(),
        }
    }
}

/// How a file read is presented to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// UTF-8 text returned inline in `text`.
    Text,
    /// Image, audio, video or PDF returned base64-encoded in `data`.
    PreviewableBinary,
    /// Binary content that cannot be previewed. Metadata only.
    OpaqueBinary,
}

/// Response for `GET /files/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub ok: bool,
    pub kind: ContentKind,
    pub mime: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64-encoded file content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Body of `POST /files/mkdir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkdirRequest {
    pub path: String,
    #[serde(default)]
    pub root: Option<String>,
}

/// Encoding of the `content` field of a write request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    /// Content is the literal UTF-8 text to store.
    #[default]
    Utf8,
    /// Content is standard base64 of the bytes to store.
    Base64,
}

/// Body of `POST /files/write`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub encoding: ContentEncoding,
    #[serde(default)]
    pub root: Option<String>,
}

/// Body of `POST /files/rename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRequest {
    pub path: String,
    #[serde(rename = "newPath")]
    pub new_path: String,
    #[serde(default)]
    pub root: Option<String>,
    /// Destination root. Defaults to the source root.
    #[serde(default, rename = "newRoot")]
    pub new_root: Option<String>,
}

/// Body of `POST /files/delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub path: String,
    #[serde(default)]
    pub root: Option<String>,
}

/// A file persisted by an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedFile {
    /// Path relative to the root the file was saved under.
    pub path: String,
}

/// Response for `POST /files/upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub ok: bool,
    pub saved: Vec<SavedFile>,
}

impl UploadResponse {
    pub fn new(saved: Vec<SavedFile>) -> Self {
        Self { ok: true, saved }
    }
}

/// Bare success acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl Default for OkResponse {
    fn default() -> Self {
        Self { ok: true }
    }
}

/// Response for `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    /// Number of configured roots. Zero means file routes are disabled.
    pub roots: usize,
}
