//! Error categories and the JSON error body.

use serde::{Deserialize, Serialize};

/// Error categories reported to clients.
///
/// The category fixes the HTTP status of the response; the human-readable
/// message travels in [`ErrorResponse::error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed request, invalid path or wrong entry kind.
    InvalidRequest,
    /// The client attempted to escape a configured root.
    PathTraversal,
    /// Unknown root or missing filesystem entry.
    NotFound,
    /// File exceeds the inline preview ceiling.
    PayloadTooLarge,
    /// Archive or filesystem failure on the server.
    InternalError,
}

impl ErrorCode {
    /// HTTP status code for this category.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest | Self::PathTraversal => 400,
            Self::NotFound => 404,
            Self::PayloadTooLarge => 413,
            Self::InternalError => 500,
        }
    }
}

/// Body of every failed request: `{"ok": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}
