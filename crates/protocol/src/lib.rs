//! # NavFiles Protocol Library
//!
//! Wire types for the NavFiles file-manager API. The daemon serializes these
//! as JSON; browser clients consume the same shapes.
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::messages::{ContentEncoding, WriteRequest};
//!
//! let request: WriteRequest = serde_json::from_str(
//!     r#"{"path": "routes/harbour.gpx", "content": "<gpx/>"}"#,
//! )
//! .unwrap();
//! assert_eq!(request.encoding, ContentEncoding::Utf8);
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: request, query and response bodies
//! - [`error`]: error categories and the error body

pub mod error;
pub mod messages;

pub use error::{ErrorCode, ErrorResponse};
pub use messages::{
    ContentEncoding, ContentKind, DeleteRequest, EntryKind, FileEntry, HealthResponse, ListQuery,
    ListResponse, MkdirRequest, OkResponse, PathQuery, ReadResponse, RenameRequest, RootInfo,
    RootsResponse, SavedFile, UploadResponse, WriteRequest,
};
