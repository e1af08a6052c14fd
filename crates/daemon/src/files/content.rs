//! File content for inline preview and for download.

use std::io;
use std::path::Path;

use base64::Engine;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use protocol::{ContentKind, ReadResponse};
use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::archive::{ArchiveStream, Archiver, EMPTY_ZIP};
use super::containment::ResolvedPath;
use super::error::FileError;

/// Fallback for unknown extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

const ZIP_MIME: &str = "application/zip";

/// Extension to MIME type. Extensions are matched lowercase.
const MIME_TYPES: &[(&str, &str)] = &[
    // Text and structured data
    ("txt", "text/plain"),
    ("log", "text/plain"),
    ("nmea", "text/plain"),
    ("ini", "text/plain"),
    ("conf", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("geojson", "application/geo+json"),
    ("xml", "application/xml"),
    ("gpx", "application/gpx+xml"),
    ("kml", "application/vnd.google-earth.kml+xml"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("toml", "application/toml"),
    ("sh", "application/x-sh"),
    // Images
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    // Audio and video
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("m4a", "audio/mp4"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    // Documents and archives
    ("pdf", "application/pdf"),
    ("zip", ZIP_MIME),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("kmz", "application/vnd.google-earth.kmz"),
    ("mbtiles", "application/vnd.sqlite3"),
];

/// Extensions previewed as UTF-8 text.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "log", "nmea", "ini", "conf", "md", "csv", "html", "htm", "css", "js", "json",
    "geojson", "xml", "gpx", "kml", "yaml", "yml", "toml", "sh",
];

/// MIME prefixes the browser can render inline.
const PREVIEWABLE_PREFIXES: &[&str] = &["image/", "audio/", "video/"];

const PDF_MIME: &str = "application/pdf";

fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// MIME type for a path, from its extension.
pub fn mime_for_path(path: &str) -> &'static str {
    extension_of(path)
        .and_then(|ext| {
            MIME_TYPES
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, mime)| *mime)
        })
        .unwrap_or(OCTET_STREAM)
}

/// Whether the extension of `path` is in the text set.
pub fn is_text_path(path: &str) -> bool {
    extension_of(path)
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Whether a MIME type can be previewed inline as binary.
pub fn is_previewable_mime(mime: &str) -> bool {
    mime == PDF_MIME || PREVIEWABLE_PREFIXES.iter().any(|p| mime.starts_with(p))
}

/// Classify a file for preview.
pub fn classify(path: &str, mime: &str) -> ContentKind {
    if is_text_path(path) {
        ContentKind::Text
    } else if is_previewable_mime(mime) {
        ContentKind::PreviewableBinary
    } else {
        ContentKind::OpaqueBinary
    }
}

/// Inline content of a preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewPayload {
    Text(String),
    Binary(Vec<u8>),
}

/// Result of a preview read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPreview {
    pub kind: ContentKind,
    pub mime: &'static str,
    pub size: u64,
    /// Present for text and previewable binaries only.
    pub payload: Option<PreviewPayload>,
}

impl ContentPreview {
    /// Convert to the wire representation, base64-encoding binary payloads.
    pub fn to_protocol(&self) -> ReadResponse {
        let (text, data) = match &self.payload {
            Some(PreviewPayload::Text(text)) => (Some(text.clone()), None),
            Some(PreviewPayload::Binary(bytes)) => (
                None,
                Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            ),
            None => (None, None),
        };

        ReadResponse {
            ok: true,
            kind: self.kind,
            mime: self.mime.to_string(),
            size: self.size,
            text,
            data,
        }
    }
}

/// Read a file for inline preview.
///
/// Files larger than `preview_max_bytes` are refused whatever their kind;
/// clients must download them instead.
pub async fn read_preview(
    file: &ResolvedPath,
    preview_max_bytes: u64,
) -> Result<ContentPreview, FileError> {
    let metadata = fs::metadata(&file.absolute_path)
        .await
        .map_err(|e| FileError::from_io(e, &file.relative_path))?;

    if metadata.is_dir() {
        return Err(FileError::NotAFile(file.display()));
    }

    let size = metadata.len();
    if size > preview_max_bytes {
        return Err(FileError::FileTooLarge {
            size,
            limit: preview_max_bytes,
        });
    }

    let mime = mime_for_path(&file.relative_path);
    let kind = classify(&file.relative_path, mime);

    let payload = match kind {
        ContentKind::OpaqueBinary => None,
        ContentKind::Text => {
            let bytes = read_all(file).await?;
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            };
            Some(PreviewPayload::Text(text))
        }
        ContentKind::PreviewableBinary => Some(PreviewPayload::Binary(read_all(file).await?)),
    };

    debug!(root = %file.root.id, path = %file.relative_path, size, mime, "Read file preview");

    Ok(ContentPreview {
        kind,
        mime,
        size,
        payload,
    })
}

async fn read_all(file: &ResolvedPath) -> Result<Vec<u8>, FileError> {
    fs::read(&file.absolute_path)
        .await
        .map_err(|e| FileError::from_io(e, &file.relative_path))
}

/// Body of a download.
pub enum DownloadBody {
    /// Raw file bytes.
    File(File),
    /// Directory archive produced by the archiver.
    Archive(ArchiveStream),
    /// Archive of an empty directory.
    EmptyArchive,
}

/// A download ready to be streamed.
pub struct Download {
    /// Suggested filename for `Content-Disposition`.
    pub file_name: String,
    pub mime: &'static str,
    /// Known length for plain files.
    pub size: Option<u64>,
    pub body: DownloadBody,
}

impl Download {
    /// Byte stream of the download contents.
    pub fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        match self.body {
            DownloadBody::File(file) => ReaderStream::new(file).boxed(),
            DownloadBody::Archive(archive) => archive.boxed(),
            DownloadBody::EmptyArchive => {
                stream::once(async { Ok(Bytes::from_static(EMPTY_ZIP)) }).boxed()
            }
        }
    }

    /// Copy the whole download into `out`, returning the number of bytes written.
    pub async fn copy_to<W>(self, out: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self.into_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.try_next().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        Ok(written)
    }
}

/// Open a file or directory for download.
///
/// Files stream as-is with no size limit. Directories are archived on the
/// fly; `cancel` stops the archiver, and is also cancelled when the returned
/// stream is dropped.
pub async fn open_download(
    target: &ResolvedPath,
    archiver: &Archiver,
    cancel: CancellationToken,
) -> Result<Download, FileError> {
    let metadata = fs::metadata(&target.absolute_path)
        .await
        .map_err(|e| FileError::from_io(e, &target.relative_path))?;

    if !metadata.is_dir() {
        let file = File::open(&target.absolute_path)
            .await
            .map_err(|e| FileError::from_io(e, &target.relative_path))?;

        return Ok(Download {
            file_name: target
                .file_name()
                .unwrap_or(target.root.id.as_str())
                .to_string(),
            mime: mime_for_path(&target.relative_path),
            size: Some(metadata.len()),
            body: DownloadBody::File(file),
        });
    }

    let file_name = format!(
        "{}.zip",
        target.file_name().unwrap_or(target.root.id.as_str())
    );

    let mut read_dir = fs::read_dir(&target.absolute_path)
        .await
        .map_err(|e| FileError::from_io(e, &target.relative_path))?;
    let body = if read_dir.next_entry().await?.is_none() {
        DownloadBody::EmptyArchive
    } else {
        debug!(root = %target.root.id, path = %target.relative_path, "Archiving directory for download");
        DownloadBody::Archive(archiver.archive(&target.absolute_path, cancel).await?)
    };

    Ok(Download {
        file_name,
        mime: ZIP_MIME,
        size: None,
        body,
    })
}
