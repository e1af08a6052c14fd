//! Streamed multipart uploads.
//!
//! An [`UploadSession`] follows one multipart request. Text fields pick the
//! destination; each file part is written to a hidden temporary file next to
//! its final location and renamed into place once complete, so an interrupted
//! part never leaves a truncated file under the final name.

use std::fmt::Display;
use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use protocol::SavedFile;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::browser::create_directory;
use super::containment::ResolvedPath;
use super::error::{FileError, UploadPartError};
use super::roots::RootRegistry;

const TEMP_PREFIX: &str = ".navfiles-upload-";

/// Last path segment of a client-declared filename.
///
/// Both `/` and `\` count as separators whatever the platform.
pub fn basename(declared: &str) -> &str {
    declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
}

/// State of one multipart upload request.
pub struct UploadSession<'a> {
    registry: &'a RootRegistry,
    max_part_bytes: u64,
    dir: String,
    root: Option<String>,
    destination: Option<ResolvedPath>,
    destination_fixed: bool,
    saved: Vec<SavedFile>,
}

impl<'a> UploadSession<'a> {
    pub fn new(registry: &'a RootRegistry, max_part_bytes: u64) -> Self {
        Self {
            registry,
            max_part_bytes,
            dir: String::new(),
            root: None,
            destination: None,
            destination_fixed: false,
            saved: Vec::new(),
        }
    }

    /// Set the destination directory from the `dir` field.
    pub fn set_dir(&mut self, dir: impl Into<String>) {
        if self.destination_fixed {
            warn!("Ignoring dir field sent after the first file part");
            return;
        }
        self.dir = dir.into();
    }

    /// Set the destination root from the `root` field.
    pub fn set_root(&mut self, root: impl Into<String>) {
        if self.destination_fixed {
            warn!("Ignoring root field sent after the first file part");
            return;
        }
        let root = root.into();
        self.root = (!root.is_empty()).then_some(root);
    }

    /// Files saved so far.
    pub fn saved(&self) -> &[SavedFile] {
        &self.saved
    }

    /// Consume the session, returning every saved file.
    pub fn finish(self) -> Vec<SavedFile> {
        self.saved
    }

    /// Receive one file part, logging and skipping it if it cannot be saved.
    pub async fn receive_file<S, E>(&mut self, declared_name: Option<&str>, body: S)
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        if let Err(e) = self.save_part(declared_name, body).await {
            warn!(error = %e, "Discarded upload part");
        }
    }

    /// Save one file part.
    ///
    /// Returns `Ok(None)` for parts without a usable filename. On error the
    /// rest of the part is drained and no file is left behind.
    pub async fn save_part<S, E>(
        &mut self,
        declared_name: Option<&str>,
        body: S,
    ) -> Result<Option<SavedFile>, UploadPartError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        tokio::pin!(body);

        let name = declared_name.map(basename).unwrap_or("");
        if name.is_empty() || name == "." || name == ".." {
            debug!(declared = ?declared_name, "Skipping upload part without a filename");
            drain(&mut body).await;
            return Ok(None);
        }
        let file_name = name.to_string();

        let result = match self.destination().await {
            Ok(destination) => {
                store(&destination, &file_name, &mut body, self.max_part_bytes).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(saved) => {
                self.saved.push(saved.clone());
                Ok(Some(saved))
            }
            Err(source) => {
                drain(&mut body).await;
                Err(UploadPartError { file_name, source })
            }
        }
    }

    /// Resolve and create the destination directory, fixing it on first use.
    async fn destination(&mut self) -> Result<ResolvedPath, FileError> {
        self.destination_fixed = true;

        if let Some(resolved) = &self.destination {
            return Ok(resolved.clone());
        }

        let resolved = self
            .registry
            .resolve_path(self.root.as_deref(), &self.dir)?;
        create_directory(&resolved).await?;
        debug!(root = %resolved.root.id, dir = %resolved.relative_path, "Upload destination ready");
        self.destination = Some(resolved.clone());
        Ok(resolved)
    }
}

async fn store<S, E>(
    destination: &ResolvedPath,
    file_name: &str,
    body: &mut Pin<&mut S>,
    max_part_bytes: u64,
) -> Result<SavedFile, FileError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let relative = destination.child_relative(file_name);
    let final_path = destination.absolute_path.join(file_name);

    if let Ok(metadata) = fs::metadata(&final_path).await {
        if metadata.is_dir() {
            return Err(FileError::NotAFile(super::error::display_path(&relative)));
        }
    }

    let temp_path = destination
        .absolute_path
        .join(format!("{}{:016x}", TEMP_PREFIX, rand::random::<u64>()));

    match write_temp(&temp_path, body, max_part_bytes).await {
        Ok(written) => {
            if let Err(e) = fs::rename(&temp_path, &final_path).await {
                remove_temp(&temp_path).await;
                return Err(FileError::from_io(e, &relative));
            }
            info!(root = %destination.root.id, path = %relative, bytes = written, "Saved upload");
            Ok(SavedFile { path: relative })
        }
        Err(e) => {
            remove_temp(&temp_path).await;
            Err(e)
        }
    }
}

async fn write_temp<S, E>(
    temp_path: &Path,
    body: &mut Pin<&mut S>,
    max_part_bytes: u64,
) -> Result<u64, FileError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut file = File::create(temp_path).await?;
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            FileError::Io(std::io::Error::other(format!("upload stream failed: {}", e)))
        })?;

        written += chunk.len() as u64;
        if written > max_part_bytes {
            return Err(FileError::PartTooLarge {
                limit: max_part_bytes,
            });
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

async fn remove_temp(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = ?temp_path, error = %e, "Failed to clean up upload temp file");
        }
    }
}

async fn drain<S, E>(body: &mut Pin<&mut S>)
where
    S: Stream<Item = Result<Bytes, E>>,
{
    while let Some(chunk) = body.next().await {
        if chunk.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::roots::FileRoot;
    use futures_util::stream;
    use std::io;
    use tempfile::TempDir;

    fn registry_for(dirs: &[(&str, &Path)]) -> RootRegistry {
        RootRegistry::new(
            dirs.iter()
                .map(|(id, path)| FileRoot::new(*id, *id, std::fs::canonicalize(path).unwrap()))
                .collect(),
        )
    }

    fn body(chunks: &[&'static str]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        stream::iter(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(TEMP_PREFIX))
            .collect()
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("track.gpx"), "track.gpx");
        assert_eq!(basename("C:\\Users\\me\\track.gpx"), "track.gpx");
        assert_eq!(basename("../../etc/passwd"), "passwd");
        assert_eq!(basename("dir/"), "");
        assert_eq!(basename(""), "");
        assert_eq!(basename("logs/ watch log .txt"), " watch log .txt");
    }

    #[tokio::test]
    async fn test_saves_into_dir_field() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_for(&[("media", temp_dir.path())]);
        let mut session = UploadSession::new(&registry, 1024);

        session.set_dir("photos/2024");
        let saved = session
            .save_part(Some("harbour.jpg"), body(&["abc", "def"]))
            .await
            .unwrap();

        assert_eq!(
            saved,
            Some(SavedFile {
                path: "photos/2024/harbour.jpg".to_string()
            })
        );
        let stored = std::fs::read(temp_dir.path().join("photos/2024/harbour.jpg")).unwrap();
        assert_eq!(stored, b"abcdef");
        assert!(leftovers(&temp_dir.path().join("photos/2024")).is_empty());
    }

    #[tokio::test]
    async fn test_selects_root_field() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let registry = registry_for(&[("charts", first.path()), ("tracks", second.path())]);
        let mut session = UploadSession::new(&registry, 1024);

        session.set_root("tracks");
        session.receive_file(Some("a.gpx"), body(&["<gpx/>"])).await;

        assert_eq!(session.finish(), vec![SavedFile { path: "a.gpx".to_string() }]);
        assert!(second.path().join("a.gpx").is_file());
        assert!(!first.path().join("a.gpx").exists());
    }

    #[tokio::test]
    async fn test_strips_directories_from_filename() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_for(&[("media", temp_dir.path())]);
        let mut session = UploadSession::new(&registry, 1024);

        session
            .receive_file(Some("..\\..\\evil.sh"), body(&["x"]))
            .await;

        assert_eq!(session.saved()[0].path, "evil.sh");
        assert!(temp_dir.path().join("evil.sh").is_file());
    }

    #[tokio::test]
    async fn test_failed_part_does_not_stop_the_rest() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("first.txt")).unwrap();
        let registry = registry_for(&[("media", temp_dir.path())]);
        let mut session = UploadSession::new(&registry, 1024);

        let result = session.save_part(Some("first.txt"), body(&["1"])).await;
        assert!(matches!(
            result,
            Err(UploadPartError { ref file_name, source: FileError::NotAFile(_) }) if file_name == "first.txt"
        ));

        session.receive_file(Some("second.txt"), body(&["2"])).await;

        assert_eq!(
            session.finish(),
            vec![SavedFile {
                path: "second.txt".to_string()
            }]
        );
        assert!(temp_dir.path().join("first.txt").is_dir());
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("second.txt")).unwrap(),
            "2"
        );
    }

    #[tokio::test]
    async fn test_destination_retried_after_creation_fails() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("blocked"), "a file in the way").unwrap();
        let registry = registry_for(&[("media", temp_dir.path())]);
        let mut session = UploadSession::new(&registry, 1024);

        session.set_dir("blocked");
        let result = session.save_part(Some("a.txt"), body(&["a"])).await;
        assert!(matches!(
            result,
            Err(UploadPartError { ref file_name, source: FileError::NotADirectory(_) }) if file_name == "a.txt"
        ));

        std::fs::remove_file(temp_dir.path().join("blocked")).unwrap();
        session.receive_file(Some("b.txt"), body(&["b"])).await;

        assert_eq!(
            session.finish(),
            vec![SavedFile {
                path: "blocked/b.txt".to_string()
            }]
        );
        assert!(!temp_dir.path().join("blocked/a.txt").exists());
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("blocked/b.txt")).unwrap(),
            "b"
        );
    }

    #[tokio::test]
    async fn test_oversize_part_leaves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_for(&[("media", temp_dir.path())]);
        let mut session = UploadSession::new(&registry, 4);

        let result = session.save_part(Some("big.bin"), body(&["abc", "def"])).await;

        assert!(matches!(
            result,
            Err(UploadPartError {
                source: FileError::PartTooLarge { limit: 4 },
                ..
            })
        ));
        assert!(!temp_dir.path().join("big.bin").exists());
        assert!(leftovers(temp_dir.path()).is_empty());
        assert!(session.saved().is_empty());
    }

    #[tokio::test]
    async fn test_stream_error_leaves_no_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("log.txt"), "previous").unwrap();
        let registry = registry_for(&[("media", temp_dir.path())]);
        let mut session = UploadSession::new(&registry, 1024);

        let broken = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);
        let result = session.save_part(Some("log.txt"), broken).await;

        assert!(result.is_err());
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("log.txt")).unwrap(),
            "previous"
        );
        assert!(leftovers(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_destination() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_for(&[("media", temp_dir.path())]);
        let mut session = UploadSession::new(&registry, 1024);

        session.set_dir("../outside");
        let result = session.save_part(Some("a.txt"), body(&["a"])).await;
        assert!(matches!(
            result,
            Err(UploadPartError {
                source: FileError::PathTraversal(_),
                ..
            })
        ));

        let mut session = UploadSession::new(&registry, 1024);
        session.set_root("nope");
        let result = session.save_part(Some("a.txt"), body(&["a"])).await;
        assert!(matches!(
            result,
            Err(UploadPartError {
                source: FileError::RootNotFound(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_destination_fixed_after_first_file() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_for(&[("media", temp_dir.path())]);
        let mut session = UploadSession::new(&registry, 1024);

        session.set_dir("first");
        session.receive_file(Some("a.txt"), body(&["a"])).await;
        session.set_dir("second");
        session.receive_file(Some("b.txt"), body(&["b"])).await;

        let paths: Vec<_> = session.saved().iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["first/a.txt", "first/b.txt"]);
        assert!(!temp_dir.path().join("second").exists());
    }

    #[tokio::test]
    async fn test_parts_without_filename_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_for(&[("media", temp_dir.path())]);
        let mut session = UploadSession::new(&registry, 1024);

        assert_eq!(session.save_part(None, body(&["x"])).await.unwrap(), None);
        assert_eq!(
            session.save_part(Some("folder/"), body(&["x"])).await.unwrap(),
            None
        );
        assert!(session.saved().is_empty());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
