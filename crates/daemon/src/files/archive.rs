//! On-the-fly directory archiving through an external archiver process.
//!
//! The archiver (by default `zip -q -r - .`) runs inside the directory being
//! downloaded and writes the archive to its stdout, which is streamed to the
//! client as it is produced. The child process is owned by a monitor task
//! that kills it as soon as the cancellation token fires; the token is
//! cancelled when the [`ArchiveStream`] is dropped, so a client disconnect
//! stops the archiver promptly.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::process::{ChildStdout, Command};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, warn};

use super::error::FileError;
use crate::config::ArchiveConfig;

/// A zip archive with no entries, served for empty directories.
pub const EMPTY_ZIP: &[u8] = &[
    0x50, 0x4b, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Command line used to archive a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archiver {
    program: String,
    args: Vec<String>,
}

impl Archiver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Start archiving `dir`.
    ///
    /// Waits for the first chunk of output before returning, so an archiver
    /// that cannot start or fails before writing anything is reported as
    /// [`FileError::ArchiveFailed`] while the response can still carry an
    /// error status. Later failures surface as an error item in the stream.
    pub async fn archive(
        &self,
        dir: &Path,
        cancel: CancellationToken,
    ) -> Result<ArchiveStream, FileError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!(program = %self.program, error = %e, "Failed to start archiver");
                FileError::ArchiveFailed(format!("failed to start {}: {}", self.program, e))
            })?;

        let pid = child.id();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FileError::ArchiveFailed("archiver stdout not captured".to_string()))?;

        let (status_tx, status_rx) = oneshot::channel();
        let monitor_cancel = cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                status = child.wait() => status,
                _ = monitor_cancel.cancelled() => {
                    debug!(pid = ?pid, "Archive consumer went away, stopping archiver");
                    if let Err(e) = child.kill().await {
                        warn!(pid = ?pid, error = %e, "Failed to kill archiver");
                    }
                    Err(io::Error::new(io::ErrorKind::Interrupted, "archive cancelled"))
                }
            };
            let _ = status_tx.send(result);
        });

        let mut stream = ArchiveStream {
            pending: None,
            stdout: Some(ReaderStream::new(stdout)),
            status: status_rx,
            finished: false,
            pid,
            _cancel_on_drop: cancel.drop_guard(),
        };

        match stream.next().await {
            Some(Ok(chunk)) => {
                stream.pending = Some(chunk);
                Ok(stream)
            }
            Some(Err(e)) => {
                error!(dir = %dir.display(), error = %e, "Archiver failed before producing output");
                Err(FileError::ArchiveFailed(e.to_string()))
            }
            None => Ok(stream),
        }
    }
}

/// Archive bytes as they come out of the archiver.
///
/// Ends with an error item if the archiver exits unsuccessfully or is
/// cancelled. Dropping the stream cancels and kills the archiver.
pub struct ArchiveStream {
    pending: Option<Bytes>,
    stdout: Option<ReaderStream<ChildStdout>>,
    status: oneshot::Receiver<io::Result<ExitStatus>>,
    finished: bool,
    pid: Option<u32>,
    _cancel_on_drop: DropGuard,
}

impl ArchiveStream {
    /// OS process id of the archiver, if it was still running at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Stream for ArchiveStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(chunk) = this.pending.take() {
            return Poll::Ready(Some(Ok(chunk)));
        }
        if this.finished {
            return Poll::Ready(None);
        }

        if let Some(stdout) = this.stdout.as_mut() {
            match ready!(Pin::new(stdout).poll_next(cx)) {
                Some(Ok(chunk)) => return Poll::Ready(Some(Ok(chunk))),
                Some(Err(e)) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => this.stdout = None,
            }
        }

        let result = ready!(Pin::new(&mut this.status).poll(cx));
        this.finished = true;

        match result {
            Ok(Ok(status)) if status.success() => Poll::Ready(None),
            Ok(Ok(status)) => Poll::Ready(Some(Err(io::Error::other(format!(
                "archiver exited with {}",
                status
            ))))),
            Ok(Err(e)) => Poll::Ready(Some(Err(e))),
            Err(_) => Poll::Ready(Some(Err(io::Error::other("archiver monitor stopped")))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn collect(mut stream: ArchiveStream) -> (Vec<u8>, Option<io::Error>) {
        let mut bytes = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => bytes.extend_from_slice(&chunk),
                Err(e) => return (bytes, Some(e)),
            }
        }
        (bytes, None)
    }

    fn shell(script: &str) -> Archiver {
        Archiver::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_streams_archiver_output() {
        let temp_dir = TempDir::new().unwrap();
        let archiver = shell("printf 'hello '; printf 'world'");

        let stream = archiver
            .archive(temp_dir.path(), CancellationToken::new())
            .await
            .unwrap();
        let (bytes, error) = collect(stream).await;

        assert_eq!(bytes, b"hello world");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_runs_inside_directory() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("marker.txt"), "inside").unwrap();
        let archiver = shell("cat marker.txt");

        let stream = archiver
            .archive(temp_dir.path(), CancellationToken::new())
            .await
            .unwrap();
        let (bytes, _) = collect(stream).await;

        assert_eq!(bytes, b"inside");
    }

    #[tokio::test]
    async fn test_failure_before_output_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let archiver = shell("exit 12");

        let result = archiver
            .archive(temp_dir.path(), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(FileError::ArchiveFailed(_))));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let archiver = Archiver::new("navfiles-no-such-archiver", vec![]);

        let result = archiver
            .archive(temp_dir.path(), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(FileError::ArchiveFailed(_))));
    }

    #[tokio::test]
    async fn test_failure_after_output_ends_stream_with_error() {
        let temp_dir = TempDir::new().unwrap();
        let archiver = shell("printf partial; exit 3");

        let stream = archiver
            .archive(temp_dir.path(), CancellationToken::new())
            .await
            .unwrap();
        let (bytes, error) = collect(stream).await;

        assert_eq!(bytes, b"partial");
        assert!(error.is_some());
    }

    #[tokio::test]
    async fn test_cancel_stops_archiver() {
        let temp_dir = TempDir::new().unwrap();
        let archiver = shell("printf started; exec sleep 30");
        let cancel = CancellationToken::new();

        let mut stream = archiver
            .archive(temp_dir.path(), cancel.clone())
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"started");

        cancel.cancel();

        let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("archiver was not stopped promptly");
        let error = next.unwrap().unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::Interrupted);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_drop_kills_archiver() {
        let temp_dir = TempDir::new().unwrap();
        let archiver = shell("printf started; exec sleep 30");

        let stream = archiver
            .archive(temp_dir.path(), CancellationToken::new())
            .await
            .unwrap();
        let pid = stream.pid().unwrap();
        let proc_path = format!("/proc/{}", pid);
        assert!(Path::new(&proc_path).exists());

        drop(stream);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while Path::new(&proc_path).exists() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "archiver {} still running after consumer dropped",
                pid
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_zip_archive_of_directory() {
        if which::which("zip").is_err() {
            eprintln!("zip not installed, skipping");
            return;
        }

        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("routes")).unwrap();
        std::fs::write(temp_dir.path().join("routes/harbour.gpx"), "<gpx/>").unwrap();

        let archiver = Archiver::from_config(&ArchiveConfig::default());
        let stream = archiver
            .archive(temp_dir.path(), CancellationToken::new())
            .await
            .unwrap();
        let (bytes, error) = collect(stream).await;

        assert!(error.is_none());
        assert_eq!(&bytes[..2], b"PK");
        let needle = b"routes/harbour.gpx";
        assert!(bytes.windows(needle.len()).any(|w| w == needle));
    }
}
