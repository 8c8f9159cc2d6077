//! Delivery of retrieved media to the requester
//!
//! Both delivery paths own the transient file and remove it exactly once,
//! whether the transfer completes, fails or is abandoned by the requester.

use crate::error::{Error, Result};
use crate::retrieval::{CompletedRetrieval, TransientFile};
use crate::types::SessionId;
use bytes::Bytes;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_stream::Stream;
use tokio_util::io::ReaderStream;

/// MIME type for a container extension
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

/// Open the retrieved file as a byte stream
///
/// # Errors
///
/// Returns [`Error::ArtifactMissing`] when the fetch tool reported success
/// but left no file behind.
pub async fn open_artifact(completed: CompletedRetrieval) -> Result<ArtifactStream> {
    let CompletedRetrieval {
        session,
        file,
        attachment_name,
    } = completed;

    let handle = match File::open(file.path()).await {
        Ok(handle) => handle,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::error!(
                session_id = %session.id,
                path = %file.path().display(),
                "fetch tool reported success but produced no file"
            );
            let path = file.path().to_path_buf();
            file.remove().await;
            return Err(Error::ArtifactMissing { path });
        }
        Err(e) => {
            file.remove().await;
            return Err(Error::Io(e));
        }
    };

    let content_length = match handle.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            drop(handle);
            file.remove().await;
            return Err(Error::Io(e));
        }
    };

    let content_type = content_type_for(
        file.path()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default(),
    );

    Ok(ArtifactStream {
        session_id: session.id,
        reader: Some(ReaderStream::new(handle)),
        file: Some(file),
        content_length,
        content_type,
        file_name: attachment_name,
        bytes_sent: 0,
    })
}

/// Byte stream over a retrieved media file
///
/// The file is removed when the stream ends, when a read fails, or when the
/// stream is dropped early.
#[derive(Debug)]
pub struct ArtifactStream {
    session_id: SessionId,
    reader: Option<ReaderStream<File>>,
    file: Option<TransientFile>,
    content_length: u64,
    content_type: &'static str,
    file_name: String,
    bytes_sent: u64,
}

impl ArtifactStream {
    /// Size of the file in bytes
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// MIME type derived from the container
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// File name offered to the requester
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Value of the `Content-Disposition` header
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.file_name)
    }

    fn finish(&mut self) {
        // close the handle before unlinking
        self.reader = None;
        if let Some(file) = self.file.take() {
            let complete = self.bytes_sent == self.content_length;
            tracing::debug!(
                session_id = %self.session_id,
                bytes_sent = self.bytes_sent,
                complete,
                "media stream finished"
            );
            // the guard's drop removes the file if the task never runs
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(file.remove());
                }
                Err(_) => drop(file),
            }
        }
    }
}

impl Stream for ArtifactStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(reader) = this.reader.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(reader).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(session_id = %this.session_id, error = %e, "failed to read media file");
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ArtifactStream {
    fn drop(&mut self) {
        if self.file.is_some() {
            tracing::info!(
                session_id = %self.session_id,
                bytes_sent = self.bytes_sent,
                "media stream abandoned before completion"
            );
        }
        self.finish();
    }
}

/// Copy the retrieved file into `sink`
///
/// The file is removed whether or not the copy succeeds. Returns the number
/// of bytes written.
pub async fn stream_to_sink<W>(completed: CompletedRetrieval, sink: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let CompletedRetrieval { session, file, .. } = completed;

    let mut handle = match File::open(file.path()).await {
        Ok(handle) => handle,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let path = file.path().to_path_buf();
            file.remove().await;
            return Err(Error::ArtifactMissing { path });
        }
        Err(e) => {
            file.remove().await;
            return Err(Error::Io(e));
        }
    };

    let copied = async {
        let written = tokio::io::copy(&mut handle, sink).await?;
        sink.flush().await?;
        Ok::<u64, io::Error>(written)
    }
    .await;

    drop(handle);
    file.remove().await;

    match copied {
        Ok(written) => {
            tracing::debug!(session_id = %session.id, bytes = written, "media copied to sink");
            Ok(written)
        }
        Err(e) => {
            tracing::warn!(session_id = %session.id, error = %e, "failed to copy media to sink");
            Err(Error::Io(e))
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::RetrievalSession;
    use crate::types::{Rendition, SessionState};
    use std::path::Path;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    async fn removed(path: &Path) -> bool {
        for _ in 0..100 {
            if !path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn completed(dir: &Path, contents: Option<&[u8]>) -> CompletedRetrieval {
        let file = TransientFile::allocate(dir, "x-video", "mp4");
        if let Some(contents) = contents {
            std::fs::write(file.path(), contents).unwrap();
        }
        let mut session = RetrievalSession::new(
            SessionId(1),
            "https://x.com/u/status/1",
            Rendition {
                format_identifier: "http-832".to_string(),
                quality_label: "720p".to_string(),
                container_format: "mp4".to_string(),
                size_bytes: 0,
            },
            file.path().to_path_buf(),
        );
        session.transition(SessionState::Running);
        session.transition(SessionState::Succeeded);
        CompletedRetrieval {
            session,
            file,
            attachment_name: "x-video-1700000000000.mp4".to_string(),
        }
    }

    #[test]
    fn maps_containers_to_content_types() {
        assert_eq!(content_type_for("mp4"), "video/mp4");
        assert_eq!(content_type_for("MP4"), "video/mp4");
        assert_eq!(content_type_for("webm"), "video/webm");
        assert_eq!(content_type_for("unknown"), "application/octet-stream");
    }

    #[tokio::test]
    async fn streams_whole_file_then_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let payload = vec![7u8; 200_000];
        let completed = completed(dir.path(), Some(&payload));
        let path = completed.file.path().to_path_buf();

        let mut stream = open_artifact(completed).await.unwrap();
        assert_eq!(stream.content_length(), 200_000);
        assert_eq!(stream.content_type(), "video/mp4");
        assert_eq!(
            stream.content_disposition(),
            "attachment; filename=\"x-video-1700000000000.mp4\""
        );

        let mut received = Vec::new();
        while let Some(chunk) = stream.next().await {
            received.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(received, payload);
        assert!(removed(&path).await);
    }

    #[tokio::test]
    async fn dropping_stream_early_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let completed = completed(dir.path(), Some(&vec![1u8; 100_000]));
        let path = completed.file.path().to_path_buf();

        let mut stream = open_artifact(completed).await.unwrap();
        let _first = stream.next().await.unwrap().unwrap();
        assert!(path.exists());
        drop(stream);
        assert!(removed(&path).await);
    }

    #[test]
    fn stream_finished_outside_a_runtime_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let completed = completed(dir.path(), Some(b"media-bytes"));
        let path = completed.file.path().to_path_buf();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let stream = runtime.block_on(open_artifact(completed)).unwrap();
        drop(runtime);

        drop(stream);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let completed = completed(dir.path(), None);
        let err = open_artifact(completed).await.unwrap_err();
        assert!(matches!(err, Error::ArtifactMissing { .. }));
    }

    #[tokio::test]
    async fn copies_to_sink_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let completed = completed(dir.path(), Some(b"media-bytes"));
        let path = completed.file.path().to_path_buf();

        let mut sink = Vec::new();
        let written = stream_to_sink(completed, &mut sink).await.unwrap();
        assert_eq!(written, 11);
        assert_eq!(sink, b"media-bytes");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn failed_sink_still_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let completed = completed(dir.path(), Some(b"media-bytes"));
        let path = completed.file.path().to_path_buf();

        let mut sink = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "requester went away"))
            .build();
        let err = stream_to_sink(completed, &mut sink).await.unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_file_for_sink_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let completed = completed(dir.path(), None);
        let mut sink = Vec::new();
        let err = stream_to_sink(completed, &mut sink).await.unwrap_err();
        assert!(matches!(err, Error::ArtifactMissing { .. }));
        assert!(sink.is_empty());
    }
}
