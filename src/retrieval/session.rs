//! Retrieval sessions and their transient files

use crate::types::{Rendition, SessionId, SessionState};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TRANSIENT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Scoped owner of a transient media file
///
/// The file is removed at most once: by [`remove`](Self::remove), or on drop
/// if nothing removed it before. Removal failures are logged and never
/// returned.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
    armed: bool,
}

impl TransientFile {
    /// Reserve a unique path in `dir`
    ///
    /// The name combines the prefix, the current time, a process-wide counter
    /// and a random suffix, so concurrent sessions never collide. No file is
    /// created; the fetch tool writes it.
    pub fn allocate(dir: &Path, prefix: &str, extension: &str) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let sequence = TRANSIENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let suffix: u32 = rand::random();

        let name = format!("{prefix}-{millis}-{sequence}-{suffix:08x}.{extension}");
        Self {
            path: dir.join(name),
            armed: true,
        }
    }

    /// Location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now
    pub async fn remove(mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed transient file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove transient file"
            ),
        }
    }

    fn remove_now(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed transient file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove transient file"
            ),
        }
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        self.remove_now();
    }
}

/// One end-to-end retrieval of one rendition
#[derive(Debug, Clone)]
pub struct RetrievalSession {
    /// Session identifier, unique per process
    pub id: SessionId,
    /// Source post URL
    pub source_url: String,
    /// Rendition being fetched
    pub chosen_rendition: Rendition,
    /// Where the fetch tool writes the media
    pub transient_path: PathBuf,
    state: SessionState,
}

impl RetrievalSession {
    /// Create a session in the `Pending` state
    pub fn new(
        id: SessionId,
        source_url: impl Into<String>,
        chosen_rendition: Rendition,
        transient_path: PathBuf,
    ) -> Self {
        Self {
            id,
            source_url: source_url.into(),
            chosen_rendition,
            transient_path,
            state: SessionState::Pending,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next` if the transition is allowed
    ///
    /// Allowed: `Pending -> Running`, `Pending -> Failed`, `Running -> Succeeded`,
    /// `Running -> Failed`. Terminal states never change. Returns whether the
    /// state changed.
    pub fn transition(&mut self, next: SessionState) -> bool {
        let allowed = matches!(
            (self.state, next),
            (SessionState::Pending, SessionState::Running)
                | (SessionState::Pending, SessionState::Failed)
                | (SessionState::Running, SessionState::Succeeded)
                | (SessionState::Running, SessionState::Failed)
        );
        if allowed {
            tracing::debug!(
                session_id = %self.id,
                from = ?self.state,
                to = ?next,
                "session state change"
            );
            self.state = next;
        } else {
            tracing::warn!(
                session_id = %self.id,
                from = ?self.state,
                to = ?next,
                "ignored invalid session state change"
            );
        }
        allowed
    }
}

/// A successful retrieval whose media file is ready to be streamed
///
/// Owns the transient file; dropping it without streaming removes the file.
#[derive(Debug)]
pub struct CompletedRetrieval {
    /// The finished session (state `Succeeded`)
    pub session: RetrievalSession,
    /// The fetched media file
    pub file: TransientFile,
    /// File name offered to the requester
    pub attachment_name: String,
}
