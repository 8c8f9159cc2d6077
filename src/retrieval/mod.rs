//! Retrieval orchestration
//!
//! A [`Retriever`] ties the pieces of one retrieval together: it resolves the
//! renditions of a post, selects the requested one, runs the fetch tool into a
//! transient file while pumping its progress into the broadcaster, and hands
//! the finished file to the caller as a [`CompletedRetrieval`].
//!
//! Every exit path either transfers the transient file to the caller or
//! removes it. No step is retried.

mod pump;
mod session;

pub use pump::{PumpSummary, spawn_progress_pump};
pub use session::{CompletedRetrieval, RetrievalSession, TransientFile};

use crate::broadcaster::ProgressBroadcaster;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::{
    CliMediaFetcher, FetchRequest, MediaFetcher, classify_failure, parse_metadata_output,
    post_content_from_metadata,
};
use crate::renditions::{resolve_renditions, select_rendition};
use crate::types::{PostContent, Rendition, SessionId, SessionState};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long to wait for the progress pump after the process exited
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the stderr collector after the process exited
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Check that `url` is an absolute http(s) URL
pub fn validate_source_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url.trim())
        .map_err(|e| Error::Validation(format!("invalid url: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::Validation(format!(
            "unsupported url scheme: {}",
            other
        ))),
    }
}

/// Key identifying a retrieval for the one-at-a-time rule
fn session_key(url: &str, format_identifier: &str) -> String {
    format!("{}#{}", url.trim(), format_identifier)
}

/// Extension of the fetched file: the rendition's container, or `fallback`
/// when the source did not report a usable one
fn file_extension<'a>(rendition: &'a Rendition, fallback: &'a str) -> &'a str {
    let container = rendition.container_format.as_str();
    if container.is_empty()
        || container == "unknown"
        || !container.chars().all(|c| c.is_ascii_alphanumeric())
    {
        fallback
    } else {
        container
    }
}

/// Claim on a session key, released on drop
struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlightGuard {
    fn claim(keys: &Arc<Mutex<HashSet<String>>>, key: String) -> Result<Self> {
        let mut set = keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(key.clone()) {
            return Err(Error::RetrievalInProgress { key });
        }
        Ok(Self {
            keys: Arc::clone(keys),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Retrieval orchestrator
///
/// Cheap to clone; clones share the fetcher, the broadcaster and the
/// in-flight registry.
#[derive(Clone)]
pub struct Retriever {
    config: Arc<Config>,
    fetcher: Arc<dyn MediaFetcher>,
    broadcaster: Arc<ProgressBroadcaster>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    next_session: Arc<AtomicU64>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("config", &self.config)
            .field("broadcaster", &self.broadcaster)
            .field("in_flight", &self.in_flight)
            .field("next_session", &self.next_session)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Create a retriever that runs the configured yt-dlp binary
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the temp directory cannot be
    /// created or the binary cannot be located.
    pub async fn new(config: Config, broadcaster: Arc<ProgressBroadcaster>) -> Result<Self> {
        let fetcher = CliMediaFetcher::from_config(&config.tool, &config.retrieval)?;
        tracing::info!(binary = %fetcher.binary_path().display(), "using fetch tool");
        Self::with_fetcher(config, Arc::new(fetcher), broadcaster).await
    }

    /// Create a retriever around any [`MediaFetcher`]
    pub async fn with_fetcher(
        config: Config,
        fetcher: Arc<dyn MediaFetcher>,
        broadcaster: Arc<ProgressBroadcaster>,
    ) -> Result<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.retrieval.temp_dir).await?;

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            broadcaster,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            next_session: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Broadcaster receiving this retriever's progress
    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    /// Number of retrievals currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// List the renditions of a post, highest quality first
    pub async fn renditions(&self, url: &str) -> Result<Vec<Rendition>> {
        validate_source_url(url)?;
        resolve_renditions(self.fetcher.as_ref(), url.trim()).await
    }

    /// Text, author and counters of a post
    pub async fn post_content(&self, url: &str) -> Result<PostContent> {
        validate_source_url(url)?;
        let output = self.fetcher.query_metadata(url.trim()).await?;
        let metadata = parse_metadata_output(&output)?;
        Ok(post_content_from_metadata(&metadata))
    }

    /// Resolve, select and fetch the rendition labeled `quality`
    ///
    /// # Errors
    ///
    /// - [`Error::RenditionNotFound`] before any fetch process starts
    /// - classification errors from the metadata query
    /// - everything [`fetch_rendition`](Self::fetch_rendition) returns
    pub async fn retrieve(
        &self,
        url: &str,
        quality: &str,
        cancel: CancellationToken,
    ) -> Result<CompletedRetrieval> {
        let renditions = self.renditions(url).await?;
        let rendition = select_rendition(&renditions, quality)?;
        self.fetch_rendition(url.trim(), rendition, cancel).await
    }

    /// Fetch an already selected rendition into a transient file
    ///
    /// # Errors
    ///
    /// - [`Error::FileTooLarge`] when the known size exceeds the configured limit
    /// - [`Error::RetrievalInProgress`] when the same rendition is already being fetched
    /// - [`Error::ContentRestricted`] / [`Error::ContentUnavailable`] when the tool
    ///   exits non-zero with a recognized stderr marker
    /// - [`Error::ExternalToolFailure`] for any other non-zero exit
    /// - [`Error::Cancelled`] when `cancel` fires first
    pub async fn fetch_rendition(
        &self,
        url: &str,
        rendition: &Rendition,
        cancel: CancellationToken,
    ) -> Result<CompletedRetrieval> {
        let retrieval = &self.config.retrieval;

        if let Some(limit) = retrieval.max_file_size_bytes
            && rendition.size_bytes > limit
        {
            return Err(Error::FileTooLarge {
                size: rendition.size_bytes,
                limit,
            });
        }

        let _claim = InFlightGuard::claim(
            &self.in_flight,
            session_key(url, &rendition.format_identifier),
        )?;

        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let extension = file_extension(rendition, &retrieval.container_extension);
        let file = TransientFile::allocate(&retrieval.temp_dir, &retrieval.file_prefix, extension);
        let mut session =
            RetrievalSession::new(id, url, rendition.clone(), file.path().to_path_buf());

        tracing::info!(
            session_id = %id,
            url,
            quality = %rendition.quality_label,
            format_id = %rendition.format_identifier,
            path = %file.path().display(),
            "starting retrieval"
        );

        let request = FetchRequest {
            url,
            format_identifier: &rendition.format_identifier,
            destination: file.path(),
        };
        let mut process = match self.fetcher.spawn_fetch(&request) {
            Ok(process) => process,
            Err(e) => {
                session.transition(SessionState::Failed);
                file.remove().await;
                return Err(e);
            }
        };
        session.transition(SessionState::Running);

        let mut pump = process
            .take_output_lines()
            .map(|lines| spawn_progress_pump(id, lines, Arc::clone(&self.broadcaster)));

        let exit = tokio::select! {
            status = process.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let status = match exit {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                tracing::error!(session_id = %id, error = %e, "failed to wait for fetch process");
                if let Err(e) = process.kill().await {
                    tracing::warn!(session_id = %id, error = %e, "failed to kill fetch process");
                }
                if let Some(handle) = pump.take() {
                    handle.abort();
                }
                session.transition(SessionState::Failed);
                file.remove().await;
                return Err(Error::Io(e));
            }
            None => {
                if let Err(e) = process.kill().await {
                    tracing::warn!(session_id = %id, error = %e, "failed to kill fetch process");
                }
                if let Some(handle) = pump.take() {
                    handle.abort();
                }
                session.transition(SessionState::Failed);
                file.remove().await;
                tracing::info!(session_id = %id, "retrieval cancelled");
                return Err(Error::Cancelled);
            }
        };

        // All progress lines are published before the outcome is reported
        if let Some(mut handle) = pump.take() {
            match tokio::time::timeout(PUMP_DRAIN_TIMEOUT, &mut handle).await {
                Ok(Ok(summary)) => tracing::debug!(
                    session_id = %id,
                    lines = summary.lines,
                    records = summary.records,
                    "progress pump finished"
                ),
                Ok(Err(e)) => tracing::warn!(session_id = %id, error = %e, "progress pump failed"),
                Err(_) => {
                    tracing::warn!(session_id = %id, "progress pump did not finish, aborting");
                    handle.abort();
                }
            }
        }

        if !status.success() {
            let stderr_tail = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, process.stderr_tail())
                .await
                .unwrap_or_default();
            let stderr_tail = stderr_tail.join("\n");
            tracing::warn!(
                session_id = %id,
                exit_code = ?status.code(),
                stderr = %stderr_tail,
                "fetch process failed"
            );
            session.transition(SessionState::Failed);
            file.remove().await;
            return Err(classify_failure(&stderr_tail).unwrap_or(Error::ExternalToolFailure {
                exit_code: status.code(),
            }));
        }

        if let Some(limit) = retrieval.max_file_size_bytes
            && let Ok(metadata) = tokio::fs::metadata(file.path()).await
            && metadata.len() > limit
        {
            tracing::warn!(
                session_id = %id,
                size = metadata.len(),
                limit,
                "fetched file exceeds size limit"
            );
            session.transition(SessionState::Failed);
            file.remove().await;
            return Err(Error::FileTooLarge {
                size: metadata.len(),
                limit,
            });
        }

        session.transition(SessionState::Succeeded);
        let attachment_name = format!(
            "{}-{}.{}",
            retrieval.file_prefix,
            chrono::Utc::now().timestamp_millis(),
            extension
        );
        tracing::info!(session_id = %id, file_name = %attachment_name, "retrieval succeeded");

        Ok(CompletedRetrieval {
            session,
            file,
            attachment_name,
        })
    }
}
