//! CLI-based media fetcher using the external yt-dlp binary

use super::process::FetchProcess;
use super::traits::{FetchRequest, MediaFetcher, ToolOutput};
use crate::config::{RetrievalConfig, ToolConfig};
use crate::error::Error;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// CLI-based media fetcher using the external yt-dlp binary
///
/// Metadata queries run `yt-dlp -J` and capture the JSON document. Fetches run
/// `yt-dlp -f <format> --newline -o <path>` with standard output piped so that
/// progress lines arrive one per line.
///
/// # Examples
///
/// ```no_run
/// use postclip_dl::fetcher::CliMediaFetcher;
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let fetcher = CliMediaFetcher::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let fetcher = CliMediaFetcher::from_path("yt-dlp").expect("yt-dlp not found in PATH");
/// ```
pub struct CliMediaFetcher {
    binary_path: PathBuf,
    extra_args: Vec<String>,
    metadata_timeout: Duration,
    stderr_tail_lines: usize,
}

impl CliMediaFetcher {
    /// Create a new CLI fetcher with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            extra_args: Vec::new(),
            metadata_timeout: Duration::from_secs(60),
            stderr_tail_lines: 50,
        }
    }

    /// Attempt to find `binary_name` in PATH
    ///
    /// Returns `None` if the binary is not found.
    pub fn from_path(binary_name: &str) -> Option<Self> {
        which::which(binary_name).ok().map(Self::new)
    }

    /// Build a fetcher from configuration
    ///
    /// An explicit `binary_path` wins; otherwise PATH is searched when
    /// `search_path` is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] when no binary can be located.
    pub fn from_config(tool: &ToolConfig, retrieval: &RetrievalConfig) -> crate::Result<Self> {
        let binary_path = match &tool.binary_path {
            Some(path) => path.clone(),
            None if tool.search_path => which::which(&tool.binary_name).map_err(|e| {
                Error::ToolNotFound(format!("{} not found in PATH: {}", tool.binary_name, e))
            })?,
            None => {
                return Err(Error::ToolNotFound(format!(
                    "no binary_path configured for {} and PATH search is disabled",
                    tool.binary_name
                )));
            }
        };

        Ok(Self::new(binary_path)
            .with_extra_args(tool.extra_args.clone())
            .with_metadata_timeout(tool.metadata_timeout)
            .with_stderr_tail_lines(retrieval.stderr_tail_lines))
    }

    /// Arguments passed to every invocation
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Upper bound for a single metadata query
    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    /// Number of trailing stderr lines kept from fetch processes
    pub fn with_stderr_tail_lines(mut self, lines: usize) -> Self {
        self.stderr_tail_lines = lines;
        self
    }

    /// Path of the binary this fetcher runs
    pub fn binary_path(&self) -> &std::path::Path {
        &self.binary_path
    }

    fn metadata_args(&self, url: &str) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend(
            ["-J", "--no-playlist", "--no-warnings", "--", url]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }

    fn fetch_args(&self, request: &FetchRequest<'_>) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend(
            [
                "-f",
                request.format_identifier,
                "--newline",
                "--no-part",
                "--no-playlist",
                "--force-overwrites",
                "-o",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(request.destination.to_string_lossy().into_owned());
        args.push("--".to_string());
        args.push(request.url.to_string());
        args
    }
}

#[async_trait]
impl MediaFetcher for CliMediaFetcher {
    async fn query_metadata(&self, url: &str) -> crate::Result<ToolOutput> {
        let mut command = Command::new(&self.binary_path);
        command
            .args(self.metadata_args(url))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.metadata_timeout, command.output())
            .await
            .map_err(|_| {
                Error::MetadataFailed(format!(
                    "metadata query timed out after {}s",
                    self.metadata_timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        Ok(ToolOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code(),
        })
    }

    fn spawn_fetch(&self, request: &FetchRequest<'_>) -> crate::Result<FetchProcess> {
        let child = Command::new(&self.binary_path)
            .args(self.fetch_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        tracing::debug!(
            pid = ?child.id(),
            format_id = request.format_identifier,
            destination = %request.destination.display(),
            "spawned fetch process"
        );

        Ok(FetchProcess::new(child, self.stderr_tail_lines))
    }

    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }
}
