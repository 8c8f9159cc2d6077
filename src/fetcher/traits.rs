//! Traits and types for the external media-fetch tool

use super::process::FetchProcess;
use async_trait::async_trait;
use std::path::Path;

/// Captured result of a metadata query
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Raw standard output (structured JSON on success)
    pub stdout: Vec<u8>,
    /// Raw standard error (diagnostics, classified on failure)
    pub stderr: Vec<u8>,
    /// Exit code, `None` if the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    /// Whether the tool exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Parameters of one fetch invocation
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    /// Source post URL
    pub url: &'a str,
    /// Format identifier of the chosen rendition
    pub format_identifier: &'a str,
    /// Where the tool must write the media file
    pub destination: &'a Path,
}

/// Interface to the external media-fetch tool
///
/// Implementations run the tool in two modes: a metadata query that returns
/// structured output describing the available formats, and a fetch that writes
/// one chosen format to disk while printing progress lines.
///
/// # Examples
///
/// ```no_run
/// use postclip_dl::fetcher::{CliMediaFetcher, MediaFetcher};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = CliMediaFetcher::from_path("yt-dlp").expect("yt-dlp not found");
/// let output = fetcher.query_metadata("https://x.com/user/status/1").await?;
/// println!("exit code: {:?}", output.exit_code);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Run one metadata query for `url` and capture its output
    ///
    /// # Errors
    ///
    /// Returns an error if the tool cannot be executed or does not finish in time.
    /// A non-zero exit is not an error at this level; it is classified by
    /// [`parse_metadata_output`](super::parse_metadata_output).
    async fn query_metadata(&self, url: &str) -> crate::Result<ToolOutput>;

    /// Start a fetch and hand back the running process
    ///
    /// The process writes progress lines to its standard output, which the
    /// caller consumes through [`FetchProcess::take_output_lines`].
    fn spawn_fetch(&self, request: &FetchRequest<'_>) -> crate::Result<FetchProcess>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
