//! Parser for yt-dlp metadata output

use super::traits::ToolOutput;
use crate::error::Error;
use crate::types::{PostAuthor, PostContent, PostStats};
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use std::str;
use std::sync::LazyLock;

/// Phrases that mark content behind a login wall
const RESTRICTED_MARKERS: &[&str] = &[
    "requires authentication",
    "login required",
    "log in",
    "sign in",
    "protected",
];

/// Phrases that mark content that is gone or never existed
const UNAVAILABLE_MARKERS: &[&str] = &[
    "unavailable",
    "does not exist",
    "removed",
    "deleted",
    "no longer available",
    "not found",
    "http error 404",
    "private",
    "no video could be found",
];

/// Number of stderr lines quoted in a generic metadata failure
const FAILURE_CONTEXT_LINES: usize = 3;

#[allow(clippy::expect_used)]
static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\w+\s*").expect("mention pattern is a valid regex"));

#[allow(clippy::expect_used)]
static SHORT_LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://t\.co/\w+").expect("short link pattern is a valid regex")
});

/// One format entry of a metadata document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatEntry {
    /// Tool-specific format selector
    #[serde(default)]
    pub format_id: Option<String>,
    /// Container extension
    #[serde(default)]
    pub ext: Option<String>,
    /// Video height in pixels (absent for audio-only formats)
    #[serde(default)]
    pub height: Option<f64>,
    /// Exact size in bytes, when known
    #[serde(default)]
    pub filesize: Option<f64>,
    /// Estimated size in bytes
    #[serde(default)]
    pub filesize_approx: Option<f64>,
    /// Video codec, `"none"` for audio-only formats
    #[serde(default)]
    pub vcodec: Option<String>,
}

impl FormatEntry {
    /// Usable pixel height, `None` for audio-only or unknown formats
    pub fn usable_height(&self) -> Option<u32> {
        if self.vcodec.as_deref() == Some("none") {
            return None;
        }
        self.height
            .filter(|h| h.is_finite() && *h >= 1.0)
            .map(|h| h.round() as u32)
    }

    /// Best-known size: exact, else estimated, else 0
    pub fn best_size(&self) -> u64 {
        self.filesize
            .or(self.filesize_approx)
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| s as u64)
            .unwrap_or(0)
    }
}

/// Metadata document produced by `yt-dlp -J`
///
/// Only the fields this crate consumes are modeled; everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaMetadata {
    /// Available formats
    #[serde(default)]
    pub formats: Vec<FormatEntry>,
    /// Selected format (used when `formats` is empty)
    #[serde(flatten)]
    pub selected: FormatEntry,
    /// Post text
    #[serde(default)]
    pub description: Option<String>,
    /// Author display name
    #[serde(default)]
    pub uploader: Option<String>,
    /// Author handle
    #[serde(default)]
    pub uploader_id: Option<String>,
    /// Thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Upload date as `YYYYMMDD`
    #[serde(default)]
    pub upload_date: Option<String>,
    /// Like count
    #[serde(default)]
    pub like_count: Option<u64>,
    /// Repost count
    #[serde(default)]
    pub repost_count: Option<u64>,
    /// Reply count
    #[serde(default)]
    pub comment_count: Option<u64>,
}

impl MediaMetadata {
    /// Format entries to consider
    ///
    /// Single-format sources report the format at the top level with no
    /// `formats` list.
    pub fn candidate_formats(&self) -> Vec<&FormatEntry> {
        if self.formats.is_empty() {
            if self.selected.format_id.is_some() {
                vec![&self.selected]
            } else {
                Vec::new()
            }
        } else {
            self.formats.iter().collect()
        }
    }
}

/// Classify failure text from the tool's standard error
///
/// Warning lines are skipped. Restricted markers are checked before
/// unavailable ones. Returns `None` when the text matches neither.
pub fn classify_failure(stderr: &str) -> Option<Error> {
    let relevant: Vec<String> = stderr
        .lines()
        .filter(|line| !line.trim_start().starts_with("WARNING:"))
        .map(str::to_lowercase)
        .collect();

    let contains_any =
        |markers: &[&str]| relevant.iter().any(|l| markers.iter().any(|m| l.contains(m)));

    if contains_any(RESTRICTED_MARKERS) {
        Some(Error::ContentRestricted)
    } else if contains_any(UNAVAILABLE_MARKERS) {
        Some(Error::ContentUnavailable)
    } else {
        None
    }
}

/// Parse the output of one metadata query
///
/// A failed run is classified from stderr and never yields a partial
/// document. A successful run is parsed; its stderr only matters when stdout
/// is not a usable document.
///
/// # Errors
///
/// - [`Error::ContentRestricted`] / [`Error::ContentUnavailable`] when a failed
///   run (or a run with unusable stdout) carries a recognized stderr marker
/// - [`Error::MetadataFailed`] for any other non-zero exit
/// - [`Error::ParseFailure`] when a successful run printed invalid JSON
pub fn parse_metadata_output(output: &ToolOutput) -> crate::Result<MediaMetadata> {
    let error_output = String::from_utf8_lossy(&output.stderr);

    if !output.success() {
        if let Some(classified) = classify_failure(&error_output) {
            return Err(classified);
        }
        let context: Vec<&str> = error_output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = context.len().saturating_sub(FAILURE_CONTEXT_LINES);
        let summary = context[start..].join("; ");
        let exit = match output.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        return Err(Error::MetadataFailed(if summary.is_empty() {
            exit
        } else {
            format!("{exit}: {summary}")
        }));
    }

    // stderr on a successful run is only consulted when stdout is unusable
    let parsed = str::from_utf8(&output.stdout)
        .map_err(|e| Error::ParseFailure(format!("output is not UTF-8: {}", e)))
        .and_then(|stdout| {
            serde_json::from_str(stdout.trim()).map_err(|e| Error::ParseFailure(e.to_string()))
        });

    parsed.map_err(|e| classify_failure(&error_output).unwrap_or(e))
}

/// Remove mentions and short links from post text
pub fn clean_post_text(text: &str) -> String {
    let without_mentions = MENTION_PATTERN.replace_all(text, "");
    SHORT_LINK_PATTERN
        .replace_all(&without_mentions, "")
        .trim()
        .to_string()
}

fn format_upload_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Build the post text view from a metadata document
pub fn post_content_from_metadata(metadata: &MediaMetadata) -> PostContent {
    PostContent {
        original_text: clean_post_text(metadata.description.as_deref().unwrap_or_default()),
        author: PostAuthor {
            name: metadata.uploader.clone().unwrap_or_default(),
            username: metadata.uploader_id.clone().unwrap_or_default(),
            avatar: metadata.thumbnail.clone().filter(|t| !t.is_empty()),
        },
        timestamp: metadata
            .upload_date
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(format_upload_date),
        stats: PostStats {
            likes: metadata.like_count.unwrap_or(0),
            retweets: metadata.repost_count.unwrap_or(0),
            replies: metadata.comment_count.unwrap_or(0),
        },
    }
}
