//! Core types for postclip-dl

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a retrieval session
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Get the inner value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One selectable quality/format variant of the source media
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Rendition {
    /// Opaque token the fetch tool uses to select this variant
    #[serde(rename = "formatId")]
    pub format_identifier: String,
    /// Normalized quality label (e.g. "720p", or "unknown")
    #[serde(rename = "quality")]
    pub quality_label: String,
    /// File extension / container name
    #[serde(rename = "format")]
    pub container_format: String,
    /// Best-known size in bytes (0 if unavailable)
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

impl Rendition {
    /// Numeric quality (leading digits of the label), `None` for labels like "unknown"
    pub fn numeric_quality(&self) -> Option<u32> {
        let digits: String = self
            .quality_label
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }
}

/// One point-in-time snapshot of an in-flight retrieval
///
/// Serialized as `{ "progress": 45.0, "downloadedSize": 56859033, "totalSize": 126353408 }`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressRecord {
    /// Percent complete as reported by the tool (nominally 0.0 to 100.0)
    #[serde(rename = "progress")]
    pub percent_complete: f64,
    /// Bytes downloaded so far
    #[serde(rename = "downloadedSize")]
    pub bytes_downloaded: u64,
    /// Total size in bytes
    #[serde(rename = "totalSize")]
    pub bytes_total: u64,
}

impl ProgressRecord {
    /// Percent clamped to [0, 100] for display
    pub fn display_percent(&self) -> f64 {
        self.percent_complete.clamp(0.0, 100.0)
    }
}

/// Terminal and intermediate states of a retrieval session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, process not started yet
    Pending,
    /// External process running
    Running,
    /// Process exited successfully, file handed to the responder
    Succeeded,
    /// Process failed or was cancelled, transient file removed
    Failed,
}

impl SessionState {
    /// Whether the session can no longer change state
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed)
    }
}

/// Text and author information of a post
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostContent {
    /// Post text with mentions and short links removed
    pub original_text: String,
    /// Post author
    pub author: PostAuthor,
    /// Upload date as reported by the source (e.g. "2024-03-01")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Engagement counters
    pub stats: PostStats,
}

/// Author of a post
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PostAuthor {
    /// Display name
    pub name: String,
    /// Account handle
    pub username: String,
    /// Avatar or thumbnail URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Engagement counters of a post
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PostStats {
    /// Like count
    pub likes: u64,
    /// Repost / retweet count
    pub retweets: u64,
    /// Reply / comment count
    pub replies: u64,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn rendition(label: &str) -> Rendition {
        Rendition {
            format_identifier: "http-1".to_string(),
            quality_label: label.to_string(),
            container_format: "mp4".to_string(),
            size_bytes: 0,
        }
    }

    #[test]
    fn numeric_quality_reads_leading_digits() {
        assert_eq!(rendition("720p").numeric_quality(), Some(720));
        assert_eq!(rendition("1080").numeric_quality(), Some(1080));
        assert_eq!(rendition("unknown").numeric_quality(), None);
        assert_eq!(rendition("").numeric_quality(), None);
    }

    #[test]
    fn progress_record_uses_wire_field_names() {
        let record = ProgressRecord {
            percent_complete: 45.0,
            bytes_downloaded: 10,
            bytes_total: 20,
        };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["progress"], 45.0);
        assert_eq!(json["downloadedSize"], 10);
        assert_eq!(json["totalSize"], 20);
    }

    #[test]
    fn display_percent_clamps_out_of_range_values() {
        let mut record = ProgressRecord {
            percent_complete: 120.0,
            bytes_downloaded: 0,
            bytes_total: 0,
        };
        assert_eq!(record.display_percent(), 100.0);
        record.percent_complete = -3.0;
        assert_eq!(record.display_percent(), 0.0);
    }

    #[test]
    fn rendition_serializes_as_quality_and_format() {
        let json = serde_json::to_value(rendition("480p")).unwrap();
        assert_eq!(json["quality"], "480p");
        assert_eq!(json["format"], "mp4");
        assert_eq!(json["formatId"], "http-1");
    }

    #[test]
    fn terminal_states() {
        assert!(!SessionState::Pending.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Succeeded.is_terminal());
        assert!(SessionState::Failed.is_terminal());
    }
}
