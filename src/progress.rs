//! Progress line parsing
//!
//! The fetch tool prints human-readable progress lines such as
//! `[download]  45.0% of ~120.50MiB at 2.00MiB/s ETA 00:30`. Only the percent and
//! the (possibly estimated) total size are extracted; everything else on the
//! line, and every line without that shape, is ignored.

use crate::types::ProgressRecord;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static PROGRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)%\s+of\s+~?\s*(\d+(?:\.\d+)?)([KMG])iB")
        .expect("progress pattern is a valid regex")
});

/// Binary multiplier for a size unit prefix
fn unit_multiplier(unit: &str) -> Option<f64> {
    match unit {
        "K" => Some(1024.0),
        "M" => Some(1024.0 * 1024.0),
        "G" => Some(1024.0 * 1024.0 * 1024.0),
        _ => None,
    }
}

/// Parse one line of fetch tool output into a progress record
///
/// Returns `None` for lines that carry no progress (status and warning lines,
/// missing units, malformed numbers). Percent values outside 0..=100 are passed
/// through unchanged.
///
/// # Examples
///
/// ```
/// use postclip_dl::progress::parse_progress_line;
///
/// let record = parse_progress_line("[download]  50.0% of ~2.00KiB").unwrap();
/// assert_eq!(record.bytes_total, 2048);
/// assert_eq!(record.bytes_downloaded, 1024);
///
/// assert!(parse_progress_line("[info] Downloading 1 format(s): http-832").is_none());
/// ```
pub fn parse_progress_line(line: &str) -> Option<ProgressRecord> {
    let captures = PROGRESS_PATTERN.captures(line)?;

    let percent: f64 = captures.get(1)?.as_str().parse().ok()?;
    let size: f64 = captures.get(2)?.as_str().parse().ok()?;
    let multiplier = unit_multiplier(captures.get(3)?.as_str())?;

    let total = size * multiplier;
    let downloaded = total * percent / 100.0;

    Some(ProgressRecord {
        percent_complete: percent,
        bytes_downloaded: downloaded.floor() as u64,
        bytes_total: total.floor() as u64,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const MIB: f64 = 1024.0 * 1024.0;

    #[test]
    fn parses_estimated_size_line() {
        let record = parse_progress_line("[download]  45.0% of ~120.5MiB").unwrap();

        assert_eq!(record.percent_complete, 45.0);
        assert_eq!(record.bytes_total, (120.5 * MIB).floor() as u64);
        assert_eq!(
            record.bytes_downloaded,
            (120.5 * MIB * 45.0 / 100.0).floor() as u64
        );
        assert_eq!(record.bytes_total, 126_353_408);
        assert_eq!(record.bytes_downloaded, 56_859_033);
    }

    #[test]
    fn parses_exact_size_with_trailing_fields() {
        let record =
            parse_progress_line("[download]  12.3% of 10.00MiB at  1.21MiB/s ETA 00:07").unwrap();

        assert_eq!(record.percent_complete, 12.3);
        assert_eq!(record.bytes_total, 10 * 1024 * 1024);
        assert_eq!(
            record.bytes_downloaded,
            (10.0 * MIB * 12.3 / 100.0).floor() as u64
        );
    }

    #[test]
    fn applies_binary_multipliers_for_each_unit() {
        let cases = [
            ("100% of 3KiB", 3 * 1024),
            ("100% of 3MiB", 3 * 1024 * 1024),
            ("100% of 3GiB", 3 * 1024 * 1024 * 1024),
        ];
        for (line, expected_total) in cases {
            let record = parse_progress_line(line).unwrap();
            assert_eq!(record.bytes_total, expected_total, "{line}");
            assert_eq!(record.bytes_downloaded, expected_total, "{line}");
        }
    }

    #[test]
    fn tolerates_space_after_tilde() {
        let record = parse_progress_line("[download]   1.0% of ~ 1.00GiB").unwrap();
        assert_eq!(record.bytes_total, 1024 * 1024 * 1024);
    }

    #[test]
    fn ignores_lines_without_progress() {
        let lines = [
            "",
            "[twitter] Extracting URL: https://x.com/user/status/1",
            "[info] 1234: Downloading 1 format(s): http-2176",
            "[download] Destination: /tmp/x-video-1.mp4",
            "WARNING: unable to extract uploader",
            "[download] 100% of",
        ];
        for line in lines {
            assert!(parse_progress_line(line).is_none(), "{line:?}");
        }
    }

    #[test]
    fn rejects_missing_or_unknown_units() {
        assert!(parse_progress_line("[download]  45.0% of ~120.5iB").is_none());
        assert!(parse_progress_line("[download]  45.0% of ~120.5B").is_none());
        assert!(parse_progress_line("[download]  45.0% of ~120.5TiB").is_none());
        assert!(parse_progress_line("[download]  45.0% of ~120.5MB").is_none());
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!(parse_progress_line("[download]  abc% of ~1.0MiB").is_none());
        assert!(parse_progress_line("[download]  45.0% of ~.MiB").is_none());
    }

    #[test]
    fn passes_out_of_range_percent_through() {
        let record = parse_progress_line("[download] 150.0% of 1.00KiB").unwrap();
        assert_eq!(record.percent_complete, 150.0);
        assert_eq!(record.bytes_downloaded, 1536);
        assert_eq!(record.display_percent(), 100.0);
    }

    #[test]
    fn parsing_is_stateless() {
        let line = "[download]  45.0% of ~120.5MiB";
        assert_eq!(parse_progress_line(line), parse_progress_line(line));
    }
}
