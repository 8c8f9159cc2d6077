//! Shared helpers for integration tests
//!
//! The helpers install a small shell script that answers the same command
//! lines yt-dlp does: `-J ... -- URL` prints metadata, `-f ID ... -o DEST -- URL`
//! writes the media file while printing progress lines.

#![allow(dead_code)]

use postclip_dl::Config;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Metadata printed for `-J`
pub const METADATA_JSON: &str = r#"{"description":"@someone hello world https://t.co/xyz","uploader":"Some User","uploader_id":"someuser","upload_date":"20240305","like_count":7,"repost_count":2,"comment_count":1,"formats":[{"format_id":"http-256","ext":"mp4","height":480,"filesize":2048},{"format_id":"http-832","ext":"mp4","height":720,"filesize":4096},{"format_id":"hls-audio","ext":"mp4","vcodec":"none","filesize":512}]}"#;

/// Payload the fake tool writes on success
pub const PAYLOAD: &str = "integration-video-bytes";

/// Body of a fake yt-dlp
///
/// `metadata` runs when `-J` is present, `fetch` otherwise. `$out` holds the
/// value of `-o` inside `fetch`.
pub fn tool_script(metadata: &str, fetch: &str) -> String {
    format!(
        r#"#!/bin/sh
json=0
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -J) json=1 ;;
    -o) shift; out="$1" ;;
  esac
  shift
done
if [ "$json" = 1 ]; then
{metadata}
  exit 0
fi
{fetch}
"#
    )
}

/// Metadata section printing [`METADATA_JSON`]
pub fn metadata_ok() -> String {
    format!("  printf '%s' '{}'", METADATA_JSON)
}

/// Fetch section printing progress and writing [`PAYLOAD`]
pub fn fetch_ok() -> String {
    format!(
        r#"echo "[download] Destination: $out"
echo "[download]  25.0% of ~2.00KiB at 1.00KiB/s ETA 00:02"
echo "[download]  50.0% of ~2.00KiB at 1.00KiB/s ETA 00:01"
echo "[download] 100.0% of 2.00KiB in 00:00:02"
printf '%s' '{}' > "$out"
exit 0"#,
        PAYLOAD
    )
}

/// Write an executable script into `dir`
pub fn install_tool(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("fake-yt-dlp");
    std::fs::write(&path, script).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    path
}

/// Configuration pointing at `tool` and writing into `temp_dir`
pub fn config_for(tool: &Path, temp_dir: &Path) -> Config {
    let mut config = Config::default();
    config.tool.binary_path = Some(tool.to_path_buf());
    config.retrieval.temp_dir = temp_dir.to_path_buf();
    config
}

/// Whether `dir` contains no entries
pub fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}
