//! External media-fetch tool integration
//!
//! The [`MediaFetcher`] trait is the seam between the retrieval core and the
//! external tool. [`CliMediaFetcher`] runs the real `yt-dlp` binary; tests
//! substitute their own implementations.
//!
//! ## Usage
//!
//! ```no_run
//! use postclip_dl::fetcher::{CliMediaFetcher, MediaFetcher, parse_metadata_output};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = CliMediaFetcher::from_path("yt-dlp").expect("yt-dlp binary not found");
//!
//!     let output = fetcher.query_metadata("https://x.com/user/status/1").await?;
//!     let metadata = parse_metadata_output(&output)?;
//!     println!("{} formats", metadata.candidate_formats().len());
//!
//!     Ok(())
//! }
//! ```

mod cli;
mod parser;
mod process;
mod traits;

pub use cli::CliMediaFetcher;
pub use parser::{
    FormatEntry, MediaMetadata, classify_failure, clean_post_text, parse_metadata_output,
    post_content_from_metadata,
};
pub use process::{FetchProcess, OutputLines, output_lines};
pub use traits::{FetchRequest, MediaFetcher, ToolOutput};
