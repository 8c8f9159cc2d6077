//! Output-to-broadcaster pump

use crate::broadcaster::ProgressBroadcaster;
use crate::fetcher::OutputLines;
use crate::progress::parse_progress_line;
use crate::types::{ProgressRecord, SessionId};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

/// What a pump saw before its line stream ended
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PumpSummary {
    /// Output lines read
    pub lines: u64,
    /// Lines that parsed into progress records
    pub records: u64,
    /// Last record published
    pub last: Option<ProgressRecord>,
}

/// Feed every progress record found in `lines` to the broadcaster
///
/// Records are published in emission order. The task ends when the stream
/// ends or yields a read error.
pub fn spawn_progress_pump(
    session_id: SessionId,
    mut lines: OutputLines,
    broadcaster: Arc<ProgressBroadcaster>,
) -> JoinHandle<PumpSummary> {
    tokio::spawn(async move {
        let mut summary = PumpSummary::default();

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "failed to read fetch output");
                    break;
                }
            };
            summary.lines += 1;

            let Some(record) = parse_progress_line(&line) else {
                tracing::trace!(session_id = %session_id, line = %line, "fetch output");
                continue;
            };

            summary.records += 1;
            summary.last = Some(record);
            let delivered = broadcaster.publish(&record).await;
            tracing::trace!(
                session_id = %session_id,
                progress = record.percent_complete,
                delivered,
                "progress published"
            );
        }

        summary
    })
}
