//! Running fetch processes and their output streams

use std::collections::VecDeque;
use std::io;
use std::process::ExitStatus;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::SplitStream;
use tokio_stream::{Stream, StreamExt};

/// Lazy, finite stream of raw output lines
///
/// Ends when the underlying reader reaches end of file, which for a child
/// process means it closed its standard output (normally on exit).
pub type OutputLines = std::pin::Pin<Box<dyn Stream<Item = io::Result<String>> + Send>>;

/// Split a byte stream into lines
///
/// Lines are split on `\n`, a trailing `\r` is dropped and invalid UTF-8 is
/// replaced rather than treated as an error, so one garbled line never ends
/// the stream.
pub fn output_lines<R>(reader: R) -> OutputLines
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let lines = SplitStream::new(BufReader::new(reader).split(b'\n')).map(|chunk| {
        chunk.map(|bytes| {
            let mut line = String::from_utf8_lossy(&bytes).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            line
        })
    });
    Box::pin(lines)
}

/// A running fetch invocation
///
/// Exclusively owns the child process. Standard error is drained in the
/// background and its last lines are kept for failure diagnostics.
pub struct FetchProcess {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr_tail: Option<JoinHandle<Vec<String>>>,
}

impl FetchProcess {
    /// Wrap a spawned child whose stdout (and optionally stderr) are piped
    pub fn new(mut child: Child, stderr_tail_lines: usize) -> Self {
        let stdout = child.stdout.take();
        let stderr_tail = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(stderr_tail_lines);
                let mut lines = output_lines(stderr);
                while let Some(line) = lines.next().await {
                    let Ok(line) = line else { break };
                    tracing::debug!(line = %line, "fetch tool stderr");
                    if tail.len() == stderr_tail_lines {
                        tail.pop_front();
                    }
                    if stderr_tail_lines > 0 {
                        tail.push_back(line);
                    }
                }
                tail.into_iter().collect()
            })
        });

        Self {
            child,
            stdout,
            stderr_tail,
        }
    }

    /// OS process id, if the process is still running
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Take the standard output line stream (available once)
    pub fn take_output_lines(&mut self) -> Option<OutputLines> {
        self.stdout.take().map(output_lines)
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Kill the process and reap it
    pub async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }

    /// Last lines the process wrote to standard error
    ///
    /// Only complete once the process has exited.
    pub async fn stderr_tail(&mut self) -> Vec<String> {
        match self.stderr_tail.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        }
    }
}
