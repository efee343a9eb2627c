//! Build log streaming
//!
//! Cursor-based tailing of a version's build log. Each poll asks for the
//! text produced since the last cursor, writes the delta out, and adopts
//! the cursor the server returns. The loop:
//! - stops as soon as a page reports `complete`, with no further polls
//! - sleeps a fixed interval between polls
//! - fails with `StreamError::Timeout` once the deadline passes
//!
//! Starting from a non-zero cursor resumes without re-delivering text the
//! caller already has. That is the server's contract and is not re-checked
//! here.

use std::io::{self, Write};
use std::time::Duration;

use kyper_api::BuildLog;
use tracing::{debug, info};

use super::LogCheckpoint;
use crate::host::{ApiClient, ClientError};
use crate::timeout::{describe, TailTimeouts};

/// Error during log streaming
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Build log request failed
    #[error("build log request failed: {0}")]
    Client(#[from] ClientError),

    /// Writing log output failed
    #[error("writing build log: {0}")]
    Io(#[from] io::Error),

    /// Deadline passed before the build completed
    #[error("timed out after {} waiting for the build to finish", describe(.deadline))]
    Timeout {
        deadline: Duration,
        cursor: u64,
    },
}

/// Update from a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUpdate {
    /// New log text (may be empty)
    pub delta: String,

    /// Whether this page carried new text
    pub had_activity: bool,

    /// Whether the build reached a terminal status
    pub complete: bool,
}

/// Log streamer state for one version
#[derive(Debug)]
pub struct LogStreamer {
    version_id: u64,

    timeouts: TailTimeouts,

    /// Latest checkpoint (cursor to ask for next)
    checkpoint: LogCheckpoint,

    /// Polls issued
    polls: u32,

    /// Log bytes delivered
    total_bytes: u64,
}

impl LogStreamer {
    /// Tail from the start of the log
    pub fn new(version_id: u64, timeouts: TailTimeouts) -> Self {
        Self::resume(version_id, 0, timeouts)
    }

    /// Tail from `cursor`
    pub fn resume(version_id: u64, cursor: u64, timeouts: TailTimeouts) -> Self {
        Self {
            version_id,
            timeouts,
            checkpoint: LogCheckpoint::at(cursor),
            polls: 0,
            total_bytes: 0,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.checkpoint.cursor
    }

    pub fn checkpoint(&self) -> &LogCheckpoint {
        &self.checkpoint
    }

    pub fn is_complete(&self) -> bool {
        self.checkpoint.complete
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Fold one page into the streamer state
    pub fn process_page(&mut self, page: BuildLog) -> StreamUpdate {
        self.polls += 1;
        let had_activity = !page.log.is_empty();
        self.total_bytes += page.log.len() as u64;

        let update = StreamUpdate {
            delta: page.log.clone(),
            had_activity,
            complete: page.complete,
        };
        self.checkpoint = LogCheckpoint::from(page);
        update
    }

    /// Poll until the build completes, writing each delta to `out`
    pub fn run(&mut self, client: &ApiClient, out: &mut dyn Write) -> Result<LogCheckpoint, StreamError> {
        let deadline = self.timeouts.start();
        info!(
            version_id = self.version_id,
            cursor = self.cursor(),
            "tailing build log"
        );

        while !self.is_complete() {
            if deadline.is_expired() {
                return Err(StreamError::Timeout {
                    deadline: deadline.limit(),
                    cursor: self.cursor(),
                });
            }

            let page = client.build_log(self.version_id, self.cursor())?;
            let update = self.process_page(page);
            debug!(
                version_id = self.version_id,
                cursor = self.cursor(),
                bytes = update.delta.len(),
                complete = update.complete,
                "build log page"
            );

            if update.had_activity {
                out.write_all(update.delta.as_bytes())?;
                out.flush()?;
            }

            if !update.complete {
                deadline.sleep(self.timeouts.poll_interval);
            }
        }

        info!(
            version_id = self.version_id,
            status = %self.checkpoint.status,
            polls = self.polls,
            "build finished"
        );
        Ok(self.checkpoint.clone())
    }
}

/// Tail a version's log from `cursor` until it completes
pub fn tail_log(
    client: &ApiClient,
    version_id: u64,
    cursor: u64,
    timeouts: TailTimeouts,
    out: &mut dyn Write,
) -> Result<LogCheckpoint, StreamError> {
    LogStreamer::resume(version_id, cursor, timeouts).run(client, out)
}
