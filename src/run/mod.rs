//! Build session state
//!
//! Ephemeral state held for one `push`:
//! - the version handle returned by the upload
//! - the last log checkpoint observed while tailing
//!
//! Nothing here is persisted. The version status is owned by the remote
//! build system and only observed by the client.

pub mod streaming;

use std::path::PathBuf;

use kyper_api::{BuildLog, VersionInfo, VersionResponse, VersionStatus};
use serde::{Deserialize, Serialize};

pub use streaming::{tail_log, LogStreamer, StreamError, StreamUpdate};

/// One submitted build attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHandle {
    /// Server-assigned identifier
    pub id: u64,

    /// Semantic version string from the descriptor
    pub version: String,

    /// Last observed status
    pub status: VersionStatus,
}

impl VersionHandle {
    /// Record a newly observed status
    pub fn observe(&mut self, status: VersionStatus) {
        self.status = status;
    }
}

impl From<VersionResponse> for VersionHandle {
    fn from(response: VersionResponse) -> Self {
        Self {
            id: response.id,
            version: response.version,
            status: response.status,
        }
    }
}

impl From<&VersionInfo> for VersionHandle {
    fn from(info: &VersionInfo) -> Self {
        Self {
            id: info.id,
            version: info.version.clone(),
            status: info.status,
        }
    }
}

/// Position in a version's build log
///
/// `delta` is the text delivered by the poll that produced `cursor`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCheckpoint {
    pub cursor: u64,
    pub delta: String,
    pub status: VersionStatus,
    pub complete: bool,
}

impl LogCheckpoint {
    /// Checkpoint before the first poll at `cursor`
    pub fn at(cursor: u64) -> Self {
        Self {
            cursor,
            delta: String::new(),
            status: VersionStatus::Pending,
            complete: false,
        }
    }
}

impl From<BuildLog> for LogCheckpoint {
    fn from(page: BuildLog) -> Self {
        Self {
            cursor: page.cursor,
            delta: page.log,
            status: page.status,
            complete: page.complete,
        }
    }
}

/// Orchestration state for one push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSession {
    /// Remote app key
    pub slug: String,

    /// Temporary package location (removed when the push ends)
    pub archive_path: PathBuf,

    /// Set once the upload succeeds
    pub version: Option<VersionHandle>,

    /// Last checkpoint from the tail loop
    pub checkpoint: Option<LogCheckpoint>,

    /// Whether a retry was issued
    pub retried: bool,
}

impl BuildSession {
    pub fn new(slug: impl Into<String>, archive_path: impl Into<PathBuf>) -> Self {
        Self {
            slug: slug.into(),
            archive_path: archive_path.into(),
            version: None,
            checkpoint: None,
            retried: false,
        }
    }

    /// Final status as far as the client knows
    pub fn final_status(&self) -> Option<VersionStatus> {
        self.checkpoint
            .as_ref()
            .filter(|c| c.complete)
            .map(|c| c.status)
            .or_else(|| self.version.as_ref().map(|v| v.status))
    }

    /// Adopt the outcome of a tail loop
    pub fn record(&mut self, checkpoint: LogCheckpoint) {
        if let Some(version) = self.version.as_mut() {
            version.observe(checkpoint.status);
        }
        self.checkpoint = Some(checkpoint);
    }
}

/// Closing line printed after a build log
pub fn status_banner(status: VersionStatus) -> String {
    match status {
        VersionStatus::Built | VersionStatus::Published => "BUILD SUCCEEDED".to_string(),
        VersionStatus::BuildFailed => "BUILD FAILED".to_string(),
        VersionStatus::Cancelled => "BUILD CANCELLED".to_string(),
        other => format!("Status: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_from_response() {
        let handle = VersionHandle::from(VersionResponse {
            id: 7,
            app: "my-app".to_string(),
            version: "1.2.0".to_string(),
            status: VersionStatus::Pending,
            message: String::new(),
        });

        assert_eq!(handle.id, 7);
        assert_eq!(handle.version, "1.2.0");
        assert_eq!(handle.status, VersionStatus::Pending);
    }

    #[test]
    fn test_checkpoint_from_page() {
        let checkpoint = LogCheckpoint::from(BuildLog {
            status: VersionStatus::Building,
            log: "step 1\n".to_string(),
            cursor: 7,
            complete: false,
        });

        assert_eq!(checkpoint.cursor, 7);
        assert_eq!(checkpoint.delta, "step 1\n");
        assert!(!checkpoint.complete);
    }

    #[test]
    fn test_session_final_status() {
        let mut session = BuildSession::new("my-app", "/tmp/my-app-source.zip");
        assert_eq!(session.final_status(), None);

        session.version = Some(VersionHandle {
            id: 1,
            version: "1.0.0".to_string(),
            status: VersionStatus::Pending,
        });
        assert_eq!(session.final_status(), Some(VersionStatus::Pending));

        session.record(LogCheckpoint {
            cursor: 40,
            delta: String::new(),
            status: VersionStatus::BuildFailed,
            complete: true,
        });
        assert_eq!(session.final_status(), Some(VersionStatus::BuildFailed));
        assert_eq!(
            session.version.as_ref().map(|v| v.status),
            Some(VersionStatus::BuildFailed)
        );
    }

    #[test]
    fn test_status_banner() {
        assert_eq!(status_banner(VersionStatus::Published), "BUILD SUCCEEDED");
        assert_eq!(status_banner(VersionStatus::BuildFailed), "BUILD FAILED");
        assert_eq!(status_banner(VersionStatus::InReview), "Status: in_review");
    }
}
