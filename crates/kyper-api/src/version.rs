//! Version resources.
//!
//! A version is one submitted build attempt. Its status is owned by the
//! remote build system; the client only observes it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a submitted version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Pending,
    Building,
    Built,
    Published,
    InReview,
    BuildFailed,
    Cancelled,
    Rejected,
    /// Any status this client does not know about (including empty).
    #[serde(other)]
    Unknown,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Built => "built",
            Self::Published => "published",
            Self::InReview => "in_review",
            Self::BuildFailed => "build_failed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the build for this version is still running or queued.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Pending | Self::Building)
    }

    /// Whether the build produced a usable artifact.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Built | Self::Published | Self::InReview)
    }
}

impl Default for VersionStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a version as embedded in an app status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub id: u64,
    pub version: String,
    #[serde(default)]
    pub status: VersionStatus,
    #[serde(default)]
    pub review_notes: String,
}

/// Response to a version upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionResponse {
    pub id: u64,
    #[serde(default)]
    pub app: String,
    pub version: String,
    #[serde(default)]
    pub status: VersionStatus,
    #[serde(default)]
    pub message: String,
}

/// One page of a version's build log.
///
/// `cursor` is the position to ask for next; `log` holds only the text
/// produced since the cursor that was requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildLog {
    #[serde(default)]
    pub status: VersionStatus,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub cursor: u64,
    #[serde(default)]
    pub complete: bool,
}

/// Short acknowledgement returned by retry/cancel/delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub message: String,
}
