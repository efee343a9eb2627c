//! Mock Server State Management
//!
//! Manages apps, versions, build logs and the device handshake for the mock
//! server.

use std::collections::BTreeMap;

use kyper_api::{App, VersionStatus};

/// How a build unfolds when its log is polled.
///
/// Each poll reveals one more chunk. Once every chunk is revealed the build
/// is complete with `final_status`, unless `endless` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildScript {
    pub chunks: Vec<String>,
    pub final_status: VersionStatus,
    pub endless: bool,
}

impl BuildScript {
    pub fn new<S: Into<String>>(chunks: impl IntoIterator<Item = S>, final_status: VersionStatus) -> Self {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            final_status,
            endless: false,
        }
    }

    /// A build that succeeds after a few log lines
    pub fn success() -> Self {
        Self::new(
            ["Step 1/3 : FROM ruby:3.3\n", "Step 2/3 : RUN bundle install\n", "Successfully built\n"],
            VersionStatus::Built,
        )
    }

    /// A build that fails after a few log lines
    pub fn failure() -> Self {
        Self::new(
            ["Step 1/3 : FROM ruby:3.3\n", "ERROR: bundle install failed\n"],
            VersionStatus::BuildFailed,
        )
    }

    /// A build that never completes
    pub fn endless() -> Self {
        Self {
            chunks: vec!["Waiting for builder\n".to_string()],
            final_status: VersionStatus::Building,
            endless: true,
        }
    }
}

impl Default for BuildScript {
    fn default() -> Self {
        Self::success()
    }
}

/// Represents a version in the mock server
#[derive(Debug, Clone)]
pub struct MockVersion {
    pub id: u64,
    pub slug: String,
    pub version: String,
    pub status: VersionStatus,
    /// Script currently driving the log
    pub script: BuildScript,
    /// Script used after a retry request
    pub retry_script: BuildScript,
    /// Chunks revealed so far
    pub revealed: usize,
    /// Retry requests accepted
    pub retries: u32,
}

impl MockVersion {
    /// Log text revealed so far
    pub fn revealed_text(&self) -> String {
        self.script.chunks[..self.revealed].concat()
    }

    /// Reveal the next chunk; returns (full text, complete)
    pub fn advance(&mut self) -> (String, bool) {
        if self.revealed < self.script.chunks.len() {
            self.revealed += 1;
        }

        let complete = !self.script.endless && self.revealed == self.script.chunks.len();
        self.status = if complete {
            self.script.final_status
        } else {
            VersionStatus::Building
        };

        (self.revealed_text(), complete)
    }

    /// Restart the build with the retry script
    pub fn restart(&mut self) {
        self.script = self.retry_script.clone();
        self.revealed = 0;
        self.status = VersionStatus::Pending;
        self.retries += 1;
    }
}

/// A recorded package upload
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub slug: String,
    /// Raw descriptor text from the `kyper_yml` field
    pub descriptor: String,
    /// File name reported for the `source_zip` part
    pub file_name: String,
    /// Entry names found in the uploaded package
    pub entries: Vec<String>,
    /// Package size in bytes
    pub size: u64,
}

/// Device-code handshake state
#[derive(Debug, Clone)]
pub struct DeviceFlow {
    pub code: String,
    pub verification_uri: String,
    /// Pending answers before the token is issued
    pub pending_polls: u32,
    pub token: String,
    /// When set, token polls answer 404
    pub expired: bool,
}

impl Default for DeviceFlow {
    fn default() -> Self {
        Self {
            code: "DEVICE-CODE-1".to_string(),
            verification_uri: "https://kyper.shop/device?code=DEVICE-CODE-1".to_string(),
            pending_polls: 1,
            token: "tok_device".to_string(),
            expired: false,
        }
    }
}

/// Mock server state
#[derive(Debug)]
pub struct MockState {
    pub apps: BTreeMap<String, App>,
    pub versions: BTreeMap<u64, MockVersion>,
    pub uploads: Vec<UploadRecord>,
    pub device: DeviceFlow,
    /// Script for the next uploaded version
    pub build_script: BuildScript,
    /// Script a version switches to on retry
    pub retry_script: BuildScript,
    pub user_email: String,
    next_version_id: u64,
}

impl Default for MockState {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    pub fn new() -> Self {
        Self {
            apps: BTreeMap::new(),
            versions: BTreeMap::new(),
            uploads: Vec::new(),
            device: DeviceFlow::default(),
            build_script: BuildScript::success(),
            retry_script: BuildScript::success(),
            user_email: "dev@example.com".to_string(),
            next_version_id: 1,
        }
    }

    /// Create a version for an app
    pub fn add_version(&mut self, slug: &str, version: &str) -> &mut MockVersion {
        let id = self.next_version_id;
        self.next_version_id += 1;

        let created = MockVersion {
            id,
            slug: slug.to_string(),
            version: version.to_string(),
            status: VersionStatus::Pending,
            script: self.build_script.clone(),
            retry_script: self.retry_script.clone(),
            revealed: 0,
            retries: 0,
        };
        self.versions.entry(id).or_insert(created)
    }

    /// The most recently created version of an app
    pub fn latest_version(&self, slug: &str) -> Option<&MockVersion> {
        self.versions.values().rev().find(|v| v.slug == slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_reveals_one_chunk_per_poll() {
        let mut state = MockState::new();
        state.build_script = BuildScript::new(["a\n", "b\n"], VersionStatus::Built);
        let version = state.add_version("app", "1.0.0");

        assert_eq!(version.advance(), ("a\n".to_string(), false));
        assert_eq!(version.status, VersionStatus::Building);
        assert_eq!(version.advance(), ("a\nb\n".to_string(), true));
        assert_eq!(version.status, VersionStatus::Built);
        // Further polls stay complete
        assert_eq!(version.advance(), ("a\nb\n".to_string(), true));
    }

    #[test]
    fn test_restart_uses_retry_script() {
        let mut state = MockState::new();
        state.build_script = BuildScript::failure();
        state.retry_script = BuildScript::new(["ok\n"], VersionStatus::Built);
        let version = state.add_version("app", "1.0.0");
        while !version.advance().1 {}
        assert_eq!(version.status, VersionStatus::BuildFailed);

        version.restart();
        assert_eq!(version.status, VersionStatus::Pending);
        assert_eq!(version.retries, 1);
        assert_eq!(version.advance(), ("ok\n".to_string(), true));
    }

    #[test]
    fn test_latest_version() {
        let mut state = MockState::new();
        state.add_version("a", "1.0.0");
        state.add_version("b", "1.0.0");
        state.add_version("a", "1.1.0");

        assert_eq!(state.latest_version("a").map(|v| v.id), Some(3));
        assert!(state.latest_version("c").is_none());
    }
}
