//! Push orchestration
//!
//! Drives one `push` from local checks to a terminal build status:
//!
//! Idle → Validating → Packaging → Syncing → Uploading → Tailing →
//! {Succeeded | Failed | RetryOffered}
//!
//! - Validation failures abort before any network call
//! - The package lives in a scratch directory removed on every exit path
//! - App sync is create-on-404, update otherwise
//! - A failed build may be retried once, only when prompting is allowed;
//!   the retried build is tailed from cursor 0

use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use kyper_api::{App, VersionStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bundle::{humanize_bytes, BundleError, Bundler};
use crate::config::ClientConfig;
use crate::host::{ApiClient, ClientError, ClientResult};
use crate::progress::with_spinner;
use crate::project::{validate, DescriptorError, ProjectDescriptor, ValidationReport};
use crate::prompt::{self, Confirm};
use crate::run::{status_banner, BuildSession, LogCheckpoint, LogStreamer, StreamError, VersionHandle};
use crate::timeout::TailTimeouts;

/// Question asked after a failed build
pub const RETRY_QUESTION: &str = "Build failed. Retry?";

/// Push states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushState {
    Idle,
    Validating,
    Packaging,
    Syncing,
    Uploading,
    Tailing,
    RetryOffered,
    Succeeded,
    Failed,
}

impl PushState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PushState::Succeeded | PushState::Failed)
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: PushState) -> bool {
        use PushState::*;
        match (self, target) {
            (Idle, Validating) => true,
            (Validating, Packaging) => true,
            (Packaging, Syncing) => true,
            (Syncing, Uploading) => true,
            (Uploading, Tailing) => true,
            (Tailing, Succeeded) | (Tailing, RetryOffered) => true,

            // Accepted retry re-enters the tail loop once
            (RetryOffered, Tailing) => true,

            // Any live state can fail
            (from, Failed) => !from.is_terminal(),

            _ => false,
        }
    }
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTransition {
    pub from: PushState,
    pub to: PushState,
    pub at: DateTime<Utc>,
}

/// Push errors
#[derive(Debug, Error)]
pub enum PushError {
    #[error("not logged in: run 'kyper login' first")]
    NotLoggedIn,

    #[error("{0}")]
    Descriptor(#[from] DescriptorError),

    #[error("kyper.yml validation failed: run 'kyper validate' for details")]
    Validation(ValidationReport),

    #[error("building archive: {0}")]
    Packaging(#[from] BundleError),

    #[error("syncing app: {0}")]
    Sync(#[source] ClientError),

    #[error("uploading version: {0}")]
    Upload(#[source] ClientError),

    #[error("retrying build: {0}")]
    Retry(#[source] ClientError),

    #[error("{0}")]
    Stream(#[from] StreamError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid push transition from {from:?} to {to:?}")]
    InvalidTransition { from: PushState, to: PushState },
}

impl PushError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PushError::NotLoggedIn => 3,
            PushError::Descriptor(_) => 2,
            PushError::Validation(_) => 2,
            PushError::Packaging(_) => 7,
            PushError::Sync(e) | PushError::Upload(e) | PushError::Retry(e) => e.exit_code(),
            PushError::Stream(StreamError::Timeout { .. }) => 6,
            PushError::Stream(StreamError::Client(e)) => e.exit_code(),
            PushError::Stream(StreamError::Io(_)) => 1,
            PushError::Io(_) => 1,
            PushError::InvalidTransition { .. } => 1,
        }
    }
}

/// Result type for push operations
pub type PushResult<T> = Result<T, PushError>;

/// Push settings
#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Project root (holds `kyper.yml`)
    pub root: PathBuf,

    /// Whether the user can be asked questions
    pub interactive: bool,

    /// Machine-readable output only
    pub json: bool,

    /// Draw spinners around blocking steps
    pub spinner: bool,

    pub timeouts: TailTimeouts,

    /// Parent of the scratch directory (system temp dir when unset)
    pub scratch_parent: Option<PathBuf>,
}

impl PushOptions {
    /// Non-interactive, human output, default timeouts
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            interactive: false,
            json: false,
            spinner: false,
            timeouts: TailTimeouts::default(),
            scratch_parent: None,
        }
    }

    /// Settings for a terminal session
    pub fn from_config(config: &ClientConfig, root: impl Into<PathBuf>) -> Self {
        let interactive = !config.is_json() && prompt::is_interactive();
        Self {
            root: root.into(),
            interactive,
            json: config.is_json(),
            spinner: interactive,
            timeouts: config.tail_timeouts(),
            scratch_parent: None,
        }
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn timeouts(mut self, timeouts: TailTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Create the scratch directory under `parent`
    pub fn scratch_in(mut self, parent: impl Into<PathBuf>) -> Self {
        self.scratch_parent = Some(parent.into());
        self
    }

    /// Prompts are only shown in interactive human mode
    pub fn may_prompt(&self) -> bool {
        self.interactive && !self.json
    }
}

/// Summary of a finished push
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushOutcome {
    pub slug: String,
    pub version: String,
    pub version_id: u64,
    pub status: VersionStatus,
    pub archive_bytes: u64,
    pub archive_sha256: String,
    pub entries: usize,
    pub retried: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Where the package was written (already removed)
    #[serde(skip)]
    pub archive_path: PathBuf,
}

impl PushOutcome {
    /// Every terminal status other than `build_failed` counts as success
    pub fn succeeded(&self) -> bool {
        self.status != VersionStatus::BuildFailed
    }

    /// 0 on success, 5 on a failed build
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            5
        }
    }
}

/// Create the app on first push, update its metadata afterwards
pub fn sync_app(client: &ApiClient, slug: &str, descriptor: &ProjectDescriptor) -> ClientResult<App> {
    match client.app_status(slug) {
        Ok(_) => {
            debug!(slug, "updating app");
            client.update_app(slug, &descriptor.update_params())
        }
        Err(e) if e.is_not_found() => {
            info!(slug, "creating app");
            client.create_app(&descriptor.create_params())
        }
        Err(e) => Err(e),
    }
}

/// Push orchestrator
pub struct PushOrchestrator<'a> {
    client: &'a ApiClient,
    confirm: &'a dyn Confirm,
    options: PushOptions,
    state: PushState,
    history: Vec<PushTransition>,
}

impl<'a> PushOrchestrator<'a> {
    pub fn new(client: &'a ApiClient, confirm: &'a dyn Confirm, options: PushOptions) -> Self {
        Self {
            client,
            confirm,
            options,
            state: PushState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> PushState {
        self.state
    }

    /// Every transition taken so far
    pub fn history(&self) -> &[PushTransition] {
        &self.history
    }

    /// States visited, starting with `Idle`
    pub fn path(&self) -> Vec<PushState> {
        std::iter::once(PushState::Idle)
            .chain(self.history.iter().map(|t| t.to))
            .collect()
    }

    /// Run the push. Human output and the build log go to `out`.
    pub fn run(&mut self, out: &mut dyn Write) -> PushResult<PushOutcome> {
        let result = self.execute(out);
        if result.is_err() && !self.state.is_terminal() {
            self.record(PushState::Failed);
        }
        result
    }

    fn execute(&mut self, out: &mut dyn Write) -> PushResult<PushOutcome> {
        let started_at = Utc::now();
        let human = !self.options.json;
        let root = self.options.root.clone();

        if !self.client.has_token() {
            return Err(PushError::NotLoggedIn);
        }

        // Local checks
        self.transition(PushState::Validating)?;
        let (descriptor, raw) = ProjectDescriptor::load_from_root(&root)?;
        let report = validate(&descriptor, Some(&root));
        if !report.valid {
            return Err(PushError::Validation(report));
        }
        for warning in &report.warnings {
            warn!(warning = %warning, "kyper.yml");
            if human {
                writeln!(out, "warning: {}", warning)?;
            }
        }
        let slug = descriptor.slug();

        // Package into a scratch directory dropped on every path out
        self.transition(PushState::Packaging)?;
        let mut builder = tempfile::Builder::new();
        builder.prefix("kyper-push-");
        let scratch = match &self.options.scratch_parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        let archive_path = scratch.path().join(format!("{}-source.zip", slug));
        let mut session = BuildSession::new(&slug, &archive_path);

        let bundler = Bundler::new(root.clone());
        let bundle = with_spinner(self.options.spinner, "Building archive...", || {
            bundler.create_bundle(&archive_path)
        })?;
        info!(
            slug = %slug,
            bytes = bundle.size_bytes,
            entries = bundle.manifest.len(),
            sha256 = %bundle.sha256,
            "archive built"
        );
        if human {
            writeln!(out, "Archive: {}", humanize_bytes(bundle.size_bytes))?;
        }

        self.transition(PushState::Syncing)?;
        let client = self.client;
        with_spinner(self.options.spinner, "Syncing app...", || {
            sync_app(client, &slug, &descriptor)
        })
        .map_err(PushError::Sync)?;

        self.transition(PushState::Uploading)?;
        let response = with_spinner(self.options.spinner, "Uploading...", || {
            client.create_version(&slug, &raw, &archive_path)
        })
        .map_err(PushError::Upload)?;
        let handle = VersionHandle::from(response);
        info!(slug = %slug, version_id = handle.id, version = %handle.version, "version uploaded");
        if human {
            writeln!(out, "Version {} uploaded (ID: {})", handle.version, handle.id)?;
            writeln!(out)?;
        }
        let version_id = handle.id;
        session.version = Some(handle);

        self.transition(PushState::Tailing)?;
        session.record(self.tail(version_id, out)?);

        if session.final_status() == Some(VersionStatus::BuildFailed) && self.options.may_prompt() {
            self.transition(PushState::RetryOffered)?;
            if self.confirm.confirm(RETRY_QUESTION)? {
                let ack = client.retry_version(version_id).map_err(PushError::Retry)?;
                session.retried = true;
                info!(version_id, "build retry requested");
                if human {
                    writeln!(out, "{}", ack.message)?;
                    writeln!(out)?;
                }
                self.transition(PushState::Tailing)?;
                session.record(self.tail(version_id, out)?);
            } else {
                debug!(version_id, "retry declined");
            }
        }

        let status = session.final_status().unwrap_or_default();
        let terminal = if status == VersionStatus::BuildFailed {
            PushState::Failed
        } else {
            PushState::Succeeded
        };
        self.transition(terminal)?;

        let outcome = PushOutcome {
            slug,
            version: session
                .version
                .as_ref()
                .map(|v| v.version.clone())
                .unwrap_or_default(),
            version_id,
            status,
            archive_bytes: bundle.size_bytes,
            archive_sha256: bundle.sha256,
            entries: bundle.manifest.len(),
            retried: session.retried,
            warnings: report.warnings,
            started_at,
            finished_at: Utc::now(),
            archive_path: session.archive_path,
        };
        drop(scratch);
        Ok(outcome)
    }

    /// Tail from cursor 0; the log is only written in human mode
    fn tail(&self, version_id: u64, out: &mut dyn Write) -> PushResult<LogCheckpoint> {
        let mut sink = io::sink();
        let target: &mut dyn Write = if self.options.json { &mut sink } else { &mut *out };
        let checkpoint = LogStreamer::new(version_id, self.options.timeouts).run(self.client, target)?;

        if !self.options.json {
            writeln!(out)?;
            writeln!(out, "{}", status_banner(checkpoint.status))?;
        }
        Ok(checkpoint)
    }

    fn transition(&mut self, to: PushState) -> PushResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(PushError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.record(to);
        Ok(())
    }

    fn record(&mut self, to: PushState) {
        debug!(from = ?self.state, to = ?to, "push state");
        self.history.push(PushTransition {
            from: self.state,
            to,
            at: Utc::now(),
        });
        self.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Method, RetryPolicy};
    use crate::mock::{BuildScript, MockServer};
    use crate::prompt::ScriptedConfirm;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const DESCRIPTOR: &str = "\
name: Demo App
version: 0.1.0
description: A demo
category: productivity
docker:
  dockerfile: Dockerfile
processes:
  web: ./server
pricing:
  subscription: 5
";

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kyper.yml"), DESCRIPTOR).unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM ruby:3.3\n").unwrap();
        fs::write(dir.path().join("app.rb"), "puts 1\n").unwrap();
        dir
    }

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::with_executor(
            Arc::new(server.clone()),
            Some("tok".to_string()),
            RetryPolicy::none(),
        )
    }

    fn options(dir: &TempDir) -> PushOptions {
        PushOptions::new(dir.path())
            .timeouts(TailTimeouts::new(Duration::from_millis(1), Duration::from_secs(5)))
    }

    #[test]
    fn test_transition_table() {
        use PushState::*;
        assert!(Idle.can_transition_to(Validating));
        assert!(Tailing.can_transition_to(RetryOffered));
        assert!(RetryOffered.can_transition_to(Tailing));
        assert!(Packaging.can_transition_to(Failed));
        assert!(!Idle.can_transition_to(Uploading));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!RetryOffered.can_transition_to(Succeeded));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(PushError::NotLoggedIn.exit_code(), 3);
        assert_eq!(PushError::Validation(ValidationReport::default()).exit_code(), 2);
        assert_eq!(
            PushError::Stream(StreamError::Timeout {
                deadline: Duration::from_secs(1800),
                cursor: 0
            })
            .exit_code(),
            6
        );
        let not_found = ClientError::Api(kyper_api::ApiError::new(404, "App not found"));
        assert_eq!(PushError::Upload(not_found).exit_code(), 4);
    }

    #[test]
    fn test_push_success_path() {
        let dir = project();
        let server = MockServer::new();
        let api = client(&server);
        let confirm = ScriptedConfirm::default();
        let mut out = Vec::new();

        let mut orchestrator = PushOrchestrator::new(&api, &confirm, options(&dir));
        let outcome = orchestrator.run(&mut out).unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.slug, "demo-app");
        assert_eq!(outcome.version, "0.1.0");
        assert!(!outcome.archive_path.exists());
        assert_eq!(
            orchestrator.path(),
            vec![
                PushState::Idle,
                PushState::Validating,
                PushState::Packaging,
                PushState::Syncing,
                PushState::Uploading,
                PushState::Tailing,
                PushState::Succeeded,
            ]
        );
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Successfully built"));
        assert!(text.contains("BUILD SUCCEEDED"));
    }

    #[test]
    fn test_missing_token_stops_before_network() {
        let dir = project();
        let server = MockServer::new();
        let api = ApiClient::with_executor(Arc::new(server.clone()), None, RetryPolicy::none());
        let confirm = ScriptedConfirm::default();

        let mut orchestrator = PushOrchestrator::new(&api, &confirm, options(&dir));
        let err = orchestrator.run(&mut Vec::new()).unwrap_err();

        assert!(matches!(err, PushError::NotLoggedIn));
        assert_eq!(orchestrator.state(), PushState::Failed);
        assert!(server.requests().is_empty());
    }

    #[test]
    fn test_failed_build_declined_retry() {
        let dir = project();
        let server = MockServer::new();
        server.set_build_script(BuildScript::failure());
        let api = client(&server);
        let confirm = ScriptedConfirm::new([false]);

        let mut orchestrator =
            PushOrchestrator::new(&api, &confirm, options(&dir).interactive(true));
        let outcome = orchestrator.run(&mut Vec::new()).unwrap();

        assert!(!outcome.succeeded());
        assert_eq!(outcome.exit_code(), 5);
        assert!(!outcome.retried);
        assert_eq!(confirm.asked(), vec![RETRY_QUESTION]);
        assert!(server.requests_to(Method::Post, "/api/v1/versions").is_empty());
        assert_eq!(orchestrator.state(), PushState::Failed);
    }
}
