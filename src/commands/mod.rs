//! Subcommands other than `push`
//!
//! Each command takes its collaborators explicitly (client, project root,
//! output mode, writer) and returns a typed error with an exit code.

mod app;
mod auth;
mod local;

pub use app::{cancel, logs, retry, status, withdraw};
pub use auth::{login, whoami, LoginOptions};
pub use local::{validate_project, version};

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use kyper_api::{VersionInfo, VersionStatus};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::host::{ApiClient, ClientError};
use crate::project::{DescriptorError, ProjectDescriptor};
use crate::run::StreamError;
use crate::timeout::describe;

/// Command errors
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("not logged in: run 'kyper login' first")]
    NotLoggedIn,

    #[error("{0}")]
    Descriptor(#[from] DescriptorError),

    #[error("{action}: {source}")]
    Client {
        action: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("no versions found: run 'kyper push' first")]
    NoVersions,

    #[error("latest version is {status}: {reason}")]
    NotAllowed {
        status: String,
        reason: &'static str,
    },

    #[error("{0}")]
    Stream(#[from] StreamError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("device code expired: run 'kyper login' again")]
    DeviceExpired,

    #[error("authorization timed out ({})", describe(.0))]
    LoginTimeout(Duration),

    #[error("kyper.yml validation failed ({errors} error(s), {warnings} warning(s))")]
    ValidationFailed { errors: usize, warnings: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CommandError {
    fn client(action: &'static str) -> impl FnOnce(ClientError) -> CommandError {
        move |source| CommandError::Client { action, source }
    }

    fn not_allowed(status: VersionStatus, reason: &'static str) -> Self {
        CommandError::NotAllowed {
            status: status.to_string(),
            reason,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::NotLoggedIn => 3,
            CommandError::Descriptor(_) => 2,
            CommandError::Client { source, .. } => source.exit_code(),
            CommandError::NoVersions => 4,
            CommandError::NotAllowed { .. } => 1,
            CommandError::Stream(StreamError::Timeout { .. }) => 6,
            CommandError::Stream(StreamError::Client(e)) => e.exit_code(),
            CommandError::Stream(StreamError::Io(_)) => 1,
            CommandError::Config(_) => 1,
            CommandError::DeviceExpired => 3,
            CommandError::LoginTimeout(_) => 6,
            CommandError::ValidationFailed { .. } => 2,
            CommandError::Io(_) => 1,
            CommandError::Json(_) => 1,
        }
    }
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Pretty JSON followed by a newline
pub fn print_json<T: Serialize>(out: &mut dyn Write, value: &T) -> CommandResult<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn require_token(client: &ApiClient) -> CommandResult<()> {
    if client.has_token() {
        Ok(())
    } else {
        Err(CommandError::NotLoggedIn)
    }
}

/// Descriptor and slug for the project at `root`
fn load_project(root: &Path) -> CommandResult<(ProjectDescriptor, String)> {
    let (descriptor, _) = ProjectDescriptor::load_from_root(root)?;
    let slug = descriptor.slug();
    Ok((descriptor, slug))
}

fn latest_version(client: &ApiClient, slug: &str) -> CommandResult<VersionInfo> {
    let status = client
        .app_status(slug)
        .map_err(CommandError::client("fetching status"))?;
    status.latest_version.ok_or(CommandError::NoVersions)
}
