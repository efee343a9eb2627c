//! Commands acting on the project's app and its latest version

use std::io::Write;
use std::path::Path;

use kyper_api::VersionStatus;
use serde_json::json;
use tracing::info;

use super::{latest_version, load_project, print_json, require_token, CommandError, CommandResult};
use crate::host::ApiClient;
use crate::prompt::Confirm;
use crate::run::{status_banner, tail_log, LogCheckpoint};
use crate::timeout::TailTimeouts;

/// Show the app and its latest version
pub fn status(client: &ApiClient, root: &Path, json: bool, out: &mut dyn Write) -> CommandResult<()> {
    require_token(client)?;
    let (descriptor, slug) = load_project(root)?;
    let status = client
        .app_status(&slug)
        .map_err(CommandError::client("fetching status"))?;

    if json {
        return print_json(out, &status);
    }

    writeln!(out, "App: {}", descriptor.name)?;
    writeln!(out, "Slug: {}", slug)?;
    writeln!(out, "Status: {}", status.status)?;
    writeln!(out)?;
    match &status.latest_version {
        Some(v) => {
            writeln!(out, "Latest Version")?;
            writeln!(out, "  Version: {}", v.version)?;
            writeln!(out, "  Status:  {}", v.status)?;
            if !v.review_notes.is_empty() {
                writeln!(out, "  Notes:   {}", v.review_notes)?;
            }
        }
        None => writeln!(out, "No versions pushed yet")?,
    }
    Ok(())
}

/// Stream the latest version's build log from the beginning
pub fn logs(
    client: &ApiClient,
    root: &Path,
    json: bool,
    timeouts: TailTimeouts,
    out: &mut dyn Write,
) -> CommandResult<VersionStatus> {
    require_token(client)?;
    let (_, slug) = load_project(root)?;
    let version = latest_version(client, &slug)?;

    let checkpoint = follow(client, version.id, json, timeouts, out)?;
    Ok(checkpoint.status)
}

/// Retry the latest version if its build failed, then stream the new build
pub fn retry(
    client: &ApiClient,
    root: &Path,
    json: bool,
    timeouts: TailTimeouts,
    out: &mut dyn Write,
) -> CommandResult<VersionStatus> {
    require_token(client)?;
    let (_, slug) = load_project(root)?;
    let version = latest_version(client, &slug)?;

    if version.status != VersionStatus::BuildFailed {
        return Err(CommandError::not_allowed(
            version.status,
            "can only retry failed builds",
        ));
    }

    let ack = client
        .retry_version(version.id)
        .map_err(CommandError::client("retrying build"))?;
    info!(version_id = version.id, "build retry requested");
    if !json {
        writeln!(out, "{}", ack.message)?;
        writeln!(out)?;
    }

    let checkpoint = follow(client, version.id, json, timeouts, out)?;
    Ok(checkpoint.status)
}

/// Cancel the latest version while it is pending or building
pub fn cancel(client: &ApiClient, root: &Path, json: bool, out: &mut dyn Write) -> CommandResult<()> {
    require_token(client)?;
    let (_, slug) = load_project(root)?;
    let version = latest_version(client, &slug)?;

    if !version.status.is_in_progress() {
        return Err(CommandError::not_allowed(
            version.status,
            "can only cancel pending or building versions",
        ));
    }

    let ack = client
        .cancel_version(version.id)
        .map_err(CommandError::client("cancelling version"))?;

    if json {
        return print_json(out, &ack);
    }
    writeln!(out, "{}", ack.message)?;
    Ok(())
}

/// Withdraw the latest version, after confirmation in human mode
pub fn withdraw(
    client: &ApiClient,
    root: &Path,
    json: bool,
    confirm: &dyn Confirm,
    out: &mut dyn Write,
) -> CommandResult<()> {
    require_token(client)?;
    let (_, slug) = load_project(root)?;
    let version = latest_version(client, &slug)?;

    if matches!(
        version.status,
        VersionStatus::Published | VersionStatus::Building
    ) {
        return Err(CommandError::not_allowed(version.status, "cannot withdraw"));
    }

    if !json {
        let question = format!(
            "Withdraw version {}? This will remove the version from review.",
            version.version
        );
        if !confirm.confirm(&question)? {
            writeln!(out, "Cancelled.")?;
            return Ok(());
        }
    }

    let ack = client
        .delete_version(version.id)
        .map_err(CommandError::client("withdrawing version"))?;

    if json {
        return print_json(out, &ack);
    }
    writeln!(out, "{}", ack.message)?;
    Ok(())
}

/// Tail from cursor 0. Human mode streams the text and ends with a banner;
/// JSON mode prints one object with the whole log.
fn follow(
    client: &ApiClient,
    version_id: u64,
    json: bool,
    timeouts: TailTimeouts,
    out: &mut dyn Write,
) -> CommandResult<LogCheckpoint> {
    if json {
        let mut log = Vec::new();
        let checkpoint = tail_log(client, version_id, 0, timeouts, &mut log)?;
        print_json(
            out,
            &json!({
                "version_id": version_id,
                "status": checkpoint.status,
                "cursor": checkpoint.cursor,
                "log": String::from_utf8_lossy(&log),
            }),
        )?;
        return Ok(checkpoint);
    }

    let checkpoint = tail_log(client, version_id, 0, timeouts, out)?;
    writeln!(out)?;
    writeln!(out, "{}", status_banner(checkpoint.status))?;
    Ok(checkpoint)
}
