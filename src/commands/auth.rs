//! Device login and identity

use std::io::Write;
use std::path::PathBuf;

use kyper_api::User;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{print_json, require_token, CommandError, CommandResult};
use crate::config::save_token;
use crate::host::ApiClient;
use crate::progress::with_spinner;
use crate::timeout::TailTimeouts;

/// Login settings
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Where the token is saved
    pub config_path: PathBuf,

    /// Token poll interval and handshake deadline
    pub timeouts: TailTimeouts,

    pub json: bool,

    pub spinner: bool,

    /// Try to launch the system browser on the verification URI
    pub open_browser: bool,
}

impl LoginOptions {
    /// JSON mode never launches anything
    pub fn opens_browser(&self) -> bool {
        self.open_browser && !self.json
    }
}

/// Device handshake: request a code, wait for approval, save the token and
/// confirm it with `me`
pub fn login(client: &ApiClient, options: &LoginOptions, out: &mut dyn Write) -> CommandResult<User> {
    let grant = with_spinner(options.spinner, "Requesting device code...", || {
        client.device_authorize()
    })
    .map_err(CommandError::client("requesting device code"))?;

    if options.json {
        eprintln!("Open {} in your browser to authenticate", grant.verification_uri);
    } else {
        writeln!(out)?;
        writeln!(out, "Open this URL in your browser to authenticate:")?;
        writeln!(out)?;
        writeln!(out, "  {}", grant.verification_uri)?;
        writeln!(out)?;
    }

    if options.opens_browser() {
        // Best effort: the URI is already printed
        if let Err(e) = open::that_detached(&grant.verification_uri) {
            warn!(error = %e, "could not open a browser");
        }
    }

    let token = with_spinner(options.spinner, "Waiting for authorization...", || {
        wait_for_token(client, &grant.code, options.timeouts)
    })?;
    save_token(&options.config_path, &token)?;
    info!(path = %options.config_path.display(), "token saved");

    let user = client
        .with_token(token)
        .me()
        .map_err(CommandError::client("verifying identity"))?;

    if options.json {
        print_json(out, &json!({"email": user.email, "role": user.role}))?;
    } else {
        writeln!(out, "Logged in as {} ({})", user.email, user.role)?;
    }
    Ok(user)
}

/// Poll the token endpoint until the grant is approved
fn wait_for_token(client: &ApiClient, code: &str, timeouts: TailTimeouts) -> CommandResult<String> {
    let deadline = timeouts.start();
    loop {
        deadline.sleep(timeouts.poll_interval);
        if deadline.is_expired() {
            return Err(CommandError::LoginTimeout(deadline.limit()));
        }

        match client.device_token(code) {
            Ok(response) => match response.token() {
                Some(token) => return Ok(token.to_string()),
                None => debug!("authorization pending"),
            },
            Err(e) if e.is_not_found() => return Err(CommandError::DeviceExpired),
            Err(e) => return Err(CommandError::client("polling for token")(e)),
        }
    }
}

/// Show the authenticated user
pub fn whoami(client: &ApiClient, json: bool, out: &mut dyn Write) -> CommandResult<User> {
    require_token(client)?;
    let user = client
        .me()
        .map_err(CommandError::client("fetching user"))?;

    if json {
        print_json(out, &user)?;
    } else {
        writeln!(out, "{} ({})", user.email, user.role)?;
    }
    Ok(user)
}
