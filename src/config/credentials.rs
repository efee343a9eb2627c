//! User config file (layer 2)
//!
//! `~/.kyper/config.toml` holds the API token written by `login` plus any
//! user overrides. The directory is private to the user.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::effective::ConfigError;
use super::merge::toml_to_json;

/// Directory under the home directory
pub const CONFIG_DIR_NAME: &str = ".kyper";

/// File name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default location of the user config file
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir()
        .ok_or_else(|| ConfigError::IoError("cannot determine home directory".to_string()))?;
    Ok(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load the config file as a merge layer. A missing file is an empty layer.
pub fn load_layer(path: &Path) -> Result<Value, ConfigError> {
    let table = read_table(path)?;
    Ok(toml_to_json(toml::Value::Table(table)))
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file");
            return Ok(toml::Table::new());
        }
        Err(e) => {
            return Err(ConfigError::IoError(format!(
                "reading {}: {}",
                path.display(),
                e
            )))
        }
    };

    toml::from_str(&contents).map_err(|e| {
        ConfigError::ParseError(format!("TOML parse error in {}: {}", path.display(), e))
    })
}

/// Store the API token, keeping every other key in the file.
///
/// Creates the parent directory with mode 0700 and writes the file with
/// mode 0600 on Unix.
pub fn save_token(path: &Path, token: &str) -> Result<(), ConfigError> {
    let mut table = read_table(path)?;
    table.insert(
        "api_token".to_string(),
        toml::Value::String(token.to_string()),
    );

    let contents = toml::to_string(&table)
        .map_err(|e| ConfigError::ParseError(format!("TOML encode error: {}", e)))?;

    if let Some(dir) = path.parent() {
        create_private_dir(dir)
            .map_err(|e| ConfigError::IoError(format!("creating {}: {}", dir.display(), e)))?;
    }
    write_private_file(path, contents.as_bytes())
        .map_err(|e| ConfigError::IoError(format!("writing {}: {}", path.display(), e)))
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // An existing file keeps its old mode on open
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(path, bytes)
}
