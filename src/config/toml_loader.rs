//! TOML settings file loading.
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// File name looked up under the configuration directories.
pub const FILE_NAME: &str = "config.toml";

/// Deserialize `path`; a missing file yields `T`'s empty form.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file exists but cannot be read and
/// [`ConfigError::Parse`] if it is not valid TOML for `T`.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        tracing::debug!("no settings file at {}", path.display());
        return parse(path, "");
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(path, &content)
}

fn parse<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.message().to_string(),
    })
}

/// Default settings path: `$XDG_CONFIG_HOME/cfenjin/config.toml`, else
/// `~/.config/cfenjin/config.toml`.
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| crate::platform::home_dir().map(|home| home.join(".config")))?;
    Some(base.join("cfenjin").join(FILE_NAME))
}
