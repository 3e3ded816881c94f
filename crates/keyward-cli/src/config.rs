use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use keyward_storage::key_provider::generate_secret;
use serde::{Deserialize, Serialize};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Environment variable consulted when `secret_key` is not set in the file.
pub const SECRET_KEY_ENV: &str = "KEYWARD_SECRET_KEY";

/// Where the field key comes from.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// Derived from `secret_key` / `KEYWARD_SECRET_KEY`.
    #[default]
    Config,
    /// Random key kept in the OS keychain.
    Keyring,
}

/// User-level configuration loaded from `~/.config/keyward/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the record store directory.
    pub data_dir: Option<PathBuf>,
    /// Key files are written under `<project_dir>/tmp`. Defaults to the data directory.
    pub project_dir: Option<PathBuf>,
    pub secret_key: Option<String>,
    #[serde(default)]
    pub key_source: KeySource,
    /// Output directory of the `file` push target.
    pub push_dir: Option<PathBuf>,
}

impl Config {
    /// Secret from the file, falling back to the environment.
    pub fn resolve_secret(&self) -> Option<String> {
        self.secret_key
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var(SECRET_KEY_ENV).ok().filter(|s| !s.is_empty()))
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("keyward").join("config.toml"))
}

/// Write `config` to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

/// Never clobbers an existing file. A secret is generated when the config
/// relies on one and none is set.
pub fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut config = config.clone();
    if config.key_source == KeySource::Config && config.secret_key.is_none() {
        config.secret_key = Some(generate_secret());
    }
    let body = toml::to_string_pretty(&config)?;
    fs::write(path, body)?;
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(path.to_path_buf())
}
