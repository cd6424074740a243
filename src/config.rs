//! Configuration file parser for ~/.config/gator/config.toml.
//!
//! The file holds the logged-in user's name plus a few tuning knobs for the
//! collector. A missing or empty file yields `Config::default()`; unknown
//! keys are accepted and logged as a warning.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::fetcher::DEFAULT_USER_AGENT;
use crate::feed::scheduler::DEFAULT_WORKERS;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("HOME environment variable not set")]
    NoHomeDir,

    #[error("No user logged in, run `gator register <name>` or `gator login <name>` first")]
    NoCurrentUser,
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the logged-in user, set by `register` and `login`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,

    /// SQLite database path. Relative paths resolve against the config
    /// file's directory; `None` means `gator.db` next to the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    pub user_agent: String,

    /// Fetch pool size, also the number of feeds claimed per cycle.
    pub workers: usize,

    pub fetch_timeout_secs: u64,

    /// Default post count for `browse`.
    pub browse_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            current_user_name: None,
            database_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            workers: DEFAULT_WORKERS,
            fetch_timeout_secs: 30,
            browse_limit: 2,
        }
    }
}

const KNOWN_KEYS: [&str; 6] = [
    "current_user_name",
    "database_path",
    "user_agent",
    "workers",
    "fetch_timeout_secs",
    "browse_limit",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// `~/.config/gator/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = std::env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .ok_or(ConfigError::NoHomeDir)?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("gator")
            .join("config.toml"))
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            user = config.current_user_name.as_deref().unwrap_or("-"),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Write the whole config to `path` atomically.
    ///
    /// Goes through a temp file in the same directory plus a rename, so a
    /// crash never leaves a half-written config behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_private_dir(dir)?;
        }
        atomic_write(path, content.as_bytes())?;
        Ok(())
    }

    /// Persist `name` as the current user, keeping every other field.
    pub fn set_user(path: &Path, name: &str) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.current_user_name = Some(name.to_string());
        config.save(path)?;
        tracing::debug!(user = %name, "Current user updated");
        Ok(config)
    }

    pub fn current_user(&self) -> Result<&str, ConfigError> {
        self.current_user_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or(ConfigError::NoCurrentUser)
    }

    /// Resolve the database path relative to the directory holding the
    /// config file.
    pub fn resolve_database_path(&self, config_path: &Path) -> PathBuf {
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        match &self.database_path {
            Some(p) if p.is_absolute() || p.as_os_str() == ":memory:" => p.clone(),
            Some(p) => base.join(p),
            None => base.join("gator.db"),
        }
    }
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

/// Write-to-temp-then-rename; the destination is never left partial.
fn atomic_write(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};

    // Unpredictable temp name, created with create_new so a planted symlink
    // makes the open fail
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let result = (|| {
        let mut temp_file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        temp_file.write_all(content)?;
        temp_file.sync_all()?;
        drop(temp_file);

        // On Windows, rename fails if destination exists
        #[cfg(windows)]
        if dst.exists() {
            std::fs::remove_file(dst)?;
        }

        std::fs::rename(&temp_path, dst)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

// ============================================================================
// Tests
// ============================================================================
