//! User configuration: where to stage files, what to pull, where to push.
//!
//! Persisted as TOML. A missing file means defaults; an unreadable or
//! malformed one is a setup failure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory name under the platform config directory.
pub const APP_DIR_NAME: &str = "fetchsync";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot determine the home or config directory")]
    NoHomeDirectory,

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

/// A remote sync target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Key under which uploads are recorded in the state store.
    pub name: String,
    /// `rclone` remote (`gdrive:Quest`) or absolute directory path.
    pub remote: String,
}

impl Destination {
    pub fn new(name: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote: remote.into(),
        }
    }

    /// Full remote path for a `/`-separated path relative to the sync root.
    pub fn remote_path(&self, relative: &str) -> String {
        let mut remote = self.remote.clone();
        if !remote.ends_with('/') && !remote.ends_with(':') {
            remote.push('/');
        }
        remote.push_str(relative.trim_start_matches('/'));
        remote
    }
}

/// A directory on the source to pull from, with the label of the local
/// staging directory its files land in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPath {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl MediaPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            category: None,
        }
    }

    pub fn with_category(path: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            category: Some(category.into()),
        }
    }

    /// Explicit category, or one guessed from well-known directory names.
    pub fn category(&self) -> &str {
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            return category;
        }
        let lower = self.path.to_lowercase();
        if lower.contains("videoshots") {
            "Videos"
        } else if lower.contains("screenshots") {
            "Screenshots"
        } else if lower.contains("photos") {
            "Photos"
        } else {
            "Other"
        }
    }
}

/// Per-source settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_ip: Option<String>,
}

/// Per-source settings keyed by source id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceRegistry(BTreeMap<String, DeviceSettings>);

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_id: &str) -> Option<&DeviceSettings> {
        self.0.get(source_id)
    }

    /// Insert or replace the settings of a source, returning the old ones.
    pub fn insert(&mut self, source_id: impl Into<String>, settings: DeviceSettings) -> Option<DeviceSettings> {
        self.0.insert(source_id.into(), settings)
    }

    pub fn remove(&mut self, source_id: &str) -> Option<DeviceSettings> {
        self.0.remove(source_id)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.0.contains_key(source_id)
    }

    /// Nickname if one is set, the raw id otherwise.
    pub fn display_name<'a>(&'a self, source_id: &'a str) -> &'a str {
        self.get(source_id)
            .and_then(|s| s.nickname.as_deref())
            .unwrap_or(source_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeviceSettings)> {
        self.0.iter().map(|(id, settings)| (id.as_str(), settings))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Top-level configuration, handed to each component at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local staging root. A leading `~` is the home directory.
    pub sync_dir: String,
    /// Extra junk-file patterns skipped when listing a source.
    pub exclude: Vec<String>,
    pub media_paths: Vec<MediaPath>,
    pub destinations: Vec<Destination>,
    pub devices: DeviceRegistry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_dir: "~/FetchSync".to_string(),
            exclude: Vec::new(),
            media_paths: vec![
                MediaPath::new("/sdcard/Oculus/VideoShots/"),
                MediaPath::new("/sdcard/Oculus/Screenshots/"),
            ],
            destinations: Vec::new(),
            devices: DeviceRegistry::new(),
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/fetchsync`, else the platform config directory.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(xdg).join(APP_DIR_NAME));
        }
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::NoHomeDirectory)
    }

    pub fn path_in(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE_NAME)
    }

    /// Load from `config_dir`, falling back to defaults when no file exists.
    pub fn load_from(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(config_dir);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        let config: Config =
            toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Write to `config_dir`, creating it if needed.
    pub fn save_to(&self, config_dir: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;
        let text = toml::to_string_pretty(self)?;
        let path = Self::path_in(config_dir);
        fs::write(&path, text).map_err(|source| ConfigError::Write { path, source })
    }

    /// Destination names must be unique: they key the upload records.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, dest) in self.destinations.iter().enumerate() {
            if dest.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "destination #{} has an empty name",
                    i + 1
                )));
            }
            if self.destinations[..i].iter().any(|d| d.name == dest.name) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate destination name '{}'",
                    dest.name
                )));
            }
        }
        Ok(())
    }

    /// The staging root with `~` expanded.
    pub fn expand_sync_dir(&self) -> PathBuf {
        expand_home(&self.sync_dir)
    }

    pub fn destination(&self, name: &str) -> Option<&Destination> {
        self.destinations.iter().find(|d| d.name == name)
    }

    pub fn destination_names(&self) -> Vec<&str> {
        self.destinations.iter().map(|d| d.name.as_str()).collect()
    }
}

fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) => rest,
        None => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
    }
}
