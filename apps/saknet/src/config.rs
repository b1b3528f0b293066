//! saknet configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/saknet/saknet.toml`
//! - Windows: `%APPDATA%/saknet/saknet.toml`
//!
//! The salt is hex-encoded. The passphrase may be left out of the file
//! and supplied through `SAKNET_PASSPHRASE` instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use saknet_data_channel::DataOptions;
use saknet_protocol::DEFAULT_MAX_PAYLOAD;
use saknet_transfer::{DEFAULT_CHUNK_SIZE, PermissionMode};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `passphrase`.
pub const PASSPHRASE_ENV: &str = "SAKNET_PASSPHRASE";

/// saknet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Session identifier; both peers must agree on it.
    #[serde(default = "default_transfer_id")]
    pub transfer_id: String,

    #[serde(default)]
    pub passphrase: String,

    /// Key derivation salt, hex-encoded (at least 16 bytes).
    #[serde(default)]
    pub salt: String,

    #[serde(default = "default_true")]
    pub encryption_enabled: bool,

    #[serde(default = "default_true")]
    pub compression_enabled: bool,

    #[serde(default = "default_true")]
    pub resume_enabled: bool,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Sender bandwidth cap in KiB/s (0 = unlimited).
    #[serde(default)]
    pub max_bandwidth_kbps: u32,

    /// Where the receiver writes incoming files.
    #[serde(default = "default_destination")]
    pub destination: PathBuf,

    #[serde(default = "default_max_frame_payload")]
    pub max_frame_payload: u32,

    /// First path segment → permission mode.
    #[serde(default)]
    pub permission_modes: HashMap<String, PermissionMode>,

    /// Relative path → SDDL.
    #[serde(default)]
    pub acl_overrides: HashMap<String, String>,
}

fn default_transfer_id() -> String {
    "saknet".into()
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

fn default_destination() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_frame_payload() -> u32 {
    DEFAULT_MAX_PAYLOAD
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transfer_id: default_transfer_id(),
            passphrase: String::new(),
            salt: String::new(),
            encryption_enabled: default_true(),
            compression_enabled: default_true(),
            resume_enabled: default_true(),
            chunk_size: default_chunk_size(),
            max_bandwidth_kbps: 0,
            destination: default_destination(),
            max_frame_payload: default_max_frame_payload(),
            permission_modes: HashMap::new(),
            acl_overrides: HashMap::new(),
        }
    }
}

impl Config {
    /// Loads `path`, or the platform default file when `path` is `None`.
    ///
    /// An explicit path must exist; a missing default file yields the
    /// defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = config_path()?;
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    tracing::debug!(path = %path.display(), "no configuration file, using defaults");
                    Config::default()
                }
            }
        };

        if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
            config.passphrase = passphrase;
        }
        Ok(config)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Builds validated session options.
    pub fn to_options(&self) -> anyhow::Result<DataOptions> {
        let salt = hex::decode(self.salt.trim()).context("salt is not valid hex")?;
        let options = DataOptions {
            transfer_id: self.transfer_id.clone(),
            encryption_enabled: self.encryption_enabled,
            compression_enabled: self.compression_enabled,
            resume_enabled: self.resume_enabled,
            chunk_size: self.chunk_size,
            max_bandwidth_kbps: self.max_bandwidth_kbps,
            passphrase: self.passphrase.clone(),
            salt,
            destination_base: self.destination.clone(),
            total_bytes: 0,
            permission_modes: self.permission_modes.clone(),
            acl_overrides: self.acl_overrides.clone(),
            max_frame_payload: self.max_frame_payload,
        };
        options.validate()?;
        Ok(options)
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").context("APPDATA is not set")?;
        Ok(PathBuf::from(appdata).join("saknet").join("saknet.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("saknet")
            .join("saknet.toml"))
    }
}
