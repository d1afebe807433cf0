//! Environment-backed configuration.
//!
//! Every setting has a default. Override with `KBFS_CACHE_*` environment variables.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheContext;

/// Block cache configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `KBFS_CACHE_*` overrides on top of defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding both tier folders. Default: `./.kbfs_cache`.
    pub storage_root: PathBuf,

    /// Open the sync tier at startup. Default: `false`.
    pub enable_sync_tier: bool,

    /// Canonical names of TLFs in sync mode.
    pub synced_tlfs: Vec<String>,

    /// Deadline applied to each cache call. `None` means no deadline.
    pub op_timeout: Option<Duration>,
}

/// Default storage root used when `KBFS_CACHE_STORAGE_ROOT` is not set.
pub const DEFAULT_STORAGE_ROOT: &str = "./.kbfs_cache";

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            enable_sync_tier: false,
            synced_tlfs: Vec::new(),
            op_timeout: None,
        }
    }
}

impl Config {
    const ENV_STORAGE_ROOT: &'static str = "KBFS_CACHE_STORAGE_ROOT";
    const ENV_ENABLE_SYNC: &'static str = "KBFS_CACHE_ENABLE_SYNC";
    const ENV_SYNCED_TLFS: &'static str = "KBFS_CACHE_SYNCED_TLFS";
    const ENV_OP_TIMEOUT_MS: &'static str = "KBFS_CACHE_OP_TIMEOUT_MS";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let storage_root = Self::parse_path_from_env(Self::ENV_STORAGE_ROOT, defaults.storage_root);
        let enable_sync_tier =
            Self::parse_bool_from_env(Self::ENV_ENABLE_SYNC, defaults.enable_sync_tier)?;
        let synced_tlfs = Self::parse_list_from_env(Self::ENV_SYNCED_TLFS);
        let op_timeout = Self::parse_timeout_from_env()?;

        Ok(Self {
            storage_root,
            enable_sync_tier,
            synced_tlfs,
            op_timeout,
        })
    }

    /// Validates paths and basic invariants (does not create directories).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_root.exists() && !self.storage_root.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: self.storage_root.clone(),
            });
        }

        if self.op_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }

    /// Fresh context for one cache call, carrying the configured deadline.
    pub fn context(&self) -> CacheContext {
        match self.op_timeout {
            Some(timeout) => CacheContext::with_timeout(timeout),
            None => CacheContext::new(),
        }
    }

    fn parse_path_from_env(var_name: &str, default: PathBuf) -> PathBuf {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(default)
    }

    fn parse_bool_from_env(var_name: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Ok(value) = env::var(var_name) else {
            return Ok(default);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                name: var_name,
                value,
            }),
        }
    }

    fn parse_list_from_env(var_name: &str) -> Vec<String> {
        env::var(var_name)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn parse_timeout_from_env() -> Result<Option<Duration>, ConfigError> {
        match env::var(Self::ENV_OP_TIMEOUT_MS) {
            Ok(value) if !value.trim().is_empty() => {
                let millis: u64 =
                    value
                        .trim()
                        .parse()
                        .map_err(|e| ConfigError::InvalidTimeout {
                            value: value.clone(),
                            source: e,
                        })?;
                Ok(Some(Duration::from_millis(millis)))
            }
            _ => Ok(None),
        }
    }
}
