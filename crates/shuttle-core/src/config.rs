//! Config - TOML 設定
//!
//! Lookup order: `$SHUTTLE_CONFIG`, then `./shuttle.toml`, then built-in
//! defaults. Every field has a default, so a partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::domain::TransferError;
use crate::transfer::backoff::BackoffPolicy;
use crate::transfer::bulk::{BulkTransfer, DEFAULT_QUEUE_DEPTH, DEFAULT_WORKERS};

pub const CONFIG_ENV: &str = "SHUTTLE_CONFIG";
pub const CONFIG_FILE: &str = "shuttle.toml";

fn default_log_level() -> String {
    "info".to_string()
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_steps() -> u32 {
    5
}

fn default_jitter() -> f64 {
    0.1
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShuttleConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub s3: S3Config,

    #[serde(default)]
    pub gcs: GcsConfig,
}

impl ShuttleConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, TransferError> {
        let cfg: ShuttleConfig =
            toml::from_str(s).map_err(|e| TransferError::Config(format!("parse toml: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, TransferError> {
        let s = std::fs::read_to_string(path).map_err(|e| {
            TransferError::Config(format!("read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&s)
            .map_err(|e| TransferError::Config(format!("{}: {e}", path.display())))
    }

    /// `$SHUTTLE_CONFIG` if set (it must exist), else `./shuttle.toml` if
    /// present, else defaults.
    pub fn load() -> Result<Self, TransferError> {
        match resolve_config_path() {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), TransferError> {
        if self.transfer.workers == 0 {
            return Err(TransferError::Config(
                "transfer.workers must be at least 1".to_string(),
            ));
        }
        if self.transfer.queue_depth == 0 {
            return Err(TransferError::Config(
                "transfer.queue_depth must be at least 1".to_string(),
            ));
        }
        self.backoff.to_policy().map(|_| ())
    }
}

impl Default for ShuttleConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            backoff: BackoffConfig::default(),
            transfer: TransferConfig::default(),
            s3: S3Config::default(),
            gcs: GcsConfig::default(),
        }
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path.trim()));
        }
    }
    let local = PathBuf::from(CONFIG_FILE);
    local.exists().then_some(local)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl BackoffConfig {
    pub fn to_policy(&self) -> Result<BackoffPolicy, TransferError> {
        BackoffPolicy::new(
            Duration::from_millis(self.initial_delay_ms),
            self.multiplier,
            self.max_steps,
            self.jitter,
        )
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_steps: default_max_steps(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Create a missing parent directory on Load instead of failing.
    #[serde(default)]
    pub create_missing_parents: bool,
}

impl TransferConfig {
    pub fn bulk(&self) -> BulkTransfer {
        BulkTransfer::new(self.workers, self.queue_depth)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            create_missing_parents: false,
        }
    }
}

/// Provider-wide S3 settings. A descriptor's own endpoint/region win.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Config {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub virtual_host_style: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub io_timeout_ms: Option<u64>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: default_region(),
            virtual_host_style: false,
            timeout_ms: None,
            io_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GcsConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub io_timeout_ms: Option<u64>,
}
