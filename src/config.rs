//! Store configuration loaded from TOML with environment overrides.
//!
//! Precedence: explicit path > `KVDOCS_CONFIG` > `./kvdocs.toml` > defaults.
//! After a file is chosen, `KVDOCS_STORAGE_PATH`, `KVDOCS_LOG_LEVEL`,
//! `KVDOCS_LOG_DIR`, `KVDOCS_LOG_RETENTION` and `KVDOCS_DEV6` override the
//! matching fields.

use crate::errors::DbError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "KVDOCS_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "kvdocs.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Log,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: BackendKind,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub level: String,
    /// Rolled files kept per log.
    pub retention: usize,
    /// Persist `dev6!` traces to `dev6.log`.
    pub dev6: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self { enabled: false, dir: None, level: "info".into(), retention: 7, dev6: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    pub slow_query_ms: u64,
    /// Emit one audit line per written document.
    pub audit: bool,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self { slow_query_ms: 500, audit: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub storage: StorageSection,
    pub logging: LoggingSection,
    pub telemetry: TelemetrySection,
}

impl StoreConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    /// `Config` on a syntax error, unknown backend, or invalid combination.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        let cfg: Self = toml::from_str(s).map_err(|e| DbError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    /// `Io` when the file cannot be read, `Config` when it does not parse.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| DbError::Config(format!("{}: {e}", path.display())))
    }

    /// Resolve configuration using the documented precedence.
    ///
    /// # Errors
    /// Fails when the chosen file cannot be read or parsed, or when the
    /// final configuration is invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self, DbError> {
        let mut cfg = match Self::candidate(explicit) {
            Some(path) => {
                log::info!("loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        cfg.apply_overrides(|k| std::env::var(k).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    fn candidate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = explicit {
            return Some(p.to_path_buf());
        }
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(p));
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        local.exists().then_some(local)
    }

    /// Apply `KVDOCS_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(p) = lookup("KVDOCS_STORAGE_PATH") {
            self.storage.path = Some(PathBuf::from(p));
        }
        if let Some(level) = lookup("KVDOCS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(dir) = lookup("KVDOCS_LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(dir));
        }
        if let Some(keep) = lookup("KVDOCS_LOG_RETENTION").and_then(|s| s.parse().ok()) {
            self.logging.retention = keep;
        }
        if let Some(flag) = lookup("KVDOCS_DEV6") {
            self.logging.dev6 = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// # Errors
    /// `Config` when the log backend has no path.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.storage.backend == BackendKind::Log && self.storage.path.is_none() {
            return Err(DbError::Config("storage.backend = \"log\" requires storage.path".into()));
        }
        Ok(())
    }
}
