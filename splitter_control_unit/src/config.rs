//! TOML configuration store.
//!
//! Loads the persisted [`ControllerConfig`] at startup and saves it on
//! explicit parameter change. A missing or invalid file falls back to
//! defaults (and writes them out), mirroring how the controller must come
//! up runnable from a blank or corrupted store. Validation runs on every
//! load *and* every save: an in-memory config that fails its bounds is
//! never written.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use splitter_common::config::ControllerConfig;

/// Configuration store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("config validation: {0}")]
    Validation(String),
}

/// File-backed configuration store.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

/// Result of the startup load.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: ControllerConfig,
    /// True when the file was missing/invalid and defaults were substituted.
    pub defaults_used: bool,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, falling back to validated defaults.
    ///
    /// Never fails: a controller with an unreadable store still has to run.
    /// The substituted defaults are written back so the next boot loads
    /// cleanly; a failed write-back is reported through the returned error
    /// slot without affecting the in-memory config.
    pub fn load_or_default(&self) -> (LoadedConfig, Option<StoreError>) {
        match self.try_load() {
            Ok(config) => {
                info!(path = %self.path.display(), "configuration loaded");
                (
                    LoadedConfig {
                        config,
                        defaults_used: false,
                    },
                    None,
                )
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "configuration load failed - using defaults");
                let config = ControllerConfig::default();
                let save_err = self.save(&config).err();
                (
                    LoadedConfig {
                        config,
                        defaults_used: true,
                    },
                    Some(save_err.unwrap_or(err)),
                )
            }
        }
    }

    /// Strict load: parse + validate, no fallback.
    pub fn try_load(&self) -> Result<ControllerConfig, StoreError> {
        let text = std::fs::read_to_string(&self.path)?;
        let config: ControllerConfig = toml::from_str(&text)?;
        config.validate().map_err(StoreError::Validation)?;
        Ok(config)
    }

    /// Validate and persist.
    pub fn save(&self, config: &ControllerConfig) -> Result<(), StoreError> {
        config.validate().map_err(StoreError::Validation)?;
        let text = toml::to_string_pretty(config)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, text)?;
        info!(path = %self.path.display(), "configuration saved");
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use splitter_common::consts::DEFAULT_SEQUENCE_TIMEOUT_MS;

    fn store_in(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("splitter.toml"))
    }

    #[test]
    fn missing_file_yields_defaults_and_writes_them() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let (loaded, _) = store.load_or_default();
        assert!(loaded.defaults_used);
        assert_eq!(loaded.config, ControllerConfig::default());

        // The write-back makes the next load clean.
        let (reloaded, err) = store.load_or_default();
        assert!(!reloaded.defaults_used);
        assert!(err.is_none());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut config = ControllerConfig::default();
        config.timing.timeout_ms = 20_000;
        config.safety.threshold_psi = 2_000.0;
        config.safety.extend_pressure_limit_psi = 1_800.0;
        config.safety.retract_pressure_limit_psi = 1_800.0;
        store.save(&config).unwrap();

        let loaded = store.try_load().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{{not toml").unwrap();

        let (loaded, err) = store.load_or_default();
        assert!(loaded.defaults_used);
        assert!(err.is_some());
        assert_eq!(loaded.config.timing.timeout_ms, DEFAULT_SEQUENCE_TIMEOUT_MS);
    }

    #[test]
    fn out_of_range_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"
[timing]
timeout_ms = 1
"#,
        )
        .unwrap();

        assert!(matches!(store.try_load(), Err(StoreError::Validation(_))));
        let (loaded, _) = store.load_or_default();
        assert!(loaded.defaults_used);
    }

    #[test]
    fn save_refuses_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut config = ControllerConfig::default();
        config.timing.timeout_ms = 0;
        assert!(matches!(store.save(&config), Err(StoreError::Validation(_))));
        assert!(!store.path().exists());
    }
}
