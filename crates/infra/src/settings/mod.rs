//! Settings for the ledger facade and its binaries.
//!
//! Layered loading:
//! 1. Default values (embedded in structs)
//! 2. TOML file
//! 3. Environment variables (highest priority)
//!
//! # Environment Variables
//!
//! Settings can be overridden with `JOBPORTAL__<section>__<key>`:
//! - `JOBPORTAL__LEDGER__INITIAL_FEE=20`
//! - `JOBPORTAL__LEDGER__ADMINISTRATOR=0x...`
//! - `JOBPORTAL__TELEMETRY__JSON=false`
//!
//! # Settings File
//!
//! Loaded from `config/jobportal.toml` unless `JOBPORTAL_CONFIG` points
//! elsewhere. A missing file is not an error.

mod models;
mod sources;
mod validation;

pub use models::{LedgerSettings, Settings, TelemetrySettings};
pub use validation::ValidationError;

use jobportal_core::PrincipalId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Settings validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Settings {
    /// Load from all sources (file + environment) and validate.
    pub fn load() -> Result<Self, SettingsError> {
        let settings = sources::load()?;
        validation::validate(&settings)?;
        Ok(settings)
    }

    /// Load from a specific file (plus the environment) and validate.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, SettingsError> {
        let settings = sources::load_from_sources(path)?;
        validation::validate(&settings)?;
        Ok(settings)
    }

    /// The configured administrator, if any.
    pub fn administrator(&self) -> Result<Option<PrincipalId>, SettingsError> {
        Ok(validation::administrator(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_validated_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("jobportal.toml");

        fs::write(
            &config_path,
            r#"
[ledger]
initial_fee = 10
administrator = "0x1111111111111111111111111111111111111111"
max_conflict_retries = 5
            "#,
        )
        .unwrap();

        let settings = Settings::load_from_path(config_path).unwrap();
        assert_eq!(settings.ledger.max_conflict_retries, 5);
        assert!(settings.administrator().unwrap().is_some());
    }

    #[test]
    fn test_validation_runs_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("jobportal.toml");

        fs::write(&config_path, "[ledger]\nmax_conflict_retries = 0\n").unwrap();

        assert!(matches!(
            Settings::load_from_path(config_path),
            Err(SettingsError::ValidationError(
                ValidationError::ZeroConflictRetries
            ))
        ));
    }

    #[test]
    fn test_malformed_file_is_a_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("jobportal.toml");

        fs::write(&config_path, "[ledger\ninitial_fee = ").unwrap();

        assert!(matches!(
            Settings::load_from_path(config_path),
            Err(SettingsError::LoadError(_))
        ));
    }
}
