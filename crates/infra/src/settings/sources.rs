use super::models::Settings;
use config::{ConfigError, Environment, File, FileFormat};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "JOBPORTAL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/jobportal.toml";
const ENV_PREFIX: &str = "JOBPORTAL";
const ENV_SEPARATOR: &str = "__";

/// Load settings from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Settings, ConfigError> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Load settings from a specific path plus the environment.
pub fn load_from_sources(config_path: PathBuf) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading settings from: {}", config_path.display());
        builder = builder.add_source(
            File::from(config_path)
                .format(FileFormat::Toml)
                .required(false),
        );
    } else {
        tracing::debug!(
            "Settings file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // JOBPORTAL__LEDGER__INITIAL_FEE -> ledger.initial_fee
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobportal_ledger::Amount;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let settings = load_from_sources(config_path).unwrap();
        assert_eq!(settings.ledger.max_conflict_retries, 3);
        assert!(!settings.ledger.poster_may_close);
        assert_eq!(settings.telemetry.log_filter, "info");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[ledger]
initial_fee = "250000000000000000000"
administrator = "0x00000000000000000000000000000000000000aa"
poster_may_close = true

[telemetry]
json = false
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = load_from_sources(config_path).unwrap();
        assert_eq!(
            settings.ledger.initial_fee,
            Amount::new(250_000_000_000_000_000_000)
        );
        assert!(settings.ledger.poster_may_close);
        assert!(!settings.telemetry.json);
        assert_eq!(settings.ledger.max_conflict_retries, 3);
    }

    #[test]
    fn test_integer_fee_is_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[ledger]\ninitial_fee = 10\n").unwrap();

        let settings = load_from_sources(config_path).unwrap();
        assert_eq!(settings.ledger.initial_fee, Amount::new(10));
    }
}
