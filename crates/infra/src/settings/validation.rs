use super::models::Settings;
use jobportal_core::PrincipalId;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("ledger.administrator '{value}' is not a 20-byte hex address")]
    InvalidAdministrator { value: String },

    #[error("ledger.max_conflict_retries must be at least 1")]
    ZeroConflictRetries,

    #[error("telemetry.log_filter '{value}' is not a valid filter directive")]
    InvalidLogFilter { value: String },
}

/// Validate the entire settings tree.
pub fn validate(settings: &Settings) -> Result<(), ValidationError> {
    administrator(settings)?;
    if settings.ledger.max_conflict_retries == 0 {
        return Err(ValidationError::ZeroConflictRetries);
    }
    if EnvFilter::try_new(&settings.telemetry.log_filter).is_err() {
        return Err(ValidationError::InvalidLogFilter {
            value: settings.telemetry.log_filter.clone(),
        });
    }
    Ok(())
}

/// The configured administrator, parsed.
pub fn administrator(settings: &Settings) -> Result<Option<PrincipalId>, ValidationError> {
    settings
        .ledger
        .administrator
        .as_deref()
        .map(|raw| {
            raw.parse::<PrincipalId>()
                .map_err(|_| ValidationError::InvalidAdministrator {
                    value: raw.to_string(),
                })
        })
        .transpose()
}
