use serde::{Deserialize, Serialize};

use jobportal_ledger::Amount;

/// Root settings structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

/// Deployment defaults and facade tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerSettings {
    /// Fee charged per posting, in the smallest unit.
    #[serde(default = "default_initial_fee")]
    pub initial_fee: Amount,
    /// `0x`-prefixed address of the deploying administrator. A fresh one is
    /// generated at deploy time when unset.
    #[serde(default)]
    pub administrator: Option<String>,
    /// Lets posters close their own open jobs.
    #[serde(default)]
    pub poster_may_close: bool,
    /// How often a command is retried after losing an optimistic append race.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            initial_fee: default_initial_fee(),
            administrator: None,
            poster_may_close: false,
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetrySettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            json: default_json(),
        }
    }
}

// 0.01 in 18-decimal units.
fn default_initial_fee() -> Amount {
    Amount::new(10_000_000_000_000_000)
}

fn default_max_conflict_retries() -> u32 {
    3
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    true
}
