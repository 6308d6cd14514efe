use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// Aggregate statistics as exposed to deployment tooling.
///
/// `contract_balance` is derived from revenue and withdrawals when the stats
/// are produced; it is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total_jobs: u64,
    pub total_revenue: Amount,
    pub current_fee: Amount,
    pub contract_balance: Amount,
}

impl LedgerStats {
    /// What a freshly deployed ledger reports.
    pub fn initial(fee: Amount) -> Self {
        Self {
            total_jobs: 0,
            total_revenue: Amount::ZERO,
            current_fee: fee,
            contract_balance: Amount::ZERO,
        }
    }
}
