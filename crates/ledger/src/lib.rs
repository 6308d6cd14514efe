//! Job-posting ledger (fee-charging, event-sourced).
//!
//! Pure domain logic only: no IO, no payouts, no persistence concerns.

pub mod amount;
pub mod error;
pub mod fee;
pub mod ledger;
pub mod registry;
pub mod revenue;
pub mod stats;

pub use amount::Amount;
pub use error::LedgerError;
pub use fee::FeePolicy;
pub use ledger::{
    AGGREGATE_TYPE, DeployLedger, FeeChanged, FundsWithdrawn, JobLedger, JobPosted,
    JobStatusChanged, LedgerCommand, LedgerDeployed, LedgerEvent, LedgerId, PostJob,
    RevertWithdrawal, SetFee, SetJobStatus, SettleWithdrawal, Withdraw, WithdrawalReverted,
    WithdrawalSettled,
};
pub use registry::{JobFilter, JobId, JobRecord, JobRegistry, JobStatus, TransitionRules};
pub use revenue::{RevenueLedger, RevenueSnapshot};
pub use stats::LedgerStats;
