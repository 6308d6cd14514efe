//! Payout sink: the external account funds leave through on withdrawal.
//!
//! The facade commits the withdrawal to the event store before calling
//! [`PayoutSink::transfer`], and compensates with a `WithdrawalReverted`
//! event if the transfer fails.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use jobportal_core::PrincipalId;
use jobportal_ledger::Amount;

/// One transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub withdrawal_id: Uuid,
    pub recipient: PrincipalId,
    pub amount: Amount,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayoutError {
    #[error("recipient {0} refused the transfer")]
    Refused(PrincipalId),

    #[error("payout channel unavailable: {0}")]
    Unavailable(String),
}

/// Destination for withdrawn funds.
///
/// Implementations may be called while the facade holds its writer gate.
/// Calling back into the facade's mutating operations from `transfer` is
/// rejected with `ReentrantCall`; reads are allowed.
pub trait PayoutSink: Send + Sync {
    fn transfer(&self, payout: &Payout) -> Result<(), PayoutError>;
}

/// In-memory external accounts, credited on every successful transfer.
#[derive(Debug, Default)]
pub struct InMemoryTreasury {
    state: Mutex<TreasuryState>,
}

#[derive(Debug, Default)]
struct TreasuryState {
    payouts: Vec<Payout>,
    balances: HashMap<PrincipalId, Amount>,
}

impl InMemoryTreasury {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transfer received, in order.
    pub fn payouts(&self) -> Vec<Payout> {
        self.lock().payouts.clone()
    }

    pub fn balance_of(&self, account: &PrincipalId) -> Amount {
        self.lock()
            .balances
            .get(account)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn total_paid(&self) -> Amount {
        self.lock()
            .payouts
            .iter()
            .fold(Amount::ZERO, |acc, p| {
                acc.checked_add(p.amount).unwrap_or(Amount::new(u128::MAX))
            })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TreasuryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PayoutSink for InMemoryTreasury {
    fn transfer(&self, payout: &Payout) -> Result<(), PayoutError> {
        let mut state = self.lock();
        let balance = state.balances.entry(payout.recipient).or_default();
        *balance = balance
            .checked_add(payout.amount)
            .ok_or_else(|| PayoutError::Unavailable("recipient balance overflow".to_string()))?;
        state.payouts.push(payout.clone());

        tracing::debug!(
            withdrawal_id = %payout.withdrawal_id,
            recipient = %payout.recipient,
            amount = %payout.amount,
            "treasury credited"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfers_accumulate_per_recipient() {
        let treasury = InMemoryTreasury::new();
        let alice = PrincipalId::random();
        let bob = PrincipalId::random();

        for (recipient, amount) in [(alice, 5u128), (bob, 7), (alice, 3)] {
            treasury
                .transfer(&Payout {
                    withdrawal_id: Uuid::now_v7(),
                    recipient,
                    amount: Amount::new(amount),
                })
                .unwrap();
        }

        assert_eq!(treasury.balance_of(&alice), Amount::new(8));
        assert_eq!(treasury.balance_of(&bob), Amount::new(7));
        assert_eq!(treasury.total_paid(), Amount::new(15));
        assert_eq!(treasury.payouts().len(), 3);
    }
}
