//! Revenue Ledger: money in from postings, money out through withdrawals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;
use crate::error::LedgerError;

/// Cumulative revenue and withdrawals. The balance is always derived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevenueLedger {
    total_revenue: Amount,
    total_withdrawn: Amount,
    /// Debited withdrawals whose payout is not yet settled or reverted.
    pending: BTreeMap<Uuid, Amount>,
}

/// Point-in-time view of the revenue ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSnapshot {
    pub total_revenue: Amount,
    pub total_withdrawn: Amount,
    pub balance: Amount,
}

impl RevenueLedger {
    pub fn total_revenue(&self) -> Amount {
        self.total_revenue
    }

    pub fn total_withdrawn(&self) -> Amount {
        self.total_withdrawn
    }

    /// `total_revenue - total_withdrawn`, recomputed on every call.
    pub fn balance(&self) -> Amount {
        debug_assert!(self.total_withdrawn <= self.total_revenue);
        self.total_revenue.saturating_sub(self.total_withdrawn)
    }

    pub fn snapshot(&self) -> RevenueSnapshot {
        RevenueSnapshot {
            total_revenue: self.total_revenue,
            total_withdrawn: self.total_withdrawn,
            balance: self.balance(),
        }
    }

    /// Amount of a withdrawal still awaiting its payout outcome.
    pub fn pending_withdrawal(&self, id: &Uuid) -> Option<Amount> {
        self.pending.get(id).copied()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Reject a credit that would overflow the revenue counter.
    pub fn check_credit(&self, amount: Amount) -> Result<(), LedgerError> {
        self.total_revenue
            .checked_add(amount)
            .map(|_| ())
            .ok_or_else(|| LedgerError::invariant("total revenue overflow"))
    }

    pub fn check_withdrawal(&self, id: Uuid, amount: Amount) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::validation("withdrawal amount must be positive"));
        }
        if self.pending.contains_key(&id) {
            return Err(LedgerError::validation(format!("duplicate withdrawal id {id}")));
        }
        let available = self.balance();
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    pub(crate) fn record_credit(&mut self, amount: Amount) {
        self.total_revenue = self
            .total_revenue
            .checked_add(amount)
            .unwrap_or(Amount::new(u128::MAX));
    }

    /// Applies a debit already checked by [`RevenueLedger::check_withdrawal`].
    pub(crate) fn record_withdrawal(&mut self, id: Uuid, amount: Amount) {
        let total_withdrawn = self.total_withdrawn.saturating_add(amount);
        debug_assert!(
            total_withdrawn <= self.total_revenue,
            "withdrawal of {amount} exceeds the checked balance"
        );
        self.total_withdrawn = total_withdrawn;
        self.pending.insert(id, amount);
    }

    /// The payout went through; the debit is final.
    pub(crate) fn record_settlement(&mut self, id: Uuid) {
        self.pending.remove(&id);
    }

    pub(crate) fn record_reversal(&mut self, id: Uuid) {
        if let Some(amount) = self.pending.remove(&id) {
            self.total_withdrawn = self.total_withdrawn.saturating_sub(amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_tracks_credits_and_withdrawals() {
        let mut ledger = RevenueLedger::default();
        ledger.record_credit(Amount::new(30));
        let id = Uuid::now_v7();
        ledger.check_withdrawal(id, Amount::new(15)).unwrap();
        ledger.record_withdrawal(id, Amount::new(15));

        assert_eq!(
            ledger.snapshot(),
            RevenueSnapshot {
                total_revenue: Amount::new(30),
                total_withdrawn: Amount::new(15),
                balance: Amount::new(15),
            }
        );
    }

    #[test]
    fn withdrawal_beyond_balance_is_rejected() {
        let mut ledger = RevenueLedger::default();
        ledger.record_credit(Amount::new(10));

        assert_eq!(
            ledger.check_withdrawal(Uuid::now_v7(), Amount::new(11)),
            Err(LedgerError::InsufficientBalance {
                requested: Amount::new(11),
                available: Amount::new(10),
            })
        );
    }

    #[test]
    fn zero_and_duplicate_withdrawals_are_invalid() {
        let mut ledger = RevenueLedger::default();
        ledger.record_credit(Amount::new(10));
        let id = Uuid::now_v7();
        ledger.record_withdrawal(id, Amount::new(1));

        assert!(matches!(
            ledger.check_withdrawal(Uuid::now_v7(), Amount::ZERO),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            ledger.check_withdrawal(id, Amount::new(1)),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn reversal_restores_previous_totals() {
        let mut ledger = RevenueLedger::default();
        ledger.record_credit(Amount::new(10));
        let before = ledger.snapshot();

        let id = Uuid::now_v7();
        ledger.record_withdrawal(id, Amount::new(4));
        ledger.record_reversal(id);

        assert_eq!(ledger.snapshot(), before);
        assert_eq!(ledger.pending_withdrawal(&id), None);
    }

    #[test]
    fn settled_withdrawal_is_final() {
        let mut ledger = RevenueLedger::default();
        ledger.record_credit(Amount::new(10));
        let id = Uuid::now_v7();
        ledger.record_withdrawal(id, Amount::new(4));
        assert_eq!(ledger.pending_withdrawal(&id), Some(Amount::new(4)));

        ledger.record_settlement(id);
        ledger.record_reversal(id);

        assert_eq!(ledger.pending_count(), 0);
        assert_eq!(ledger.total_withdrawn(), Amount::new(4));
        assert_eq!(ledger.balance(), Amount::new(6));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "exceeds the checked balance")]
    fn unchecked_overdraw_trips_the_balance_invariant() {
        let mut ledger = RevenueLedger::default();
        ledger.record_credit(Amount::new(10));
        ledger.record_withdrawal(Uuid::now_v7(), Amount::new(11));
    }

    #[test]
    fn credit_overflow_is_an_invariant_violation() {
        let mut ledger = RevenueLedger::default();
        ledger.record_credit(Amount::new(u128::MAX));
        assert!(matches!(
            ledger.check_credit(Amount::new(1)),
            Err(LedgerError::InvariantViolation(_))
        ));
    }
}
