//! Fee Policy: the price of one posting.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::LedgerError;

/// Current per-job posting fee.
///
/// Only exact payment is accepted. Anything short is `InsufficientPayment`,
/// anything above is `OverPayment`; nothing is refunded because nothing is
/// taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    current: Amount,
}

impl FeePolicy {
    pub fn new(current: Amount) -> Self {
        Self { current }
    }

    pub fn current(&self) -> Amount {
        self.current
    }

    /// Check an attached payment against the fee in effect right now.
    pub fn check_payment(&self, offered: Amount) -> Result<Amount, LedgerError> {
        let required = self.current;
        if offered < required {
            return Err(LedgerError::InsufficientPayment { required, offered });
        }
        if offered > required {
            return Err(LedgerError::OverPayment { required, offered });
        }
        Ok(required)
    }

    pub(crate) fn set(&mut self, fee: Amount) {
        self.current = fee;
    }
}
