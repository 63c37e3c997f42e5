use plg_common::Tzs;
use thiserror::Error;

use crate::traits::{AccountApiError, LedgerError};

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),
    #[error("Account error: {0}")]
    AccountError(#[from] AccountApiError),
    #[error("No payment intent found for reference {0}, and the payload carried no usable metadata")]
    UnknownReference(String),
    #[error("Withdrawal amount is below the minimum of {0}")]
    BelowMinimum(Tzs),
    #[error("No payout destination is configured for {0}")]
    NoPayoutDestination(String),
}

impl SettlementError {
    /// Insufficient balance and similar user mistakes get a descriptive rejection; everything
    /// else is an internal failure the caller should not see details of.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SettlementError::BelowMinimum(_)
                | SettlementError::NoPayoutDestination(_)
                | SettlementError::LedgerError(LedgerError::InsufficientFunds(_))
        )
    }
}
