//! Engine-level error taxonomy.
//!
//! Module-local errors (`LedgerError`, `TokenError`, `OracleError`,
//! `StoreError`) live with their modules and fold into `EngineError` via
//! `#[from]`. Every failing engine operation is atomic: no partial state
//! survives, and nothing is retried internally.

use crate::oracle::OracleError;
use crate::store::StoreError;
use crate::table::ledger::LedgerError;
use crate::table::types::{Amount, RequestId, RoundId};
use crate::token::TokenError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("caller is not authorized for this operation")]
    Unauthorized,

    #[error("round {0} is not open")]
    RoundNotOpen(RoundId),

    #[error("round {0} is not closed")]
    RoundNotClosed(RoundId),

    #[error("round {0} is not locked")]
    RoundNotLocked(RoundId),

    #[error("round {0} cannot be opened")]
    RoundNotOpenable(RoundId),

    #[error("invalid number {0}: the wheel is 0..=36")]
    InvalidNumber(u8),

    #[error("bet amount must be greater than zero")]
    ZeroAmount,

    #[error("bet batch is empty")]
    EmptyBatch,

    #[error("amount arithmetic overflowed")]
    AmountOverflow,

    #[error("cumulative bet {cumulative} on number {number} exceeds max bet {max_bet}")]
    MaxBetExceeded {
        number: u8,
        cumulative: Amount,
        max_bet: Amount,
    },

    #[error(
        "cannot payout winnings: {aggregate} staked on number {number} \
         needs {required} but the engine holds {balance}"
    )]
    CannotPayoutWinnings {
        number: u8,
        aggregate: Amount,
        required: Amount,
        balance: Amount,
    },

    #[error("insufficient funds to pay {payout}: engine holds {balance}")]
    InsufficientPayoutFunds { payout: Amount, balance: Amount },

    #[error("no winnings to collect")]
    NoWinnings,

    #[error("no spin result has been delivered")]
    NoSpinResult,

    #[error("randomness request mismatch: expected {expected}, got {delivered}")]
    RequestMismatch {
        expected: RequestId,
        delivered: RequestId,
    },

    #[error("asset transfer failed: {0}")]
    TransferFailed(#[from] TokenError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_errors_fold_into_engine_error() {
        fn ledger_op() -> Result<(), LedgerError> {
            Err(LedgerError::ZeroStake)
        }
        fn engine_op() -> EngineResult<()> {
            ledger_op()?;
            Ok(())
        }

        assert!(matches!(
            engine_op(),
            Err(EngineError::Ledger(LedgerError::ZeroStake))
        ));
    }

    #[test]
    fn test_messages_carry_context() {
        let err = EngineError::MaxBetExceeded {
            number: 7,
            cumulative: 501,
            max_bet: 500,
        };
        assert_eq!(
            err.to_string(),
            "cumulative bet 501 on number 7 exceeds max bet 500"
        );

        let err = EngineError::RequestMismatch {
            expected: 3,
            delivered: 9,
        };
        assert!(err.to_string().contains("expected 3"));
    }
}
