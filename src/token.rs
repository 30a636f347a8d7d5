//! Staking-asset seam and the in-memory reference token.

use crate::table::types::{AccountId, Amount};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: Amount, have: Amount },
    #[error("insufficient allowance: need {need}, have {have}")]
    InsufficientAllowance { need: Amount, have: Amount },
    #[error("balance arithmetic overflowed")]
    BalanceOverflow,
}

/// Asset the engine pulls stakes in and pays winnings out of.
///
/// Modeled on an allowance-based token: `transfer_from` spends an allowance
/// the `owner` granted to the `spender`. Every call is atomic; a failed
/// call moves nothing and burns no allowance.
pub trait StakingAsset: Send + Sync {
    fn transfer_from(
        &self,
        spender: AccountId,
        owner: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), TokenError>;

    fn transfer(&self, from: AccountId, to: AccountId, amount: Amount) -> Result<(), TokenError>;

    fn balance_of(&self, account: AccountId) -> Amount;

    fn mint(&self, to: AccountId, amount: Amount) -> Result<(), TokenError>;
}

#[derive(Debug, Default)]
struct TokenBook {
    balances: HashMap<AccountId, Amount>,
    // Keyed (owner, spender).
    allowances: HashMap<(AccountId, AccountId), Amount>,
}

/// In-memory allowance-based token used by the test suite and the simulator.
///
/// The engine only ever sees it through the `StakingAsset` trait.
#[derive(Debug, Default)]
pub struct HouseToken {
    book: RwLock<TokenBook>,
}

impl HouseToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `spender` the right to pull up to `amount` from `owner`.
    /// Overwrites any previous allowance for the pair.
    pub fn approve(&self, owner: AccountId, spender: AccountId, amount: Amount) {
        let mut book = self.book.write().unwrap();
        book.allowances.insert((owner, spender), amount);
    }

    pub fn allowance(&self, owner: AccountId, spender: AccountId) -> Amount {
        self.book
            .read()
            .unwrap()
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(0)
    }

    fn move_balance(
        book: &mut TokenBook,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let from_balance = book.balances.get(&from).copied().unwrap_or(0);
        if from_balance < amount {
            return Err(TokenError::InsufficientBalance {
                need: amount,
                have: from_balance,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_balance = book.balances.get(&to).copied().unwrap_or(0);
        let credited = to_balance
            .checked_add(amount)
            .ok_or(TokenError::BalanceOverflow)?;
        book.balances.insert(from, from_balance - amount);
        book.balances.insert(to, credited);
        Ok(())
    }
}

impl StakingAsset for HouseToken {
    fn transfer_from(
        &self,
        spender: AccountId,
        owner: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let mut book = self.book.write().unwrap();
        let allowance_key = (owner, spender);
        let allowance = book.allowances.get(&allowance_key).copied().unwrap_or(0);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                need: amount,
                have: allowance,
            });
        }
        Self::move_balance(&mut book, owner, to, amount)?;
        book.allowances.insert(allowance_key, allowance - amount);
        Ok(())
    }

    fn transfer(&self, from: AccountId, to: AccountId, amount: Amount) -> Result<(), TokenError> {
        let mut book = self.book.write().unwrap();
        Self::move_balance(&mut book, from, to, amount)
    }

    fn balance_of(&self, account: AccountId) -> Amount {
        self.book
            .read()
            .unwrap()
            .balances
            .get(&account)
            .copied()
            .unwrap_or(0)
    }

    fn mint(&self, to: AccountId, amount: Amount) -> Result<(), TokenError> {
        let mut book = self.book.write().unwrap();
        let balance = book.balances.get(&to).copied().unwrap_or(0);
        let credited = balance
            .checked_add(amount)
            .ok_or(TokenError::BalanceOverflow)?;
        book.balances.insert(to, credited);
        Ok(())
    }
}
