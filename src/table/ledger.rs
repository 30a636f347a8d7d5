//! Round bookkeeping: lifecycle state machine, stake tables, claim flags.
//!
//! The ledger makes no external calls and holds no handles. It is the
//! authoritative in-memory record; durability is layered on top of it by
//! the engine's write-through store.

use crate::table::types::{AccountId, Amount, RequestId, Round, RoundId, RoundStatus, MAX_NUMBER};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("round {round} is {status}, expected {expected}")]
    RoundNotTransitionable {
        round: RoundId,
        status: RoundStatus,
        expected: RoundStatus,
    },
    #[error("round {0} is not open for staking")]
    RoundNotOpen(RoundId),
    #[error("number {0} is off the wheel")]
    InvalidNumber(u8),
    #[error("stake amount must be greater than zero")]
    ZeroStake,
    #[error("stake accounting overflowed")]
    StakeOverflow,
}

/// Per-table round ledger.
///
/// Exactly one current round exists at any time; all earlier rounds are
/// Closed. Round 0 exists from construction in NotStarted. Rounds live in
/// an arena indexed by round id.
#[derive(Debug, Clone)]
pub struct RoundLedger {
    rounds: Vec<Round>,
    stakes: HashMap<(RoundId, AccountId, u8), Amount>,
    totals: HashMap<(RoundId, u8), Amount>,
    claims: HashSet<(RoundId, AccountId)>,
}

impl Default for RoundLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundLedger {
    pub fn new() -> Self {
        Self {
            rounds: vec![Round::new(0)],
            stakes: HashMap::new(),
            totals: HashMap::new(),
            claims: HashSet::new(),
        }
    }

    fn current(&self) -> &Round {
        self.rounds.last().expect("ledger holds at least one round")
    }

    fn current_mut(&mut self) -> &mut Round {
        self.rounds
            .last_mut()
            .expect("ledger holds at least one round")
    }

    pub fn current_round(&self) -> &Round {
        self.current()
    }

    pub fn current_round_id(&self) -> RoundId {
        self.current().id
    }

    pub fn round(&self, id: RoundId) -> Option<&Round> {
        self.rounds.get(id as usize)
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    /// Append the next round (id = previous + 1) in NotStarted.
    pub fn create_round(&mut self) -> Result<RoundId, LedgerError> {
        let current = self.current();
        if current.status != RoundStatus::Closed {
            return Err(LedgerError::RoundNotTransitionable {
                round: current.id,
                status: current.status,
                expected: RoundStatus::Closed,
            });
        }
        let id = current.id + 1;
        self.rounds.push(Round::new(id));
        Ok(id)
    }

    /// NotStarted -> Open.
    pub fn open_current_round(&mut self) -> Result<(), LedgerError> {
        let round = self.current_mut();
        if round.status != RoundStatus::NotStarted {
            return Err(LedgerError::RoundNotTransitionable {
                round: round.id,
                status: round.status,
                expected: RoundStatus::NotStarted,
            });
        }
        round.status = RoundStatus::Open;
        Ok(())
    }

    /// Open -> Locked; records the randomness request id on the round.
    pub fn lock_current_round(&mut self, request_id: RequestId) -> Result<(), LedgerError> {
        let round = self.current_mut();
        if round.status != RoundStatus::Open {
            return Err(LedgerError::RoundNotTransitionable {
                round: round.id,
                status: round.status,
                expected: RoundStatus::Open,
            });
        }
        round.status = RoundStatus::Locked;
        round.random_request_id = Some(request_id);
        Ok(())
    }

    /// Locked -> Closed; records the winning number.
    pub fn close_current_round(&mut self, winning_number: u8) -> Result<(), LedgerError> {
        let round = self.current_mut();
        if round.status != RoundStatus::Locked {
            return Err(LedgerError::RoundNotTransitionable {
                round: round.id,
                status: round.status,
                expected: RoundStatus::Locked,
            });
        }
        if winning_number > MAX_NUMBER {
            return Err(LedgerError::InvalidNumber(winning_number));
        }
        round.status = RoundStatus::Closed;
        round.winning_number = Some(winning_number);
        Ok(())
    }

    /// Add `amount` to the bettor's cumulative stake on a number and to the
    /// per-number aggregate. Returns the new cumulative per-bettor stake.
    ///
    /// All arithmetic is checked before anything is written, so a failed
    /// call leaves the tables untouched.
    pub fn record_stake(
        &mut self,
        round_id: RoundId,
        bettor: AccountId,
        number: u8,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        let open = self
            .round(round_id)
            .map(|round| round.status == RoundStatus::Open)
            .unwrap_or(false);
        if !open {
            return Err(LedgerError::RoundNotOpen(round_id));
        }
        if number > MAX_NUMBER {
            return Err(LedgerError::InvalidNumber(number));
        }
        if amount == 0 {
            return Err(LedgerError::ZeroStake);
        }

        let stake_key = (round_id, bettor, number);
        let cumulative = self
            .stakes
            .get(&stake_key)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(LedgerError::StakeOverflow)?;
        let total_key = (round_id, number);
        let aggregate = self
            .totals
            .get(&total_key)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(LedgerError::StakeOverflow)?;

        self.stakes.insert(stake_key, cumulative);
        self.totals.insert(total_key, aggregate);
        Ok(cumulative)
    }

    /// Cumulative stake of one bettor on one number; 0 for unknown keys.
    pub fn stake_of(&self, round_id: RoundId, bettor: AccountId, number: u8) -> Amount {
        self.stakes
            .get(&(round_id, bettor, number))
            .copied()
            .unwrap_or(0)
    }

    /// Aggregate stake across all bettors on one number; 0 for unknown keys.
    pub fn total_stake_on(&self, round_id: RoundId, number: u8) -> Amount {
        self.totals.get(&(round_id, number)).copied().unwrap_or(0)
    }

    pub fn is_claimed(&self, round_id: RoundId, bettor: AccountId) -> bool {
        self.claims.contains(&(round_id, bettor))
    }

    pub fn mark_claimed(&mut self, round_id: RoundId, bettor: AccountId) {
        self.claims.insert((round_id, bettor));
    }

    /// Unwind a claim flag after a failed payout transfer. Only the engine
    /// uses this, and only to keep a failed operation free of partial state.
    pub(crate) fn revoke_claim(&mut self, round_id: RoundId, bettor: AccountId) {
        self.claims.remove(&(round_id, bettor));
    }

    /// Subtract a just-recorded stake while a failed bet batch unwinds.
    /// Cells that drop to zero are removed, so an unwound batch leaves the
    /// tables exactly as they were.
    pub(crate) fn remove_stake(
        &mut self,
        round_id: RoundId,
        bettor: AccountId,
        number: u8,
        amount: Amount,
    ) {
        let stake_key = (round_id, bettor, number);
        if let Some(stake) = self.stakes.get_mut(&stake_key) {
            *stake = stake.saturating_sub(amount);
            if *stake == 0 {
                self.stakes.remove(&stake_key);
            }
        }
        let total_key = (round_id, number);
        if let Some(total) = self.totals.get_mut(&total_key) {
            *total = total.saturating_sub(amount);
            if *total == 0 {
                self.totals.remove(&total_key);
            }
        }
    }

    // Replay helpers used when rebuilding the ledger from a store.

    pub(crate) fn restore_round(&mut self, round: Round) {
        let slot = round.id as usize;
        if slot < self.rounds.len() {
            self.rounds[slot] = round;
        } else {
            self.rounds.push(round);
        }
    }

    pub(crate) fn restore_stake(
        &mut self,
        round_id: RoundId,
        bettor: AccountId,
        number: u8,
        cumulative: Amount,
    ) {
        self.stakes.insert((round_id, bettor, number), cumulative);
        let total = self.totals.entry((round_id, number)).or_insert(0);
        *total = total.saturating_add(cumulative);
    }

    pub(crate) fn restore_claim(&mut self, round_id: RoundId, bettor: AccountId) {
        self.claims.insert((round_id, bettor));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bettor(label: &str) -> AccountId {
        AccountId::from_label(label)
    }

    fn opened_ledger() -> RoundLedger {
        let mut ledger = RoundLedger::new();
        ledger.open_current_round().unwrap();
        ledger
    }

    #[test]
    fn test_round_zero_exists_on_construction() {
        let ledger = RoundLedger::new();
        assert_eq!(ledger.current_round_id(), 0);
        assert_eq!(ledger.current_round().status, RoundStatus::NotStarted);
        assert_eq!(ledger.round_count(), 1);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut ledger = RoundLedger::new();

        ledger.open_current_round().unwrap();
        assert_eq!(ledger.current_round().status, RoundStatus::Open);

        ledger.lock_current_round(7).unwrap();
        assert_eq!(ledger.current_round().status, RoundStatus::Locked);
        assert_eq!(ledger.current_round().random_request_id, Some(7));

        ledger.close_current_round(17).unwrap();
        assert_eq!(ledger.current_round().status, RoundStatus::Closed);
        assert_eq!(ledger.current_round().winning_number, Some(17));

        let next = ledger.create_round().unwrap();
        assert_eq!(next, 1);
        assert_eq!(ledger.current_round().status, RoundStatus::NotStarted);
        assert_eq!(ledger.round_count(), 2);
    }

    #[test]
    fn test_out_of_order_transitions_are_rejected() {
        let mut ledger = RoundLedger::new();

        // NotStarted: only open is legal.
        assert!(matches!(
            ledger.lock_current_round(1),
            Err(LedgerError::RoundNotTransitionable { .. })
        ));
        assert!(matches!(
            ledger.close_current_round(0),
            Err(LedgerError::RoundNotTransitionable { .. })
        ));
        assert!(matches!(
            ledger.create_round(),
            Err(LedgerError::RoundNotTransitionable { .. })
        ));

        ledger.open_current_round().unwrap();
        assert!(matches!(
            ledger.open_current_round(),
            Err(LedgerError::RoundNotTransitionable {
                status: RoundStatus::Open,
                ..
            })
        ));
        assert!(matches!(
            ledger.close_current_round(0),
            Err(LedgerError::RoundNotTransitionable { .. })
        ));

        ledger.lock_current_round(1).unwrap();
        assert!(matches!(
            ledger.lock_current_round(2),
            Err(LedgerError::RoundNotTransitionable { .. })
        ));

        ledger.close_current_round(0).unwrap();
        assert!(matches!(
            ledger.open_current_round(),
            Err(LedgerError::RoundNotTransitionable {
                status: RoundStatus::Closed,
                ..
            })
        ));
    }

    #[test]
    fn test_close_rejects_off_wheel_number() {
        let mut ledger = opened_ledger();
        ledger.lock_current_round(1).unwrap();

        assert_eq!(
            ledger.close_current_round(37),
            Err(LedgerError::InvalidNumber(37))
        );
        // Still locked, still closable with a legal number.
        assert_eq!(ledger.current_round().status, RoundStatus::Locked);
        ledger.close_current_round(36).unwrap();
    }

    #[test]
    fn test_record_stake_accumulates() {
        let mut ledger = opened_ledger();
        let alice = bettor("alice");
        let bob = bettor("bob");

        assert_eq!(ledger.record_stake(0, alice, 17, 100).unwrap(), 100);
        assert_eq!(ledger.record_stake(0, alice, 17, 50).unwrap(), 150);
        assert_eq!(ledger.record_stake(0, bob, 17, 25).unwrap(), 25);
        assert_eq!(ledger.record_stake(0, alice, 3, 10).unwrap(), 10);

        assert_eq!(ledger.stake_of(0, alice, 17), 150);
        assert_eq!(ledger.stake_of(0, bob, 17), 25);
        assert_eq!(ledger.total_stake_on(0, 17), 175);
        assert_eq!(ledger.total_stake_on(0, 3), 10);
    }

    #[test]
    fn test_record_stake_validation() {
        let mut ledger = RoundLedger::new();
        let alice = bettor("alice");

        // Round 0 is NotStarted.
        assert_eq!(
            ledger.record_stake(0, alice, 1, 10),
            Err(LedgerError::RoundNotOpen(0))
        );
        // Unknown round ids read as not open.
        assert_eq!(
            ledger.record_stake(9, alice, 1, 10),
            Err(LedgerError::RoundNotOpen(9))
        );

        ledger.open_current_round().unwrap();
        assert_eq!(
            ledger.record_stake(0, alice, 37, 10),
            Err(LedgerError::InvalidNumber(37))
        );
        assert_eq!(
            ledger.record_stake(0, alice, 0, 0),
            Err(LedgerError::ZeroStake)
        );
    }

    #[test]
    fn test_record_stake_overflow_leaves_tables_untouched() {
        let mut ledger = opened_ledger();
        let alice = bettor("alice");

        ledger.record_stake(0, alice, 5, u64::MAX - 10).unwrap();
        assert_eq!(
            ledger.record_stake(0, alice, 5, 11),
            Err(LedgerError::StakeOverflow)
        );
        assert_eq!(ledger.stake_of(0, alice, 5), u64::MAX - 10);
        assert_eq!(ledger.total_stake_on(0, 5), u64::MAX - 10);
    }

    #[test]
    fn test_stakes_freeze_when_round_locks() {
        let mut ledger = opened_ledger();
        let alice = bettor("alice");

        ledger.record_stake(0, alice, 12, 40).unwrap();
        ledger.lock_current_round(1).unwrap();

        assert_eq!(
            ledger.record_stake(0, alice, 12, 1),
            Err(LedgerError::RoundNotOpen(0))
        );
        assert_eq!(ledger.stake_of(0, alice, 12), 40);
    }

    #[test]
    fn test_remove_stake_reverses_record_stake() {
        let mut ledger = opened_ledger();
        let alice = bettor("alice");
        let bob = bettor("bob");

        ledger.record_stake(0, alice, 9, 400).unwrap();
        ledger.record_stake(0, bob, 9, 100).unwrap();
        ledger.record_stake(0, alice, 9, 101).unwrap();

        ledger.remove_stake(0, alice, 9, 101);
        assert_eq!(ledger.stake_of(0, alice, 9), 400);
        assert_eq!(ledger.total_stake_on(0, 9), 500);

        // Removing the rest drops the cells entirely.
        ledger.remove_stake(0, alice, 9, 400);
        ledger.remove_stake(0, bob, 9, 100);
        assert_eq!(ledger.stake_of(0, alice, 9), 0);
        assert_eq!(ledger.total_stake_on(0, 9), 0);
    }

    #[test]
    fn test_claim_flags() {
        let mut ledger = RoundLedger::new();
        let alice = bettor("alice");

        assert!(!ledger.is_claimed(0, alice));
        ledger.mark_claimed(0, alice);
        assert!(ledger.is_claimed(0, alice));

        ledger.revoke_claim(0, alice);
        assert!(!ledger.is_claimed(0, alice));
    }

    #[test]
    fn test_restore_rebuilds_state() {
        let mut ledger = RoundLedger::new();
        let alice = bettor("alice");
        let bob = bettor("bob");

        let mut round0 = Round::new(0);
        round0.status = RoundStatus::Closed;
        round0.winning_number = Some(24);
        round0.random_request_id = Some(1);
        ledger.restore_round(round0);

        let mut round1 = Round::new(1);
        round1.status = RoundStatus::Open;
        ledger.restore_round(round1);

        ledger.restore_stake(0, alice, 24, 100);
        ledger.restore_stake(0, bob, 24, 60);
        ledger.restore_claim(0, alice);

        assert_eq!(ledger.current_round_id(), 1);
        assert_eq!(ledger.round(0).unwrap().winning_number, Some(24));
        assert_eq!(ledger.stake_of(0, alice, 24), 100);
        assert_eq!(ledger.total_stake_on(0, 24), 160);
        assert!(ledger.is_claimed(0, alice));
        assert!(!ledger.is_claimed(0, bob));

        // The restored round 1 is open for staking.
        assert_eq!(ledger.record_stake(1, bob, 5, 10).unwrap(), 10);
    }
}
