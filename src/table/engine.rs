//! The caller-facing settlement engine.
//!
//! Owns a round ledger, talks to the staking asset and the randomness
//! oracle, and enforces authorization, max-bet and fund-safety policy.
//! Every state-mutating operation takes `&mut self` and is atomic: it
//! either fully applies or leaves all state (ledger and asset balances)
//! as it found it.

use crate::errors::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::metrics::EngineMetrics;
use crate::oracle::RandomnessOracle;
use crate::store::{ClaimRecord, EngineStore, RoundRecord, StakeRecord};
use crate::table::ledger::RoundLedger;
use crate::table::types::{
    derive_winning_number, AccountId, Amount, BetEntry, Entropy, RequestId, Round, RoundId,
    RoundStatus, MAX_NUMBER, PAYOUT_MULTIPLIER,
};
use crate::token::StakingAsset;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Administrator-mutable table parameters.
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub owner: AccountId,
    /// Ceiling on one bettor's cumulative stake per (round, number).
    /// Starts at 0, which disables betting until the owner raises it.
    pub max_bet_per_number: Amount,
}

pub struct RouletteEngine {
    account: AccountId,
    config: TableConfig,
    asset: Arc<dyn StakingAsset>,
    oracle: Arc<dyn RandomnessOracle>,
    ledger: RoundLedger,
    // Raw oracle value between delivery and resolution; single-use.
    spin_entropy: Option<Entropy>,
    events: EventBus,
    metrics: Arc<EngineMetrics>,
    store: Option<EngineStore>,
}

impl RouletteEngine {
    /// Purely in-memory engine. `account` is the engine's custody account
    /// at the staking asset; `owner` drives the lifecycle and treasury.
    pub fn new(
        account: AccountId,
        owner: AccountId,
        asset: Arc<dyn StakingAsset>,
        oracle: Arc<dyn RandomnessOracle>,
    ) -> Self {
        info!(
            engine = %account.short_hex(),
            owner = %owner.short_hex(),
            oracle = %oracle.account().short_hex(),
            "roulette engine created"
        );
        Self {
            account,
            config: TableConfig {
                owner,
                max_bet_per_number: 0,
            },
            asset,
            oracle,
            ledger: RoundLedger::new(),
            spin_entropy: None,
            events: EventBus::default(),
            metrics: Arc::new(EngineMetrics::new()),
            store: None,
        }
    }

    /// Engine backed by a write-through store. An existing store is
    /// replayed into the ledger, so stakes and claims survive restarts.
    /// The transient randomness buffer is not restored; a round that was
    /// Locked at shutdown waits for the oracle to deliver again.
    pub fn with_store(
        account: AccountId,
        owner: AccountId,
        asset: Arc<dyn StakingAsset>,
        oracle: Arc<dyn RandomnessOracle>,
        store: EngineStore,
    ) -> EngineResult<Self> {
        let mut engine = Self::new(account, owner, asset, oracle);
        let state = store.load_state()?;

        if state.rounds.is_empty() {
            store.put_round(&RoundRecord::from_round(engine.ledger.current_round()))?;
        } else {
            let mut rounds = state.rounds;
            rounds.sort_by_key(|record| record.id);
            for record in rounds {
                engine.ledger.restore_round(record.into_round());
            }
            for stake in &state.stakes {
                engine
                    .ledger
                    .restore_stake(stake.round_id, stake.bettor, stake.number, stake.cumulative);
            }
            for claim in &state.claims {
                engine.ledger.restore_claim(claim.round_id, claim.bettor);
            }
            info!(
                rounds = engine.ledger.round_count(),
                stakes = state.stakes.len(),
                claims = state.claims.len(),
                "ledger rebuilt from store"
            );
        }

        engine.store = Some(store);
        Ok(engine)
    }

    // ------------------------------------------------------------------
    // Administrative lifecycle (owner-only)
    // ------------------------------------------------------------------

    /// NotStarted -> Open for the current round.
    pub fn open_round(&mut self, caller: AccountId) -> EngineResult<RoundId> {
        self.require_owner(caller)?;
        let round_id = self.ledger.current_round_id();
        if self.ledger.current_round().status != RoundStatus::NotStarted {
            return Err(EngineError::RoundNotOpenable(round_id));
        }

        self.ledger.open_current_round()?;
        self.persist_round(self.ledger.current_round());
        self.metrics.record_round_opened();
        self.events.publish(EngineEvent::RoundOpened { round: round_id });
        info!(round = round_id, "round opened");
        Ok(round_id)
    }

    /// Forward `nonce` to the oracle, record the assigned request id, and
    /// lock the current round. No further bets after this point.
    pub fn request_spin(&mut self, caller: AccountId, nonce: u64) -> EngineResult<RequestId> {
        self.require_owner(caller)?;
        let round_id = self.ledger.current_round_id();
        if self.ledger.current_round().status != RoundStatus::Open {
            return Err(EngineError::RoundNotOpen(round_id));
        }

        let request_id = self.oracle.request_random(self.account, nonce)?;
        self.ledger.lock_current_round(request_id)?;
        self.persist_round(self.ledger.current_round());
        self.metrics.record_spin_requested();
        self.events.publish(EngineEvent::SpinRequested {
            round: round_id,
            request_id,
            nonce,
        });
        info!(round = round_id, request_id, nonce, "spin requested, round locked");
        Ok(request_id)
    }

    /// Fix the winning number from the delivered randomness and close the
    /// round. The buffer is consumed; a later round needs a new delivery.
    pub fn set_spin_result(&mut self, caller: AccountId) -> EngineResult<u8> {
        self.require_owner(caller)?;
        let round_id = self.ledger.current_round_id();
        if self.ledger.current_round().status != RoundStatus::Locked {
            return Err(EngineError::RoundNotLocked(round_id));
        }
        let entropy = self.spin_entropy.ok_or(EngineError::NoSpinResult)?;

        let winning_number = derive_winning_number(&entropy);
        self.ledger.close_current_round(winning_number)?;
        self.spin_entropy = None;
        self.persist_round(self.ledger.current_round());
        self.metrics.record_spin_resolved();
        self.events.publish(EngineEvent::SpinResolved {
            round: round_id,
            winning_number,
        });
        info!(round = round_id, winning_number, "round closed");
        Ok(winning_number)
    }

    /// Create the next round (id + 1) in NotStarted.
    pub fn next_round(&mut self, caller: AccountId) -> EngineResult<RoundId> {
        self.require_owner(caller)?;
        let current = self.ledger.current_round();
        if current.status != RoundStatus::Closed {
            return Err(EngineError::RoundNotClosed(current.id));
        }

        let round_id = self.ledger.create_round()?;
        self.persist_round(self.ledger.current_round());
        info!(round = round_id, "next round created");
        Ok(round_id)
    }

    // ------------------------------------------------------------------
    // Betting (any principal)
    // ------------------------------------------------------------------

    /// Place a batch of straight-up stakes for `bettor` on the current
    /// round. `tag` is an opaque caller label echoed on events.
    ///
    /// The batch is atomic: on any failure every amount already pulled in
    /// this call is refunded and no ledger writes survive.
    pub fn place_bet(
        &mut self,
        bettor: AccountId,
        entries: &[BetEntry],
        tag: &str,
    ) -> EngineResult<()> {
        let round_id = self.ledger.current_round_id();
        if self.ledger.current_round().status != RoundStatus::Open {
            return Err(EngineError::RoundNotOpen(round_id));
        }
        if entries.is_empty() {
            return Err(EngineError::EmptyBatch);
        }

        let mut pulled: Amount = 0;
        let mut recorded: Vec<BetEntry> = Vec::with_capacity(entries.len());

        for entry in entries {
            if let Err(err) = self.apply_entry(round_id, bettor, *entry, &mut pulled, &mut recorded)
            {
                self.unwind_bet(round_id, bettor, pulled, &recorded);
                return Err(err);
            }
        }

        let now = Utc::now().timestamp_millis();
        let records: Vec<StakeRecord> = recorded
            .iter()
            .map(|entry| StakeRecord {
                round_id,
                bettor,
                number: entry.number,
                cumulative: self.ledger.stake_of(round_id, bettor, entry.number),
                updated_at_ms: now,
            })
            .collect();
        self.persist_stakes(&records);

        for entry in &recorded {
            self.metrics.record_bet(entry.amount);
            self.events.publish(EngineEvent::BetPlaced {
                bettor,
                round: round_id,
                number: entry.number,
                amount: entry.amount,
                tag: tag.to_string(),
            });
            debug!(
                bettor = %bettor.short_hex(),
                round = round_id,
                number = entry.number,
                amount = entry.amount,
                tag,
                "bet placed"
            );
        }
        Ok(())
    }

    /// Validate, pull and record one entry. Ran per entry, in order; the
    /// max-bet and fund-safety checks see the ledger with this entry
    /// already applied, so earlier entries of the same call count.
    fn apply_entry(
        &mut self,
        round_id: RoundId,
        bettor: AccountId,
        entry: BetEntry,
        pulled: &mut Amount,
        recorded: &mut Vec<BetEntry>,
    ) -> EngineResult<()> {
        if entry.number > MAX_NUMBER {
            return Err(EngineError::InvalidNumber(entry.number));
        }
        if entry.amount == 0 {
            return Err(EngineError::ZeroAmount);
        }

        let next_pulled = pulled
            .checked_add(entry.amount)
            .ok_or(EngineError::AmountOverflow)?;
        self.asset
            .transfer_from(self.account, bettor, self.account, entry.amount)?;
        *pulled = next_pulled;

        let cumulative = self
            .ledger
            .record_stake(round_id, bettor, entry.number, entry.amount)?;
        recorded.push(entry);

        if cumulative > self.config.max_bet_per_number {
            return Err(EngineError::MaxBetExceeded {
                number: entry.number,
                cumulative,
                max_bet: self.config.max_bet_per_number,
            });
        }

        // Fund-safety: the engine must stay able to pay 36x the aggregate
        // stake on this number out of its live balance, which at this
        // point already includes everything pulled in this call.
        let aggregate = self.ledger.total_stake_on(round_id, entry.number);
        let required = aggregate
            .checked_mul(PAYOUT_MULTIPLIER)
            .ok_or(EngineError::AmountOverflow)?;
        let balance = self.asset.balance_of(self.account);
        if required > balance {
            return Err(EngineError::CannotPayoutWinnings {
                number: entry.number,
                aggregate,
                required,
                balance,
            });
        }
        Ok(())
    }

    fn unwind_bet(
        &mut self,
        round_id: RoundId,
        bettor: AccountId,
        pulled: Amount,
        recorded: &[BetEntry],
    ) {
        for entry in recorded {
            self.ledger
                .remove_stake(round_id, bettor, entry.number, entry.amount);
        }
        if pulled == 0 {
            return;
        }
        match self.asset.transfer(self.account, bettor, pulled) {
            Ok(()) => {
                debug!(
                    bettor = %bettor.short_hex(),
                    amount = pulled,
                    "refunded rejected bet batch"
                );
            }
            Err(refund_err) => {
                error!(
                    bettor = %bettor.short_hex(),
                    amount = pulled,
                    error = %refund_err,
                    "failed to refund a rejected bet batch"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Randomness callback (oracle-only)
    // ------------------------------------------------------------------

    /// Accept the raw random value for the current round's request. Only
    /// the configured oracle principal may call; `request_id` must match
    /// the id recorded when the round locked. Redelivery with the matching
    /// id before resolution overwrites the buffer.
    pub fn deliver_random(
        &mut self,
        caller: AccountId,
        request_id: RequestId,
        value: Entropy,
    ) -> EngineResult<()> {
        if caller != self.oracle.account() {
            return Err(EngineError::Unauthorized);
        }
        let round = self.ledger.current_round();
        if round.status != RoundStatus::Locked {
            return Err(EngineError::RoundNotLocked(round.id));
        }
        let expected = match round.random_request_id {
            Some(id) => id,
            None => return Err(EngineError::RoundNotLocked(round.id)),
        };
        if request_id != expected {
            return Err(EngineError::RequestMismatch {
                expected,
                delivered: request_id,
            });
        }

        let round_id = round.id;
        if self.spin_entropy.is_some() {
            debug!(round = round_id, request_id, "overwriting delivered randomness");
        }
        self.spin_entropy = Some(value);
        debug!(round = round_id, request_id, "randomness delivered");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Payouts (permissionless)
    // ------------------------------------------------------------------

    /// Pay `bettor` their winnings for a closed round. Callable by anyone
    /// on the bettor's behalf; idempotent per (round, bettor). Returns the
    /// amount paid.
    pub fn collect_winnings(&mut self, bettor: AccountId, round_id: RoundId) -> EngineResult<Amount> {
        let winning_number = match self.ledger.round(round_id) {
            Some(round) if round.status == RoundStatus::Closed => match round.winning_number {
                Some(number) => number,
                None => return Err(EngineError::RoundNotClosed(round_id)),
            },
            _ => return Err(EngineError::RoundNotClosed(round_id)),
        };

        let stake = self.ledger.stake_of(round_id, bettor, winning_number);
        if stake == 0 || self.ledger.is_claimed(round_id, bettor) {
            return Err(EngineError::NoWinnings);
        }

        let payout = stake
            .checked_mul(PAYOUT_MULTIPLIER)
            .ok_or(EngineError::AmountOverflow)?;
        let balance = self.asset.balance_of(self.account);
        if balance < payout {
            // Claim flag stays unset; the call can be retried once the
            // treasury is refunded.
            return Err(EngineError::InsufficientPayoutFunds { payout, balance });
        }

        self.ledger.mark_claimed(round_id, bettor);
        if let Err(transfer_err) = self.asset.transfer(self.account, bettor, payout) {
            self.ledger.revoke_claim(round_id, bettor);
            error!(
                bettor = %bettor.short_hex(),
                round = round_id,
                payout,
                error = %transfer_err,
                "payout transfer failed, claim unwound"
            );
            return Err(EngineError::TransferFailed(transfer_err));
        }

        self.persist_claim(&ClaimRecord {
            round_id,
            bettor,
            amount: payout,
            claimed_at_ms: Utc::now().timestamp_millis(),
        });
        self.metrics.record_payout(payout);
        self.events.publish(EngineEvent::WinningsCollected {
            bettor,
            round: round_id,
            amount: payout,
        });
        info!(
            bettor = %bettor.short_hex(),
            round = round_id,
            winning_number,
            payout,
            "winnings collected"
        );
        Ok(payout)
    }

    // ------------------------------------------------------------------
    // Treasury and oracle funding
    // ------------------------------------------------------------------

    /// Move asset out of engine custody.
    pub fn withdraw(&mut self, caller: AccountId, to: AccountId, amount: Amount) -> EngineResult<()> {
        self.require_owner(caller)?;
        self.asset.transfer(self.account, to, amount)?;
        info!(to = %to.short_hex(), amount, "treasury withdrawal");
        Ok(())
    }

    /// Pull `amount` from the caller into the oracle's account and credit
    /// the engine's gas-funding balance held there. Any principal may top
    /// the engine up.
    pub fn deposit_to_randomizer(&mut self, caller: AccountId, amount: Amount) -> EngineResult<()> {
        self.asset
            .transfer_from(self.account, caller, self.oracle.account(), amount)?;
        self.oracle.client_deposit(self.account, amount)?;
        debug!(caller = %caller.short_hex(), amount, "oracle gas deposit");
        Ok(())
    }

    /// Debit the engine's gas-funding balance at the oracle; the oracle
    /// pays `to` directly.
    pub fn withdraw_from_randomizer(
        &mut self,
        caller: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> EngineResult<()> {
        self.require_owner(caller)?;
        self.oracle.client_withdraw(self.account, to, amount)?;
        info!(to = %to.short_hex(), amount, "oracle gas withdrawal");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Configuration (owner-only)
    // ------------------------------------------------------------------

    /// Any value is legal; 0 disables betting.
    pub fn set_max_bet(&mut self, caller: AccountId, amount: Amount) -> EngineResult<()> {
        self.require_owner(caller)?;
        info!(
            previous = self.config.max_bet_per_number,
            new = amount,
            "max bet updated"
        );
        self.config.max_bet_per_number = amount;
        Ok(())
    }

    pub fn set_betting_token(
        &mut self,
        caller: AccountId,
        asset: Arc<dyn StakingAsset>,
    ) -> EngineResult<()> {
        self.require_owner(caller)?;
        self.asset = asset;
        info!("staking asset replaced");
        Ok(())
    }

    /// Subsequent callback authorization uses the new oracle's principal.
    pub fn set_randomizer(
        &mut self,
        caller: AccountId,
        oracle: Arc<dyn RandomnessOracle>,
    ) -> EngineResult<()> {
        self.require_owner(caller)?;
        info!(oracle = %oracle.account().short_hex(), "randomness oracle replaced");
        self.oracle = oracle;
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: AccountId, new_owner: AccountId) -> EngineResult<()> {
        self.require_owner(caller)?;
        info!(
            previous = %self.config.owner.short_hex(),
            new = %new_owner.short_hex(),
            "ownership transferred"
        );
        self.config.owner = new_owner;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn owner(&self) -> AccountId {
        self.config.owner
    }

    pub fn oracle_account(&self) -> AccountId {
        self.oracle.account()
    }

    pub fn max_bet_per_number(&self) -> Amount {
        self.config.max_bet_per_number
    }

    pub fn current_round(&self) -> &Round {
        self.ledger.current_round()
    }

    pub fn current_round_id(&self) -> RoundId {
        self.ledger.current_round_id()
    }

    pub fn round_status(&self, round_id: RoundId) -> Option<RoundStatus> {
        self.ledger.round(round_id).map(|round| round.status)
    }

    /// Winning number of a closed round; `None` while it is undecided.
    pub fn winning_number(&self, round_id: RoundId) -> Option<u8> {
        self.ledger.round(round_id).and_then(|round| round.winning_number)
    }

    pub fn stake_of(&self, round_id: RoundId, bettor: AccountId, number: u8) -> Amount {
        self.ledger.stake_of(round_id, bettor, number)
    }

    pub fn total_stake_on(&self, round_id: RoundId, number: u8) -> Amount {
        self.ledger.total_stake_on(round_id, number)
    }

    pub fn is_claimed(&self, round_id: RoundId, bettor: AccountId) -> bool {
        self.ledger.is_claimed(round_id, bettor)
    }

    /// The engine's live balance at the staking asset.
    pub fn balance(&self) -> Amount {
        self.asset.balance_of(self.account)
    }

    /// The engine's gas-funding balance held at the oracle.
    pub fn oracle_fund_balance(&self) -> Amount {
        self.oracle.fund_balance(self.account)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    // ------------------------------------------------------------------

    fn require_owner(&self, caller: AccountId) -> EngineResult<()> {
        if caller != self.config.owner {
            return Err(EngineError::Unauthorized);
        }
        Ok(())
    }

    fn persist_round(&self, round: &Round) {
        if let Some(store) = &self.store {
            if let Err(e) = store.put_round(&RoundRecord::from_round(round)) {
                warn!(round = round.id, error = %e, "failed to persist round record");
            }
        }
    }

    fn persist_stakes(&self, records: &[StakeRecord]) {
        if let Some(store) = &self.store {
            if let Err(e) = store.put_stakes(records) {
                warn!(count = records.len(), error = %e, "failed to persist stake records");
            }
        }
    }

    fn persist_claim(&self, record: &ClaimRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = store.put_claim(record) {
                warn!(round = record.round_id, error = %e, "failed to persist claim record");
            }
        }
    }
}
