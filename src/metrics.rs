//! Operational counters for the settlement engine.

use crate::table::types::Amount;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters, cheap enough to bump on every operation.
///
/// Shared as `Arc<EngineMetrics>` between the engine and whoever reports.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    rounds_opened: AtomicU64,
    bets_placed: AtomicU64,
    stake_volume: AtomicU64,
    spins_requested: AtomicU64,
    spins_resolved: AtomicU64,
    claims_paid: AtomicU64,
    payout_volume: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_round_opened(&self) {
        self.rounds_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bet(&self, amount: Amount) {
        self.bets_placed.fetch_add(1, Ordering::Relaxed);
        self.stake_volume.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn record_spin_requested(&self) {
        self.spins_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_spin_resolved(&self) {
        self.spins_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payout(&self, amount: Amount) {
        self.claims_paid.fetch_add(1, Ordering::Relaxed);
        self.payout_volume.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rounds_opened: self.rounds_opened.load(Ordering::Relaxed),
            bets_placed: self.bets_placed.load(Ordering::Relaxed),
            stake_volume: self.stake_volume.load(Ordering::Relaxed),
            spins_requested: self.spins_requested.load(Ordering::Relaxed),
            spins_resolved: self.spins_resolved.load(Ordering::Relaxed),
            claims_paid: self.claims_paid.load(Ordering::Relaxed),
            payout_volume: self.payout_volume.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rounds_opened: u64,
    pub bets_placed: u64,
    pub stake_volume: u64,
    pub spins_requested: u64,
    pub spins_resolved: u64,
    pub claims_paid: u64,
    pub payout_volume: u64,
}

impl MetricsSnapshot {
    /// Net amount the house kept so far (stakes in minus payouts out).
    pub fn house_margin(&self) -> i128 {
        i128::from(self.stake_volume) - i128::from(self.payout_volume)
    }
}
