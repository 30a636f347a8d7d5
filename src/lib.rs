//! Croupier - Round-Based Roulette Wagering Engine
//!
//! Single-number roulette over a pull-based staking asset, with batched
//! bets, VRF-backed spins and RocksDB-persisted claims. The engine runs
//! one table through a strict round lifecycle: open, lock for a spin,
//! close on the delivered randomness, then settle 36x winners on demand.

pub mod config;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod oracle;
pub mod store;
pub mod table;
pub mod token;

pub use config::{ConfigLoader, CroupierConfig};
pub use errors::{EngineError, EngineResult};
pub use events::{EngineEvent, EventBus};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use oracle::{OracleError, RandomnessOracle, SpinProof, VrfRandomizer};
pub use store::{EngineStore, StoreError};
pub use table::engine::{RouletteEngine, TableConfig};
pub use table::ledger::{LedgerError, RoundLedger};
pub use table::types::{
    AccountId, Amount, BetEntry, Entropy, RequestId, Round, RoundId, RoundStatus,
    derive_winning_number, number_color, NumberColor, MAX_NUMBER, PAYOUT_MULTIPLIER, RED_NUMBERS,
};
pub use token::{HouseToken, StakingAsset, TokenError};
