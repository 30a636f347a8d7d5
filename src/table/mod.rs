//! Table-side core: domain types, the round ledger, the settlement engine.

pub mod engine;
pub mod ledger;
pub mod types;

pub use engine::*;
pub use ledger::*;
pub use types::*;
