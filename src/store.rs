//! Write-through persistence for rounds, stakes and claims on RocksDB.
//!
//! The in-memory ledger stays authoritative; the store mirrors it so an
//! engine reopened over the same path can rebuild the ledger and keep
//! historical rounds claimable. Records are JSON under string-prefixed
//! keys, one keyspace per table.

use crate::table::types::{AccountId, Amount, RequestId, Round, RoundId, RoundStatus};
use chrono::Utc;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const ROUND_PREFIX: &str = "round:";
const STAKE_PREFIX: &str = "stake:";
const CLAIM_PREFIX: &str = "claim:";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rocksdb::Error),
    #[error("failed to encode record for {key}: {reason}")]
    EncodeFailed { key: String, reason: String },
    #[error("corrupted record at {key}: {reason}")]
    Corrupted { key: String, reason: String },
}

/// Durable image of a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub id: RoundId,
    pub status: RoundStatus,
    pub winning_number: Option<u8>,
    pub random_request_id: Option<RequestId>,
    pub updated_at_ms: i64,
}

impl RoundRecord {
    pub fn from_round(round: &Round) -> Self {
        Self {
            id: round.id,
            status: round.status,
            winning_number: round.winning_number,
            random_request_id: round.random_request_id,
            updated_at_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn into_round(self) -> Round {
        Round {
            id: self.id,
            status: self.status,
            winning_number: self.winning_number,
            random_request_id: self.random_request_id,
        }
    }
}

/// Durable image of one (round, bettor, number) stake cell. Holds the
/// cumulative stake, so rewriting the cell is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeRecord {
    pub round_id: RoundId,
    pub bettor: AccountId,
    pub number: u8,
    pub cumulative: Amount,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub round_id: RoundId,
    pub bettor: AccountId,
    pub amount: Amount,
    pub claimed_at_ms: i64,
}

/// Everything needed to rebuild a ledger, as read back from disk.
#[derive(Debug, Default)]
pub struct PersistedState {
    pub rounds: Vec<RoundRecord>,
    pub stakes: Vec<StakeRecord>,
    pub claims: Vec<ClaimRecord>,
}

fn round_key(id: RoundId) -> Vec<u8> {
    // Zero-padded so lexicographic key order matches numeric round order.
    format!("{}{:020}", ROUND_PREFIX, id).into_bytes()
}

fn stake_key(round_id: RoundId, bettor: &AccountId, number: u8) -> Vec<u8> {
    format!(
        "{}{:020}:{}:{:02}",
        STAKE_PREFIX,
        round_id,
        bettor.to_hex(),
        number
    )
    .into_bytes()
}

fn claim_key(round_id: RoundId, bettor: &AccountId) -> Vec<u8> {
    format!("{}{:020}:{}", CLAIM_PREFIX, round_id, bettor.to_hex()).into_bytes()
}

fn encode<T: Serialize>(key: &[u8], value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::EncodeFailed {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: e.to_string(),
    })
}

#[derive(Clone)]
pub struct EngineStore {
    db: Arc<DB>,
}

impl EngineStore {
    /// Open (or create) a store with the default tuning.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_tuned(path, 128, 4, 128)
    }

    /// Open with explicit RocksDB tuning, sized in megabytes.
    pub fn open_tuned<P: AsRef<Path>>(
        path: P,
        write_buffer_size_mb: usize,
        max_write_buffer_number: i32,
        target_file_size_mb: u64,
    ) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(write_buffer_size_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(max_write_buffer_number);
        opts.set_target_file_size_base(target_file_size_mb * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn put_round(&self, record: &RoundRecord) -> Result<(), StoreError> {
        let key = round_key(record.id);
        let bytes = encode(&key, record)?;
        self.db.put(&key, bytes)?;
        Ok(())
    }

    pub fn put_stake(&self, record: &StakeRecord) -> Result<(), StoreError> {
        let key = stake_key(record.round_id, &record.bettor, record.number);
        let bytes = encode(&key, record)?;
        self.db.put(&key, bytes)?;
        Ok(())
    }

    /// Write a batch of stake cells atomically; one bet batch, one write.
    pub fn put_stakes(&self, records: &[StakeRecord]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        for record in records {
            let key = stake_key(record.round_id, &record.bettor, record.number);
            let bytes = encode(&key, record)?;
            batch.put(&key, bytes);
        }
        self.db.write(batch)?;
        Ok(())
    }

    pub fn put_claim(&self, record: &ClaimRecord) -> Result<(), StoreError> {
        let key = claim_key(record.round_id, &record.bettor);
        let bytes = encode(&key, record)?;
        self.db.put(&key, bytes)?;
        Ok(())
    }

    pub fn round(&self, id: RoundId) -> Result<Option<RoundRecord>, StoreError> {
        let key = round_key(id);
        match self.db.get(&key)? {
            Some(bytes) => {
                let record =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupted {
                        key: String::from_utf8_lossy(&key).into_owned(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn load_rounds(&self) -> Result<Vec<RoundRecord>, StoreError> {
        self.scan_json(ROUND_PREFIX)
    }

    pub fn load_stakes(&self) -> Result<Vec<StakeRecord>, StoreError> {
        self.scan_json(STAKE_PREFIX)
    }

    pub fn load_claims(&self) -> Result<Vec<ClaimRecord>, StoreError> {
        self.scan_json(CLAIM_PREFIX)
    }

    pub fn load_state(&self) -> Result<PersistedState, StoreError> {
        Ok(PersistedState {
            rounds: self.load_rounds()?,
            stakes: self.load_stakes()?,
            claims: self.load_claims()?,
        })
    }

    fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, StoreError> {
        let mut records = Vec::new();
        let mode = IteratorMode::From(prefix.as_bytes(), Direction::Forward);
        for item in self.db.iterator(mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let record = serde_json::from_slice(&value).map_err(|e| StoreError::Corrupted {
                key: String::from_utf8_lossy(&key).into_owned(),
                reason: e.to_string(),
            })?;
            records.push(record);
        }
        Ok(records)
    }
}
