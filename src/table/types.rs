use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Dense round identifier, assigned in creation order starting at 0.
pub type RoundId = u64;

/// Indivisible base units of the staking asset.
pub type Amount = u64;

/// Oracle-assigned identifier for a randomness request.
pub type RequestId = u64;

/// Raw 256-bit value delivered by the randomness oracle.
pub type Entropy = [u8; 32];

/// Highest playable wheel number (the wheel is 0..=36).
pub const MAX_NUMBER: u8 = 36;

/// A winning straight-up stake pays out at this multiple of the stake.
pub const PAYOUT_MULTIPLIER: u64 = 36;

/// Red pockets of a single-zero wheel; 0 is green, the rest are black.
pub const RED_NUMBERS: [u8; 18] = [
    1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36,
];

/// Opaque 32-byte principal identifier (bettors, owner, oracle, engine custody).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a stable account id from a human-readable label.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First four bytes as hex, for compact log output.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_hex())
    }
}

impl Serialize for AccountId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        let raw: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom("account id must be 32 bytes"))?;
        Ok(AccountId(raw))
    }
}

/// Round lifecycle states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    NotStarted,
    Open,
    Locked,
    Closed,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::NotStarted => write!(f, "not_started"),
            RoundStatus::Open => write!(f, "open"),
            RoundStatus::Locked => write!(f, "locked"),
            RoundStatus::Closed => write!(f, "closed"),
        }
    }
}

/// One round of play.
///
/// `winning_number` is `Some` exactly when the round is Closed;
/// `random_request_id` is `Some` from the moment the round locks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Round {
    pub id: RoundId,
    pub status: RoundStatus,
    pub winning_number: Option<u8>,
    pub random_request_id: Option<RequestId>,
}

impl Round {
    pub fn new(id: RoundId) -> Self {
        Self {
            id,
            status: RoundStatus::NotStarted,
            winning_number: None,
            random_request_id: None,
        }
    }
}

/// One entry of a bet batch: a stake on a single number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BetEntry {
    pub number: u8,
    pub amount: Amount,
}

/// Pocket color, for display and simulator tagging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NumberColor {
    Red,
    Black,
    Green,
}

impl fmt::Display for NumberColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberColor::Red => write!(f, "red"),
            NumberColor::Black => write!(f, "black"),
            NumberColor::Green => write!(f, "green"),
        }
    }
}

/// Color of a wheel number (0 is green).
pub fn number_color(number: u8) -> NumberColor {
    if number == 0 {
        NumberColor::Green
    } else if RED_NUMBERS.contains(&number) {
        NumberColor::Red
    } else {
        NumberColor::Black
    }
}

/// Reduce 32 bytes of spin entropy to a wheel number in 0..=36.
///
/// The bytes are read as one big-endian integer and reduced modulo 37,
/// folding byte by byte so the intermediate value never overflows.
/// The modulo bias over a 256-bit input is negligible.
pub fn derive_winning_number(entropy: &Entropy) -> u8 {
    let folded = entropy
        .iter()
        .fold(0u64, |acc, byte| ((acc << 8) | u64::from(*byte)) % 37);
    folded as u8
}
