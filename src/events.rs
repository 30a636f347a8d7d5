//! Engine event fanout over a tokio broadcast channel.
//!
//! Events are published only after the operation that produced them has
//! fully committed. Slow or absent subscribers never block the engine; a
//! lagging receiver just misses events.

use crate::table::types::{AccountId, Amount, RequestId, RoundId};
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RoundOpened {
        round: RoundId,
    },
    BetPlaced {
        bettor: AccountId,
        round: RoundId,
        number: u8,
        amount: Amount,
        tag: String,
    },
    SpinRequested {
        round: RoundId,
        request_id: RequestId,
        nonce: u64,
    },
    SpinResolved {
        round: RoundId,
        winning_number: u8,
    },
    WinningsCollected {
        bettor: AccountId,
        round: RoundId,
        amount: Amount,
    },
}

pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish to whoever is listening; dropped when nobody is.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
