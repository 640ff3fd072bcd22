use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::round::Direction;
use crate::settlement::Outcome;
use crate::types::{ParticipantId, Price};

/// Notification emitted after a transition commits. Delivery is best effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    RoundStarted {
        round: u64,
        start_time: DateTime<Utc>,
        lock_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    RoundLocked {
        round: u64,
        price: Price,
        timestamp: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    RoundEnded {
        round: u64,
        price: Price,
        timestamp: DateTime<Utc>,
    },
    RewardsCalculated {
        round: u64,
        outcome: Outcome,
        total_stake: u64,
        fee: u64,
        reward_pool: u64,
        swept: bool,
    },
    BetPlaced {
        round: u64,
        participant: ParticipantId,
        direction: Direction,
        amount: u64,
        shares: u64,
    },
    Claimed {
        participant: ParticipantId,
        rounds: Vec<u64>,
        amount: u64,
    },
    Paused {
        timestamp: DateTime<Utc>,
    },
    Unpaused {
        timestamp: DateTime<Utc>,
    },
}

impl MarketEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RoundStarted { .. } => "round_started",
            Self::RoundLocked { .. } => "round_locked",
            Self::RoundEnded { .. } => "round_ended",
            Self::RewardsCalculated { .. } => "rewards_calculated",
            Self::BetPlaced { .. } => "bet_placed",
            Self::Claimed { .. } => "claimed",
            Self::Paused { .. } => "paused",
            Self::Unpaused { .. } => "unpaused",
        }
    }
}

/// Observer invoked after each committed transition.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &MarketEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &MarketEvent) {}
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &MarketEvent) {
        match event {
            MarketEvent::RoundStarted {
                round, lock_time, ..
            } => tracing::info!(round, %lock_time, "round started"),
            MarketEvent::RoundLocked {
                round,
                price,
                end_time,
                ..
            } => tracing::info!(round, %price, %end_time, "round locked"),
            MarketEvent::RoundEnded { round, price, .. } => {
                tracing::info!(round, %price, "round ended");
            }
            MarketEvent::RewardsCalculated {
                round,
                outcome,
                fee,
                reward_pool,
                swept,
                ..
            } => tracing::info!(round, %outcome, fee, reward_pool, swept, "rewards calculated"),
            MarketEvent::BetPlaced {
                round,
                participant,
                direction,
                amount,
                ..
            } => tracing::debug!(round, %participant, %direction, amount, "bet placed"),
            MarketEvent::Claimed {
                participant,
                rounds,
                amount,
            } => tracing::debug!(%participant, rounds = ?rounds, amount, "claimed"),
            MarketEvent::Paused { .. } => tracing::warn!("market paused"),
            MarketEvent::Unpaused { .. } => tracing::info!("market unpaused"),
        }
    }
}

/// Keeps every event in memory. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<MarketEvent>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<MarketEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(MarketEvent::name).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &MarketEvent) {
        self.events.lock().push(event.clone());
    }
}
