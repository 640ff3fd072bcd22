//! One betting cycle: two share pools, three deadlines, and the lock/end
//! transitions that move the round through its lifecycle.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MarketError, MarketResult};
use crate::pool::SharePool;
use crate::settlement::Outcome;
use crate::types::{ParticipantId, Price, Timestamp};

/// Side of a round a participant backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// End price strictly above lock price.
    Up,
    /// End price strictly below lock price.
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// Lifecycle phase of a round at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    /// Accepting bets.
    Open,
    /// Lock deadline reached, lock price not yet recorded.
    AwaitingLock,
    /// Lock price recorded, end deadline not reached.
    Locked,
    /// End deadline reached, end price not yet recorded.
    AwaitingSettlement,
    /// End price recorded and payouts computed.
    Finalized,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Open => "open",
            Self::AwaitingLock => "awaiting-lock",
            Self::Locked => "locked",
            Self::AwaitingSettlement => "awaiting-settlement",
            Self::Finalized => "finalized",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: u64,
    pub start_time: Timestamp,
    pub lock_time: Timestamp,
    pub end_time: Timestamp,
    pub lock_price: Option<Price>,
    pub end_price: Option<Price>,
    pub up_pool: SharePool,
    pub down_pool: SharePool,
    pub finalized: bool,
    /// Recorded by settlement; `None` until finalized.
    pub outcome: Option<Outcome>,
    /// Value that left the vault at settlement.
    pub fee: u64,
}

impl Round {
    /// Opens a round at `now` with lock and end deadlines one and two
    /// durations out.
    #[must_use]
    pub fn open(id: u64, now: Timestamp, duration: Duration) -> Self {
        Self {
            id,
            start_time: now,
            lock_time: now + duration,
            end_time: now + duration + duration,
            lock_price: None,
            end_price: None,
            up_pool: SharePool::new(),
            down_pool: SharePool::new(),
            finalized: false,
            outcome: None,
            fee: 0,
        }
    }

    #[must_use]
    pub fn phase(&self, now: Timestamp) -> RoundPhase {
        if self.finalized {
            RoundPhase::Finalized
        } else if self.lock_price.is_some() {
            if now >= self.end_time {
                RoundPhase::AwaitingSettlement
            } else {
                RoundPhase::Locked
            }
        } else if now >= self.lock_time {
            RoundPhase::AwaitingLock
        } else {
            RoundPhase::Open
        }
    }

    /// True once the pending transition's buffer window has passed without it.
    #[must_use]
    pub fn is_stranded(&self, now: Timestamp, buffer: Duration) -> bool {
        match self.phase(now) {
            RoundPhase::AwaitingLock => now > self.lock_time + buffer,
            RoundPhase::AwaitingSettlement => now > self.end_time + buffer,
            _ => false,
        }
    }

    /// Bets are accepted strictly between start and lock.
    #[must_use]
    pub fn is_bettable(&self, now: Timestamp) -> bool {
        self.lock_price.is_none() && self.start_time < now && now < self.lock_time
    }

    #[must_use]
    pub fn pool(&self, direction: Direction) -> &SharePool {
        match direction {
            Direction::Up => &self.up_pool,
            Direction::Down => &self.down_pool,
        }
    }

    pub fn pool_mut(&mut self, direction: Direction) -> &mut SharePool {
        match direction {
            Direction::Up => &mut self.up_pool,
            Direction::Down => &mut self.down_pool,
        }
    }

    /// Side the participant holds shares in, if any.
    #[must_use]
    pub fn position_of(&self, participant: &ParticipantId) -> Option<Direction> {
        if self.up_pool.shares_of(participant) > 0 {
            Some(Direction::Up)
        } else if self.down_pool.shares_of(participant) > 0 {
            Some(Direction::Down)
        } else {
            None
        }
    }

    /// Combined raw stake (or post-settlement payout pool) of both sides.
    #[must_use]
    pub fn total_value(&self) -> u64 {
        self.up_pool
            .total_value()
            .saturating_add(self.down_pool.total_value())
    }

    pub fn check_lock(&self, now: Timestamp, buffer: Duration) -> MarketResult<()> {
        if self.lock_price.is_some() {
            return Err(MarketError::AlreadyLocked(self.id));
        }
        if now < self.lock_time {
            return Err(MarketError::TooEarly {
                round: self.id,
                deadline: self.lock_time,
                now,
            });
        }
        let closed_at = self.lock_time + buffer;
        if now > closed_at {
            return Err(MarketError::TooLate {
                round: self.id,
                closed_at,
                now,
            });
        }
        Ok(())
    }

    /// Records the lock price and pushes the end deadline to one duration
    /// after the actual lock instant.
    pub fn lock(
        &mut self,
        price: Price,
        now: Timestamp,
        duration: Duration,
        buffer: Duration,
    ) -> MarketResult<()> {
        self.check_lock(now, buffer)?;
        self.lock_price = Some(price);
        self.end_time = now + duration;
        Ok(())
    }

    pub fn check_end(&self, now: Timestamp, buffer: Duration) -> MarketResult<()> {
        if self.finalized || self.end_price.is_some() {
            return Err(MarketError::AlreadyFinalized(self.id));
        }
        if self.lock_price.is_none() {
            return Err(MarketError::NotLocked(self.id));
        }
        if now < self.end_time {
            return Err(MarketError::TooEarly {
                round: self.id,
                deadline: self.end_time,
                now,
            });
        }
        let closed_at = self.end_time + buffer;
        if now > closed_at {
            return Err(MarketError::TooLate {
                round: self.id,
                closed_at,
                now,
            });
        }
        Ok(())
    }

    /// Records the end price. Payouts are computed separately by
    /// [`SettlementEngine`](crate::settlement::SettlementEngine).
    pub fn end(&mut self, price: Price, now: Timestamp, buffer: Duration) -> MarketResult<()> {
        self.check_end(now, buffer)?;
        self.end_price = Some(price);
        Ok(())
    }
}
