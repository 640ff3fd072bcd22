//! Winner determination and payout-pool rescaling, applied once per round.
//!
//! Let `T` be the combined stake and `fee = floor(T * fee_bps / 10_000)`.
//! The winning pool is rescaled to `T - fee` and the losing pool to 0, so
//! every winning share redeems for its proportional slice of the whole
//! round. On a tie neither pool is touched and no fee is charged.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::BPS_DENOMINATOR;
use crate::error::{MarketError, MarketResult};
use crate::round::{Direction, Round};
use crate::types::Price;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// `lock_price < end_price`.
    UpWins,
    /// `lock_price > end_price`.
    DownWins,
    /// Prices equal; stakes are refunded in full.
    Tie,
}

impl Outcome {
    #[must_use]
    pub fn from_prices(lock_price: Price, end_price: Price) -> Self {
        match lock_price.cmp(&end_price) {
            std::cmp::Ordering::Less => Self::UpWins,
            std::cmp::Ordering::Greater => Self::DownWins,
            std::cmp::Ordering::Equal => Self::Tie,
        }
    }

    #[must_use]
    pub const fn winner(self) -> Option<Direction> {
        match self {
            Self::UpWins => Some(Direction::Up),
            Self::DownWins => Some(Direction::Down),
            Self::Tie => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpWins => f.write_str("up"),
            Self::DownWins => f.write_str("down"),
            Self::Tie => f.write_str("tie"),
        }
    }
}

/// Result of settling one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub round_id: u64,
    pub outcome: Outcome,
    /// Combined stake of both pools before rescaling.
    pub total_stake: u64,
    /// Value leaving the vault for the fee recipient.
    pub fee: u64,
    /// Value left for winners (or refunds on a tie).
    pub reward_pool: u64,
    /// Nobody backed the winning side, so the whole round went to the fee recipient.
    pub swept: bool,
}

/// Pool values a settlement should leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rescale {
    up: Option<u64>,
    down: Option<u64>,
    fee: u64,
    swept: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementEngine {
    fee_bps: u16,
}

impl SettlementEngine {
    /// Rates above 100% are capped at `BPS_DENOMINATOR`.
    #[must_use]
    pub const fn new(fee_bps: u16) -> Self {
        let fee_bps = if fee_bps > BPS_DENOMINATOR {
            BPS_DENOMINATOR
        } else {
            fee_bps
        };
        Self { fee_bps }
    }

    #[must_use]
    pub const fn fee_bps(&self) -> u16 {
        self.fee_bps
    }

    /// `floor(total * fee_bps / 10_000)`; the remainder stays with winners.
    #[must_use]
    pub fn fee_for(&self, total: u64) -> u64 {
        let fee = u128::from(total) * u128::from(self.fee_bps) / u128::from(BPS_DENOMINATOR);
        // fee_bps <= 10_000 keeps this at or below total
        fee as u64
    }

    fn plan(
        &self,
        outcome: Outcome,
        up_value: u64,
        down_value: u64,
        winner_shares: u64,
    ) -> MarketResult<Rescale> {
        let total = up_value
            .checked_add(down_value)
            .ok_or(MarketError::Overflow)?;

        let Some(winner) = outcome.winner() else {
            return Ok(Rescale {
                up: None,
                down: None,
                fee: 0,
                swept: false,
            });
        };

        if winner_shares == 0 {
            return Ok(Rescale {
                up: Some(0),
                down: Some(0),
                fee: total,
                swept: total > 0,
            });
        }

        let fee = self.fee_for(total);
        let reward = total.checked_sub(fee).ok_or(MarketError::Overflow)?;
        let (up, down) = match winner {
            Direction::Up => (reward, 0),
            Direction::Down => (0, reward),
        };
        Ok(Rescale {
            up: Some(up),
            down: Some(down),
            fee,
            swept: false,
        })
    }

    /// Settles a round whose end price has been recorded.
    ///
    /// Marks the round finalized; a finalized round is rejected, which is
    /// what keeps the fee from ever being charged twice.
    pub fn settle(&self, round: &mut Round) -> MarketResult<Settlement> {
        if round.finalized {
            return Err(MarketError::AlreadyFinalized(round.id));
        }
        let lock_price = round.lock_price.ok_or(MarketError::NotLocked(round.id))?;
        let end_price = round.end_price.ok_or(MarketError::NotFinalized(round.id))?;

        let outcome = Outcome::from_prices(lock_price, end_price);
        let winner_shares = outcome
            .winner()
            .map_or(0, |side| round.pool(side).total_shares());
        let up_value = round.up_pool.total_value();
        let down_value = round.down_pool.total_value();
        let rescale = self.plan(outcome, up_value, down_value, winner_shares)?;

        if let Some(value) = rescale.up {
            round.up_pool.rescale(value);
        }
        if let Some(value) = rescale.down {
            round.down_pool.rescale(value);
        }
        round.finalized = true;
        round.outcome = Some(outcome);
        round.fee = rescale.fee;

        Ok(Settlement {
            round_id: round.id,
            outcome,
            total_stake: up_value + down_value,
            fee: rescale.fee,
            reward_pool: round.total_value(),
            swept: rescale.swept,
        })
    }
}
