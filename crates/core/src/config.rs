use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::types::ParticipantId;

pub const BPS_DENOMINATOR: u16 = 10_000;

/// Longest round the market accepts (one week).
pub const MAX_ROUND_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub market: MarketConfig,
    pub keeper: KeeperConfig,
}

/// Constants of one market deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Seconds between open and lock, and between lock and end.
    pub round_duration_secs: u64,
    /// Grace period after each deadline during which the transition is still accepted.
    pub buffer_secs: u64,
    /// Fee on the combined stake of a decided round, in basis points.
    pub fee_bps: u16,
    pub min_bet_amount: u64,
    pub fee_recipient: ParticipantId,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self::five_minute()
    }
}

impl MarketConfig {
    #[must_use]
    pub fn five_minute() -> Self {
        Self {
            round_duration_secs: 300,
            buffer_secs: 30,
            fee_bps: 5,
            min_bet_amount: 1,
            fee_recipient: ParticipantId::new("treasury"),
        }
    }

    #[must_use]
    pub fn one_minute() -> Self {
        Self {
            round_duration_secs: 60,
            buffer_secs: 10,
            ..Self::five_minute()
        }
    }

    #[must_use]
    pub fn hourly() -> Self {
        Self {
            round_duration_secs: 3_600,
            buffer_secs: 120,
            ..Self::five_minute()
        }
    }

    #[must_use]
    pub fn round_duration(&self) -> Duration {
        Duration::seconds(self.round_duration_secs.min(MAX_ROUND_DURATION_SECS) as i64)
    }

    #[must_use]
    pub fn buffer(&self) -> Duration {
        Duration::seconds(self.buffer_secs.min(MAX_ROUND_DURATION_SECS) as i64)
    }

    /// Rejects configurations the round state machine cannot run on.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first violated constraint.
    pub fn validate(&self) -> MarketResult<()> {
        if self.round_duration_secs == 0 {
            return Err(MarketError::InvalidConfig(
                "round_duration_secs must be positive".to_string(),
            ));
        }
        if self.round_duration_secs > MAX_ROUND_DURATION_SECS {
            return Err(MarketError::InvalidConfig(format!(
                "round_duration_secs must not exceed {MAX_ROUND_DURATION_SECS}"
            )));
        }
        if self.buffer_secs >= self.round_duration_secs {
            return Err(MarketError::InvalidConfig(
                "buffer_secs must be shorter than the round duration".to_string(),
            ));
        }
        if self.fee_bps > BPS_DENOMINATOR {
            return Err(MarketError::InvalidConfig(format!(
                "fee_bps must be at most {BPS_DENOMINATOR}"
            )));
        }
        if self.min_bet_amount == 0 {
            return Err(MarketError::InvalidConfig(
                "min_bet_amount must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the process that drives genesis and ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    pub admin: ParticipantId,
    /// Defaults to the round duration.
    pub tick_interval_secs: Option<u64>,
    /// Starting price of the simulated feed.
    pub start_price: Decimal,
    /// Per-sample standard step of the simulated feed, in basis points.
    pub volatility_bps: u32,
    pub seed: u64,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            admin: ParticipantId::new("admin"),
            tick_interval_secs: None,
            start_price: Decimal::from(60_000),
            volatility_bps: 20,
            seed: 42,
        }
    }
}

impl KeeperConfig {
    #[must_use]
    pub fn tick_interval(&self, market: &MarketConfig) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.tick_interval_secs
                .unwrap_or(market.round_duration_secs),
        )
    }
}
