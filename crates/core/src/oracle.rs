//! Price feeds consumed once per `genesis_lock` / `tick`.

use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::BPS_DENOMINATOR;
use crate::error::{MarketError, MarketResult};
use crate::types::Price;

pub trait PriceOracle: Send + Sync {
    fn latest_price(&mut self) -> MarketResult<Price>;
}

/// Always returns the current value; clones share it.
#[derive(Debug, Clone)]
pub struct FixedPriceOracle {
    price: Arc<RwLock<Price>>,
}

impl FixedPriceOracle {
    #[must_use]
    pub fn new(price: Price) -> Self {
        Self {
            price: Arc::new(RwLock::new(price)),
        }
    }

    pub fn set(&self, price: Price) {
        *self.price.write() = price;
    }
}

impl PriceOracle for FixedPriceOracle {
    fn latest_price(&mut self) -> MarketResult<Price> {
        Ok(*self.price.read())
    }
}

/// Replays a queue of prices, failing once it runs dry. Clones share the queue.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOracle {
    prices: Arc<Mutex<VecDeque<Price>>>,
}

impl ScriptedOracle {
    #[must_use]
    pub fn new(prices: impl IntoIterator<Item = Price>) -> Self {
        Self {
            prices: Arc::new(Mutex::new(prices.into_iter().collect())),
        }
    }

    pub fn push(&self, price: Price) {
        self.prices.lock().push_back(price);
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.prices.lock().len()
    }
}

impl PriceOracle for ScriptedOracle {
    fn latest_price(&mut self) -> MarketResult<Price> {
        self.prices
            .lock()
            .pop_front()
            .ok_or_else(|| MarketError::Oracle("price script exhausted".to_string()))
    }
}

/// Seeded random walk, used by the simulator and the keeper's paper mode.
#[derive(Debug, Clone)]
pub struct RandomWalkOracle {
    rng: ChaCha8Rng,
    price: Price,
    step_bps: u32,
}

impl RandomWalkOracle {
    #[must_use]
    pub fn new(start: Price, step_bps: u32, seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            price: start,
            step_bps,
        }
    }

    #[must_use]
    pub const fn current(&self) -> Price {
        self.price
    }
}

impl PriceOracle for RandomWalkOracle {
    fn latest_price(&mut self) -> MarketResult<Price> {
        let bound = i64::from(self.step_bps);
        let step_bps = if bound == 0 {
            0
        } else {
            self.rng.gen_range(-bound..=bound)
        };
        let change = self.price * Decimal::from(step_bps) / Decimal::from(BPS_DENOMINATOR);
        // Two decimal places so equal samples (ties) stay possible.
        let next = (self.price + change).round_dp(2);
        if next > Decimal::ZERO {
            self.price = next;
        }
        Ok(self.price)
    }
}
