//! Proportional-ownership ledger for one side of one round.
//!
//! Stakes mint shares against the pool's current value; redemption burns
//! shares for `floor(shares * total_value / total_shares)`. Settlement
//! rescales `total_value` without touching share counts, which is how a
//! winning side's shares come to be worth more than was staked.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{MarketError, MarketResult};
use crate::types::ParticipantId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePool {
    total_value: u64,
    total_shares: u64,
    shares_by_participant: BTreeMap<ParticipantId, u64>,
}

impl SharePool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn total_value(&self) -> u64 {
        self.total_value
    }

    #[must_use]
    pub const fn total_shares(&self) -> u64 {
        self.total_shares
    }

    #[must_use]
    pub fn shares_of(&self, participant: &ParticipantId) -> u64 {
        self.shares_by_participant
            .get(participant)
            .copied()
            .unwrap_or(0)
    }

    /// Number of participants currently holding shares.
    #[must_use]
    pub fn holders(&self) -> usize {
        self.shares_by_participant.len()
    }

    pub fn participants(&self) -> impl Iterator<Item = (&ParticipantId, &u64)> {
        self.shares_by_participant.iter()
    }

    /// Value `shares` would redeem for right now.
    #[must_use]
    pub fn redeemable(&self, shares: u64) -> u64 {
        if self.total_shares == 0 {
            return 0;
        }
        // shares <= total_shares, so the quotient fits back into u64
        (u128::from(shares) * u128::from(self.total_value) / u128::from(self.total_shares)) as u64
    }

    /// Shares a stake of `amount` would mint, checking every total it would
    /// touch. Does not mutate.
    ///
    /// The first stake mints 1:1; later stakes mint against the current
    /// share price, rounding down.
    pub fn quote_buy_in(&self, participant: &ParticipantId, amount: u64) -> MarketResult<u64> {
        if amount == 0 {
            return Err(MarketError::InvalidAmount);
        }

        // A pool with shares but no value only exists after a losing
        // settlement, and settled pools never take stakes.
        let minted = if self.total_shares == 0 || self.total_value == 0 {
            amount
        } else {
            let minted = u128::from(amount) * u128::from(self.total_shares)
                / u128::from(self.total_value);
            u64::try_from(minted).map_err(|_| MarketError::Overflow)?
        };

        self.total_value
            .checked_add(amount)
            .ok_or(MarketError::Overflow)?;
        self.total_shares
            .checked_add(minted)
            .ok_or(MarketError::Overflow)?;
        self.shares_of(participant)
            .checked_add(minted)
            .ok_or(MarketError::Overflow)?;

        Ok(minted)
    }

    /// Stakes `amount` and returns the number of shares minted.
    pub fn buy_in(&mut self, participant: &ParticipantId, amount: u64) -> MarketResult<u64> {
        let minted = self.quote_buy_in(participant, amount)?;

        self.total_value += amount;
        self.total_shares += minted;
        if minted > 0 {
            *self
                .shares_by_participant
                .entry(participant.clone())
                .or_insert(0) += minted;
        }

        Ok(minted)
    }

    /// Burns `shares` from `participant` and returns the payout.
    ///
    /// Redeeming zero shares is a no-op that returns 0.
    pub fn redeem_shares(&mut self, participant: &ParticipantId, shares: u64) -> MarketResult<u64> {
        let held = self.shares_of(participant);
        if shares > held {
            return Err(MarketError::InsufficientShares {
                requested: shares,
                held,
            });
        }
        if shares == 0 {
            return Ok(0);
        }

        let payout = self.redeemable(shares);
        self.total_value -= payout;
        self.total_shares -= shares;

        let remaining = held - shares;
        if remaining == 0 {
            self.shares_by_participant.remove(participant);
        } else {
            self.shares_by_participant
                .insert(participant.clone(), remaining);
        }

        Ok(payout)
    }

    /// Redeems the participant's whole balance.
    pub fn redeem_all(&mut self, participant: &ParticipantId) -> u64 {
        let held = self.shares_of(participant);
        // held is exactly the balance, so this cannot fail
        self.redeem_shares(participant, held).unwrap_or(0)
    }

    /// Overwrites the pool value. Share balances are untouched.
    pub fn rescale(&mut self, new_total_value: u64) {
        self.total_value = new_total_value;
    }
}
