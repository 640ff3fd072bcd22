//! Payout of finalized rounds.
//!
//! Claiming is split into a read-only [`ClaimProcessor::preview`] that
//! validates every requested round and prices the payout, and
//! [`ClaimProcessor::apply`] that burns the shares. The market moves the
//! funds between the two, so a custody failure leaves the ledger untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{MarketError, MarketResult};
use crate::ledger::RoundLedger;
use crate::types::ParticipantId;

/// Payout owed for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEntry {
    pub round: u64,
    pub up_shares: u64,
    pub down_shares: u64,
    pub payout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPlan {
    pub participant: ParticipantId,
    /// One entry per distinct requested round, in request order.
    pub entries: Vec<ClaimEntry>,
    pub total: u64,
}

impl ClaimPlan {
    #[must_use]
    pub fn rounds(&self) -> Vec<u64> {
        self.entries.iter().map(|entry| entry.round).collect()
    }

    /// True when nothing would be paid or burned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.up_shares == 0 && entry.down_shares == 0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimProcessor;

impl ClaimProcessor {
    /// Validates every id and prices the claim without touching the ledger.
    ///
    /// Duplicate ids are collapsed; each round pays at most once per call.
    ///
    /// # Errors
    ///
    /// `InvalidRound` for an id at or past the current round, `NotFinalized`
    /// for a round that has not been settled, `Overflow` if the payout does
    /// not fit.
    pub fn preview(
        ledger: &RoundLedger,
        participant: &ParticipantId,
        round_ids: &[u64],
    ) -> MarketResult<ClaimPlan> {
        let mut seen = BTreeSet::new();
        let mut entries = Vec::with_capacity(round_ids.len());
        let mut total: u64 = 0;

        for &id in round_ids {
            if !ledger.genesis_started || id >= ledger.current_round {
                return Err(MarketError::InvalidRound {
                    round: id,
                    current: ledger.current_round,
                });
            }
            let round = ledger.round(id).ok_or(MarketError::InvalidRound {
                round: id,
                current: ledger.current_round,
            })?;
            if !round.finalized {
                return Err(MarketError::NotFinalized(id));
            }
            if !seen.insert(id) {
                continue;
            }

            let up_shares = round.up_pool.shares_of(participant);
            let down_shares = round.down_pool.shares_of(participant);
            let payout = round
                .up_pool
                .redeemable(up_shares)
                .checked_add(round.down_pool.redeemable(down_shares))
                .ok_or(MarketError::Overflow)?;
            total = total.checked_add(payout).ok_or(MarketError::Overflow)?;

            entries.push(ClaimEntry {
                round: id,
                up_shares,
                down_shares,
                payout,
            });
        }

        Ok(ClaimPlan {
            participant: participant.clone(),
            entries,
            total,
        })
    }

    /// Burns the shares priced by `plan` and debits the vault.
    ///
    /// `plan` must come from [`preview`](Self::preview) on this same ledger
    /// with no mutation in between.
    ///
    /// # Errors
    ///
    /// `Overflow` if the vault cannot cover the total; nothing is burned in
    /// that case.
    pub fn apply(ledger: &mut RoundLedger, plan: &ClaimPlan) -> MarketResult<u64> {
        if plan.total > ledger.vault() {
            return Err(MarketError::Overflow);
        }

        let mut paid: u64 = 0;
        for entry in &plan.entries {
            let Some(round) = ledger.round_mut(entry.round) else {
                continue;
            };
            paid += round.up_pool.redeem_all(&plan.participant);
            paid += round.down_pool.redeem_all(&plan.participant);
        }
        debug_assert_eq!(paid, plan.total);

        ledger.debit_vault(paid)?;
        Ok(paid)
    }
}
