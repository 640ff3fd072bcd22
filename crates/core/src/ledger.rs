//! The aggregate state of one market deployment.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{MarketError, MarketResult};
use crate::round::Round;
use crate::types::{ParticipantId, Timestamp};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundLedger {
    /// Id of the most recently opened round.
    pub current_round: u64,
    pub genesis_started: bool,
    pub genesis_locked: bool,
    pub paused: bool,
    /// Indexed by round id; only ever appended to.
    rounds: Vec<Round>,
    /// Custody balance backing every unclaimed pool value.
    vault: u64,
    participant_rounds: BTreeMap<ParticipantId, Vec<u64>>,
}

impl RoundLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn round(&self, id: u64) -> Option<&Round> {
        usize::try_from(id).ok().and_then(|idx| self.rounds.get(idx))
    }

    pub(crate) fn round_mut(&mut self, id: u64) -> Option<&mut Round> {
        usize::try_from(id)
            .ok()
            .and_then(move |idx| self.rounds.get_mut(idx))
    }

    #[must_use]
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// Id the next opened round will receive.
    #[must_use]
    pub fn next_round_id(&self) -> u64 {
        self.rounds.len() as u64
    }

    #[must_use]
    pub const fn vault(&self) -> u64 {
        self.vault
    }

    /// Appends a freshly opened round and returns its id.
    pub(crate) fn open_round(&mut self, now: Timestamp, duration: Duration) -> u64 {
        let id = self.next_round_id();
        self.rounds.push(Round::open(id, now, duration));
        id
    }

    /// Writes back a round that was staged and mutated out of place.
    pub(crate) fn replace_round(&mut self, round: Round) {
        if let Some(slot) = self.round_mut(round.id) {
            *slot = round;
        }
    }

    pub(crate) fn credit_vault(&mut self, amount: u64) -> MarketResult<()> {
        self.vault = self
            .vault
            .checked_add(amount)
            .ok_or(MarketError::Overflow)?;
        Ok(())
    }

    pub(crate) fn debit_vault(&mut self, amount: u64) -> MarketResult<()> {
        self.vault = self
            .vault
            .checked_sub(amount)
            .ok_or(MarketError::Overflow)?;
        Ok(())
    }

    pub(crate) fn record_participation(&mut self, participant: &ParticipantId, round: u64) {
        let rounds = self
            .participant_rounds
            .entry(participant.clone())
            .or_default();
        if rounds.last() != Some(&round) {
            rounds.push(round);
        }
    }

    /// Rounds the participant has bet in, ascending.
    #[must_use]
    pub fn participant_rounds(&self, participant: &ParticipantId) -> &[u64] {
        self.participant_rounds
            .get(participant)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sum of every pool value still held across all rounds.
    #[must_use]
    pub fn outstanding_value(&self) -> u128 {
        self.rounds
            .iter()
            .map(|round| {
                u128::from(round.up_pool.total_value()) + u128::from(round.down_pool.total_value())
            })
            .sum()
    }

    /// The vault backs exactly what the pools still owe.
    #[must_use]
    pub fn is_solvent(&self) -> bool {
        u128::from(self.vault) == self.outstanding_value()
    }
}
