//! The market orchestrator.
//!
//! Every operation samples the clock once, validates against untouched
//! state, moves funds through [`Custody`], and only then commits to the
//! ledger. A failed operation leaves both the ledger and custody as they
//! were. Events go out after the commit.

use serde::{Deserialize, Serialize};

use crate::authority::AuthorityResolver;
use crate::claim::ClaimProcessor;
use crate::clock::Clock;
use crate::config::MarketConfig;
use crate::custody::Custody;
use crate::error::{MarketError, MarketResult};
use crate::events::{EventSink, MarketEvent, TracingSink};
use crate::ledger::RoundLedger;
use crate::oracle::PriceOracle;
use crate::round::{Direction, Round, RoundPhase};
use crate::settlement::{Settlement, SettlementEngine};
use crate::snapshot::LedgerSnapshot;
use crate::types::{ParticipantId, Price, Timestamp};

/// External collaborators a market is wired to.
pub struct Collaborators {
    pub authority: Box<dyn AuthorityResolver>,
    pub custody: Box<dyn Custody>,
    pub oracle: Box<dyn PriceOracle>,
    pub clock: Box<dyn Clock>,
    pub events: Box<dyn EventSink>,
}

impl Collaborators {
    /// Wires the required collaborators; events are logged through `tracing`.
    pub fn new(
        authority: impl AuthorityResolver + 'static,
        custody: impl Custody + 'static,
        oracle: impl PriceOracle + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            authority: Box::new(authority),
            custody: Box::new(custody),
            oracle: Box::new(oracle),
            clock: Box::new(clock),
            events: Box::new(TracingSink),
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: impl EventSink + 'static) -> Self {
        self.events = Box::new(events);
        self
    }
}

/// What one successful `tick` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub price: Price,
    pub timestamp: Timestamp,
    /// Round that stopped taking bets.
    pub locked: u64,
    pub settlement: Settlement,
    /// Round that started taking bets.
    pub opened: u64,
}

/// What one successful bet did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetReceipt {
    pub round: u64,
    pub direction: Direction,
    pub amount: u64,
    pub shares: u64,
}

pub struct PredictionMarket {
    config: MarketConfig,
    settlement: SettlementEngine,
    ledger: RoundLedger,
    authority: Box<dyn AuthorityResolver>,
    custody: Box<dyn Custody>,
    oracle: Box<dyn PriceOracle>,
    clock: Box<dyn Clock>,
    events: Box<dyn EventSink>,
}

impl PredictionMarket {
    /// Creates an empty market. No round exists until `genesis_start`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` fails validation.
    pub fn initialize(config: MarketConfig, collaborators: Collaborators) -> MarketResult<Self> {
        Self::from_ledger(config, RoundLedger::new(), collaborators)
    }

    /// Resumes a market from a saved snapshot.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the snapshot's config is invalid, its ledger is
    /// not backed by its vault, or the custody vault holds a different
    /// balance than the ledger records.
    pub fn restore(snapshot: LedgerSnapshot, collaborators: Collaborators) -> MarketResult<Self> {
        if !snapshot.ledger.is_solvent() {
            return Err(MarketError::InvalidConfig(format!(
                "snapshot vault {} does not match outstanding pool value {}",
                snapshot.ledger.vault(),
                snapshot.ledger.outstanding_value()
            )));
        }
        let held = collaborators.custody.vault_balance();
        if held != snapshot.ledger.vault() {
            return Err(MarketError::InvalidConfig(format!(
                "custody vault {held} does not match snapshot vault {}",
                snapshot.ledger.vault()
            )));
        }
        Self::from_ledger(snapshot.config, snapshot.ledger, collaborators)
    }

    fn from_ledger(
        config: MarketConfig,
        ledger: RoundLedger,
        collaborators: Collaborators,
    ) -> MarketResult<Self> {
        config.validate()?;
        tracing::info!(
            round_duration_secs = config.round_duration_secs,
            buffer_secs = config.buffer_secs,
            fee_bps = config.fee_bps,
            "market initialized"
        );
        Ok(Self {
            settlement: SettlementEngine::new(config.fee_bps),
            config,
            ledger,
            authority: collaborators.authority,
            custody: collaborators.custody,
            oracle: collaborators.oracle,
            clock: collaborators.clock,
            events: collaborators.events,
        })
    }

    // ============================================================
    // Admin transitions
    // ============================================================

    /// Opens the first round.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `Paused`, or `GenesisAlreadyStarted`.
    pub fn genesis_start(&mut self, caller: &ParticipantId) -> MarketResult<u64> {
        let now = self.clock.now();
        self.admin_gate(caller, "genesis_start")?;
        if self.ledger.genesis_started {
            return Err(MarketError::GenesisAlreadyStarted);
        }

        let id = self.ledger.open_round(now, self.config.round_duration());
        self.ledger.current_round = id;
        self.ledger.genesis_started = true;

        tracing::info!(round = id, %now, "genesis started");
        self.emit_started(id);
        Ok(id)
    }

    /// Locks the genesis round and opens the next one. Returns the new
    /// round's id.
    ///
    /// # Errors
    ///
    /// Authorization and pause errors, `GenesisNotStarted`,
    /// `GenesisAlreadyLocked`, timing errors on the genesis round, or an
    /// oracle failure.
    pub fn genesis_lock(&mut self, caller: &ParticipantId) -> MarketResult<u64> {
        let now = self.clock.now();
        self.admin_gate(caller, "genesis_lock")?;
        if !self.ledger.genesis_started {
            return Err(MarketError::GenesisNotStarted);
        }
        if self.ledger.genesis_locked {
            return Err(MarketError::GenesisAlreadyLocked);
        }

        let current = self.ledger.current_round;
        let mut staged = self.staged(current)?;
        staged
            .check_lock(now, self.config.buffer())
            .inspect_err(|err| self.reject("genesis_lock", err))?;
        let price = self.sample_price("genesis_lock")?;
        staged.lock(
            price,
            now,
            self.config.round_duration(),
            self.config.buffer(),
        )?;

        self.ledger.replace_round(staged);
        let next = self.ledger.open_round(now, self.config.round_duration());
        self.ledger.current_round = next;
        self.ledger.genesis_locked = true;

        tracing::info!(locked = current, opened = next, %price, "genesis locked");
        self.emit_locked(current, price, now);
        self.emit_started(next);
        Ok(next)
    }

    /// Advances the market by one step: locks the current round, ends and
    /// settles the previous one, and opens a new round. All of it happens
    /// under one clock sample and one oracle price, or none of it does.
    ///
    /// # Errors
    ///
    /// Authorization and pause errors, `GenesisNotStarted` /
    /// `GenesisNotLocked`, timing errors on either round,
    /// `PreviousRoundNotEnded`, oracle or custody failures.
    pub fn tick(&mut self, caller: &ParticipantId) -> MarketResult<TickReport> {
        let now = self.clock.now();
        self.admin_gate(caller, "tick")?;
        if !self.ledger.genesis_started {
            return Err(MarketError::GenesisNotStarted);
        }
        if !self.ledger.genesis_locked {
            return Err(MarketError::GenesisNotLocked);
        }

        let buffer = self.config.buffer();
        let duration = self.config.round_duration();
        let current = self.ledger.current_round;
        // genesis_lock has run, so at least one round precedes the current one
        let previous = current.saturating_sub(1);

        let mut locking = self.staged(current)?;
        let mut ending = self.staged(previous)?;
        let checked = locking
            .check_lock(now, buffer)
            .and_then(|()| ending.check_end(now, buffer));
        if let Err(err) = checked {
            self.reject("tick", &err);
            return Err(err);
        }

        let price = self.sample_price("tick")?;
        locking.lock(price, now, duration, buffer)?;
        ending.end(price, now, buffer)?;
        let settlement = self.settlement.settle(&mut ending)?;

        let opened = self.ledger.next_round_id();
        Self::ensure_ended(&ending, opened, now)?;
        if settlement.fee > self.ledger.vault() {
            return Err(MarketError::Overflow);
        }

        if settlement.fee > 0 {
            self.custody
                .withdraw(&self.config.fee_recipient, settlement.fee)
                .inspect_err(|err| {
                    tracing::error!(
                        round = previous,
                        fee = settlement.fee,
                        error = %err,
                        "fee transfer failed"
                    );
                })?;
        }

        self.ledger.replace_round(locking);
        self.ledger.replace_round(ending);
        self.ledger.debit_vault(settlement.fee)?;
        self.ledger.open_round(now, duration);
        self.ledger.current_round = opened;

        tracing::info!(
            locked = current,
            settled = previous,
            opened,
            %price,
            outcome = %settlement.outcome,
            fee = settlement.fee,
            "tick"
        );
        self.emit_locked(current, price, now);
        self.events.emit(&MarketEvent::RoundEnded {
            round: previous,
            price,
            timestamp: now,
        });
        self.events.emit(&MarketEvent::RewardsCalculated {
            round: previous,
            outcome: settlement.outcome,
            total_stake: settlement.total_stake,
            fee: settlement.fee,
            reward_pool: settlement.reward_pool,
            swept: settlement.swept,
        });
        self.emit_started(opened);

        Ok(TickReport {
            price,
            timestamp: now,
            locked: current,
            settlement,
            opened,
        })
    }

    /// # Errors
    ///
    /// `Unauthorized` or `Paused` if already paused.
    pub fn pause(&mut self, caller: &ParticipantId) -> MarketResult<()> {
        let now = self.clock.now();
        self.admin_gate(caller, "pause")?;
        self.ledger.paused = true;
        self.events.emit(&MarketEvent::Paused { timestamp: now });
        Ok(())
    }

    /// # Errors
    ///
    /// `Unauthorized` or `NotPaused`.
    pub fn unpause(&mut self, caller: &ParticipantId) -> MarketResult<()> {
        let now = self.clock.now();
        self.authority
            .authorize(caller)
            .inspect_err(|err| self.reject("unpause", err))?;
        if !self.ledger.paused {
            return Err(MarketError::NotPaused);
        }
        self.ledger.paused = false;
        self.events.emit(&MarketEvent::Unpaused { timestamp: now });
        Ok(())
    }

    // ============================================================
    // Participant operations
    // ============================================================

    /// Bets on the round currently accepting stakes.
    ///
    /// # Errors
    ///
    /// See [`bet_on`](Self::bet_on).
    pub fn bet(
        &mut self,
        participant: &ParticipantId,
        direction: Direction,
        amount: u64,
    ) -> MarketResult<BetReceipt> {
        let round = self.ledger.current_round;
        self.bet_on(participant, round, direction, amount)
    }

    /// Stakes `amount` on `direction` in `round_id`, which must be the
    /// current round.
    ///
    /// # Errors
    ///
    /// `Paused`, `InvalidAmount`, `BelowMinimum`, `CannotBet` when the round
    /// is not current or outside its betting window, `AlreadyBet`, or a
    /// custody failure.
    pub fn bet_on(
        &mut self,
        participant: &ParticipantId,
        round_id: u64,
        direction: Direction,
        amount: u64,
    ) -> MarketResult<BetReceipt> {
        let now = self.clock.now();
        if self.ledger.paused {
            return Err(MarketError::Paused);
        }
        if amount == 0 {
            return Err(MarketError::InvalidAmount);
        }
        if amount < self.config.min_bet_amount {
            return Err(MarketError::BelowMinimum {
                amount,
                minimum: self.config.min_bet_amount,
            });
        }
        if !self.ledger.genesis_started || round_id != self.ledger.current_round {
            return Err(MarketError::CannotBet(round_id));
        }

        let round = self
            .ledger
            .round(round_id)
            .ok_or(MarketError::CannotBet(round_id))?;
        if !round.is_bettable(now) {
            return Err(MarketError::CannotBet(round_id));
        }
        if round.position_of(participant).is_some() {
            return Err(MarketError::AlreadyBet {
                participant: participant.to_string(),
                round: round_id,
            });
        }
        round.pool(direction).quote_buy_in(participant, amount)?;
        self.ledger
            .vault()
            .checked_add(amount)
            .ok_or(MarketError::Overflow)?;

        self.custody.deposit(participant, amount)?;

        let shares = self
            .ledger
            .round_mut(round_id)
            .ok_or(MarketError::CannotBet(round_id))?
            .pool_mut(direction)
            .buy_in(participant, amount)?;
        self.ledger.credit_vault(amount)?;
        self.ledger.record_participation(participant, round_id);

        tracing::debug!(
            %participant,
            round = round_id,
            %direction,
            amount,
            shares,
            "bet committed"
        );
        self.events.emit(&MarketEvent::BetPlaced {
            round: round_id,
            participant: participant.clone(),
            direction,
            amount,
            shares,
        });
        Ok(BetReceipt {
            round: round_id,
            direction,
            amount,
            shares,
        })
    }

    /// Pays out every listed finalized round and returns the total paid.
    /// Claiming a round again pays nothing. Allowed while paused.
    ///
    /// # Errors
    ///
    /// `InvalidRound`, `NotFinalized`, or a custody failure; in every case
    /// nothing is paid for any of the listed rounds.
    pub fn claim(&mut self, participant: &ParticipantId, round_ids: &[u64]) -> MarketResult<u64> {
        let plan = ClaimProcessor::preview(&self.ledger, participant, round_ids)?;
        if plan.total > self.ledger.vault() {
            return Err(MarketError::Overflow);
        }

        if plan.total > 0 {
            self.custody.withdraw(participant, plan.total)?;
        }
        let paid = ClaimProcessor::apply(&mut self.ledger, &plan)?;

        tracing::debug!(%participant, rounds = ?plan.rounds(), paid, "claim processed");
        self.events.emit(&MarketEvent::Claimed {
            participant: participant.clone(),
            rounds: plan.rounds(),
            amount: paid,
        });
        Ok(paid)
    }

    // ============================================================
    // Views
    // ============================================================

    #[must_use]
    pub const fn config(&self) -> &MarketConfig {
        &self.config
    }

    #[must_use]
    pub const fn ledger(&self) -> &RoundLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn current_round(&self) -> u64 {
        self.ledger.current_round
    }

    #[must_use]
    pub fn round(&self, id: u64) -> Option<&Round> {
        self.ledger.round(id)
    }

    #[must_use]
    pub const fn vault(&self) -> u64 {
        self.ledger.vault()
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.ledger.paused
    }

    #[must_use]
    pub const fn genesis_started(&self) -> bool {
        self.ledger.genesis_started
    }

    #[must_use]
    pub const fn genesis_locked(&self) -> bool {
        self.ledger.genesis_locked
    }

    /// The clock reading operations would see right now.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    #[must_use]
    pub fn round_phase(&self, id: u64) -> Option<RoundPhase> {
        let now = self.clock.now();
        self.ledger.round(id).map(|round| round.phase(now))
    }

    /// True when the pending transition on the current round can no longer
    /// happen and the market needs an operator.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        let now = self.clock.now();
        let buffer = self.config.buffer();
        let current = self.ledger.current_round;
        [Some(current), current.checked_sub(1)]
            .into_iter()
            .flatten()
            .filter_map(|id| self.ledger.round(id))
            .any(|round| round.is_stranded(now, buffer))
    }

    /// What `claim` would pay for a single round.
    ///
    /// # Errors
    ///
    /// Same validation as `claim`.
    pub fn claimable(&self, participant: &ParticipantId, round_id: u64) -> MarketResult<u64> {
        ClaimProcessor::preview(&self.ledger, participant, &[round_id]).map(|plan| plan.total)
    }

    /// Finalized rounds where the participant still holds shares worth
    /// something.
    #[must_use]
    pub fn pending_claims(&self, participant: &ParticipantId) -> Vec<u64> {
        self.ledger
            .participant_rounds(participant)
            .iter()
            .copied()
            .filter(|&id| self.claimable(participant, id).is_ok_and(|amount| amount > 0))
            .collect()
    }

    #[must_use]
    pub fn participant_rounds(&self, participant: &ParticipantId) -> &[u64] {
        self.ledger.participant_rounds(participant)
    }

    /// Captures config and ledger for persistence.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::new(self.config.clone(), self.ledger.clone(), self.clock.now())
    }

    // ============================================================
    // Internals
    // ============================================================

    fn admin_gate(&self, caller: &ParticipantId, operation: &str) -> MarketResult<()> {
        self.authority
            .authorize(caller)
            .inspect_err(|err| self.reject(operation, err))?;
        if self.ledger.paused {
            let err = MarketError::Paused;
            self.reject(operation, &err);
            return Err(err);
        }
        Ok(())
    }

    fn staged(&self, id: u64) -> MarketResult<Round> {
        self.ledger
            .round(id)
            .cloned()
            .ok_or(MarketError::NotStarted(id))
    }

    fn sample_price(&mut self, operation: &str) -> MarketResult<Price> {
        match self.oracle.latest_price() {
            Ok(price) => Ok(price),
            Err(err) => {
                tracing::error!(operation, error = %err, "price oracle failed");
                Err(err)
            }
        }
    }

    /// The round two behind `opening` must be settled and past its end
    /// before another round may start.
    fn ensure_ended(previous: &Round, opening: u64, now: Timestamp) -> MarketResult<()> {
        if previous.finalized && now >= previous.end_time {
            Ok(())
        } else {
            Err(MarketError::PreviousRoundNotEnded {
                round: opening,
                previous: previous.id,
            })
        }
    }

    fn reject(&self, operation: &str, err: &MarketError) {
        tracing::warn!(
            operation,
            kind = ?err.kind(),
            error = %err,
            round = self.ledger.current_round,
            "transition rejected"
        );
    }

    fn emit_started(&self, id: u64) {
        if let Some(round) = self.ledger.round(id) {
            self.events.emit(&MarketEvent::RoundStarted {
                round: id,
                start_time: round.start_time,
                lock_time: round.lock_time,
                end_time: round.end_time,
            });
        }
    }

    fn emit_locked(&self, id: u64, price: Price, now: Timestamp) {
        if let Some(round) = self.ledger.round(id) {
            self.events.emit(&MarketEvent::RoundLocked {
                round: id,
                price,
                timestamp: now,
                end_time: round.end_time,
            });
        }
    }
}
