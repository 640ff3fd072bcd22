//! End-to-end round lifecycle tests.
//!
//! These drive a [`PredictionMarket`] through genesis, betting, ticks and
//! claims on a hand-driven clock, checking:
//! - settlement and payout arithmetic for up, down, tie and unbacked outcomes
//! - timing windows and their buffer edges
//! - that every rejected operation leaves ledger, custody and events untouched
//! - that the vault always matches what the pools still owe

use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::TempDir;
use updown_core::{
    BetReceipt, CapabilityRegistry, Collaborators, Custody, CustodyError, Direction, ErrorKind,
    FixedAdmin, InMemoryCustody, ManualClock, MarketConfig, MarketError, MarketResult, Outcome,
    ParticipantId, PredictionMarket, RecordingSink, RoundPhase, ScriptedOracle, SnapshotStore,
    Timestamp,
};

const D: i64 = 300;
const BUFFER: i64 = 30;

// =============================================================================
// Helper Functions
// =============================================================================

/// Custody that can be told to refuse withdrawals.
#[derive(Clone, Default)]
struct FlakyCustody {
    inner: InMemoryCustody,
    refuse_withdrawals: Arc<Mutex<bool>>,
}

impl Custody for FlakyCustody {
    fn deposit(&mut self, from: &ParticipantId, amount: u64) -> Result<(), CustodyError> {
        self.inner.deposit(from, amount)
    }

    fn withdraw(&mut self, to: &ParticipantId, amount: u64) -> Result<(), CustodyError> {
        if *self.refuse_withdrawals.lock() {
            return Err(CustodyError::InsufficientVault {
                available: 0,
                required: amount,
            });
        }
        self.inner.withdraw(to, amount)
    }

    fn vault_balance(&self) -> u64 {
        self.inner.vault_balance()
    }
}

struct Fixture {
    market: PredictionMarket,
    clock: ManualClock,
    custody: FlakyCustody,
    oracle: ScriptedOracle,
    events: RecordingSink,
    t0: Timestamp,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(MarketConfig::five_minute())
    }

    fn with_config(config: MarketConfig) -> Self {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(t0);
        let custody = FlakyCustody::default();
        let oracle = ScriptedOracle::default();
        let events = RecordingSink::new();
        let collaborators = Collaborators::new(
            FixedAdmin::new("admin"),
            custody.clone(),
            oracle.clone(),
            clock.clone(),
        )
        .with_events(events.clone());
        let market = PredictionMarket::initialize(config, collaborators).unwrap();

        Self {
            market,
            clock,
            custody,
            oracle,
            events,
            t0,
        }
    }

    /// Moves the clock to `secs` after genesis start.
    fn at(&self, secs: i64) {
        self.clock.set(self.t0 + Duration::seconds(secs));
    }

    fn fund(&self, who: &str, amount: u64) {
        self.custody.inner.credit(&who.into(), amount);
    }

    fn wallet(&self, who: &str) -> u64 {
        self.custody.inner.balance_of(&who.into())
    }

    fn bet(&mut self, who: &str, direction: Direction, amount: u64) -> MarketResult<BetReceipt> {
        self.market.bet(&who.into(), direction, amount)
    }

    fn claim(&mut self, who: &str, rounds: &[u64]) -> MarketResult<u64> {
        self.market.claim(&who.into(), rounds)
    }

    fn genesis_start(&mut self) {
        self.at(0);
        self.market.genesis_start(&admin()).unwrap();
    }

    fn genesis_lock(&mut self, price: Decimal) {
        self.at(D);
        self.oracle.push(price);
        self.market.genesis_lock(&admin()).unwrap();
    }

    /// Ticks at `secs` with `price`.
    fn tick_at(&mut self, secs: i64, price: Decimal) -> MarketResult<updown_core::TickReport> {
        self.at(secs);
        self.oracle.push(price);
        self.market.tick(&admin())
    }

    fn assert_solvent(&self) {
        assert!(self.market.ledger().is_solvent());
        assert_eq!(self.custody.vault_balance(), self.market.vault());
    }
}

fn admin() -> ParticipantId {
    ParticipantId::new("admin")
}

/// Round 0 with alice 10_000 up and bob 15_000 down, locked at `lock`.
fn staked_genesis(lock: Decimal) -> Fixture {
    let mut f = Fixture::new();
    f.fund("alice", 10_000);
    f.fund("bob", 15_000);
    f.genesis_start();
    f.at(1);
    f.bet("alice", Direction::Up, 10_000).unwrap();
    f.bet("bob", Direction::Down, 15_000).unwrap();
    f.genesis_lock(lock);
    f
}

// =============================================================================
// Settlement outcomes
// =============================================================================

#[test]
fn up_win_pays_winner_whole_pool_minus_fee() {
    let mut f = staked_genesis(dec!(1));
    f.assert_solvent();

    let report = f.tick_at(2 * D, dec!(2)).unwrap();
    assert_eq!(report.locked, 1);
    assert_eq!(report.opened, 2);
    assert_eq!(report.settlement.outcome, Outcome::UpWins);
    assert_eq!(report.settlement.fee, 12);
    assert_eq!(report.settlement.reward_pool, 24_988);

    let round = f.market.round(0).unwrap();
    assert!(round.finalized);
    assert_eq!(round.up_pool.total_value(), 24_988);
    assert_eq!(round.down_pool.total_value(), 0);
    assert_eq!(f.wallet("treasury"), 12);
    f.assert_solvent();

    assert_eq!(f.claim("alice", &[0]).unwrap(), 24_988);
    assert_eq!(f.claim("bob", &[0]).unwrap(), 0);
    assert_eq!(f.wallet("alice"), 24_988);
    assert_eq!(f.wallet("bob"), 0);
    assert_eq!(f.market.vault(), 0);
    f.assert_solvent();
}

#[test]
fn down_win_pays_down_side() {
    let mut f = staked_genesis(dec!(2));
    let report = f.tick_at(2 * D, dec!(1)).unwrap();
    assert_eq!(report.settlement.outcome, Outcome::DownWins);

    assert_eq!(f.claim("bob", &[0]).unwrap(), 24_988);
    assert_eq!(f.claim("alice", &[0]).unwrap(), 0);
    f.assert_solvent();
}

#[test]
fn tie_refunds_every_stake_without_fee() {
    let mut f = staked_genesis(dec!(5));
    let report = f.tick_at(2 * D, dec!(5)).unwrap();
    assert_eq!(report.settlement.outcome, Outcome::Tie);
    assert_eq!(report.settlement.fee, 0);

    assert_eq!(f.claim("alice", &[0]).unwrap(), 10_000);
    assert_eq!(f.claim("bob", &[0]).unwrap(), 15_000);
    assert_eq!(f.wallet("treasury"), 0);
    f.assert_solvent();
}

#[test]
fn unbacked_winning_side_is_swept_to_fee_recipient() {
    let mut f = Fixture::new();
    f.fund("alice", 10_000);
    f.genesis_start();
    f.at(1);
    f.bet("alice", Direction::Up, 10_000).unwrap();
    f.genesis_lock(dec!(3));

    let report = f.tick_at(2 * D, dec!(2)).unwrap();
    assert!(report.settlement.swept);
    assert_eq!(f.wallet("treasury"), 10_000);
    assert_eq!(f.claim("alice", &[0]).unwrap(), 0);
    f.assert_solvent();
}

#[test]
fn later_stakes_split_reward_proportionally() {
    let mut f = Fixture::new();
    for (who, amount) in [("alice", 1_000), ("carol", 3_000), ("bob", 4_000)] {
        f.fund(who, amount);
    }
    f.genesis_start();
    f.at(1);
    f.bet("alice", Direction::Up, 1_000).unwrap();
    f.bet("carol", Direction::Up, 3_000).unwrap();
    f.bet("bob", Direction::Down, 4_000).unwrap();
    f.genesis_lock(dec!(10));
    f.tick_at(2 * D, dec!(11)).unwrap();

    // total 8_000, fee 4, reward 7_996 over 4_000 up shares
    assert_eq!(f.claim("alice", &[0]).unwrap(), 1_999);
    assert_eq!(f.claim("carol", &[0]).unwrap(), 5_997);
    f.assert_solvent();
}

// =============================================================================
// Timing windows
// =============================================================================

#[test]
fn betting_window_excludes_both_ends() {
    let mut f = Fixture::new();
    f.fund("alice", 100);
    f.genesis_start();

    assert_eq!(
        f.bet("alice", Direction::Up, 10),
        Err(MarketError::CannotBet(0))
    );
    f.at(D);
    assert_eq!(
        f.bet("alice", Direction::Up, 10),
        Err(MarketError::CannotBet(0))
    );
    f.at(D - 1);
    assert!(f.bet("alice", Direction::Up, 10).is_ok());
}

#[test]
fn genesis_lock_window_honours_buffer() {
    let mut f = Fixture::new();
    f.genesis_start();
    f.oracle.push(dec!(1));

    f.at(D - 1);
    let early = f.market.genesis_lock(&admin()).unwrap_err();
    assert_eq!(early.kind(), ErrorKind::Timing);
    assert!(matches!(early, MarketError::TooEarly { .. }));

    f.at(D + BUFFER + 1);
    assert!(matches!(
        f.market.genesis_lock(&admin()),
        Err(MarketError::TooLate { .. })
    ));

    f.at(D + BUFFER);
    assert_eq!(f.market.genesis_lock(&admin()).unwrap(), 1);
}

#[test]
fn tick_accepted_at_buffer_edge() {
    let mut f = staked_genesis(dec!(1));
    assert!(f.tick_at(2 * D + BUFFER, dec!(2)).is_ok());
    // the new round opens at the actual tick instant
    let opened = f.market.round(2).unwrap();
    assert_eq!(
        opened.lock_time,
        f.t0 + Duration::seconds(2 * D + BUFFER + D)
    );
}

#[test]
fn late_tick_mutates_nothing() {
    let mut f = staked_genesis(dec!(1));
    let before = f.market.ledger().clone();
    let events = f.events.events().len();

    let err = f.tick_at(2 * D + BUFFER + 1, dec!(2)).unwrap_err();
    assert!(matches!(err, MarketError::TooLate { .. }));
    assert_eq!(f.market.ledger(), &before);
    assert_eq!(f.events.events().len(), events);
    assert_eq!(f.oracle.remaining(), 1);
    assert!(f.market.is_stalled());
}

#[test]
fn early_tick_mutates_nothing() {
    let mut f = staked_genesis(dec!(1));
    let before = f.market.ledger().clone();

    assert!(matches!(
        f.tick_at(2 * D - 1, dec!(2)),
        Err(MarketError::TooEarly { .. })
    ));
    assert_eq!(f.market.ledger(), &before);
}

// =============================================================================
// Atomicity
// =============================================================================

#[test]
fn oracle_failure_aborts_tick() {
    let mut f = staked_genesis(dec!(1));
    let before = f.market.ledger().clone();
    f.at(2 * D);

    assert!(matches!(
        f.market.tick(&admin()),
        Err(MarketError::Oracle(_))
    ));
    assert_eq!(f.market.ledger(), &before);

    f.oracle.push(dec!(2));
    assert!(f.market.tick(&admin()).is_ok());
}

#[test]
fn refused_fee_transfer_aborts_tick() {
    let mut f = staked_genesis(dec!(1));
    let before = f.market.ledger().clone();
    *f.custody.refuse_withdrawals.lock() = true;

    let err = f.tick_at(2 * D, dec!(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Custody);
    assert_eq!(f.market.ledger(), &before);
    assert_eq!(f.wallet("treasury"), 0);
    f.assert_solvent();
}

#[test]
fn refused_payout_keeps_shares() {
    let mut f = staked_genesis(dec!(1));
    f.tick_at(2 * D, dec!(2)).unwrap();
    *f.custody.refuse_withdrawals.lock() = true;

    assert!(f.claim("alice", &[0]).is_err());
    assert_eq!(f.market.claimable(&"alice".into(), 0), Ok(24_988));

    *f.custody.refuse_withdrawals.lock() = false;
    assert_eq!(f.claim("alice", &[0]).unwrap(), 24_988);
}

// =============================================================================
// Bets and claims
// =============================================================================

#[test]
fn one_position_per_round() {
    let mut f = Fixture::new();
    f.fund("alice", 100);
    f.genesis_start();
    f.at(1);
    f.bet("alice", Direction::Up, 10).unwrap();

    for direction in [Direction::Up, Direction::Down] {
        let err = f.bet("alice", direction, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateAction);
    }
    assert_eq!(f.wallet("alice"), 90);
}

#[test]
fn stake_limits_enforced() {
    let mut f = Fixture::with_config(MarketConfig {
        min_bet_amount: 100,
        ..MarketConfig::five_minute()
    });
    f.fund("alice", 1_000);
    f.genesis_start();
    f.at(1);

    assert_eq!(
        f.bet("alice", Direction::Up, 0),
        Err(MarketError::InvalidAmount)
    );
    assert_eq!(
        f.bet("alice", Direction::Up, 99),
        Err(MarketError::BelowMinimum {
            amount: 99,
            minimum: 100
        })
    );
    assert!(f.bet("alice", Direction::Up, 100).is_ok());
}

#[test]
fn claim_requires_finalized_past_round() {
    let mut f = staked_genesis(dec!(1));
    f.fund("carol", 500);
    f.at(D + 1);
    f.bet("carol", Direction::Down, 500).unwrap();

    // round 1 is the current round
    assert_eq!(
        f.claim("carol", &[1]),
        Err(MarketError::InvalidRound {
            round: 1,
            current: 1
        })
    );

    f.tick_at(2 * D, dec!(2)).unwrap();
    // round 1 is locked but not settled; round 0 must not pay either
    assert_eq!(
        f.claim("alice", &[0, 1]),
        Err(MarketError::NotFinalized(1))
    );
    assert_eq!(f.wallet("alice"), 0);

    assert_eq!(f.claim("alice", &[0, 0]).unwrap(), 24_988);
    assert_eq!(f.claim("alice", &[0]).unwrap(), 0);
}

#[test]
fn pending_claims_track_unclaimed_wins() {
    let mut f = staked_genesis(dec!(1));
    f.tick_at(2 * D, dec!(2)).unwrap();

    assert_eq!(f.market.pending_claims(&"alice".into()), vec![0]);
    assert!(f.market.pending_claims(&"bob".into()).is_empty());
    assert_eq!(f.market.participant_rounds(&"bob".into()), &[0]);

    f.claim("alice", &[0]).unwrap();
    assert!(f.market.pending_claims(&"alice".into()).is_empty());
}

#[test]
fn many_rounds_stay_solvent() {
    let mut f = Fixture::new();
    let players = ["alice", "bob", "carol", "dave"];
    for who in players {
        f.fund(who, 1_000_000);
    }
    f.genesis_start();
    f.at(1);
    f.bet("alice", Direction::Up, 700).unwrap();
    f.genesis_lock(dec!(100));

    let prices = [dec!(101), dec!(99), dec!(99), dec!(104), dec!(90), dec!(95)];
    let mut now = D;
    for (step, price) in prices.into_iter().enumerate() {
        f.at(now + 1);
        for (i, who) in players.iter().enumerate() {
            let direction = if (i + step) % 2 == 0 {
                Direction::Up
            } else {
                Direction::Down
            };
            let amount = 100 * (i as u64 + 1) + step as u64 * 37;
            f.bet(who, direction, amount).unwrap();
        }
        now += D;
        f.tick_at(now, price).unwrap();
        f.assert_solvent();
    }

    let settled: Vec<u64> = (0..f.market.current_round() - 1).collect();
    for who in players {
        f.claim(who, &settled).unwrap();
        f.assert_solvent();
    }

    // everything staked is either paid out, charged as fee, or still in
    // the two unsettled rounds
    let wallets: u64 = players.iter().map(|who| f.wallet(who)).sum();
    let outstanding = u64::try_from(f.market.ledger().outstanding_value()).unwrap();
    let dust: u64 = settled
        .iter()
        .filter_map(|&id| f.market.round(id))
        .map(|round| round.total_value())
        .sum();
    assert_eq!(
        wallets + f.wallet("treasury") + outstanding,
        4 * 1_000_000
    );
    assert!(dust <= outstanding);
}

// =============================================================================
// Administration
// =============================================================================

#[test]
fn only_admin_drives_rounds() {
    let mut f = staked_genesis(dec!(1));
    f.at(2 * D);
    f.oracle.push(dec!(2));

    let err = f.market.tick(&"alice".into()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(f.market.current_round(), 1);
}

#[test]
fn transferred_capability_moves_admin_rights() {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let clock = ManualClock::new(t0);
    let oracle = ScriptedOracle::default();
    let registry = CapabilityRegistry::new();
    let cap = registry.issue("operator");
    let collaborators = Collaborators::new(
        registry.clone(),
        InMemoryCustody::new(),
        oracle.clone(),
        clock.clone(),
    );
    let mut market = PredictionMarket::initialize(MarketConfig::five_minute(), collaborators)
        .unwrap();

    assert_eq!(
        market.genesis_start(&admin()).unwrap_err().kind(),
        ErrorKind::Authorization
    );
    market.genesis_start(&"operator".into()).unwrap();

    registry.transfer(cap, &"operator".into(), "successor").unwrap();
    clock.set(t0 + Duration::seconds(D));
    oracle.push(dec!(100));
    assert_eq!(
        market.genesis_lock(&"operator".into()).unwrap_err().kind(),
        ErrorKind::Authorization
    );
    assert!(!market.genesis_locked());
    assert_eq!(market.genesis_lock(&"successor".into()).unwrap(), 1);

    clock.set(t0 + Duration::seconds(2 * D));
    oracle.push(dec!(101));
    assert!(market.tick(&"operator".into()).is_err());
    assert!(market.tick(&"successor".into()).is_ok());
    assert_eq!(market.current_round(), 2);
}

#[test]
fn pause_freezes_rounds_but_not_claims() {
    let mut f = staked_genesis(dec!(1));
    f.tick_at(2 * D, dec!(2)).unwrap();
    f.market.pause(&admin()).unwrap();

    assert_eq!(f.tick_at(3 * D, dec!(3)), Err(MarketError::Paused));
    assert_eq!(
        f.bet("alice", Direction::Up, 1),
        Err(MarketError::Paused)
    );
    assert_eq!(f.claim("alice", &[0]).unwrap(), 24_988);

    f.market.unpause(&admin()).unwrap();
    assert!(f.market.tick(&admin()).is_ok());
}

#[test]
fn events_follow_commit_order() {
    let mut f = staked_genesis(dec!(1));
    f.events.clear();
    f.tick_at(2 * D, dec!(2)).unwrap();

    assert_eq!(
        f.events.names(),
        vec![
            "round_locked",
            "round_ended",
            "rewards_calculated",
            "round_started"
        ]
    );
    assert_eq!(f.market.round_phase(1), Some(RoundPhase::Locked));
    assert_eq!(f.market.round_phase(2), Some(RoundPhase::Open));
}

#[test]
fn snapshot_restores_claimable_state() {
    let mut f = staked_genesis(dec!(1));
    f.tick_at(2 * D, dec!(2)).unwrap();

    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path().join("ledger.json"));
    store.save(&f.market.snapshot()).unwrap();
    let snapshot = store.load().unwrap().unwrap();

    let collaborators = Collaborators::new(
        FixedAdmin::new("admin"),
        f.custody.clone(),
        f.oracle.clone(),
        f.clock.clone(),
    );
    let mut restored = PredictionMarket::restore(snapshot, collaborators).unwrap();
    assert_eq!(restored.current_round(), 2);
    assert_eq!(restored.claim(&"alice".into(), &[0]).unwrap(), 24_988);
    assert_eq!(f.wallet("alice"), 24_988);
}

#[test]
fn restore_rejects_custody_that_does_not_hold_the_vault() {
    let mut f = staked_genesis(dec!(1));
    f.tick_at(2 * D, dec!(2)).unwrap();
    let snapshot = f.market.snapshot();
    assert_eq!(snapshot.ledger.vault(), 24_988);

    let empty = Collaborators::new(
        FixedAdmin::new("admin"),
        InMemoryCustody::new(),
        f.oracle.clone(),
        f.clock.clone(),
    );
    assert!(matches!(
        PredictionMarket::restore(snapshot.clone(), empty),
        Err(MarketError::InvalidConfig(_))
    ));

    let custody = InMemoryCustody::with_vault(24_988);
    let seeded = Collaborators::new(
        FixedAdmin::new("admin"),
        custody.clone(),
        f.oracle.clone(),
        f.clock.clone(),
    );
    let mut restored = PredictionMarket::restore(snapshot, seeded).unwrap();
    assert_eq!(restored.claim(&"alice".into(), &[0]).unwrap(), 24_988);
    assert_eq!(custody.balance_of(&"alice".into()), 24_988);
    assert_eq!(custody.vault_balance(), restored.vault());
}
