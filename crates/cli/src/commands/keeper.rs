//! Live keeper loop.
//!
//! Drives a market on the wall clock: genesis start, genesis lock one round
//! later, then one tick per round. The loop sleeps until the pending deadline,
//! waking at least every `keeper.tick_interval_secs` to re-check, and stops as
//! soon as a transition fails for any reason other than being early. A missed
//! window is never retried blindly; it needs an operator.

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use updown_core::{
    AppConfig, Collaborators, FixedAdmin, InMemoryCustody, MarketError, ParticipantId,
    PredictionMarket, RandomWalkOracle, SnapshotStore, SystemClock, Timestamp,
};

/// Arguments for the keeper command.
#[derive(Args, Debug, Clone)]
pub struct KeeperArgs {
    /// Stop after this many ticks (runs until Ctrl-C if omitted)
    #[arg(long)]
    pub max_rounds: Option<u64>,

    /// Snapshot file to resume from and to persist after every transition
    #[arg(long, env = "UPDOWN_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,
}

/// Next transition the keeper owes the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    GenesisStart,
    GenesisLock(Timestamp),
    Tick(Timestamp),
}

impl Pending {
    fn of(market: &PredictionMarket) -> Result<Self> {
        if !market.genesis_started() {
            return Ok(Self::GenesisStart);
        }
        let Some(round) = market.round(market.current_round()) else {
            bail!("current round {} missing from ledger", market.current_round());
        };
        if market.genesis_locked() {
            Ok(Self::Tick(round.lock_time))
        } else {
            Ok(Self::GenesisLock(round.lock_time))
        }
    }

    fn deadline(self) -> Option<Timestamp> {
        match self {
            Self::GenesisStart => None,
            Self::GenesisLock(at) | Self::Tick(at) => Some(at),
        }
    }
}

fn open_market(args: &KeeperArgs, config: &AppConfig) -> Result<PredictionMarket> {
    let snapshot = match &args.snapshot {
        Some(path) => SnapshotStore::new(path).load()?,
        None => None,
    };
    // custody is in-memory, so a resumed market starts with the vault it saved
    let custody = snapshot
        .as_ref()
        .map_or_else(InMemoryCustody::new, |s| InMemoryCustody::with_vault(s.ledger.vault()));

    let collaborators = Collaborators::new(
        FixedAdmin::new(config.keeper.admin.clone()),
        custody,
        RandomWalkOracle::new(
            config.keeper.start_price,
            config.keeper.volatility_bps,
            config.keeper.seed,
        ),
        SystemClock,
    );

    let market = match snapshot {
        Some(snapshot) => {
            tracing::info!(
                round = snapshot.ledger.current_round,
                vault = snapshot.ledger.vault(),
                "resuming from snapshot"
            );
            PredictionMarket::restore(snapshot, collaborators)?
        }
        None => PredictionMarket::initialize(config.market.clone(), collaborators)?,
    };
    Ok(market)
}

/// Performs the pending transition. `Ok(false)` means it was too early and
/// should be retried after the next wait.
fn drive(market: &mut PredictionMarket, admin: &ParticipantId, pending: Pending) -> Result<bool> {
    let result = match pending {
        Pending::GenesisStart => market.genesis_start(admin).map(|_| ()),
        Pending::GenesisLock(_) => market.genesis_lock(admin).map(|_| ()),
        Pending::Tick(_) => market.tick(admin).map(|report| {
            tracing::info!(
                settled = report.settlement.round_id,
                outcome = %report.settlement.outcome,
                fee = report.settlement.fee,
                opened = report.opened,
                "round settled"
            );
        }),
    };

    match result {
        Ok(()) => Ok(true),
        Err(MarketError::TooEarly { .. }) => Ok(false),
        Err(e) if e.is_timing() => {
            tracing::error!(error = %e, "transition window missed; operator intervention required");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Runs the keeper until Ctrl-C, `--max-rounds`, or a failed transition.
///
/// # Errors
/// Returns an error if the market cannot be opened, a transition fails, or a
/// snapshot cannot be written.
pub async fn run_keeper(args: &KeeperArgs, config: AppConfig) -> Result<()> {
    let mut market = open_market(args, &config)?;
    let admin = config.keeper.admin.clone();
    let poll = config.keeper.tick_interval(&config.market);
    let store = args.snapshot.as_ref().map(SnapshotStore::new);
    let mut ticks = 0_u64;

    tracing::info!(
        admin = %admin,
        round_duration_secs = config.market.round_duration_secs,
        poll_secs = poll.as_secs(),
        "keeper started"
    );

    loop {
        if args.max_rounds.is_some_and(|max| ticks >= max) {
            tracing::info!(ticks, "tick limit reached");
            break;
        }
        if market.is_stalled() {
            bail!(
                "round {} missed its transition window; operator intervention required",
                market.current_round()
            );
        }

        let pending = Pending::of(&market)?;
        if let Some(deadline) = pending.deadline() {
            let remaining = (deadline - market.now()).to_std().unwrap_or_default();
            if !remaining.is_zero() {
                let wait = remaining.min(poll);
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("shutdown requested");
                        break;
                    }
                }
                continue;
            }
        }

        if drive(&mut market, &admin, pending)? {
            if matches!(pending, Pending::Tick(_)) {
                ticks += 1;
            }
            if let Some(store) = &store {
                store.save(&market.snapshot())?;
            }
        }
    }

    Ok(())
}
