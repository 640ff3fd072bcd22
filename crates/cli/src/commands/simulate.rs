//! Offline market simulation.
//!
//! Runs genesis and a number of ticks on a hand-driven clock against a seeded
//! random-walk price feed, with simulated bettors staking random amounts on
//! random sides. Every tick is checked for solvency, and a final claim sweep
//! pays out everything owed. The same seed always produces the same run.

#![allow(clippy::format_push_string)]

use anyhow::{ensure, Context, Result};
use chrono::{Duration, TimeZone, Utc};
use clap::{Args, ValueEnum};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use updown_core::{
    AppConfig, Collaborators, Custody, Direction, FixedAdmin, InMemoryCustody, ManualClock,
    NoopSink, Outcome, ParticipantId, PredictionMarket, RandomWalkOracle, RoundReport, Settlement,
    SnapshotStore, Timestamp,
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for the simulate command.
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of ticks to run after genesis
    #[arg(long, default_value_t = 24)]
    pub rounds: u64,

    /// Number of simulated bettors
    #[arg(long, default_value_t = 5)]
    pub players: usize,

    /// Seed for prices and bets (defaults to keeper.seed from config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Starting wallet of each bettor
    #[arg(long, default_value_t = 100_000)]
    pub bankroll: u64,

    /// Probability that a bettor joins any given round (0.0 to 1.0)
    #[arg(long, default_value_t = 0.6)]
    pub participation: f64,

    /// Write the final ledger snapshot to this path
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Number of most recent rounds shown in the text report
    #[arg(long, default_value_t = 10)]
    pub show: usize,

    /// Log every market event instead of only the final report
    #[arg(long)]
    pub log_events: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerResult {
    pub participant: ParticipantId,
    pub balance: u64,
    pub pnl: i128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationSummary {
    pub seed: u64,
    pub rounds_settled: u64,
    pub bets_placed: u64,
    pub bets_rejected: u64,
    pub volume: u64,
    pub fees: u64,
    pub up_wins: u64,
    pub down_wins: u64,
    pub ties: u64,
    pub swept: u64,
    pub final_price: Decimal,
    pub treasury: u64,
    pub vault: u64,
    pub players: Vec<PlayerResult>,
}

impl SimulationSummary {
    fn record(&mut self, settlement: &Settlement) {
        self.rounds_settled += 1;
        self.fees += settlement.fee;
        if settlement.swept {
            self.swept += 1;
        }
        match settlement.outcome {
            Outcome::UpWins => self.up_wins += 1,
            Outcome::DownWins => self.down_wins += 1,
            Outcome::Tie => self.ties += 1,
        }
    }
}

pub struct Simulation {
    pub summary: SimulationSummary,
    pub market: PredictionMarket,
}

struct Bettors<'a> {
    players: &'a [ParticipantId],
    custody: &'a InMemoryCustody,
    clock: &'a ManualClock,
    rng: ChaCha8Rng,
    participation: f64,
}

impl Bettors<'_> {
    /// Places this round's random bets one second after it opens.
    fn place(
        &mut self,
        market: &mut PredictionMarket,
        summary: &mut SimulationSummary,
    ) -> Result<()> {
        let round = market.current_round();
        let start = market
            .round(round)
            .map(|r| r.start_time)
            .context("current round missing from ledger")?;
        self.clock.set(start + Duration::seconds(1));

        let minimum = market.config().min_bet_amount;
        for player in self.players {
            if !self.rng.gen_bool(self.participation) {
                continue;
            }
            let balance = self.custody.balance_of(player);
            if balance < minimum {
                continue;
            }
            let amount = self.rng.gen_range(minimum..=(balance / 10).max(minimum));
            let direction = if self.rng.gen_bool(0.5) {
                Direction::Up
            } else {
                Direction::Down
            };

            match market.bet(player, direction, amount) {
                Ok(_) => {
                    summary.bets_placed += 1;
                    summary.volume += amount;
                }
                Err(e) => {
                    summary.bets_rejected += 1;
                    tracing::debug!(%player, round, error = %e, "simulated bet rejected");
                }
            }
        }
        Ok(())
    }
}

fn lock_deadline(market: &PredictionMarket) -> Result<Timestamp> {
    market
        .round(market.current_round())
        .map(|round| round.lock_time)
        .context("current round missing from ledger")
}

/// Runs a whole simulation and returns the settled market.
///
/// # Errors
/// Returns an error if the arguments are out of range, any admin transition
/// fails, or the vault ever stops matching what the pools owe.
pub fn simulate(args: &SimulateArgs, config: &AppConfig) -> Result<Simulation> {
    ensure!(
        (0.0..=1.0).contains(&args.participation),
        "participation must be between 0 and 1, got {}",
        args.participation
    );

    let seed = args.seed.unwrap_or(config.keeper.seed);
    let admin = config.keeper.admin.clone();
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .context("invalid simulation start time")?;

    let clock = ManualClock::new(start);
    let custody = InMemoryCustody::new();
    let players: Vec<ParticipantId> = (0..args.players)
        .map(|i| ParticipantId::new(format!("player-{i}")))
        .collect();
    for player in &players {
        custody.credit(player, args.bankroll);
    }

    let oracle = RandomWalkOracle::new(
        config.keeper.start_price,
        config.keeper.volatility_bps,
        seed,
    );
    let mut collaborators = Collaborators::new(
        FixedAdmin::new(admin.clone()),
        custody.clone(),
        oracle,
        clock.clone(),
    );
    if !args.log_events {
        collaborators = collaborators.with_events(NoopSink);
    }
    let mut market = PredictionMarket::initialize(config.market.clone(), collaborators)?;

    let mut summary = SimulationSummary {
        seed,
        final_price: config.keeper.start_price,
        ..SimulationSummary::default()
    };
    let mut bettors = Bettors {
        players: &players,
        custody: &custody,
        clock: &clock,
        rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(1)),
        participation: args.participation,
    };

    market.genesis_start(&admin)?;
    bettors.place(&mut market, &mut summary)?;
    clock.set(lock_deadline(&market)?);
    market.genesis_lock(&admin)?;

    for _ in 0..args.rounds {
        bettors.place(&mut market, &mut summary)?;
        clock.set(lock_deadline(&market)?);
        let report = market.tick(&admin)?;
        summary.record(&report.settlement);
        summary.final_price = report.price;

        ensure!(
            market.ledger().is_solvent(),
            "vault {} does not match outstanding value {} after settling round {}",
            market.vault(),
            market.ledger().outstanding_value(),
            report.settlement.round_id
        );
    }

    for player in &players {
        let pending = market.pending_claims(player);
        if !pending.is_empty() {
            market.claim(player, &pending)?;
        }
    }
    ensure!(
        custody.vault_balance() == market.vault(),
        "custody holds {} but ledger vault is {}",
        custody.vault_balance(),
        market.vault()
    );

    summary.treasury = custody.balance_of(&market.config().fee_recipient);
    summary.vault = market.vault();
    summary.players = players
        .iter()
        .map(|player| {
            let balance = custody.balance_of(player);
            PlayerResult {
                participant: player.clone(),
                balance,
                pnl: i128::from(balance) - i128::from(args.bankroll),
            }
        })
        .collect();

    Ok(Simulation { summary, market })
}

fn format_summary(summary: &SimulationSummary) -> String {
    let mut output = String::new();
    output.push_str("Simulation\n");
    output.push_str("───────────────────────────────────────────────────────────────\n");
    output.push_str(&format!("Seed:                  {}\n", summary.seed));
    output.push_str(&format!("Rounds Settled:        {}\n", summary.rounds_settled));
    output.push_str(&format!(
        "Outcomes:              up={} down={} tie={} swept={}\n",
        summary.up_wins, summary.down_wins, summary.ties, summary.swept
    ));
    output.push_str(&format!(
        "Bets:                  {} placed, {} rejected\n",
        summary.bets_placed, summary.bets_rejected
    ));
    output.push_str(&format!("Volume:                {}\n", summary.volume));
    output.push_str(&format!("Fees:                  {}\n", summary.fees));
    output.push_str(&format!("Final Price:           {}\n", summary.final_price));
    output.push_str(&format!("Unclaimed Vault:       {}\n", summary.vault));
    output.push('\n');

    output.push_str("Players\n");
    output.push_str("───────────────────────────────────────────────────────────────\n");
    for player in &summary.players {
        output.push_str(&format!(
            "{:<20} {:>14} {:>+14}\n",
            player.participant.as_str(),
            player.balance,
            player.pnl
        ));
    }
    output
}

/// Runs the simulate command.
///
/// # Errors
/// Returns an error if the simulation fails or the snapshot cannot be written.
pub fn run_simulate(args: &SimulateArgs, config: &AppConfig) -> Result<()> {
    tracing::info!(
        rounds = args.rounds,
        players = args.players,
        round_duration_secs = config.market.round_duration_secs,
        "starting simulation"
    );
    let simulation = simulate(args, config)?;

    match args.format {
        OutputFormat::Text => {
            print!(
                "{}",
                RoundReport::format(
                    simulation.market.ledger(),
                    simulation.market.now(),
                    args.show
                )
            );
            println!();
            print!("{}", format_summary(&simulation.summary));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&simulation.summary)?);
        }
    }

    if let Some(path) = &args.snapshot {
        SnapshotStore::new(path).save(&simulation.market.snapshot())?;
        tracing::info!(path = %path.display(), "snapshot written");
    }

    Ok(())
}
