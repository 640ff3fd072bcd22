//! Snapshot inspection CLI command.
//!
//! Loads a ledger snapshot written by `simulate --snapshot` or the keeper and
//! prints the market report, optionally with what one participant can claim.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use std::path::PathBuf;
use updown_core::{ClaimProcessor, LedgerSnapshot, ParticipantId, RoundReport, SnapshotStore};

/// Arguments for the inspect command.
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Snapshot file to read
    #[arg(long, env = "UPDOWN_SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Show the rounds this participant has bet in and what each would pay
    #[arg(long)]
    pub participant: Option<String>,

    /// Number of most recent rounds to show
    #[arg(long, default_value_t = 20)]
    pub rounds: usize,
}

/// Per-round claim lines for one participant.
fn format_claims(snapshot: &LedgerSnapshot, participant: &ParticipantId) -> String {
    let ledger = &snapshot.ledger;
    let mut lines = vec![format!("Claims for {participant}")];

    let rounds = ledger.participant_rounds(participant);
    if rounds.is_empty() {
        lines.push("  (no bets)".to_string());
    }
    for &id in rounds {
        let line = match ClaimProcessor::preview(ledger, participant, &[id]) {
            Ok(plan) => format!("  round {id:>6}: {}", plan.total),
            Err(e) => format!("  round {id:>6}: {e}"),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// Runs the inspect command.
///
/// # Errors
/// Returns an error if the snapshot is missing or cannot be parsed.
pub fn run_inspect(args: &InspectArgs) -> Result<()> {
    let snapshot = SnapshotStore::new(&args.snapshot)
        .load()?
        .with_context(|| format!("no snapshot at {}", args.snapshot.display()))?;

    println!("Snapshot saved at {}", snapshot.saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
    print!(
        "{}",
        RoundReport::format(&snapshot.ledger, Utc::now(), args.rounds)
    );

    if let Some(participant) = &args.participant {
        println!();
        println!("{}", format_claims(&snapshot, &ParticipantId::new(participant.as_str())));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::simulate::{simulate, OutputFormat, SimulateArgs};
    use tempfile::TempDir;
    use updown_core::AppConfig;

    #[test]
    fn inspects_simulated_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let sim_args = SimulateArgs {
            rounds: 4,
            players: 2,
            seed: Some(5),
            bankroll: 10_000,
            participation: 1.0,
            snapshot: None,
            format: OutputFormat::Text,
            show: 4,
            log_events: false,
        };
        let sim = simulate(&sim_args, &AppConfig::default()).unwrap();
        SnapshotStore::new(&path).save(&sim.market.snapshot()).unwrap();

        let args = InspectArgs {
            snapshot: path.clone(),
            participant: Some("player-0".to_string()),
            rounds: 3,
        };
        assert!(run_inspect(&args).is_ok());

        let snapshot = SnapshotStore::new(&path).load().unwrap().unwrap();
        let claims = format_claims(&snapshot, &"player-0".into());
        assert!(claims.starts_with("Claims for player-0"));
        assert!(claims.contains("round      0"));
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let args = InspectArgs {
            snapshot: dir.path().join("absent.json"),
            participant: None,
            rounds: 5,
        };
        assert!(run_inspect(&args).is_err());
    }
}
