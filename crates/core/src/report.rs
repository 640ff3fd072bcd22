#![allow(clippy::format_push_string)]

use crate::ledger::RoundLedger;
use crate::round::Round;
use crate::types::{Price, Timestamp};

const RULE: &str = "═══════════════════════════════════════════════════════════════\n";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────\n";

pub struct RoundReport;

impl RoundReport {
    /// Renders the market state and the most recent `limit` rounds.
    #[must_use]
    pub fn format(ledger: &RoundLedger, now: Timestamp, limit: usize) -> String {
        let mut output = String::new();

        output.push('\n');
        output.push_str(RULE);
        output.push_str("                       MARKET STATE                            \n");
        output.push_str(RULE);
        output.push('\n');

        output.push_str("Market\n");
        output.push_str(THIN_RULE);
        output.push_str(&format!(
            "As Of:                 {}\n",
            now.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(&format!("Current Round:         {}\n", ledger.current_round));
        output.push_str(&format!(
            "Genesis:               started={} locked={}\n",
            ledger.genesis_started, ledger.genesis_locked
        ));
        output.push_str(&format!("Paused:                {}\n", ledger.paused));
        output.push_str(&format!("Vault:                 {}\n", ledger.vault()));
        output.push_str(&format!(
            "Solvent:               {}\n",
            if ledger.is_solvent() { "yes" } else { "NO" }
        ));
        output.push('\n');

        output.push_str("Rounds\n");
        output.push_str(THIN_RULE);
        output.push_str(&format!(
            "{:>6}  {:<20}  {:>12}  {:>12}  {:>10}  {:>10}  {:>8}\n",
            "Round", "Phase", "Lock", "End", "Up", "Down", "Fee"
        ));

        let rounds = ledger.rounds();
        let skip = rounds.len().saturating_sub(limit);
        for round in &rounds[skip..] {
            output.push_str(&Self::format_round(round, now));
        }
        if rounds.is_empty() {
            output.push_str("(no rounds)\n");
        }

        output.push('\n');
        output.push_str(RULE);
        output
    }

    fn format_round(round: &Round, now: Timestamp) -> String {
        let phase = match round.outcome {
            Some(outcome) => format!("{} ({outcome})", round.phase(now)),
            None => round.phase(now).to_string(),
        };
        format!(
            "{:>6}  {:<20}  {:>12}  {:>12}  {:>10}  {:>10}  {:>8}\n",
            round.id,
            phase,
            display_price(round.lock_price),
            display_price(round.end_price),
            round.up_pool.total_value(),
            round.down_pool.total_value(),
            round.fee
        )
    }
}

fn display_price(price: Option<Price>) -> String {
    price.map_or_else(|| "-".to_string(), |p| p.to_string())
}
