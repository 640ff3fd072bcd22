//! Saving and resuming a market's ledger across restarts.
//!
//! A snapshot holds the market config and the full [`RoundLedger`]. It is
//! written as pretty JSON. Collaborators are not persisted; they are wired
//! again on [`PredictionMarket::restore`](crate::market::PredictionMarket::restore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::MarketConfig;
use crate::ledger::RoundLedger;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub saved_at: DateTime<Utc>,
    pub config: MarketConfig,
    pub ledger: RoundLedger,
}

impl LedgerSnapshot {
    #[must_use]
    pub const fn new(config: MarketConfig, ledger: RoundLedger, saved_at: DateTime<Utc>) -> Self {
        Self {
            saved_at,
            config,
            ledger,
        }
    }
}

/// Reads and writes snapshots at one path.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the snapshot, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(&self.path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), snapshot)?;

        debug!(
            path = %self.path.display(),
            current_round = snapshot.ledger.current_round,
            vault = snapshot.ledger.vault(),
            "saved ledger snapshot"
        );
        Ok(())
    }

    /// Reads the snapshot, or `None` if nothing has been saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<LedgerSnapshot>, SnapshotError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no ledger snapshot found");
            return Ok(None);
        }

        let file = File::open(&self.path)?;
        let snapshot: LedgerSnapshot = serde_json::from_reader(BufReader::new(file))?;

        info!(
            path = %self.path.display(),
            current_round = snapshot.ledger.current_round,
            saved_at = %snapshot.saved_at,
            "loaded ledger snapshot"
        );
        Ok(Some(snapshot))
    }
}
