//! Error taxonomy for market operations.
//!
//! Every failure is detected before the ledger is touched, so an `Err` from
//! any public operation always means "nothing happened".

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Broad class of a [`MarketError`], used by operators to decide whether a
/// failure is worth retrying at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller is not the configured administrator.
    Authorization,
    /// Operation invoked in the wrong lifecycle phase.
    State,
    /// Operation invoked outside its timing window.
    Timing,
    /// Round id out of range.
    Range,
    /// Participant already holds a position.
    DuplicateAction,
    /// Round not finalized yet.
    NotReady,
    /// Rejected argument (zero stake, bad config).
    InvalidInput,
    /// Checked arithmetic failed.
    Arithmetic,
    /// The custody collaborator refused a transfer.
    Custody,
    /// The price feed could not produce a sample.
    Oracle,
}

/// Failures reported by a [`Custody`](crate::custody::Custody) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("participant {participant} has {available}, needs {required}")]
    InsufficientFunds {
        participant: String,
        available: u64,
        required: u64,
    },

    #[error("vault holds {available}, cannot release {required}")]
    InsufficientVault { available: u64, required: u64 },

    #[error("balance overflow for {0}")]
    Overflow(String),
}

/// Errors returned by [`PredictionMarket`](crate::market::PredictionMarket) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("caller {0} is not the market administrator")]
    Unauthorized(String),

    #[error("genesis round has already been started")]
    GenesisAlreadyStarted,

    #[error("genesis round has not been started")]
    GenesisNotStarted,

    #[error("genesis round has already been locked")]
    GenesisAlreadyLocked,

    #[error("genesis sequence has not completed")]
    GenesisNotLocked,

    #[error("market is paused")]
    Paused,

    #[error("market is not paused")]
    NotPaused,

    #[error("round {0} has not been started")]
    NotStarted(u64),

    #[error("round {0} is already locked")]
    AlreadyLocked(u64),

    #[error("round {0} is not locked")]
    NotLocked(u64),

    #[error("round {0} is already finalized")]
    AlreadyFinalized(u64),

    #[error("round {round} cannot open before round {previous} has ended")]
    PreviousRoundNotEnded { round: u64, previous: u64 },

    #[error("round {round}: too early, deadline {deadline}, now {now}")]
    TooEarly {
        round: u64,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("round {round}: too late, window closed at {closed_at}, now {now}")]
    TooLate {
        round: u64,
        closed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("round {0} is not accepting bets")]
    CannotBet(u64),

    #[error("round {round} is not claimable yet (current round {current})")]
    InvalidRound { round: u64, current: u64 },

    #[error("participant {participant} already has a position in round {round}")]
    AlreadyBet { participant: String, round: u64 },

    #[error("round {0} is not finalized")]
    NotFinalized(u64),

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("amount {amount} is below the minimum stake {minimum}")]
    BelowMinimum { amount: u64, minimum: u64 },

    #[error("requested {requested} shares, participant holds {held}")]
    InsufficientShares { requested: u64, held: u64 },

    #[error("arithmetic overflow")]
    Overflow,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("custody transfer failed: {0}")]
    Custody(#[from] CustodyError),

    #[error("price oracle unavailable: {0}")]
    Oracle(String),
}

impl MarketError {
    /// Maps the error onto its taxonomy class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Authorization,
            Self::GenesisAlreadyStarted
            | Self::GenesisNotStarted
            | Self::GenesisAlreadyLocked
            | Self::GenesisNotLocked
            | Self::Paused
            | Self::NotPaused
            | Self::NotStarted(_)
            | Self::AlreadyLocked(_)
            | Self::NotLocked(_)
            | Self::AlreadyFinalized(_)
            | Self::PreviousRoundNotEnded { .. } => ErrorKind::State,
            Self::TooEarly { .. } | Self::TooLate { .. } | Self::CannotBet(_) => {
                ErrorKind::Timing
            }
            Self::InvalidRound { .. } => ErrorKind::Range,
            Self::AlreadyBet { .. } => ErrorKind::DuplicateAction,
            Self::NotFinalized(_) => ErrorKind::NotReady,
            Self::InvalidAmount
            | Self::BelowMinimum { .. }
            | Self::InsufficientShares { .. }
            | Self::InvalidConfig(_) => ErrorKind::InvalidInput,
            Self::Overflow => ErrorKind::Arithmetic,
            Self::Custody(_) => ErrorKind::Custody,
            Self::Oracle(_) => ErrorKind::Oracle,
        }
    }

    /// True for the timing failures that strand a round when the buffer is missed.
    #[must_use]
    pub const fn is_timing(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timing)
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
