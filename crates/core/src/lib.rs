pub mod authority;
pub mod claim;
pub mod clock;
pub mod config;
pub mod config_loader;
pub mod custody;
pub mod error;
pub mod events;
pub mod ledger;
pub mod market;
pub mod oracle;
pub mod pool;
pub mod report;
pub mod round;
pub mod settlement;
pub mod snapshot;
pub mod types;

pub use authority::{AdminCap, AuthorityResolver, CapabilityRegistry, FixedAdmin};
pub use claim::{ClaimEntry, ClaimPlan, ClaimProcessor};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, KeeperConfig, MarketConfig};
pub use config_loader::ConfigLoader;
pub use custody::{Custody, InMemoryCustody};
pub use error::{CustodyError, ErrorKind, MarketError, MarketResult};
pub use events::{EventSink, MarketEvent, NoopSink, RecordingSink, TracingSink};
pub use ledger::RoundLedger;
pub use market::{BetReceipt, Collaborators, PredictionMarket, TickReport};
pub use oracle::{FixedPriceOracle, PriceOracle, RandomWalkOracle, ScriptedOracle};
pub use pool::SharePool;
pub use report::RoundReport;
pub use round::{Direction, Round, RoundPhase};
pub use settlement::{Outcome, Settlement, SettlementEngine};
pub use snapshot::{LedgerSnapshot, SnapshotError, SnapshotStore};
pub use types::{ParticipantId, Price, Timestamp};
