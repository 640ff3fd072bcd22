//! CLI commands for operating a prediction market.

pub mod inspect;
pub mod keeper;
pub mod simulate;

pub use inspect::{run_inspect, InspectArgs};
pub use keeper::{run_keeper, KeeperArgs};
pub use simulate::{run_simulate, SimulateArgs};
