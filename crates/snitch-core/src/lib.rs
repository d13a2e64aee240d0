pub mod compose;
pub mod hash;
pub mod ledger;
pub mod types;

pub use compose::{compose, connections_channel, filestat_channel, Envelope};
pub use ledger::Ledger;
pub use types::*;
