//! LendBank Protocol - transactional entry point
//!
//! [`Protocol`] runs every user and admin operation as one atomic
//! transaction over the ledger and the risk controller, and journals the
//! resulting events.

pub mod config;
pub mod context;

pub use config::{ConfigError, MarketConfig, ProtocolConfig, RateModelConfig};
pub use context::{Protocol, ProtocolError};
