//! LendBank Price Oracle
//!
//! Provides underlying prices (1e18 mantissas) for account liquidity and
//! liquidation seize calculations. A price of zero means "unavailable" and
//! stops every solvency computation that needs it.
//!
//! Currently implements MockOracle for testing; can be extended for external feeds.

mod error;
mod mock;
mod types;

pub use error::OracleError;
pub use mock::MockOracle;
pub use types::{Price, PriceOracle};
