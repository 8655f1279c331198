//! LendBank Risk Controller
//!
//! Decides whether ledger operations may proceed. Keeps the market listing,
//! collateral factors and market membership, computes cross-market account
//! liquidity from oracle prices, and coordinates liquidations.

pub mod controller;
mod hooks;
pub mod interest;
pub mod liquidation;
pub mod liquidity;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{MarketRecord, RiskController, RiskParams, DEFAULT_MAX_ASSETS};
pub use interest::{JumpRateModel, WhitePaperRateModel, BLOCKS_PER_YEAR};
pub use liquidation::{calculate_seize_tokens, liquidate_borrow_fresh, LiquidationReceipt};
pub use liquidity::{AccountLiquidity, Hypothetical};
