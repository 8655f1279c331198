//! Oracle error types

use lendbank_core::MarketId;
use thiserror::Error;

/// Oracle-related errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// No price has been published for the market
    #[error("Price not found for {market}")]
    PriceNotFound { market: MarketId },

    /// Price data is stale (older than threshold)
    #[error("Stale price for {market}: last update was {last_update}, threshold is {threshold_secs}s")]
    StalePrice {
        market: MarketId,
        last_update: String,
        threshold_secs: u64,
    },
}
