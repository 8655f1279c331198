//! Core oracle types

use chrono::{DateTime, Utc};
use lendbank_core::{Exp, MarketId};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::OracleError;

/// A price quote for one market's underlying asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// The market whose underlying is priced
    pub market: MarketId,
    /// Price mantissa, scaled so that `price * underlying_amount` is a 1e18-scaled value
    pub mantissa: Exp,
    /// Timestamp when this price was published
    pub timestamp: DateTime<Utc>,
    /// Source of the price (e.g., "mock", "chainlink")
    pub source: String,
}

impl Price {
    pub fn new(market: MarketId, mantissa: Exp, source: impl Into<String>) -> Self {
        Self {
            market,
            mantissa,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    /// Published at an explicit time (used to simulate old quotes)
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Check if price is stale (older than threshold)
    pub fn is_stale(&self, max_age_secs: u64) -> bool {
        let age = Utc::now().signed_duration_since(self.timestamp);
        age.num_seconds() > i64::try_from(max_age_secs).unwrap_or(i64::MAX)
    }
}

/// Price Oracle trait - interface for price feeds
///
/// The risk controller and the liquidation coordinator only consume
/// [`PriceOracle::underlying_price`]; `get_price` exposes the reason a
/// price is missing.
pub trait PriceOracle: Debug + Send + Sync {
    /// Get the current price quote for a market's underlying
    fn get_price(&self, market: MarketId) -> Result<Price, OracleError>;

    /// Markets with a published price
    fn supported_markets(&self) -> Vec<MarketId>;

    /// Price mantissa, or zero when the price is missing or stale
    fn underlying_price(&self, market: MarketId) -> Exp {
        match self.get_price(market) {
            Ok(price) => price.mantissa,
            Err(e) => {
                tracing::warn!(market = %market, error = %e, "Underlying price unavailable");
                Exp::ZERO
            }
        }
    }
}
