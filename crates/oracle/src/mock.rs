//! Mock Oracle for testing
//!
//! Provides configurable fixed prices for testing liquidity and liquidation.

use chrono::{DateTime, Utc};
use lendbank_core::{Exp, MarketId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::OracleError;
use crate::types::{Price, PriceOracle};

/// Mock Price Oracle for testing
///
/// Stores fixed prices that can be updated programmatically. With
/// [`MockOracle::with_max_age`], quotes older than the threshold are
/// reported as stale.
#[derive(Debug, Default)]
pub struct MockOracle {
    /// Stored prices (market -> price)
    prices: RwLock<HashMap<MarketId, Price>>,
    /// Staleness threshold in seconds
    max_age_secs: Option<u64>,
}

impl MockOracle {
    /// Create a new empty mock oracle
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject quotes older than `secs`
    pub fn with_max_age(mut self, secs: u64) -> Self {
        self.max_age_secs = Some(secs);
        self
    }

    /// Set a fixed price for a market
    pub fn set_price(&self, market: MarketId, mantissa: Exp) {
        self.insert(Price::new(market, mantissa, "mock"));
    }

    /// Set a price published at a given time
    pub fn set_price_at(&self, market: MarketId, mantissa: Exp, timestamp: DateTime<Utc>) {
        self.insert(Price::new(market, mantissa, "mock").at(timestamp));
    }

    /// Remove a price (for testing price not found)
    pub fn remove_price(&self, market: MarketId) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.remove(&market);
    }

    /// Get number of configured markets
    pub fn market_count(&self) -> usize {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn insert(&self, price: Price) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.insert(price.market, price);
    }
}

impl PriceOracle for MockOracle {
    fn get_price(&self, market: MarketId) -> Result<Price, OracleError> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        let price = prices
            .get(&market)
            .cloned()
            .ok_or(OracleError::PriceNotFound { market })?;

        if let Some(threshold_secs) = self.max_age_secs {
            if price.is_stale(threshold_secs) {
                return Err(OracleError::StalePrice {
                    market,
                    last_update: price.timestamp.to_rfc3339(),
                    threshold_secs,
                });
            }
        }

        Ok(price)
    }

    fn supported_markets(&self) -> Vec<MarketId> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        let mut markets: Vec<MarketId> = prices.keys().copied().collect();
        markets.sort();
        markets
    }
}
