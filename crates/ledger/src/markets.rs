//! Markets - arena of every market the ledger knows

use lendbank_core::{MarketId, U256};
use std::sync::Arc;

use crate::error::{fail, ErrorCode, FailureInfo, LedgerError};
use crate::market::{Accrual, Market, MarketParams};
use crate::rate_model::InterestRateModel;
use crate::token::Erc20Token;

/// Owned collection of markets indexed by [`MarketId`]
#[derive(Debug, Clone, Default)]
pub struct Markets {
    markets: Vec<Market>,
}

impl Markets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a market and return its handle
    pub fn create(
        &mut self,
        params: MarketParams,
        underlying: Erc20Token,
        rate_model: Arc<dyn InterestRateModel>,
        block: u64,
    ) -> MarketId {
        let id = MarketId::new(self.markets.len() as u32);
        tracing::info!(market = %id, symbol = %params.symbol, "Market created");
        self.markets
            .push(Market::new(id, params, underlying, rate_model, block));
        id
    }

    pub fn get(&self, id: MarketId) -> Option<&Market> {
        self.markets.get(id.index())
    }

    pub fn get_mut(&mut self, id: MarketId) -> Option<&mut Market> {
        self.markets.get_mut(id.index())
    }

    /// Market lookup for an operation; an unknown id is a soft failure
    pub fn market(&self, id: MarketId, operation: FailureInfo) -> Result<&Market, LedgerError> {
        self.get(id)
            .ok_or_else(|| fail(operation, ErrorCode::MarketNotListed))
    }

    pub fn market_mut(
        &mut self,
        id: MarketId,
        operation: FailureInfo,
    ) -> Result<&mut Market, LedgerError> {
        self.get_mut(id)
            .ok_or_else(|| fail(operation, ErrorCode::MarketNotListed))
    }

    /// Accrue one market up to `block`
    pub fn accrue_interest(
        &mut self,
        id: MarketId,
        block: u64,
    ) -> Result<Option<Accrual>, LedgerError> {
        self.market_mut(id, FailureInfo::AccrueInterest)?
            .accrue_interest(block)
    }

    pub fn ids(&self) -> impl Iterator<Item = MarketId> + '_ {
        self.markets.iter().map(|m| m.id())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Market> {
        self.markets.iter()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Underlying cash held by a market, zero for unknown ids
    pub fn cash(&self, id: MarketId) -> U256 {
        self.get(id).map(|m| m.cash()).unwrap_or_default()
    }
}
