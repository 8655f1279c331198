//! Test doubles shared by the ledger's unit tests

use lendbank_core::{AccountId, Exp, MarketId, MathError, U256};
use std::sync::Arc;

use crate::hooks::{ControllerError, ListedMarket, RiskHooks};
use crate::market::{Market, MarketParams};
use crate::markets::Markets;
use crate::rate_model::InterestRateModel;
use crate::token::Erc20Token;

/// Constant per-block borrow rate
#[derive(Debug)]
pub struct FlatRate(pub Exp);

impl InterestRateModel for FlatRate {
    fn name(&self) -> &str {
        "flat"
    }

    fn borrow_rate(&self, _cash: U256, _borrows: U256, _reserves: U256) -> Result<Exp, MathError> {
        Ok(self.0)
    }
}

/// Market 0 with a flat borrow rate and no supply
pub fn flat_market(initial_exchange_rate: Exp, borrow_rate: Exp) -> Market {
    Market::new(
        MarketId::new(0),
        MarketParams::new("cTEST", initial_exchange_rate),
        Erc20Token::new("TEST", 18),
        Arc::new(FlatRate(borrow_rate)),
        0,
    )
}

/// One market at block 0; `account` holds `amount` underlying and has
/// approved the market vault without limit
pub fn funded_markets(
    initial_exchange_rate: Exp,
    account: &AccountId,
    amount: u128,
) -> (Markets, MarketId) {
    let mut markets = Markets::new();
    let id = markets.create(
        MarketParams::new("cTEST", initial_exchange_rate),
        Erc20Token::new("TEST", 18),
        Arc::new(FlatRate(Exp::ZERO)),
        0,
    );
    let vault = id.vault();
    if let Some(market) = markets.get_mut(id) {
        let token = market.underlying_mut();
        token.mint(account, U256::from(amount)).unwrap();
        token.approve(account, &vault, U256::MAX);
    }
    (markets, id)
}

/// Hooks that authorize everything
pub struct AllowAll;

impl RiskHooks for AllowAll {
    fn mint_allowed(&self, _: &Markets, _: MarketId, _: &AccountId, _: U256) -> Result<(), ControllerError> {
        Ok(())
    }

    fn redeem_allowed(&self, _: &Markets, _: MarketId, _: &AccountId, _: U256) -> Result<(), ControllerError> {
        Ok(())
    }

    fn borrow_allowed(&mut self, _: &Markets, _: MarketId, _: &AccountId, _: U256) -> Result<(), ControllerError> {
        Ok(())
    }

    fn repay_borrow_allowed(
        &self,
        _: &Markets,
        _: MarketId,
        _: &AccountId,
        _: &AccountId,
        _: U256,
    ) -> Result<(), ControllerError> {
        Ok(())
    }

    fn liquidate_borrow_allowed(
        &self,
        _: &Markets,
        _: MarketId,
        _: MarketId,
        _: &AccountId,
        _: &AccountId,
        _: U256,
    ) -> Result<(), ControllerError> {
        Ok(())
    }

    fn seize_allowed(
        &self,
        _: &Markets,
        _: MarketId,
        seizer: MarketId,
        _: &AccountId,
        _: &AccountId,
        _: U256,
    ) -> Result<ListedMarket, ControllerError> {
        Ok(ListedMarket::new(seizer))
    }

    fn transfer_allowed(
        &self,
        _: &Markets,
        _: MarketId,
        _: &AccountId,
        _: &AccountId,
        _: U256,
    ) -> Result<(), ControllerError> {
        Ok(())
    }
}

/// Hooks that reject everything
pub struct DenyAll;

impl RiskHooks for DenyAll {
    fn mint_allowed(&self, _: &Markets, _: MarketId, _: &AccountId, _: U256) -> Result<(), ControllerError> {
        Err(ControllerError::MarketNotListed)
    }

    fn redeem_allowed(&self, _: &Markets, _: MarketId, _: &AccountId, _: U256) -> Result<(), ControllerError> {
        Err(ControllerError::InsufficientLiquidity)
    }

    fn borrow_allowed(&mut self, _: &Markets, _: MarketId, _: &AccountId, _: U256) -> Result<(), ControllerError> {
        Err(ControllerError::InsufficientLiquidity)
    }

    fn repay_borrow_allowed(
        &self,
        _: &Markets,
        _: MarketId,
        _: &AccountId,
        _: &AccountId,
        _: U256,
    ) -> Result<(), ControllerError> {
        Err(ControllerError::MarketNotListed)
    }

    fn liquidate_borrow_allowed(
        &self,
        _: &Markets,
        _: MarketId,
        _: MarketId,
        _: &AccountId,
        _: &AccountId,
        _: U256,
    ) -> Result<(), ControllerError> {
        Err(ControllerError::InsufficientShortfall)
    }

    fn seize_allowed(
        &self,
        _: &Markets,
        _: MarketId,
        _: MarketId,
        _: &AccountId,
        _: &AccountId,
        _: U256,
    ) -> Result<ListedMarket, ControllerError> {
        Err(ControllerError::MarketNotListed)
    }

    fn transfer_allowed(
        &self,
        _: &Markets,
        _: MarketId,
        _: &AccountId,
        _: &AccountId,
        _: U256,
    ) -> Result<(), ControllerError> {
        Err(ControllerError::InsufficientLiquidity)
    }
}
