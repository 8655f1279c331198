//! Risk hooks - the authorization seam between the ledger and the risk controller
//!
//! Every value-moving ledger operation asks a [`RiskHooks`] implementation
//! first. Hooks never abort: they return a [`ControllerError`] and the
//! ledger turns it into a soft failure.

use lendbank_core::{AccountId, MarketId, MathError, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::markets::Markets;

/// Reasons the risk controller rejects an operation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerError {
    #[error("caller is not authorized")]
    Unauthorized,

    #[error("market not listed")]
    MarketNotListed,

    #[error("market already listed")]
    MarketAlreadyListed,

    #[error("market not entered")]
    MarketNotEntered,

    #[error("too many assets")]
    TooManyAssets,

    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    #[error("insufficient shortfall")]
    InsufficientShortfall,

    #[error("too much repay")]
    TooMuchRepay,

    #[error("nonzero borrow balance")]
    NonzeroBorrowBalance,

    #[error("price unavailable")]
    PriceError,

    #[error("invalid collateral factor")]
    InvalidCollateralFactor,

    #[error("invalid close factor")]
    InvalidCloseFactor,

    #[error("invalid liquidation incentive")]
    InvalidLiquidationIncentive,

    #[error("redeem tokens zero")]
    RedeemTokensZero,

    #[error("math error: {0}")]
    Math(MathError),
}

impl From<MathError> for ControllerError {
    fn from(err: MathError) -> Self {
        ControllerError::Math(err)
    }
}

/// Proof that the market performing a seize was listed when the seize was
/// authorized. Only [`RiskHooks::seize_allowed`] hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListedMarket {
    market: MarketId,
}

impl ListedMarket {
    pub fn new(market: MarketId) -> Self {
        Self { market }
    }

    pub fn market(&self) -> MarketId {
        self.market
    }
}

/// Authorization hooks consulted by the ledger
///
/// All hooks observe the market registry as it is before the operation's
/// effects. `borrow_allowed` takes `&mut self` because a borrow in a market
/// the borrower has not entered enters it first.
pub trait RiskHooks {
    fn mint_allowed(
        &self,
        markets: &Markets,
        market: MarketId,
        minter: &AccountId,
        mint_amount: U256,
    ) -> Result<(), ControllerError>;

    fn redeem_allowed(
        &self,
        markets: &Markets,
        market: MarketId,
        redeemer: &AccountId,
        redeem_tokens: U256,
    ) -> Result<(), ControllerError>;

    /// Rejects a redeem that would pay out underlying for zero tokens
    fn redeem_verify(
        &self,
        _market: MarketId,
        _redeemer: &AccountId,
        redeem_amount: U256,
        redeem_tokens: U256,
    ) -> Result<(), ControllerError> {
        if redeem_tokens.is_zero() && !redeem_amount.is_zero() {
            return Err(ControllerError::RedeemTokensZero);
        }
        Ok(())
    }

    fn borrow_allowed(
        &mut self,
        markets: &Markets,
        market: MarketId,
        borrower: &AccountId,
        borrow_amount: U256,
    ) -> Result<(), ControllerError>;

    fn repay_borrow_allowed(
        &self,
        markets: &Markets,
        market: MarketId,
        payer: &AccountId,
        borrower: &AccountId,
        repay_amount: U256,
    ) -> Result<(), ControllerError>;

    fn liquidate_borrow_allowed(
        &self,
        markets: &Markets,
        borrowed: MarketId,
        collateral: MarketId,
        liquidator: &AccountId,
        borrower: &AccountId,
        repay_amount: U256,
    ) -> Result<(), ControllerError>;

    /// Authorize `seizer` (the borrowed market) to move collateral tokens
    fn seize_allowed(
        &self,
        markets: &Markets,
        collateral: MarketId,
        seizer: MarketId,
        liquidator: &AccountId,
        borrower: &AccountId,
        seize_tokens: U256,
    ) -> Result<ListedMarket, ControllerError>;

    fn transfer_allowed(
        &self,
        markets: &Markets,
        market: MarketId,
        src: &AccountId,
        dst: &AccountId,
        transfer_tokens: U256,
    ) -> Result<(), ControllerError>;
}
