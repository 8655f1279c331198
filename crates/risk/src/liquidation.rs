//! Liquidation coordinator
//!
//! Repays part of an underwater borrow and seizes the borrower's collateral
//! claim tokens at a discount, as one all-or-nothing operation.
//!
//! ```text
//! seizeTokens = repayAmount * liquidationIncentive * priceBorrowed
//!               / (priceCollateral * exchangeRateCollateral)
//! ```
//!
//! The ratio is formed with a single division, so the only rounding is the
//! final floor (strictly less than one claim-token unit, in the protocol's
//! favor).

use lendbank_core::math::ratio_floor;
use lendbank_core::{AccountId, Exp, MarketId, U256};
use lendbank_ledger::{
    fail, fail_opaque, repay_borrow_fresh, seize, ControllerError, ErrorCode, FailureInfo,
    LedgerError, Markets, RiskHooks,
};

use crate::controller::RiskController;

/// Outcome of a successful liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationReceipt {
    pub repay_amount: U256,
    pub seize_tokens: U256,
}

/// Collateral claim tokens owed for repaying `repay_amount` of a borrow
pub fn calculate_seize_tokens(
    repay_amount: U256,
    liquidation_incentive: Exp,
    price_borrowed: Exp,
    price_collateral: Exp,
    exchange_rate_collateral: Exp,
) -> Result<U256, ControllerError> {
    if price_borrowed.is_zero() || price_collateral.is_zero() {
        return Err(ControllerError::PriceError);
    }
    Ok(ratio_floor(
        &[
            repay_amount,
            liquidation_incentive.mantissa,
            price_borrowed.mantissa,
        ],
        &[price_collateral.mantissa, exchange_rate_collateral.mantissa],
    )?)
}

impl RiskController {
    /// Seize tokens at current oracle prices and the collateral market's
    /// stored exchange rate
    pub fn liquidate_calculate_seize_tokens(
        &self,
        markets: &Markets,
        borrowed: MarketId,
        collateral: MarketId,
        repay_amount: U256,
    ) -> Result<U256, ControllerError> {
        let exchange_rate = markets
            .get(collateral)
            .ok_or(ControllerError::MarketNotListed)?
            .exchange_rate_stored()?;
        calculate_seize_tokens(
            repay_amount,
            self.params().liquidation_incentive,
            self.underlying_price(borrowed),
            self.underlying_price(collateral),
            exchange_rate,
        )
    }
}

/// Liquidate `borrower`: `liquidator` repays `repay_amount` in `borrowed`
/// and receives collateral tokens of `collateral`.
///
/// Both markets must be accrued to `block`. Every failure, soft or not,
/// aborts the transaction.
#[allow(clippy::too_many_arguments)]
pub fn liquidate_borrow_fresh(
    markets: &mut Markets,
    controller: &RiskController,
    borrowed: MarketId,
    collateral: MarketId,
    liquidator: &AccountId,
    borrower: &AccountId,
    repay_amount: U256,
    block: u64,
) -> Result<LiquidationReceipt, LedgerError> {
    liquidate(
        markets,
        controller,
        borrowed,
        collateral,
        liquidator,
        borrower,
        repay_amount,
        block,
    )
    .map_err(|e| {
        tracing::error!(
            liquidator = %liquidator,
            borrower = %borrower,
            borrowed = %borrowed,
            collateral = %collateral,
            error = %e,
            "Liquidation aborted"
        );
        e.escalate()
    })
}

#[allow(clippy::too_many_arguments)]
fn liquidate(
    markets: &mut Markets,
    controller: &RiskController,
    borrowed: MarketId,
    collateral: MarketId,
    liquidator: &AccountId,
    borrower: &AccountId,
    repay_amount: U256,
    block: u64,
) -> Result<LiquidationReceipt, LedgerError> {
    const OP: FailureInfo = FailureInfo::LiquidateBorrow;

    controller
        .liquidate_borrow_allowed(markets, borrowed, collateral, liquidator, borrower, repay_amount)
        .map_err(|e| fail_opaque(OP, e))?;

    if !markets.market(borrowed, OP)?.is_fresh(block)
        || !markets.market(collateral, OP)?.is_fresh(block)
    {
        return Err(fail(OP, ErrorCode::MarketNotFresh));
    }
    if borrower == liquidator {
        return Err(fail(OP, ErrorCode::InvalidAccountPair));
    }
    if repay_amount.is_zero() || repay_amount == U256::MAX {
        return Err(fail(OP, ErrorCode::InvalidCloseAmountRequested));
    }

    let repaid = repay_borrow_fresh(
        markets,
        controller,
        borrowed,
        liquidator,
        borrower,
        repay_amount,
        block,
    )?;

    let seize_tokens = controller
        .liquidate_calculate_seize_tokens(markets, borrowed, collateral, repaid.repay_amount)
        .map_err(|e| fail_opaque(OP, e))?;

    if seize_tokens > markets.market(collateral, OP)?.balance_of(borrower) {
        return Err(fail(OP, ErrorCode::InsufficientBalance));
    }

    seize(
        markets,
        controller,
        collateral,
        borrowed,
        liquidator,
        borrower,
        seize_tokens,
    )?;

    tracing::info!(
        liquidator = %liquidator,
        borrower = %borrower,
        borrowed = %borrowed,
        collateral = %collateral,
        repay = %repaid.repay_amount,
        seize_tokens = %seize_tokens,
        "Borrow liquidated"
    );

    Ok(LiquidationReceipt {
        repay_amount: repaid.repay_amount,
        seize_tokens,
    })
}
