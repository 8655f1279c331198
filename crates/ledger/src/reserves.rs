//! Reserves administration
//!
//! Reserve factor, reserve top-ups and withdrawals, and swapping a market's
//! interest rate model. Authorization is the caller's job; these functions
//! only enforce freshness and accounting.

use lendbank_core::math::{add, sub};
use lendbank_core::{AccountId, Exp, MarketId, U256};
use std::sync::Arc;

use crate::error::{fail, ErrorCode, FailureInfo, LedgerError};
use crate::markets::Markets;
use crate::rate_model::InterestRateModel;

/// Set the share of interest kept as reserves. Returns the old factor.
pub fn set_reserve_factor_fresh(
    markets: &mut Markets,
    market_id: MarketId,
    reserve_factor: Exp,
    block: u64,
) -> Result<Exp, LedgerError> {
    let market = markets.market_mut(market_id, FailureInfo::SetReserveFactor)?;
    if !market.is_fresh(block) {
        return Err(fail(FailureInfo::SetReserveFactor, ErrorCode::MarketNotFresh));
    }
    if reserve_factor > Exp::ONE {
        return Err(fail(FailureInfo::SetReserveFactor, ErrorCode::BadInput));
    }

    let old = market.params.reserve_factor;
    market.params.reserve_factor = reserve_factor;
    tracing::info!(market = %market_id, old = %old, new = %reserve_factor, "Reserve factor updated");
    Ok(old)
}

/// Donate underlying to reserves. Returns the new reserve total.
pub fn add_reserves_fresh(
    markets: &mut Markets,
    market_id: MarketId,
    benefactor: &AccountId,
    amount: U256,
    block: u64,
) -> Result<U256, LedgerError> {
    let market = markets.market_mut(market_id, FailureInfo::AddReserves)?;
    if !market.is_fresh(block) {
        return Err(fail(FailureInfo::AddReserves, ErrorCode::MarketNotFresh));
    }
    market.check_transfer_in(benefactor, amount, FailureInfo::AddReserves)?;

    let total_reserves_new = add(market.total_reserves, amount)?;
    market.total_reserves = total_reserves_new;
    market.do_transfer_in(benefactor, amount)?;

    tracing::info!(
        market = %market_id,
        benefactor = %benefactor,
        amount = %amount,
        total_reserves = %total_reserves_new,
        "Reserves added"
    );
    Ok(total_reserves_new)
}

/// Withdraw reserves to `recipient`. Returns the new reserve total.
pub fn reduce_reserves_fresh(
    markets: &mut Markets,
    market_id: MarketId,
    recipient: &AccountId,
    amount: U256,
    block: u64,
) -> Result<U256, LedgerError> {
    let market = markets.market_mut(market_id, FailureInfo::ReduceReserves)?;
    if !market.is_fresh(block) {
        return Err(fail(FailureInfo::ReduceReserves, ErrorCode::MarketNotFresh));
    }
    if market.cash() < amount {
        return Err(fail(FailureInfo::ReduceReserves, ErrorCode::InsufficientCash));
    }
    if amount > market.total_reserves {
        return Err(fail(FailureInfo::ReduceReserves, ErrorCode::BadInput));
    }

    let total_reserves_new = sub(market.total_reserves, amount)?;
    market.total_reserves = total_reserves_new;
    market.do_transfer_out(recipient, amount)?;

    tracing::info!(
        market = %market_id,
        recipient = %recipient,
        amount = %amount,
        total_reserves = %total_reserves_new,
        "Reserves reduced"
    );
    Ok(total_reserves_new)
}

/// Replace the market's interest rate model. The market must already have
/// accrued under the old model.
pub fn set_interest_rate_model_fresh(
    markets: &mut Markets,
    market_id: MarketId,
    rate_model: Arc<dyn InterestRateModel>,
    block: u64,
) -> Result<(), LedgerError> {
    let market = markets.market_mut(market_id, FailureInfo::SetInterestRateModel)?;
    if !market.is_fresh(block) {
        return Err(fail(FailureInfo::SetInterestRateModel, ErrorCode::MarketNotFresh));
    }

    tracing::info!(
        market = %market_id,
        old = market.rate_model.name(),
        new = rate_model.name(),
        "Interest rate model updated"
    );
    market.rate_model = rate_model;
    Ok(())
}
