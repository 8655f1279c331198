//! Borrow side - borrow, repay and collateral seizure

use lendbank_core::math::{add, sub};
use lendbank_core::{AccountId, MarketId, U256};

use crate::error::{fail, fail_opaque, ErrorCode, FailureInfo, LedgerError};
use crate::hooks::RiskHooks;
use crate::market::BorrowSnapshot;
use crate::markets::Markets;

/// Outcome of a successful borrow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowReceipt {
    pub borrow_amount: U256,
    pub account_borrows: U256,
    pub total_borrows: U256,
}

/// Outcome of a successful repay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepayReceipt {
    /// Amount actually repaid (capped at the borrow balance)
    pub repay_amount: U256,
    pub account_borrows: U256,
    pub total_borrows: U256,
}

/// Borrow `borrow_amount` underlying against the borrower's collateral.
///
/// A failed transfer out aborts the whole transaction.
pub fn borrow_fresh(
    markets: &mut Markets,
    hooks: &mut dyn RiskHooks,
    market_id: MarketId,
    borrower: &AccountId,
    borrow_amount: U256,
    block: u64,
) -> Result<BorrowReceipt, LedgerError> {
    hooks
        .borrow_allowed(markets, market_id, borrower, borrow_amount)
        .map_err(|e| fail_opaque(FailureInfo::Borrow, e))?;

    let market = markets.market_mut(market_id, FailureInfo::Borrow)?;
    if !market.is_fresh(block) {
        return Err(fail(FailureInfo::Borrow, ErrorCode::MarketNotFresh));
    }
    if market.cash() < borrow_amount {
        return Err(fail(FailureInfo::Borrow, ErrorCode::InsufficientCash));
    }

    let account_borrows = market.borrow_balance_stored(borrower)?;
    let account_borrows_new = add(account_borrows, borrow_amount)?;
    let total_borrows_new = add(market.total_borrows, borrow_amount)?;

    let borrow_index = market.borrow_index;
    market.position_mut(borrower).borrow = BorrowSnapshot {
        principal: account_borrows_new,
        interest_index: borrow_index,
    };
    market.total_borrows = total_borrows_new;

    market.do_transfer_out(borrower, borrow_amount)?;

    tracing::debug!(
        market = %market_id,
        borrower = %borrower,
        amount = %borrow_amount,
        account_borrows = %account_borrows_new,
        "Borrow"
    );

    Ok(BorrowReceipt {
        borrow_amount,
        account_borrows: account_borrows_new,
        total_borrows: total_borrows_new,
    })
}

/// Repay on behalf of `borrower`. `U256::MAX` repays the full balance;
/// any larger-than-owed amount is capped at the balance.
pub fn repay_borrow_fresh(
    markets: &mut Markets,
    hooks: &dyn RiskHooks,
    market_id: MarketId,
    payer: &AccountId,
    borrower: &AccountId,
    repay_amount: U256,
    block: u64,
) -> Result<RepayReceipt, LedgerError> {
    hooks
        .repay_borrow_allowed(markets, market_id, payer, borrower, repay_amount)
        .map_err(|e| fail_opaque(FailureInfo::RepayBorrow, e))?;

    let market = markets.market_mut(market_id, FailureInfo::RepayBorrow)?;
    if !market.is_fresh(block) {
        return Err(fail(FailureInfo::RepayBorrow, ErrorCode::MarketNotFresh));
    }

    let account_borrows = market.borrow_balance_stored(borrower)?;
    let actual_repay = repay_amount.min(account_borrows);

    market.check_transfer_in(payer, actual_repay, FailureInfo::RepayBorrow)?;

    let account_borrows_new = sub(account_borrows, actual_repay)?;
    let total_borrows_new = sub(market.total_borrows, actual_repay)?;

    let borrow_index = market.borrow_index;
    market.position_mut(borrower).borrow = BorrowSnapshot {
        principal: account_borrows_new,
        interest_index: borrow_index,
    };
    market.total_borrows = total_borrows_new;

    market.do_transfer_in(payer, actual_repay)?;

    tracing::debug!(
        market = %market_id,
        payer = %payer,
        borrower = %borrower,
        amount = %actual_repay,
        account_borrows = %account_borrows_new,
        "Repay borrow"
    );

    Ok(RepayReceipt {
        repay_amount: actual_repay,
        account_borrows: account_borrows_new,
        total_borrows: total_borrows_new,
    })
}

/// Move `seize_tokens` of `collateral` claim tokens from `borrower` to
/// `liquidator` on behalf of the `seizer` market.
///
/// Authorized by [`RiskHooks::seize_allowed`], whose proof of listing must
/// name the seizing market.
pub fn seize(
    markets: &mut Markets,
    hooks: &dyn RiskHooks,
    collateral: MarketId,
    seizer: MarketId,
    liquidator: &AccountId,
    borrower: &AccountId,
    seize_tokens: U256,
) -> Result<(), LedgerError> {
    let proof = hooks
        .seize_allowed(markets, collateral, seizer, liquidator, borrower, seize_tokens)
        .map_err(|e| fail_opaque(FailureInfo::Seize, e))?;
    if proof.market() != seizer {
        return Err(fail(FailureInfo::Seize, ErrorCode::ControllerRejection));
    }

    if borrower == liquidator {
        return Err(fail(FailureInfo::Seize, ErrorCode::InvalidAccountPair));
    }

    let market = markets.market_mut(collateral, FailureInfo::Seize)?;
    let borrower_tokens_new = sub(market.balance_of(borrower), seize_tokens)?;
    let liquidator_tokens_new = add(market.balance_of(liquidator), seize_tokens)?;

    market.position_mut(borrower).tokens = borrower_tokens_new;
    market.position_mut(liquidator).tokens = liquidator_tokens_new;

    tracing::debug!(
        market = %collateral,
        seizer = %seizer,
        liquidator = %liquidator,
        borrower = %borrower,
        tokens = %seize_tokens,
        "Seize"
    );
    Ok(())
}
