//! Supply side - mint, redeem and claim-token transfers
//!
//! `*_fresh` operations require the market to be accrued to `block` by the
//! caller. Soft rejections are raised before any state is written; ledger
//! state is updated before the underlying moves, and a failed transfer is
//! fatal so the caller discards the partially updated markets.

use lendbank_core::math::{add, div_scalar_by_exp_truncate, sub};
use lendbank_core::{AccountId, MarketId, U256};

use crate::error::{fail, fail_opaque, ErrorCode, FailureInfo, LedgerError};
use crate::hooks::RiskHooks;
use crate::markets::Markets;

/// Outcome of a successful mint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintReceipt {
    pub mint_amount: U256,
    pub mint_tokens: U256,
}

/// How much to redeem: exactly one side is given, the other is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemAmount {
    /// Claim tokens to burn
    Tokens(U256),
    /// Underlying to receive
    Underlying(U256),
}

/// Outcome of a successful redeem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemReceipt {
    pub redeem_amount: U256,
    pub redeem_tokens: U256,
}

/// Supply `mint_amount` underlying and receive claim tokens at the current
/// exchange rate. A zero amount is allowed and mints nothing.
pub fn mint_fresh(
    markets: &mut Markets,
    hooks: &dyn RiskHooks,
    market_id: MarketId,
    minter: &AccountId,
    mint_amount: U256,
    block: u64,
) -> Result<MintReceipt, LedgerError> {
    hooks
        .mint_allowed(markets, market_id, minter, mint_amount)
        .map_err(|e| fail_opaque(FailureInfo::Mint, e))?;

    let market = markets.market_mut(market_id, FailureInfo::Mint)?;
    if !market.is_fresh(block) {
        return Err(fail(FailureInfo::Mint, ErrorCode::MarketNotFresh));
    }

    let exchange_rate = market.exchange_rate_stored()?;
    market.check_transfer_in(minter, mint_amount, FailureInfo::Mint)?;

    let mint_tokens = div_scalar_by_exp_truncate(mint_amount, exchange_rate)?;
    let total_supply_new = add(market.total_supply, mint_tokens)?;
    let account_tokens_new = add(market.balance_of(minter), mint_tokens)?;

    market.total_supply = total_supply_new;
    market.position_mut(minter).tokens = account_tokens_new;

    market.do_transfer_in(minter, mint_amount)?;

    tracing::debug!(
        market = %market_id,
        minter = %minter,
        amount = %mint_amount,
        tokens = %mint_tokens,
        "Mint"
    );

    Ok(MintReceipt {
        mint_amount,
        mint_tokens,
    })
}

/// Burn claim tokens for underlying.
///
/// Fails softly when the market lacks cash, or when paying out would leave
/// the market holding less than its configured minimum underlying.
pub fn redeem_fresh(
    markets: &mut Markets,
    hooks: &dyn RiskHooks,
    market_id: MarketId,
    redeemer: &AccountId,
    amount: RedeemAmount,
    block: u64,
) -> Result<RedeemReceipt, LedgerError> {
    let market = markets.market(market_id, FailureInfo::Redeem)?;
    let exchange_rate = market.exchange_rate_stored()?;

    let (redeem_tokens, redeem_amount) = match amount {
        RedeemAmount::Tokens(tokens) => (tokens, exchange_rate.mul_scalar_truncate(tokens)?),
        RedeemAmount::Underlying(underlying) => (
            div_scalar_by_exp_truncate(underlying, exchange_rate)?,
            underlying,
        ),
    };

    hooks
        .redeem_verify(market_id, redeemer, redeem_amount, redeem_tokens)
        .map_err(|e| fail_opaque(FailureInfo::Redeem, e))?;
    hooks
        .redeem_allowed(markets, market_id, redeemer, redeem_tokens)
        .map_err(|e| fail_opaque(FailureInfo::Redeem, e))?;

    let market = markets.market_mut(market_id, FailureInfo::Redeem)?;
    if !market.is_fresh(block) {
        return Err(fail(FailureInfo::Redeem, ErrorCode::MarketNotFresh));
    }

    let total_supply_new = sub(market.total_supply, redeem_tokens)?;
    let account_tokens_new = sub(market.balance_of(redeemer), redeem_tokens)?;

    let cash = market.cash();
    if cash < redeem_amount {
        return Err(fail(FailureInfo::Redeem, ErrorCode::InsufficientCash));
    }
    if sub(cash, redeem_amount)? < market.minimum_underlying() {
        tracing::warn!(
            market = %market_id,
            redeemer = %redeemer,
            amount = %redeem_amount,
            minimum = %market.minimum_underlying(),
            "Redeem would leave market below minimum underlying"
        );
        return Err(fail(FailureInfo::Redeem, ErrorCode::InsufficientUnderlying));
    }

    market.total_supply = total_supply_new;
    market.position_mut(redeemer).tokens = account_tokens_new;

    market.do_transfer_out(redeemer, redeem_amount)?;

    tracing::debug!(
        market = %market_id,
        redeemer = %redeemer,
        amount = %redeem_amount,
        tokens = %redeem_tokens,
        "Redeem"
    );

    Ok(RedeemReceipt {
        redeem_amount,
        redeem_tokens,
    })
}

/// Move claim tokens from `src` to `dst`. `spender` is either `src` itself
/// or an account holding an allowance from `src`.
pub fn transfer_tokens(
    markets: &mut Markets,
    hooks: &dyn RiskHooks,
    market_id: MarketId,
    spender: &AccountId,
    src: &AccountId,
    dst: &AccountId,
    tokens: U256,
) -> Result<(), LedgerError> {
    hooks
        .transfer_allowed(markets, market_id, src, dst, tokens)
        .map_err(|e| fail_opaque(FailureInfo::Transfer, e))?;

    if src == dst {
        return Err(fail(FailureInfo::Transfer, ErrorCode::BadInput));
    }

    let market = markets.market_mut(market_id, FailureInfo::Transfer)?;

    let allowance = if spender == src {
        U256::MAX
    } else {
        market.allowance(src, spender)
    };
    let allowance_new = allowance
        .checked_sub(tokens)
        .ok_or_else(|| fail(FailureInfo::Transfer, ErrorCode::InsufficientAllowance))?;
    let src_tokens_new = market
        .balance_of(src)
        .checked_sub(tokens)
        .ok_or_else(|| fail(FailureInfo::Transfer, ErrorCode::InsufficientBalance))?;
    let dst_tokens_new = add(market.balance_of(dst), tokens)?;

    market.position_mut(src).tokens = src_tokens_new;
    market.position_mut(dst).tokens = dst_tokens_new;
    if allowance != U256::MAX {
        market
            .allowances
            .insert((src.clone(), spender.clone()), allowance_new);
    }

    tracing::debug!(market = %market_id, src = %src, dst = %dst, tokens = %tokens, "Transfer");
    Ok(())
}

/// Let `spender` transfer up to `amount` of `owner`'s claim tokens
pub fn approve(
    markets: &mut Markets,
    market_id: MarketId,
    owner: &AccountId,
    spender: &AccountId,
    amount: U256,
) -> Result<(), LedgerError> {
    let market = markets.market_mut(market_id, FailureInfo::Transfer)?;
    market
        .allowances
        .insert((owner.clone(), spender.clone()), amount);
    Ok(())
}
