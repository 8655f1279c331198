//! Account liquidity - cross-market solvency
//!
//! For every market an account has entered:
//!
//! ```text
//! collateral += tokens * exchangeRate * collateralFactor * price
//! borrows    += borrowBalance * price
//! ```
//!
//! A hypothetical redeem or borrow in one market is added to the borrow
//! side, so the sums never need to go negative.

use lendbank_core::math::sub;
use lendbank_core::{AccountId, MarketId, U256};
use lendbank_ledger::{ControllerError, Markets};

use crate::controller::RiskController;

/// `(liquidity, shortfall)`: at most one of the two is nonzero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountLiquidity {
    /// Excess collateral value
    pub liquidity: U256,
    /// Missing collateral value
    pub shortfall: U256,
}

impl AccountLiquidity {
    pub fn is_shortfall(&self) -> bool {
        !self.shortfall.is_zero()
    }
}

/// A redeem and/or borrow to evaluate as if it had happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hypothetical {
    pub market: MarketId,
    pub redeem_tokens: U256,
    pub borrow_amount: U256,
}

impl Hypothetical {
    pub fn redeem(market: MarketId, redeem_tokens: U256) -> Self {
        Self {
            market,
            redeem_tokens,
            borrow_amount: U256::ZERO,
        }
    }

    pub fn borrow(market: MarketId, borrow_amount: U256) -> Self {
        Self {
            market,
            redeem_tokens: U256::ZERO,
            borrow_amount,
        }
    }

    fn is_empty(&self) -> bool {
        self.redeem_tokens.is_zero() && self.borrow_amount.is_zero()
    }
}

impl RiskController {
    /// Liquidity of the account as it stands
    pub fn account_liquidity(
        &self,
        markets: &Markets,
        account: &AccountId,
    ) -> Result<AccountLiquidity, ControllerError> {
        self.liquidity_over(markets, account, self.assets_in(account), None)
    }

    /// Liquidity of the account if `change` were applied
    pub fn hypothetical_account_liquidity(
        &self,
        markets: &Markets,
        account: &AccountId,
        change: Hypothetical,
    ) -> Result<AccountLiquidity, ControllerError> {
        self.liquidity_over(markets, account, self.assets_in(account), Some(change))
    }

    /// Sum collateral and borrows over `assets`.
    ///
    /// A zero price is a `PriceError` whenever the account holds a position
    /// in that market or the hypothetical change touches it.
    pub(crate) fn liquidity_over(
        &self,
        markets: &Markets,
        account: &AccountId,
        assets: &[MarketId],
        change: Option<Hypothetical>,
    ) -> Result<AccountLiquidity, ControllerError> {
        let mut sum_collateral = U256::ZERO;
        let mut sum_borrow_plus_effects = U256::ZERO;

        for &asset in assets {
            let market = markets.get(asset).ok_or(ControllerError::MarketNotListed)?;
            let snapshot = market.account_snapshot(account)?;
            let delta = change.filter(|c| c.market == asset && !c.is_empty());

            let price = self.underlying_price(asset);
            if price.is_zero() {
                let has_position =
                    !snapshot.tokens.is_zero() || !snapshot.borrow_balance.is_zero();
                if has_position || delta.is_some() {
                    tracing::warn!(account = %account, market = %asset, "Zero price in liquidity check");
                    return Err(ControllerError::PriceError);
                }
                continue;
            }

            let tokens_to_denom = self
                .collateral_factor(asset)
                .mul(snapshot.exchange_rate)?
                .mul(price)?;

            sum_collateral =
                tokens_to_denom.mul_scalar_truncate_add(snapshot.tokens, sum_collateral)?;
            sum_borrow_plus_effects =
                price.mul_scalar_truncate_add(snapshot.borrow_balance, sum_borrow_plus_effects)?;

            if let Some(delta) = delta {
                sum_borrow_plus_effects = tokens_to_denom
                    .mul_scalar_truncate_add(delta.redeem_tokens, sum_borrow_plus_effects)?;
                sum_borrow_plus_effects =
                    price.mul_scalar_truncate_add(delta.borrow_amount, sum_borrow_plus_effects)?;
            }
        }

        let result = if sum_collateral >= sum_borrow_plus_effects {
            AccountLiquidity {
                liquidity: sub(sum_collateral, sum_borrow_plus_effects)?,
                shortfall: U256::ZERO,
            }
        } else {
            AccountLiquidity {
                liquidity: U256::ZERO,
                shortfall: sub(sum_borrow_plus_effects, sum_collateral)?,
            }
        };
        Ok(result)
    }

    /// Redeem check shared by redeem, transfer and exit-market.
    /// Accounts not in the market are never limited by it.
    pub(crate) fn redeem_allowed_internal(
        &self,
        markets: &Markets,
        market: MarketId,
        redeemer: &AccountId,
        redeem_tokens: U256,
    ) -> Result<(), ControllerError> {
        self.ensure_listed(market)?;
        if !self.check_membership(redeemer, market) {
            return Ok(());
        }
        let liquidity = self.hypothetical_account_liquidity(
            markets,
            redeemer,
            Hypothetical::redeem(market, redeem_tokens),
        )?;
        if liquidity.is_shortfall() {
            return Err(ControllerError::InsufficientLiquidity);
        }
        Ok(())
    }
}
