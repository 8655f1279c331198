//! Risk controller - market registry, membership and risk parameters
//!
//! The controller owns everything the ledger must ask about before moving
//! value: which markets are listed, their collateral factors, which markets
//! each account has entered, and the global close factor and liquidation
//! incentive.

use lendbank_core::{AccountId, Exp, MarketId, U256};
use lendbank_ledger::{fail_opaque, ControllerError, FailureInfo, LedgerError, Markets};
use lendbank_oracle::PriceOracle;
use std::collections::HashMap;
use std::sync::Arc;

/// Number of markets an account may enter by default
pub const DEFAULT_MAX_ASSETS: usize = 20;

/// Bounds and current values of the global risk parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskParams {
    /// Share of a borrow a single liquidation may repay
    pub close_factor: Exp,
    /// Collateral bonus paid to liquidators (> 1.0)
    pub liquidation_incentive: Exp,
    pub max_assets: usize,
    /// Collateral factors must stay strictly below this
    pub collateral_factor_max: Exp,
    pub close_factor_min: Exp,
    pub close_factor_max: Exp,
    pub liquidation_incentive_min: Exp,
    pub liquidation_incentive_max: Exp,
}

impl Default for RiskParams {
    fn default() -> Self {
        const E17: u128 = 100_000_000_000_000_000;
        Self {
            close_factor: Exp::from_mantissa(5 * E17),
            liquidation_incentive: Exp::from_mantissa(108 * E17 / 10),
            max_assets: DEFAULT_MAX_ASSETS,
            collateral_factor_max: Exp::from_mantissa(9 * E17),
            close_factor_min: Exp::from_mantissa(E17 / 2),
            close_factor_max: Exp::from_mantissa(9 * E17),
            liquidation_incentive_min: Exp::ONE,
            liquidation_incentive_max: Exp::from_mantissa(15 * E17),
        }
    }
}

/// Controller-side record of one market
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketRecord {
    pub is_listed: bool,
    pub collateral_factor: Exp,
}

/// Risk controller state
#[derive(Debug, Clone)]
pub struct RiskController {
    admin: AccountId,
    params: RiskParams,
    pub(crate) oracle: Arc<dyn PriceOracle>,
    pub(crate) records: HashMap<MarketId, MarketRecord>,
    pub(crate) memberships: HashMap<AccountId, Vec<MarketId>>,
}

impl RiskController {
    pub fn new(admin: AccountId, oracle: Arc<dyn PriceOracle>, params: RiskParams) -> Self {
        Self {
            admin,
            params,
            oracle,
            records: HashMap::new(),
            memberships: HashMap::new(),
        }
    }

    pub fn admin(&self) -> &AccountId {
        &self.admin
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    pub fn oracle(&self) -> &Arc<dyn PriceOracle> {
        &self.oracle
    }

    pub fn record(&self, market: MarketId) -> MarketRecord {
        self.records.get(&market).copied().unwrap_or_default()
    }

    pub fn is_listed(&self, market: MarketId) -> bool {
        self.record(market).is_listed
    }

    pub fn collateral_factor(&self, market: MarketId) -> Exp {
        self.record(market).collateral_factor
    }

    /// Markets the account has entered, in entry order
    pub fn assets_in(&self, account: &AccountId) -> &[MarketId] {
        self.memberships
            .get(account)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn check_membership(&self, account: &AccountId, market: MarketId) -> bool {
        self.assets_in(account).contains(&market)
    }

    /// Soft `Unauthorized` failure unless `caller` is the admin
    pub fn ensure_admin(&self, caller: &AccountId, operation: FailureInfo) -> Result<(), LedgerError> {
        if caller != &self.admin {
            tracing::warn!(caller = %caller, operation = %operation, "Unauthorized admin call");
            return Err(fail_opaque(operation, ControllerError::Unauthorized));
        }
        Ok(())
    }

    pub(crate) fn ensure_listed(&self, market: MarketId) -> Result<(), ControllerError> {
        if !self.is_listed(market) {
            return Err(ControllerError::MarketNotListed);
        }
        Ok(())
    }

    // === Membership ===

    /// Enter `market` so it counts toward the account's liquidity.
    /// Entering a market twice is a no-op.
    pub fn enter_market(&mut self, account: &AccountId, market: MarketId) -> Result<(), LedgerError> {
        self.add_to_market(account, market)
            .map_err(|e| fail_opaque(FailureInfo::EnterMarket, e))?;
        tracing::debug!(account = %account, market = %market, "Market entered");
        Ok(())
    }

    pub(crate) fn add_to_market(
        &mut self,
        account: &AccountId,
        market: MarketId,
    ) -> Result<(), ControllerError> {
        self.ensure_listed(market)?;
        if self.check_membership(account, market) {
            return Ok(());
        }
        if self.assets_in(account).len() >= self.params.max_assets {
            return Err(ControllerError::TooManyAssets);
        }
        self.memberships
            .entry(account.clone())
            .or_default()
            .push(market);
        Ok(())
    }

    /// Leave `market`. Rejected while the account borrows from it, or when
    /// dropping its collateral would leave the account in shortfall.
    pub fn exit_market(
        &mut self,
        markets: &Markets,
        account: &AccountId,
        market: MarketId,
    ) -> Result<(), LedgerError> {
        let reject = |e| fail_opaque(FailureInfo::ExitMarket, e);

        let snapshot = markets
            .market(market, FailureInfo::ExitMarket)?
            .account_snapshot(account)?;
        if !snapshot.borrow_balance.is_zero() {
            return Err(reject(ControllerError::NonzeroBorrowBalance));
        }

        self.redeem_allowed_internal(markets, market, account, snapshot.tokens)
            .map_err(reject)?;

        if !self.check_membership(account, market) {
            return Ok(());
        }
        if let Some(assets) = self.memberships.get_mut(account) {
            assets.retain(|m| *m != market);
        }
        tracing::debug!(account = %account, market = %market, "Market exited");
        Ok(())
    }

    // === Admin ===

    /// List a market created in the ledger
    pub fn support_market(
        &mut self,
        caller: &AccountId,
        markets: &Markets,
        market: MarketId,
    ) -> Result<(), LedgerError> {
        self.ensure_admin(caller, FailureInfo::SupportMarket)?;
        markets.market(market, FailureInfo::SupportMarket)?;
        if self.is_listed(market) {
            return Err(fail_opaque(
                FailureInfo::SupportMarket,
                ControllerError::MarketAlreadyListed,
            ));
        }
        self.records.insert(
            market,
            MarketRecord {
                is_listed: true,
                collateral_factor: Exp::ZERO,
            },
        );
        tracing::info!(market = %market, "Market listed");
        Ok(())
    }

    /// Returns the old factor
    pub fn set_collateral_factor(
        &mut self,
        caller: &AccountId,
        market: MarketId,
        factor: Exp,
    ) -> Result<Exp, LedgerError> {
        let reject = |e| fail_opaque(FailureInfo::SetCollateralFactor, e);
        self.ensure_admin(caller, FailureInfo::SetCollateralFactor)?;
        self.ensure_listed(market).map_err(reject)?;
        if factor >= self.params.collateral_factor_max {
            return Err(reject(ControllerError::InvalidCollateralFactor));
        }
        if !factor.is_zero() && self.oracle.underlying_price(market).is_zero() {
            return Err(reject(ControllerError::PriceError));
        }

        let old = self.collateral_factor(market);
        if let Some(record) = self.records.get_mut(&market) {
            record.collateral_factor = factor;
        }
        tracing::info!(market = %market, old = %old, new = %factor, "Collateral factor updated");
        Ok(old)
    }

    /// Returns the old close factor
    pub fn set_close_factor(&mut self, caller: &AccountId, factor: Exp) -> Result<Exp, LedgerError> {
        self.ensure_admin(caller, FailureInfo::SetCloseFactor)?;
        if factor < self.params.close_factor_min || factor > self.params.close_factor_max {
            return Err(fail_opaque(
                FailureInfo::SetCloseFactor,
                ControllerError::InvalidCloseFactor,
            ));
        }
        let old = std::mem::replace(&mut self.params.close_factor, factor);
        tracing::info!(old = %old, new = %factor, "Close factor updated");
        Ok(old)
    }

    /// Returns the old incentive
    pub fn set_liquidation_incentive(
        &mut self,
        caller: &AccountId,
        incentive: Exp,
    ) -> Result<Exp, LedgerError> {
        self.ensure_admin(caller, FailureInfo::SetLiquidationIncentive)?;
        if incentive < self.params.liquidation_incentive_min
            || incentive > self.params.liquidation_incentive_max
        {
            return Err(fail_opaque(
                FailureInfo::SetLiquidationIncentive,
                ControllerError::InvalidLiquidationIncentive,
            ));
        }
        let old = std::mem::replace(&mut self.params.liquidation_incentive, incentive);
        tracing::info!(old = %old, new = %incentive, "Liquidation incentive updated");
        Ok(old)
    }

    /// Returns the old cap. Existing memberships above the new cap are kept.
    pub fn set_max_assets(&mut self, caller: &AccountId, max_assets: usize) -> Result<usize, LedgerError> {
        self.ensure_admin(caller, FailureInfo::SetMaxAssets)?;
        let old = std::mem::replace(&mut self.params.max_assets, max_assets);
        tracing::info!(old, new = max_assets, "Max assets updated");
        Ok(old)
    }

    /// Underlying price from the oracle, zero when unavailable
    pub fn underlying_price(&self, market: MarketId) -> Exp {
        self.oracle.underlying_price(market)
    }

    /// Maximum a liquidator may repay of `borrow_balance` in one call
    pub fn max_close(&self, borrow_balance: U256) -> Result<U256, ControllerError> {
        Ok(self.params.close_factor.mul_scalar_truncate(borrow_balance)?)
    }
}
