//! Market - per-asset lending pool bookkeeping
//!
//! A market tracks claim-token supply, borrows, reserves and the borrow
//! index for one underlying asset. Its cash is whatever underlying the
//! market's vault account holds in the underlying token.
//!
//! # Invariants
//! - `exchange_rate * total_supply` is within one `total_supply` unit of
//!   `cash + total_borrows - total_reserves`
//! - The sum of account claim-token balances equals `total_supply`
//! - `borrow_index` never decreases
//! - A mutation only happens at the block the market was accrued to

use lendbank_core::math::{add, div, mul, sub};
use lendbank_core::{AccountId, Exp, MarketId, MathError, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{fail, ErrorCode, FailureInfo, LedgerError};
use crate::rate_model::{blocks_elapsed, InterestRateModel};
use crate::token::Erc20Token;

/// Default ceiling on the per-block borrow rate (0.0005% per block)
pub const DEFAULT_BORROW_RATE_MAX: Exp = Exp::new(U256::from_limbs([5_000_000_000_000, 0, 0, 0]));

/// Parameters fixed when a market is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    pub symbol: String,
    /// Exchange rate used while `total_supply` is zero
    pub initial_exchange_rate: Exp,
    pub reserve_factor: Exp,
    /// Cash a redeem may never take the market below
    pub minimum_underlying: U256,
    pub borrow_rate_max: Exp,
}

impl MarketParams {
    pub fn new(symbol: impl Into<String>, initial_exchange_rate: Exp) -> Self {
        Self {
            symbol: symbol.into(),
            initial_exchange_rate,
            reserve_factor: Exp::ZERO,
            minimum_underlying: U256::ZERO,
            borrow_rate_max: DEFAULT_BORROW_RATE_MAX,
        }
    }

    pub fn with_reserve_factor(mut self, reserve_factor: Exp) -> Self {
        self.reserve_factor = reserve_factor;
        self
    }

    pub fn with_minimum_underlying(mut self, minimum_underlying: U256) -> Self {
        self.minimum_underlying = minimum_underlying;
        self
    }

    pub fn with_borrow_rate_max(mut self, borrow_rate_max: Exp) -> Self {
        self.borrow_rate_max = borrow_rate_max;
        self
    }
}

/// Borrow principal as of the last interaction, and the index it was taken at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowSnapshot {
    pub principal: U256,
    pub interest_index: Exp,
}

/// One account's position in one market
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPosition {
    pub tokens: U256,
    pub borrow: BorrowSnapshot,
}

/// Account view used by liquidity calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub tokens: U256,
    pub borrow_balance: U256,
    pub exchange_rate: Exp,
}

/// Result of one interest accrual
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accrual {
    pub cash_prior: U256,
    pub interest_accumulated: U256,
    pub borrow_index: Exp,
    pub total_borrows: U256,
    pub total_reserves: U256,
}

/// One lending pool
#[derive(Debug, Clone)]
pub struct Market {
    pub(crate) id: MarketId,
    pub(crate) params: MarketParams,
    pub(crate) underlying: Erc20Token,
    pub(crate) rate_model: Arc<dyn InterestRateModel>,
    pub(crate) accrual_block: u64,
    pub(crate) borrow_index: Exp,
    pub(crate) total_supply: U256,
    pub(crate) total_borrows: U256,
    pub(crate) total_reserves: U256,
    pub(crate) positions: BTreeMap<AccountId, AccountPosition>,
    /// Claim-token allowances (owner, spender)
    pub(crate) allowances: HashMap<(AccountId, AccountId), U256>,
}

impl Market {
    pub fn new(
        id: MarketId,
        params: MarketParams,
        underlying: Erc20Token,
        rate_model: Arc<dyn InterestRateModel>,
        block: u64,
    ) -> Self {
        Self {
            id,
            params,
            underlying,
            rate_model,
            accrual_block: block,
            borrow_index: Exp::ONE,
            total_supply: U256::ZERO,
            total_borrows: U256::ZERO,
            total_reserves: U256::ZERO,
            positions: BTreeMap::new(),
            allowances: HashMap::new(),
        }
    }

    pub fn id(&self) -> MarketId {
        self.id
    }

    pub fn symbol(&self) -> &str {
        &self.params.symbol
    }

    pub fn params(&self) -> &MarketParams {
        &self.params
    }

    /// Account holding this market's underlying
    pub fn vault(&self) -> AccountId {
        self.id.vault()
    }

    pub fn underlying(&self) -> &Erc20Token {
        &self.underlying
    }

    pub fn underlying_mut(&mut self) -> &mut Erc20Token {
        &mut self.underlying
    }

    pub fn rate_model(&self) -> &Arc<dyn InterestRateModel> {
        &self.rate_model
    }

    pub fn accrual_block(&self) -> u64 {
        self.accrual_block
    }

    pub fn borrow_index(&self) -> Exp {
        self.borrow_index
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn total_borrows(&self) -> U256 {
        self.total_borrows
    }

    pub fn total_reserves(&self) -> U256 {
        self.total_reserves
    }

    pub fn reserve_factor(&self) -> Exp {
        self.params.reserve_factor
    }

    pub fn minimum_underlying(&self) -> U256 {
        self.params.minimum_underlying
    }

    /// Underlying held by the market
    pub fn cash(&self) -> U256 {
        self.underlying.balance_of(&self.vault())
    }

    pub fn is_fresh(&self, block: u64) -> bool {
        self.accrual_block == block
    }

    /// Claim-token balance
    pub fn balance_of(&self, account: &AccountId) -> U256 {
        self.positions
            .get(account)
            .map(|p| p.tokens)
            .unwrap_or_default()
    }

    pub fn borrow_snapshot(&self, account: &AccountId) -> BorrowSnapshot {
        self.positions
            .get(account)
            .map(|p| p.borrow)
            .unwrap_or_default()
    }

    /// All positions, including ones whose balances went back to zero
    pub fn positions(&self) -> impl Iterator<Item = (&AccountId, &AccountPosition)> {
        self.positions.iter()
    }

    /// Claim-token allowance granted by `owner` to `spender`
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> U256 {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// `(cash + total_borrows - total_reserves) / total_supply`, or the
    /// initial exchange rate while nothing is supplied
    pub fn exchange_rate_stored(&self) -> Result<Exp, MathError> {
        if self.total_supply.is_zero() {
            return Ok(self.params.initial_exchange_rate);
        }
        let cash_plus_borrows_minus_reserves =
            sub(add(self.cash(), self.total_borrows)?, self.total_reserves)?;
        Exp::from_ratio(cash_plus_borrows_minus_reserves, self.total_supply)
    }

    /// `principal * borrow_index / interest_index`, without accruing
    pub fn borrow_balance_stored(&self, account: &AccountId) -> Result<U256, MathError> {
        let snapshot = self.borrow_snapshot(account);
        if snapshot.principal.is_zero() {
            return Ok(U256::ZERO);
        }
        let principal_times_index = mul(snapshot.principal, self.borrow_index.mantissa)?;
        div(principal_times_index, snapshot.interest_index.mantissa)
    }

    /// Claim-token balance valued in underlying at the stored exchange rate
    pub fn balance_of_underlying_stored(&self, account: &AccountId) -> Result<U256, MathError> {
        self.exchange_rate_stored()?
            .mul_scalar_truncate(self.balance_of(account))
    }

    pub fn account_snapshot(&self, account: &AccountId) -> Result<AccountSnapshot, MathError> {
        Ok(AccountSnapshot {
            tokens: self.balance_of(account),
            borrow_balance: self.borrow_balance_stored(account)?,
            exchange_rate: self.exchange_rate_stored()?,
        })
    }

    pub fn borrow_rate_per_block(&self) -> Result<Exp, MathError> {
        self.rate_model
            .borrow_rate(self.cash(), self.total_borrows, self.total_reserves)
    }

    pub fn supply_rate_per_block(&self) -> Result<Exp, MathError> {
        self.rate_model.supply_rate(
            self.cash(),
            self.total_borrows,
            self.total_reserves,
            self.params.reserve_factor,
        )
    }

    /// Apply interest from the last accrual block up to `block`.
    ///
    /// Returns `None` when the market is already fresh. A borrow rate above
    /// the configured ceiling aborts instead of being clamped.
    pub fn accrue_interest(&mut self, block: u64) -> Result<Option<Accrual>, LedgerError> {
        if self.accrual_block == block {
            return Ok(None);
        }

        let cash_prior = self.cash();
        let borrows_prior = self.total_borrows;
        let reserves_prior = self.total_reserves;
        let index_prior = self.borrow_index;

        let borrow_rate = self
            .rate_model
            .borrow_rate(cash_prior, borrows_prior, reserves_prior)?;
        if borrow_rate > self.params.borrow_rate_max {
            tracing::error!(
                market = %self.id,
                rate = %borrow_rate,
                max = %self.params.borrow_rate_max,
                "Borrow rate above ceiling"
            );
            return Err(LedgerError::BorrowRateTooHigh {
                rate: borrow_rate,
                max: self.params.borrow_rate_max,
            });
        }

        let block_delta = blocks_elapsed(self.accrual_block, block)?;
        let simple_interest_factor = borrow_rate.mul_scalar(block_delta)?;
        let interest_accumulated = simple_interest_factor.mul_scalar_truncate(borrows_prior)?;
        let total_borrows = add(interest_accumulated, borrows_prior)?;
        let total_reserves = self
            .params
            .reserve_factor
            .mul_scalar_truncate_add(interest_accumulated, reserves_prior)?;
        let borrow_index = Exp::new(
            simple_interest_factor
                .mul_scalar_truncate_add(index_prior.mantissa, index_prior.mantissa)?,
        );

        self.accrual_block = block;
        self.borrow_index = borrow_index;
        self.total_borrows = total_borrows;
        self.total_reserves = total_reserves;

        tracing::debug!(
            market = %self.id,
            block,
            interest = %interest_accumulated,
            borrow_index = %borrow_index,
            "Interest accrued"
        );

        Ok(Some(Accrual {
            cash_prior,
            interest_accumulated,
            borrow_index,
            total_borrows,
            total_reserves,
        }))
    }

    /// Soft precondition check for pulling `amount` from `from`
    pub(crate) fn check_transfer_in(
        &self,
        from: &AccountId,
        amount: U256,
        operation: FailureInfo,
    ) -> Result<(), LedgerError> {
        if self.underlying.allowance(from, &self.vault()) < amount {
            return Err(fail(operation, ErrorCode::InsufficientAllowance));
        }
        if self.underlying.balance_of(from) < amount {
            return Err(fail(operation, ErrorCode::InsufficientBalance));
        }
        Ok(())
    }

    /// Pull `amount` of underlying into the vault and verify the realized
    /// balance change. Any shortfall (e.g. a transfer fee) aborts.
    pub(crate) fn do_transfer_in(
        &mut self,
        from: &AccountId,
        amount: U256,
    ) -> Result<U256, LedgerError> {
        let vault = self.vault();
        let expected = add(self.underlying.balance_of(&vault), amount)?;
        self.underlying.transfer_from(&vault, from, &vault, amount)?;
        let realized = self.underlying.balance_of(&vault);
        if realized != expected {
            tracing::error!(
                market = %self.id,
                expected = %expected,
                realized = %realized,
                "Transfer-in balance mismatch"
            );
            return Err(LedgerError::BalanceMismatch { expected, realized });
        }
        Ok(amount)
    }

    /// Send `amount` of underlying out of the vault. Failure aborts.
    pub(crate) fn do_transfer_out(&mut self, to: &AccountId, amount: U256) -> Result<(), LedgerError> {
        let vault = self.vault();
        self.underlying.transfer(&vault, to, amount)?;
        Ok(())
    }

    pub(crate) fn position_mut(&mut self, account: &AccountId) -> &mut AccountPosition {
        self.positions.entry(account.clone()).or_default()
    }
}
