//! Interest rate model interface
//!
//! A market asks its model for the per-block borrow rate on every accrual.

use lendbank_core::math::{add_then_sub, sub};
use lendbank_core::{Exp, MathError, U256};
use std::fmt::Debug;

/// Per-block borrow and supply rates as a function of market utilization
pub trait InterestRateModel: Debug + Send + Sync {
    /// Short identifier used in logs and events
    fn name(&self) -> &str;

    /// Per-block borrow rate
    fn borrow_rate(&self, cash: U256, borrows: U256, reserves: U256) -> Result<Exp, MathError>;

    /// Per-block supply rate: `utilization * borrowRate * (1 - reserveFactor)`
    fn supply_rate(
        &self,
        cash: U256,
        borrows: U256,
        reserves: U256,
        reserve_factor: Exp,
    ) -> Result<Exp, MathError> {
        let one_minus_reserve_factor = Exp::ONE.sub(reserve_factor)?;
        let borrow_rate = self.borrow_rate(cash, borrows, reserves)?;
        let rate_to_pool = borrow_rate.mul(one_minus_reserve_factor)?;
        utilization_rate(cash, borrows, reserves)?.mul(rate_to_pool)
    }
}

/// `borrows / (cash + borrows - reserves)`, zero when nothing is borrowed
pub fn utilization_rate(cash: U256, borrows: U256, reserves: U256) -> Result<Exp, MathError> {
    if borrows.is_zero() {
        return Ok(Exp::ZERO);
    }
    let total = add_then_sub(cash, borrows, reserves)?;
    Exp::from_ratio(borrows, total)
}

/// Blocks elapsed between two accrual points
pub fn blocks_elapsed(from: u64, to: u64) -> Result<U256, MathError> {
    sub(U256::from(to), U256::from(from))
}
