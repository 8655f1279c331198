//! Interest rate models
//!
//! Utilization-based borrow rate curves. Annual parameters are converted to
//! per-block rates once, at construction.

use lendbank_core::{Exp, MathError, U256};
use lendbank_ledger::{utilization_rate, InterestRateModel};
use serde::{Deserialize, Serialize};

/// Approximate number of blocks per year (15s blocks)
pub const BLOCKS_PER_YEAR: u64 = 2_102_400;

/// `base + utilization * multiplier`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitePaperRateModel {
    pub base_rate_per_block: Exp,
    pub multiplier_per_block: Exp,
}

impl WhitePaperRateModel {
    pub fn new(
        base_rate_per_year: Exp,
        multiplier_per_year: Exp,
        blocks_per_year: u64,
    ) -> Result<Self, MathError> {
        let blocks = U256::from(blocks_per_year);
        Ok(Self {
            base_rate_per_block: base_rate_per_year.div_scalar(blocks)?,
            multiplier_per_block: multiplier_per_year.div_scalar(blocks)?,
        })
    }
}

impl InterestRateModel for WhitePaperRateModel {
    fn name(&self) -> &str {
        "white-paper"
    }

    fn borrow_rate(&self, cash: U256, borrows: U256, reserves: U256) -> Result<Exp, MathError> {
        let utilization = utilization_rate(cash, borrows, reserves)?;
        utilization
            .mul(self.multiplier_per_block)?
            .add(self.base_rate_per_block)
    }
}

/// White-paper curve up to `kink` utilization, then a steeper `jump_multiplier`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpRateModel {
    pub base_rate_per_block: Exp,
    pub multiplier_per_block: Exp,
    pub jump_multiplier_per_block: Exp,
    pub kink: Exp,
}

impl JumpRateModel {
    pub fn new(
        base_rate_per_year: Exp,
        multiplier_per_year: Exp,
        jump_multiplier_per_year: Exp,
        kink: Exp,
        blocks_per_year: u64,
    ) -> Result<Self, MathError> {
        let blocks = U256::from(blocks_per_year);
        Ok(Self {
            base_rate_per_block: base_rate_per_year.div_scalar(blocks)?,
            multiplier_per_block: multiplier_per_year.div_scalar(blocks)?,
            jump_multiplier_per_block: jump_multiplier_per_year.div_scalar(blocks)?,
            kink,
        })
    }
}

impl InterestRateModel for JumpRateModel {
    fn name(&self) -> &str {
        "jump-rate"
    }

    fn borrow_rate(&self, cash: U256, borrows: U256, reserves: U256) -> Result<Exp, MathError> {
        let utilization = utilization_rate(cash, borrows, reserves)?;
        if utilization <= self.kink {
            return utilization
                .mul(self.multiplier_per_block)?
                .add(self.base_rate_per_block);
        }
        let normal_rate = self
            .kink
            .mul(self.multiplier_per_block)?
            .add(self.base_rate_per_block)?;
        let excess = utilization.sub(self.kink)?;
        excess.mul(self.jump_multiplier_per_block)?.add(normal_rate)
    }
}
