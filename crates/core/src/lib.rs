//! LendBank Core - Domain primitives shared by every crate
//!
//! - [`Exp`]: 1e18-scaled fixed-point mantissa with checked arithmetic
//! - [`MarketId`] / [`AccountId`]: typed identifiers

pub mod ids;
pub mod math;

pub use alloy_primitives::U256;
pub use ids::{AccountId, IdError, MarketId};
pub use math::{DecimalError, Exp, MathError, EXP_SCALE};
