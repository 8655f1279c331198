//! Fixed-point math over 256-bit unsigned integers
//!
//! Ratios, rates, factors and prices are stored as mantissas scaled by 1e18.
//! Every operation is checked: overflow, underflow and division by zero are
//! reported as [`MathError`] and never wrap or saturate.
//!
//! All division truncates toward zero (floor for unsigned values).
//!
//! # Example
//! ```
//! use lendbank_core::{Exp, U256};
//!
//! // 1.5 * 10 = 15
//! let rate = Exp::from_ratio(U256::from(3), U256::from(2)).unwrap();
//! assert_eq!(rate.mul_scalar_truncate(U256::from(10)).unwrap(), U256::from(15));
//!
//! // Division by zero is reported, not panicked on
//! assert!(Exp::from_ratio(U256::from(1), U256::ZERO).is_err());
//! ```

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 1e18, the mantissa of 1.0
pub const EXP_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Arithmetic failures. Any of these aborts the enclosing ledger operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathError {
    #[error("integer overflow")]
    Overflow,

    #[error("integer underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,
}

/// Errors converting a human-readable decimal into a mantissa
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecimalError {
    #[error("Mantissa cannot be negative: {0}")]
    Negative(Decimal),

    #[error("Decimal has more than 18 fractional digits: {0}")]
    TooPrecise(Decimal),

    #[error(transparent)]
    Math(#[from] MathError),
}

/// Checked addition
#[inline]
pub fn add(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// Checked subtraction; a negative result is an underflow
#[inline]
pub fn sub(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

/// Checked multiplication
#[inline]
pub fn mul(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

/// Checked truncating division
#[inline]
pub fn div(a: U256, b: U256) -> Result<U256, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    Ok(a / b)
}

/// `a + b - c`, checked at each step
pub fn add_then_sub(a: U256, b: U256, c: U256) -> Result<U256, MathError> {
    sub(add(a, b)?, c)
}

/// `floor(product(numerators) / product(denominators))` as a single ratio.
///
/// Both products are formed in full before the one division, so no
/// precision is lost to intermediate truncation. A product that exceeds
/// 256 bits is an overflow.
pub fn ratio_floor(numerators: &[U256], denominators: &[U256]) -> Result<U256, MathError> {
    let numerator = numerators
        .iter()
        .try_fold(U256::from(1), |acc, &factor| mul(acc, factor))?;
    let denominator = denominators
        .iter()
        .try_fold(U256::from(1), |acc, &factor| mul(acc, factor))?;
    div(numerator, denominator)
}

/// `floor(scalar / divisor)` where `divisor` is a mantissa
pub fn div_scalar_by_exp_truncate(scalar: U256, divisor: Exp) -> Result<U256, MathError> {
    div(mul(scalar, EXP_SCALE)?, divisor.mantissa)
}

/// A fixed-point number: `mantissa / 1e18`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Exp {
    pub mantissa: U256,
}

impl Exp {
    pub const ZERO: Self = Self {
        mantissa: U256::ZERO,
    };

    pub const ONE: Self = Self {
        mantissa: EXP_SCALE,
    };

    /// Wrap a raw mantissa
    #[inline]
    pub const fn new(mantissa: U256) -> Self {
        Self { mantissa }
    }

    /// Mantissa from a `u128` literal (e.g. `Exp::from_mantissa(5 * 10u128.pow(17))` is 0.5)
    #[inline]
    pub fn from_mantissa(mantissa: u128) -> Self {
        Self::new(U256::from(mantissa))
    }

    /// `num / denom` as a mantissa
    pub fn from_ratio(num: U256, denom: U256) -> Result<Self, MathError> {
        Ok(Self::new(div(mul(num, EXP_SCALE)?, denom)?))
    }

    /// Convert a decimal such as `0.75` into its mantissa.
    ///
    /// Rejects negative values and values with more than 18 fractional
    /// digits (they cannot be represented exactly).
    pub fn from_decimal(value: Decimal) -> Result<Self, DecimalError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DecimalError::Negative(value));
        }
        let normalized = value.normalize();
        let scale = normalized.scale();
        if scale > 18 {
            return Err(DecimalError::TooPrecise(value));
        }
        let digits = U256::from(normalized.mantissa().unsigned_abs());
        let factor = pow10(18 - scale)?;
        Ok(Self::new(mul(digits, factor)?))
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    pub fn add(self, other: Exp) -> Result<Exp, MathError> {
        Ok(Exp::new(add(self.mantissa, other.mantissa)?))
    }

    pub fn sub(self, other: Exp) -> Result<Exp, MathError> {
        Ok(Exp::new(sub(self.mantissa, other.mantissa)?))
    }

    /// `self * scalar`, still scaled
    pub fn mul_scalar(self, scalar: U256) -> Result<Exp, MathError> {
        Ok(Exp::new(mul(self.mantissa, scalar)?))
    }

    /// `floor(self * scalar)`
    pub fn mul_scalar_truncate(self, scalar: U256) -> Result<U256, MathError> {
        Ok(self.mul_scalar(scalar)?.truncate())
    }

    /// `floor(self * scalar) + addend`
    pub fn mul_scalar_truncate_add(self, scalar: U256, addend: U256) -> Result<U256, MathError> {
        add(self.mul_scalar_truncate(scalar)?, addend)
    }

    /// `self * other`, truncated to 18 decimals
    pub fn mul(self, other: Exp) -> Result<Exp, MathError> {
        Ok(Exp::new(mul(self.mantissa, other.mantissa)? / EXP_SCALE))
    }

    /// `self / other`, truncated to 18 decimals
    pub fn div(self, other: Exp) -> Result<Exp, MathError> {
        Exp::from_ratio(self.mantissa, other.mantissa)
    }

    /// `self / scalar`
    pub fn div_scalar(self, scalar: U256) -> Result<Exp, MathError> {
        Ok(Exp::new(div(self.mantissa, scalar)?))
    }

    /// Integer part
    #[inline]
    pub fn truncate(self) -> U256 {
        self.mantissa / EXP_SCALE
    }
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.mantissa / EXP_SCALE;
        let frac = self.mantissa % EXP_SCALE;
        if frac.is_zero() {
            return write!(f, "{int}");
        }
        let digits = format!("{:0>18}", frac.to_string());
        write!(f, "{int}.{}", digits.trim_end_matches('0'))
    }
}

impl From<U256> for Exp {
    fn from(mantissa: U256) -> Self {
        Exp::new(mantissa)
    }
}

fn pow10(exp: u32) -> Result<U256, MathError> {
    (0..exp).try_fold(U256::from(1), |acc, _| mul(acc, U256::from(10)))
}
