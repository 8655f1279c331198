//! Ledger errors
//!
//! Two tiers:
//! - [`LedgerError::Rejected`]: a soft failure. The operation made no
//!   effects of its own and the caller decides what to do with the code.
//! - Everything else: the whole transaction must be discarded.

use lendbank_core::{Exp, MathError, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::hooks::ControllerError;
use crate::token::TransferError;

/// Error codes carried by soft failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    BadInput,
    ControllerRejection,
    InvalidAccountPair,
    InvalidCloseAmountRequested,
    MarketNotFresh,
    MarketNotListed,
    InsufficientCash,
    InsufficientBalance,
    InsufficientAllowance,
    InsufficientLiquidity,
    PriceError,
    InsufficientUnderlying,
}

impl ErrorCode {
    /// Human-readable reason
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "caller is not authorized",
            ErrorCode::BadInput => "bad input",
            ErrorCode::ControllerRejection => "rejected by risk controller",
            ErrorCode::InvalidAccountPair => "borrower and liquidator must differ",
            ErrorCode::InvalidCloseAmountRequested => "invalid close amount requested",
            ErrorCode::MarketNotFresh => "market interest not accrued to current block",
            ErrorCode::MarketNotListed => "market not listed",
            ErrorCode::InsufficientCash => "insufficient cash",
            ErrorCode::InsufficientBalance => "insufficient balance",
            ErrorCode::InsufficientAllowance => "insufficient allowance",
            ErrorCode::InsufficientLiquidity => "insufficient liquidity",
            ErrorCode::PriceError => "price unavailable",
            ErrorCode::InsufficientUnderlying => "underlying balance less than required",
        }
    }
}

impl From<ControllerError> for ErrorCode {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::Unauthorized => ErrorCode::Unauthorized,
            ControllerError::MarketNotListed => ErrorCode::MarketNotListed,
            ControllerError::InsufficientLiquidity => ErrorCode::InsufficientLiquidity,
            ControllerError::PriceError => ErrorCode::PriceError,
            _ => ErrorCode::ControllerRejection,
        }
    }
}

/// The operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureInfo {
    AccrueInterest,
    Mint,
    Redeem,
    Borrow,
    RepayBorrow,
    LiquidateBorrow,
    Seize,
    Transfer,
    AddReserves,
    ReduceReserves,
    SetReserveFactor,
    SetInterestRateModel,
    EnterMarket,
    ExitMarket,
    SupportMarket,
    SetCollateralFactor,
    SetCloseFactor,
    SetLiquidationIncentive,
    SetMaxAssets,
}

/// Structured failure record: operation + code + controller sub-reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub operation: FailureInfo,
    pub error: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ControllerError>,
}

impl Failure {
    pub fn new(operation: FailureInfo, error: ErrorCode) -> Self {
        Self {
            operation,
            error,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: ControllerError) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.error.message())?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Errors that can occur in ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Soft failure: no effects were made by the failing operation
    #[error("{0}")]
    Rejected(Failure),

    /// A soft failure escalated to a transaction abort
    #[error("Aborted: {0}")]
    Aborted(Failure),

    #[error("Arithmetic error: {0}")]
    Math(#[from] MathError),

    #[error("Token transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Token balance mismatch: expected {expected}, realized {realized}")]
    BalanceMismatch { expected: U256, realized: U256 },

    #[error("Borrow rate {rate} exceeds ceiling {max}")]
    BorrowRateTooHigh { rate: Exp, max: Exp },
}

impl LedgerError {
    /// Whether the enclosing transaction must be discarded
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LedgerError::Rejected(_))
    }

    /// The structured failure, for soft and escalated failures
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            LedgerError::Rejected(failure) | LedgerError::Aborted(failure) => Some(failure),
            _ => None,
        }
    }

    /// Error code of a soft or escalated failure
    pub fn code(&self) -> Option<ErrorCode> {
        self.failure().map(|f| f.error)
    }

    /// Turn a soft failure into an abort
    pub fn escalate(self) -> Self {
        match self {
            LedgerError::Rejected(failure) => LedgerError::Aborted(failure),
            other => other,
        }
    }
}

/// Soft failure with a ledger code
pub fn fail(operation: FailureInfo, error: ErrorCode) -> LedgerError {
    LedgerError::Rejected(Failure::new(operation, error))
}

/// Soft failure carrying the controller's reason.
///
/// Arithmetic errors raised while the controller evaluated a hook are not
/// soft: they abort like any other ledger arithmetic error.
pub fn fail_opaque(operation: FailureInfo, detail: ControllerError) -> LedgerError {
    if let ControllerError::Math(e) = detail {
        return LedgerError::Math(e);
    }
    LedgerError::Rejected(Failure::new(operation, ErrorCode::from(detail)).with_detail(detail))
}
