//! LendBank Ledger - Per-market lending bookkeeping
//!
//! All balance-changing state of the protocol lives here: claim-token
//! supply, borrow snapshots, reserves and the borrow index of every market.
//!
//! # Key Types
//! - `Market` / `Markets`: one lending pool, and the arena holding them
//! - `RiskHooks`: authorization seam implemented by the risk controller
//! - `LedgerError`: soft (`Rejected`) vs fatal failures
//! - `Erc20Token`: the underlying token each market custodies

pub mod borrow;
pub mod error;
pub mod hooks;
pub mod market;
pub mod markets;
pub mod rate_model;
pub mod reserves;
pub mod supply;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use borrow::{borrow_fresh, repay_borrow_fresh, seize, BorrowReceipt, RepayReceipt};
pub use error::{fail, fail_opaque, ErrorCode, Failure, FailureInfo, LedgerError};
pub use hooks::{ControllerError, ListedMarket, RiskHooks};
pub use market::{
    AccountPosition, AccountSnapshot, Accrual, BorrowSnapshot, Market, MarketParams,
    DEFAULT_BORROW_RATE_MAX,
};
pub use markets::Markets;
pub use rate_model::{utilization_rate, InterestRateModel};
pub use reserves::{
    add_reserves_fresh, reduce_reserves_fresh, set_interest_rate_model_fresh,
    set_reserve_factor_fresh,
};
pub use supply::{
    approve, mint_fresh, redeem_fresh, transfer_tokens, MintReceipt, RedeemAmount, RedeemReceipt,
};
pub use token::{Erc20Token, TransferError};
