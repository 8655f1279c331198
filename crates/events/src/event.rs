//! Protocol events
//!
//! One variant per observable state change, plus `Failure` for soft
//! rejections. Amounts are raw token units, factors are 1e18 mantissas.

use chrono::{DateTime, Utc};
use lendbank_core::{AccountId, Exp, MarketId, U256};
use lendbank_ledger::Failure;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    MarketCreated {
        market: MarketId,
        symbol: String,
        underlying: String,
    },
    MarketListed {
        market: MarketId,
    },
    AccrueInterest {
        market: MarketId,
        cash_prior: U256,
        interest_accumulated: U256,
        borrow_index: Exp,
        total_borrows: U256,
    },
    Mint {
        market: MarketId,
        minter: AccountId,
        mint_amount: U256,
        mint_tokens: U256,
    },
    Redeem {
        market: MarketId,
        redeemer: AccountId,
        redeem_amount: U256,
        redeem_tokens: U256,
    },
    Borrow {
        market: MarketId,
        borrower: AccountId,
        borrow_amount: U256,
        account_borrows: U256,
        total_borrows: U256,
    },
    RepayBorrow {
        market: MarketId,
        payer: AccountId,
        borrower: AccountId,
        repay_amount: U256,
        account_borrows: U256,
        total_borrows: U256,
    },
    LiquidateBorrow {
        borrowed: MarketId,
        collateral: MarketId,
        liquidator: AccountId,
        borrower: AccountId,
        repay_amount: U256,
        seize_tokens: U256,
    },
    Transfer {
        market: MarketId,
        from: AccountId,
        to: AccountId,
        amount: U256,
    },
    Approval {
        market: MarketId,
        owner: AccountId,
        spender: AccountId,
        amount: U256,
    },
    MarketEntered {
        market: MarketId,
        account: AccountId,
    },
    MarketExited {
        market: MarketId,
        account: AccountId,
    },
    NewCollateralFactor {
        market: MarketId,
        old: Exp,
        new: Exp,
    },
    NewCloseFactor {
        old: Exp,
        new: Exp,
    },
    NewLiquidationIncentive {
        old: Exp,
        new: Exp,
    },
    NewMaxAssets {
        old: usize,
        new: usize,
    },
    NewReserveFactor {
        market: MarketId,
        old: Exp,
        new: Exp,
    },
    ReservesAdded {
        market: MarketId,
        benefactor: AccountId,
        amount: U256,
        total_reserves: U256,
    },
    ReservesReduced {
        market: MarketId,
        recipient: AccountId,
        amount: U256,
        total_reserves: U256,
    },
    NewInterestRateModel {
        market: MarketId,
        old: String,
        new: String,
    },
    Failure {
        failure: Failure,
    },
}

impl ProtocolEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, ProtocolEvent::Failure { .. })
    }

    /// Market the event is about, if it concerns exactly one
    pub fn market(&self) -> Option<MarketId> {
        use ProtocolEvent::*;
        match self {
            MarketCreated { market, .. }
            | MarketListed { market }
            | AccrueInterest { market, .. }
            | Mint { market, .. }
            | Redeem { market, .. }
            | Borrow { market, .. }
            | RepayBorrow { market, .. }
            | Transfer { market, .. }
            | Approval { market, .. }
            | MarketEntered { market, .. }
            | MarketExited { market, .. }
            | NewCollateralFactor { market, .. }
            | NewReserveFactor { market, .. }
            | ReservesAdded { market, .. }
            | ReservesReduced { market, .. }
            | NewInterestRateModel { market, .. } => Some(*market),
            LiquidateBorrow { .. }
            | NewCloseFactor { .. }
            | NewLiquidationIncentive { .. }
            | NewMaxAssets { .. }
            | Failure { .. } => None,
        }
    }
}

/// A journaled event. Events produced by the same transaction share a
/// correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub correlation_id: Uuid,
    pub block: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: ProtocolEvent,
}

impl EventRecord {
    pub fn new(sequence: u64, correlation_id: Uuid, block: u64, event: ProtocolEvent) -> Self {
        Self {
            sequence,
            correlation_id,
            block,
            recorded_at: Utc::now(),
            event,
        }
    }
}
