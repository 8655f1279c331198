//! Underlying token - a minimal fungible token ledger
//!
//! Each market custodies its underlying in an [`Erc20Token`] under the
//! market's vault account. The token can charge a transfer fee (burned)
//! and can be paused, which makes every transfer fail.

use lendbank_core::math::{add, sub};
use lendbank_core::{AccountId, Exp, MathError, U256};
use std::collections::HashMap;
use thiserror::Error;

/// Token transfer failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Insufficient {symbol} balance for {account}: available {available}, required {required}")]
    InsufficientBalance {
        symbol: String,
        account: AccountId,
        available: U256,
        required: U256,
    },

    #[error("Insufficient {symbol} allowance from {owner} to {spender}: available {available}, required {required}")]
    InsufficientAllowance {
        symbol: String,
        owner: AccountId,
        spender: AccountId,
        available: U256,
        required: U256,
    },

    #[error("Token {0} is paused")]
    Paused(String),

    #[error("Arithmetic error: {0}")]
    Math(#[from] MathError),
}

/// Fungible token with balances, allowances, optional fee and pause switch
#[derive(Debug, Clone)]
pub struct Erc20Token {
    symbol: String,
    decimals: u8,
    total_supply: U256,
    balances: HashMap<AccountId, U256>,
    allowances: HashMap<(AccountId, AccountId), U256>,
    /// Fraction of every transfer that is burned
    fee: Exp,
    paused: bool,
}

impl Erc20Token {
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            total_supply: U256::ZERO,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            fee: Exp::ZERO,
            paused: false,
        }
    }

    /// Charge `fee` (a fraction of 1.0) on every transfer
    pub fn with_fee(mut self, fee: Exp) -> Self {
        self.fee = fee;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn fee(&self) -> Exp {
        self.fee
    }

    pub fn set_fee(&mut self, fee: Exp) {
        self.fee = fee;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn balance_of(&self, account: &AccountId) -> U256 {
        self.balances.get(account).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> U256 {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or_default()
    }

    pub fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: U256) {
        self.allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    /// Create new tokens (faucet)
    pub fn mint(&mut self, to: &AccountId, amount: U256) -> Result<(), TransferError> {
        let balance = add(self.balance_of(to), amount)?;
        self.total_supply = add(self.total_supply, amount)?;
        self.balances.insert(to.clone(), balance);
        Ok(())
    }

    /// Move `amount` from `from` to `to`. Returns the amount received
    /// after the fee.
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: U256,
    ) -> Result<U256, TransferError> {
        if self.paused {
            return Err(TransferError::Paused(self.symbol.clone()));
        }

        let available = self.balance_of(from);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                symbol: self.symbol.clone(),
                account: from.clone(),
                available,
                required: amount,
            });
        }

        let fee = self.fee.mul_scalar_truncate(amount)?;
        let received = sub(amount, fee)?;

        self.balances.insert(from.clone(), sub(available, amount)?);
        let to_balance = add(self.balance_of(to), received)?;
        self.balances.insert(to.clone(), to_balance);
        self.total_supply = sub(self.total_supply, fee)?;

        Ok(received)
    }

    /// `transfer` on behalf of `from`, spending `spender`'s allowance.
    /// An allowance of `U256::MAX` is never decremented.
    pub fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: U256,
    ) -> Result<U256, TransferError> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(TransferError::InsufficientAllowance {
                symbol: self.symbol.clone(),
                owner: from.clone(),
                spender: spender.clone(),
                available: allowance,
                required: amount,
            });
        }

        let received = self.transfer(from, to, amount)?;
        if allowance != U256::MAX {
            self.approve(from, spender, sub(allowance, amount)?);
        }
        Ok(received)
    }
}
