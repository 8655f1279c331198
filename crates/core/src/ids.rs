//! Identifiers - typed handles for markets and accounts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Empty account id")]
    EmptyAccount,

    #[error("Invalid market id: {0}")]
    InvalidMarket(String),
}

/// Handle of a market inside the market registry.
///
/// Issued by the registry when a market is created; stable for the
/// lifetime of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(u32);

impl MarketId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position in the registry arena
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Account that custodies this market's underlying tokens.
    ///
    /// Lowercase, so no id built by [`AccountId::new`] can alias it.
    pub fn vault(&self) -> AccountId {
        AccountId(format!("vault:market#{}", self.0))
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "market#{}", self.0)
    }
}

impl FromStr for MarketId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("market#").unwrap_or(s);
        digits
            .parse::<u32>()
            .map(MarketId)
            .map_err(|_| IdError::InvalidMarket(s.to_string()))
    }
}

/// Account identifier (user, liquidator, market vault).
///
/// Normalized to uppercase so `alice` and `ALICE` are the same account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(IdError::EmptyAccount);
        }
        Ok(Self::new(s))
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
