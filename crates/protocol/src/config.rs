//! Protocol configuration
//!
//! Loaded from JSON. Human-facing factors are decimals ("0.75") and are
//! converted to 1e18 mantissas when the protocol is built.

use lendbank_core::{AccountId, DecimalError, Exp, IdError, MathError, U256};
use lendbank_ledger::{InterestRateModel, MarketParams, DEFAULT_BORROW_RATE_MAX};
use lendbank_risk::{JumpRateModel, RiskParams, WhitePaperRateModel, BLOCKS_PER_YEAR};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {source}")]
    Decimal {
        field: &'static str,
        #[source]
        source: DecimalError,
    },

    #[error("Invalid admin account: {0}")]
    Admin(#[from] IdError),

    #[error("Arithmetic error: {0}")]
    Math(#[from] MathError),
}

fn default_admin() -> String {
    "ADMIN".to_string()
}

fn default_close_factor() -> Decimal {
    dec!(0.5)
}

fn default_liquidation_incentive() -> Decimal {
    dec!(1.08)
}

fn default_max_assets() -> usize {
    lendbank_risk::DEFAULT_MAX_ASSETS
}

fn default_blocks_per_year() -> u64 {
    BLOCKS_PER_YEAR
}

fn default_decimals() -> u8 {
    18
}

fn default_initial_exchange_rate() -> Decimal {
    dec!(0.02)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_admin")]
    pub admin: String,

    #[serde(default = "default_close_factor")]
    pub close_factor: Decimal,

    #[serde(default = "default_liquidation_incentive")]
    pub liquidation_incentive: Decimal,

    #[serde(default = "default_max_assets")]
    pub max_assets: usize,

    /// Used to convert annual rate-model parameters to per-block rates
    #[serde(default = "default_blocks_per_year")]
    pub blocks_per_year: u64,

    #[serde(default)]
    pub start_block: u64,

    /// Directory for the JSONL event journal; in-memory only when absent
    #[serde(default)]
    pub journal_path: Option<PathBuf>,

    #[serde(default)]
    pub markets: Vec<MarketConfig>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            admin: default_admin(),
            close_factor: default_close_factor(),
            liquidation_incentive: default_liquidation_incentive(),
            max_assets: default_max_assets(),
            blocks_per_year: default_blocks_per_year(),
            start_block: 0,
            journal_path: None,
            markets: Vec::new(),
        }
    }
}

impl ProtocolConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn admin(&self) -> Result<AccountId, ConfigError> {
        Ok(self.admin.parse()?)
    }

    /// Default bounds with this config's current values
    pub fn risk_params(&self) -> Result<RiskParams, ConfigError> {
        Ok(RiskParams {
            close_factor: to_exp("close_factor", self.close_factor)?,
            liquidation_incentive: to_exp("liquidation_incentive", self.liquidation_incentive)?,
            max_assets: self.max_assets,
            ..RiskParams::default()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Claim token symbol, e.g. "cUSDC"
    pub symbol: String,

    /// Underlying token symbol, e.g. "USDC"
    pub underlying: String,

    #[serde(default = "default_decimals")]
    pub decimals: u8,

    #[serde(default = "default_initial_exchange_rate")]
    pub initial_exchange_rate: Decimal,

    #[serde(default)]
    pub reserve_factor: Decimal,

    /// Applied after listing; a nonzero factor needs an oracle price
    #[serde(default)]
    pub collateral_factor: Decimal,

    /// Cash a redeem must leave behind, in underlying units
    #[serde(default)]
    pub minimum_underlying: u128,

    /// Per-block borrow rate ceiling
    #[serde(default)]
    pub borrow_rate_max: Option<Decimal>,

    #[serde(default)]
    pub rate_model: RateModelConfig,
}

impl MarketConfig {
    pub fn params(&self) -> Result<MarketParams, ConfigError> {
        let borrow_rate_max = match self.borrow_rate_max {
            Some(max) => to_exp("borrow_rate_max", max)?,
            None => DEFAULT_BORROW_RATE_MAX,
        };
        Ok(MarketParams::new(
            self.symbol.clone(),
            to_exp("initial_exchange_rate", self.initial_exchange_rate)?,
        )
        .with_reserve_factor(to_exp("reserve_factor", self.reserve_factor)?)
        .with_minimum_underlying(U256::from(self.minimum_underlying))
        .with_borrow_rate_max(borrow_rate_max))
    }

    pub fn collateral_factor(&self) -> Result<Exp, ConfigError> {
        to_exp("collateral_factor", self.collateral_factor)
    }
}

/// Annual rate-model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateModelConfig {
    WhitePaper {
        base_rate_per_year: Decimal,
        multiplier_per_year: Decimal,
    },
    JumpRate {
        base_rate_per_year: Decimal,
        multiplier_per_year: Decimal,
        jump_multiplier_per_year: Decimal,
        kink: Decimal,
    },
}

impl Default for RateModelConfig {
    fn default() -> Self {
        RateModelConfig::WhitePaper {
            base_rate_per_year: dec!(0.02),
            multiplier_per_year: dec!(0.2),
        }
    }
}

impl RateModelConfig {
    pub fn build(&self, blocks_per_year: u64) -> Result<Arc<dyn InterestRateModel>, ConfigError> {
        let model: Arc<dyn InterestRateModel> = match self {
            RateModelConfig::WhitePaper {
                base_rate_per_year,
                multiplier_per_year,
            } => Arc::new(WhitePaperRateModel::new(
                to_exp("base_rate_per_year", *base_rate_per_year)?,
                to_exp("multiplier_per_year", *multiplier_per_year)?,
                blocks_per_year,
            )?),
            RateModelConfig::JumpRate {
                base_rate_per_year,
                multiplier_per_year,
                jump_multiplier_per_year,
                kink,
            } => Arc::new(JumpRateModel::new(
                to_exp("base_rate_per_year", *base_rate_per_year)?,
                to_exp("multiplier_per_year", *multiplier_per_year)?,
                to_exp("jump_multiplier_per_year", *jump_multiplier_per_year)?,
                to_exp("kink", *kink)?,
                blocks_per_year,
            )?),
        };
        Ok(model)
    }
}

fn to_exp(field: &'static str, value: Decimal) -> Result<Exp, ConfigError> {
    Exp::from_decimal(value).map_err(|source| ConfigError::Decimal { field, source })
}
