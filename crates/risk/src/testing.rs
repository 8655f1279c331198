//! Fixture shared by the risk crate's unit tests

use lendbank_core::{AccountId, Exp, MarketId, U256};
use lendbank_ledger::{borrow_fresh, mint_fresh, Erc20Token, MarketParams, Markets};
use lendbank_oracle::{MockOracle, PriceOracle};
use std::sync::Arc;

use crate::controller::{RiskController, RiskParams};
use crate::interest::WhitePaperRateModel;

pub const E18: u128 = 1_000_000_000_000_000_000;

pub fn admin() -> AccountId {
    AccountId::new("ADMIN")
}

pub fn alice() -> AccountId {
    AccountId::new("ALICE")
}

pub fn bob() -> AccountId {
    AccountId::new("BOB")
}

/// Markets at block 0 with zero interest and exchange rate 1.0
pub struct Fixture {
    pub markets: Markets,
    pub controller: RiskController,
    pub oracle: Arc<MockOracle>,
}

impl Fixture {
    pub fn new() -> Self {
        let oracle = Arc::new(MockOracle::new());
        let controller = RiskController::new(
            admin(),
            oracle.clone() as Arc<dyn PriceOracle>,
            RiskParams::default(),
        );
        Self {
            markets: Markets::new(),
            controller,
            oracle,
        }
    }

    /// Ledger market, not yet listed
    pub fn create_market(&mut self, symbol: &str) -> MarketId {
        let zero_rate = WhitePaperRateModel {
            base_rate_per_block: Exp::ZERO,
            multiplier_per_block: Exp::ZERO,
        };
        self.markets.create(
            MarketParams::new(symbol, Exp::ONE),
            Erc20Token::new(symbol.trim_start_matches('c'), 18),
            Arc::new(zero_rate),
            0,
        )
    }

    pub fn listed_market(&mut self, symbol: &str, price: Option<u128>) -> MarketId {
        let id = self.create_market(symbol);
        self.controller
            .support_market(&admin(), &self.markets, id)
            .unwrap();
        if let Some(price) = price {
            self.oracle.set_price(id, Exp::from_mantissa(price));
        }
        id
    }

    pub fn collateral_market(&mut self, symbol: &str, price: u128, factor: u128) -> MarketId {
        let id = self.listed_market(symbol, Some(price));
        self.controller
            .set_collateral_factor(&admin(), id, Exp::from_mantissa(factor))
            .unwrap();
        id
    }

    /// Give `account` underlying and approve the market vault without limit
    pub fn fund(&mut self, id: MarketId, account: &AccountId, amount: u128) {
        let vault = id.vault();
        let token = self.markets.get_mut(id).unwrap().underlying_mut();
        token.mint(account, U256::from(amount)).unwrap();
        token.approve(account, &vault, U256::MAX);
    }

    pub fn supply(&mut self, id: MarketId, account: &AccountId, amount: u128) {
        self.fund(id, account, amount);
        mint_fresh(
            &mut self.markets,
            &self.controller,
            id,
            account,
            U256::from(amount),
            0,
        )
        .unwrap();
    }

    pub fn borrow(&mut self, id: MarketId, account: &AccountId, amount: u128) {
        borrow_fresh(
            &mut self.markets,
            &mut self.controller,
            id,
            account,
            U256::from(amount),
            0,
        )
        .unwrap();
    }
}
