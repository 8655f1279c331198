//! RiskHooks implementation - the controller's answers to the ledger

use lendbank_core::{AccountId, MarketId, U256};
use lendbank_ledger::{ControllerError, ListedMarket, Markets, RiskHooks};

use crate::controller::RiskController;
use crate::liquidity::Hypothetical;

impl RiskHooks for RiskController {
    fn mint_allowed(
        &self,
        _markets: &Markets,
        market: MarketId,
        _minter: &AccountId,
        _mint_amount: U256,
    ) -> Result<(), ControllerError> {
        self.ensure_listed(market)
    }

    fn redeem_allowed(
        &self,
        markets: &Markets,
        market: MarketId,
        redeemer: &AccountId,
        redeem_tokens: U256,
    ) -> Result<(), ControllerError> {
        self.redeem_allowed_internal(markets, market, redeemer, redeem_tokens)
    }

    /// Enters the market on the borrower's behalf when needed, but only once
    /// the borrow is known to be allowed.
    fn borrow_allowed(
        &mut self,
        markets: &Markets,
        market: MarketId,
        borrower: &AccountId,
        borrow_amount: U256,
    ) -> Result<(), ControllerError> {
        self.ensure_listed(market)?;

        let mut assets = self.assets_in(borrower).to_vec();
        let entering = !assets.contains(&market);
        if entering {
            if assets.len() >= self.params().max_assets {
                return Err(ControllerError::TooManyAssets);
            }
            assets.push(market);
        }

        if self.underlying_price(market).is_zero() {
            return Err(ControllerError::PriceError);
        }

        let liquidity = self.liquidity_over(
            markets,
            borrower,
            &assets,
            Some(Hypothetical::borrow(market, borrow_amount)),
        )?;
        if liquidity.is_shortfall() {
            tracing::debug!(
                borrower = %borrower,
                market = %market,
                shortfall = %liquidity.shortfall,
                "Borrow would cause shortfall"
            );
            return Err(ControllerError::InsufficientLiquidity);
        }

        if entering {
            self.add_to_market(borrower, market)?;
            tracing::debug!(account = %borrower, market = %market, "Market entered by borrow");
        }
        Ok(())
    }

    fn repay_borrow_allowed(
        &self,
        _markets: &Markets,
        market: MarketId,
        _payer: &AccountId,
        _borrower: &AccountId,
        _repay_amount: U256,
    ) -> Result<(), ControllerError> {
        self.ensure_listed(market)
    }

    /// Borrower must be in shortfall, and the repay must not exceed the
    /// close factor share of the borrow.
    fn liquidate_borrow_allowed(
        &self,
        markets: &Markets,
        borrowed: MarketId,
        collateral: MarketId,
        _liquidator: &AccountId,
        borrower: &AccountId,
        repay_amount: U256,
    ) -> Result<(), ControllerError> {
        self.ensure_listed(borrowed)?;
        self.ensure_listed(collateral)?;

        let liquidity = self.account_liquidity(markets, borrower)?;
        if !liquidity.is_shortfall() {
            return Err(ControllerError::InsufficientShortfall);
        }

        let borrow_balance = markets
            .get(borrowed)
            .ok_or(ControllerError::MarketNotListed)?
            .borrow_balance_stored(borrower)?;
        if repay_amount > self.max_close(borrow_balance)? {
            return Err(ControllerError::TooMuchRepay);
        }
        Ok(())
    }

    fn seize_allowed(
        &self,
        _markets: &Markets,
        collateral: MarketId,
        seizer: MarketId,
        _liquidator: &AccountId,
        _borrower: &AccountId,
        _seize_tokens: U256,
    ) -> Result<ListedMarket, ControllerError> {
        self.ensure_listed(collateral)?;
        self.ensure_listed(seizer)?;
        Ok(ListedMarket::new(seizer))
    }

    fn transfer_allowed(
        &self,
        markets: &Markets,
        market: MarketId,
        src: &AccountId,
        _dst: &AccountId,
        transfer_tokens: U256,
    ) -> Result<(), ControllerError> {
        self.redeem_allowed_internal(markets, market, src, transfer_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, alice, bob, Fixture, E18};
    use lendbank_core::Exp;

    #[test]
    fn test_mint_requires_listing() {
        let mut fx = Fixture::new();
        let unlisted = fx.create_market("cA");
        assert_eq!(
            fx.controller.mint_allowed(&fx.markets, unlisted, &alice(), U256::from(1)),
            Err(ControllerError::MarketNotListed)
        );
    }

    #[test]
    fn test_borrow_enters_market_only_on_success() {
        let mut fx = Fixture::new();
        let collateral = fx.collateral_market("cETH", E18, E18 / 2);
        let borrowed = fx.collateral_market("cUSD", E18, E18 / 2);
        fx.supply(collateral, &alice(), 1_000);
        fx.controller.enter_market(&alice(), collateral).unwrap();

        let markets = fx.markets.clone();
        assert_eq!(
            fx.controller
                .borrow_allowed(&markets, borrowed, &alice(), U256::from(501)),
            Err(ControllerError::InsufficientLiquidity)
        );
        assert!(!fx.controller.check_membership(&alice(), borrowed));

        fx.controller
            .borrow_allowed(&markets, borrowed, &alice(), U256::from(500))
            .unwrap();
        assert!(fx.controller.check_membership(&alice(), borrowed));
    }

    #[test]
    fn test_borrow_needs_price() {
        let mut fx = Fixture::new();
        let id = fx.listed_market("cA", None);
        let markets = fx.markets.clone();
        assert_eq!(
            fx.controller.borrow_allowed(&markets, id, &alice(), U256::ZERO),
            Err(ControllerError::PriceError)
        );
    }

    #[test]
    fn test_redeem_limited_by_borrows() {
        let mut fx = Fixture::new();
        let id = fx.collateral_market("cETH", E18, E18 / 2);
        fx.supply(id, &alice(), 1_000);
        fx.controller.enter_market(&alice(), id).unwrap();
        fx.borrow(id, &alice(), 400);

        // 1_000 tokens * 0.5 = 500 collateral, 400 borrowed: 200 tokens free,
        // 201 still rounds down to 100 of value
        assert!(fx
            .controller
            .redeem_allowed(&fx.markets, id, &alice(), U256::from(200))
            .is_ok());
        assert_eq!(
            fx.controller
                .redeem_allowed(&fx.markets, id, &alice(), U256::from(202)),
            Err(ControllerError::InsufficientLiquidity)
        );
        assert_eq!(
            fx.controller
                .transfer_allowed(&fx.markets, id, &alice(), &bob(), U256::from(202)),
            Err(ControllerError::InsufficientLiquidity)
        );
    }

    #[test]
    fn test_liquidate_requires_shortfall_and_close_factor() {
        let mut fx = Fixture::new();
        let id = fx.collateral_market("cETH", E18, E18 / 2);
        fx.supply(id, &alice(), 1_000);
        fx.controller.enter_market(&alice(), id).unwrap();
        fx.borrow(id, &alice(), 400);

        assert_eq!(
            fx.controller
                .liquidate_borrow_allowed(&fx.markets, id, id, &bob(), &alice(), U256::from(1)),
            Err(ControllerError::InsufficientShortfall)
        );

        // Collateral factor 0.25: 250 of collateral against 400 borrowed
        fx.controller
            .set_collateral_factor(&admin(), id, Exp::from_mantissa(E18 / 4))
            .unwrap();

        // Close factor 0.5 of 400
        assert_eq!(
            fx.controller
                .liquidate_borrow_allowed(&fx.markets, id, id, &bob(), &alice(), U256::from(201)),
            Err(ControllerError::TooMuchRepay)
        );
        assert!(fx
            .controller
            .liquidate_borrow_allowed(&fx.markets, id, id, &bob(), &alice(), U256::from(200))
            .is_ok());
    }

    #[test]
    fn test_seize_allowed_issues_proof() {
        let mut fx = Fixture::new();
        let a = fx.listed_market("cA", Some(E18));
        let b = fx.listed_market("cB", Some(E18));
        let unlisted = fx.create_market("cC");

        let proof = fx
            .controller
            .seize_allowed(&fx.markets, a, b, &bob(), &alice(), U256::from(1))
            .unwrap();
        assert_eq!(proof.market(), b);
        assert_eq!(
            fx.controller
                .seize_allowed(&fx.markets, a, unlisted, &bob(), &alice(), U256::from(1)),
            Err(ControllerError::MarketNotListed)
        );
    }
}
