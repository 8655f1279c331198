//! Integration tests for LendBank
//!
//! These tests drive the protocol through its public entry point: supply,
//! borrow, accrue, liquidate, and check what ends up in the ledger, the
//! controller and the event journal.

use lendbank_core::{AccountId, Exp, MarketId, U256};
use lendbank_events::{EventReader, ProtocolEvent};
use lendbank_ledger::{
    ControllerError, ErrorCode, FailureInfo, InterestRateModel, LedgerError, MarketParams,
    MintReceipt, TransferError,
};
use lendbank_oracle::MockOracle;
use lendbank_protocol::{Protocol, ProtocolConfig, ProtocolError};
use lendbank_risk::{calculate_seize_tokens, Hypothetical, RiskParams, WhitePaperRateModel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tempfile::TempDir;

const E18: u128 = 1_000_000_000_000_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn u(v: u128) -> U256 {
    U256::from(v)
}

fn admin() -> AccountId {
    AccountId::new("ADMIN")
}

fn alice() -> AccountId {
    AccountId::new("ALICE")
}

fn bob() -> AccountId {
    AccountId::new("BOB")
}

fn carol() -> AccountId {
    AccountId::new("CAROL")
}

fn zero_rate() -> Arc<dyn InterestRateModel> {
    Arc::new(WhitePaperRateModel {
        base_rate_per_block: Exp::ZERO,
        multiplier_per_block: Exp::ZERO,
    })
}

struct Setup {
    protocol: Protocol,
    oracle: Arc<MockOracle>,
}

impl Setup {
    fn new() -> Self {
        Self::with_oracle(MockOracle::new())
    }

    fn with_oracle(oracle: MockOracle) -> Self {
        init_tracing();
        let oracle = Arc::new(oracle);
        let protocol = Protocol::new(admin(), oracle.clone(), RiskParams::default());
        Self { protocol, oracle }
    }

    fn market(
        &mut self,
        params: MarketParams,
        decimals: u8,
        model: Arc<dyn InterestRateModel>,
    ) -> MarketId {
        let underlying = params.symbol.trim_start_matches('c').to_string();
        self.protocol
            .add_market(
                &admin(),
                params,
                lendbank_ledger::Erc20Token::new(underlying, decimals),
                model,
            )
            .unwrap()
    }

    /// 18 decimals, exchange rate 1.0, no interest
    fn plain_market(&mut self, symbol: &str, price: u128, collateral_factor: u128) -> MarketId {
        let id = self.market(MarketParams::new(symbol, Exp::ONE), 18, zero_rate());
        self.oracle.set_price(id, Exp::from_mantissa(price));
        if collateral_factor > 0 {
            self.protocol
                .set_collateral_factor(&admin(), id, Exp::from_mantissa(collateral_factor))
                .unwrap();
        }
        id
    }

    fn fund(&mut self, market: MarketId, account: &AccountId, amount: u128) {
        self.protocol.faucet(market, account, u(amount)).unwrap();
        self.protocol
            .approve_underlying(account, market, U256::MAX)
            .unwrap();
    }

    fn supply(&mut self, market: MarketId, account: &AccountId, amount: u128) -> MintReceipt {
        self.fund(market, account, amount);
        self.protocol.mint(account, market, u(amount)).unwrap()
    }
}

/// `exchangeRate * totalSupply` is `cash + borrows - reserves` rounded down
/// by less than one claim token
fn assert_exchange_rate_bound(protocol: &Protocol, market: MarketId) {
    let m = protocol.market(market).unwrap();
    let supply = m.total_supply();
    if supply.is_zero() {
        return;
    }
    let numerator = (m.cash() + m.total_borrows() - m.total_reserves()) * U256::from(E18);
    let scaled = m.exchange_rate_stored().unwrap().mantissa * supply;
    assert!(scaled <= numerator);
    assert!(numerator - scaled < supply);

    let balances = m
        .positions()
        .fold(U256::ZERO, |acc, (_, position)| acc + position.tokens);
    assert_eq!(balances, supply);
}

#[test]
fn test_six_decimal_redeem_scenario() {
    let mut s = Setup::new();
    let usdc = s.market(
        MarketParams::new("cUSDC", Exp::from_mantissa(10_000_000_000_000_000))
            .with_minimum_underlying(u(10_000_000)),
        6,
        zero_rate(),
    );

    let receipt = s.supply(usdc, &alice(), 1_000_000_000_000);
    assert_eq!(receipt.mint_tokens, u(100_000_000_000_000));
    assert_eq!(
        s.protocol.balance_of(usdc, &alice()).unwrap(),
        u(100_000_000_000_000)
    );

    let err = s
        .protocol
        .redeem(&alice(), usdc, u(99_999_000_000_100))
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InsufficientUnderlying));
    assert!(err
        .to_string()
        .contains("underlying balance less than required"));

    s.protocol
        .redeem(&alice(), usdc, u(99_999_000_000_099))
        .unwrap();
    assert_eq!(
        s.protocol.exchange_rate_stored(usdc).unwrap(),
        Exp::from_mantissa(10_000_000_990_000_098)
    );
    assert_eq!(s.protocol.get_cash(usdc).unwrap(), u(10_000_000));
    assert_exchange_rate_bound(&s.protocol, usdc);
}

/// alice: collateral in `eth`, borrowing from `usd`, which bob supplies
fn borrowing_setup() -> (Setup, MarketId, MarketId) {
    let mut s = Setup::new();
    let eth = s.plain_market("cETH", 2_000 * E18, 3 * E18 / 4);
    let usd = s.plain_market("cUSD", E18, 3 * E18 / 4);

    s.supply(eth, &alice(), 10 * E18);
    s.protocol.enter_market(&alice(), eth).unwrap();
    s.supply(usd, &bob(), 20_000 * E18);
    s.protocol.borrow(&alice(), usd, u(15_000 * E18)).unwrap();
    (s, eth, usd)
}

#[test]
fn test_borrow_enters_market_and_moves_cash() {
    let (s, eth, usd) = borrowing_setup();

    assert_eq!(s.protocol.assets_in(&alice()), &[eth, usd]);
    assert_eq!(s.protocol.get_cash(usd).unwrap(), u(5_000 * E18));
    assert_eq!(
        s.protocol.underlying_balance(usd, &alice()).unwrap(),
        u(15_000 * E18)
    );

    // 10 ETH * 2000 * 0.75 exactly covers 15_000 USD
    let liquidity = s.protocol.account_liquidity(&alice()).unwrap();
    assert_eq!(liquidity.liquidity, U256::ZERO);
    assert_eq!(liquidity.shortfall, U256::ZERO);

    let entered = s.protocol.events().iter().any(|r| {
        matches!(
            &r.event,
            ProtocolEvent::MarketEntered { market, account } if *market == usd && *account == alice()
        )
    });
    assert!(entered);
}

#[test]
fn test_borrow_exceeding_cash_changes_no_balances() {
    let mut s = Setup::new();
    let eth = s.plain_market("cETH", 2_000 * E18, 3 * E18 / 4);
    let usd = s.plain_market("cUSD", E18, 3 * E18 / 4);
    s.supply(eth, &alice(), 10 * E18);
    s.protocol.enter_market(&alice(), eth).unwrap();
    s.supply(usd, &bob(), 1_000);

    let err = s.protocol.borrow(&alice(), usd, u(1_001)).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InsufficientCash));
    assert!(!err.is_fatal());

    assert_eq!(s.protocol.get_cash(usd).unwrap(), u(1_000));
    assert_eq!(s.protocol.underlying_balance(usd, &alice()).unwrap(), U256::ZERO);
    assert_eq!(
        s.protocol.borrow_balance_stored(usd, &alice()).unwrap(),
        U256::ZERO
    );
    assert_eq!(s.protocol.market(usd).unwrap().total_borrows(), U256::ZERO);

    let last = &s.protocol.events().last().unwrap().event;
    assert!(matches!(
        last,
        ProtocolEvent::Failure { failure } if failure.error == ErrorCode::InsufficientCash
    ));
}

#[test]
fn test_rejected_borrow_journals_implicit_entry() {
    let mut s = Setup::new();
    let eth = s.plain_market("cETH", 2_000 * E18, 3 * E18 / 4);
    let usd = s.plain_market("cUSD", E18, 3 * E18 / 4);
    s.supply(eth, &alice(), 10 * E18);
    s.protocol.enter_market(&alice(), eth).unwrap();
    s.supply(usd, &bob(), 1_000);
    let journaled = s.protocol.events().len();

    let err = s.protocol.borrow(&alice(), usd, u(1_001)).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InsufficientCash));
    assert_eq!(s.protocol.assets_in(&alice()), &[eth, usd]);

    let written: Vec<_> = s.protocol.events()[journaled..]
        .iter()
        .map(|r| &r.event)
        .collect();
    assert_eq!(written.len(), 2);
    assert!(matches!(
        written[0],
        ProtocolEvent::MarketEntered { market, account } if *market == usd && *account == alice()
    ));
    assert!(written[1].is_failure());

    // Already a member: a second rejection journals only the failure
    let err = s.protocol.borrow(&alice(), usd, u(1_001)).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InsufficientCash));
    assert_eq!(s.protocol.events().len(), journaled + 3);
    assert!(s.protocol.events().last().unwrap().event.is_failure());
}

#[test]
fn test_redeem_exceeding_cash_is_rejected() {
    let (mut s, _, usd) = borrowing_setup();
    let journaled = s.protocol.events().len();

    // 5_000 cash left after alice's borrow; bob never entered the market
    let err = s.protocol.redeem(&bob(), usd, u(6_000 * E18)).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InsufficientCash));
    assert!(!err.is_fatal());

    let market = s.protocol.market(usd).unwrap();
    assert_eq!(market.total_supply(), u(20_000 * E18));
    assert_eq!(market.balance_of(&bob()), u(20_000 * E18));
    assert_eq!(market.cash(), u(5_000 * E18));
    assert_eq!(s.protocol.underlying_balance(usd, &bob()).unwrap(), U256::ZERO);

    assert_eq!(s.protocol.events().len(), journaled + 1);
    assert!(matches!(
        &s.protocol.events().last().unwrap().event,
        ProtocolEvent::Failure { failure }
            if failure.operation == FailureInfo::Redeem && failure.error == ErrorCode::InsufficientCash
    ));
}

#[test]
fn test_fee_on_mint_aborts_without_minting() {
    let mut s = Setup::new();
    let usd = s.plain_market("cUSD", E18, 0);
    s.fund(usd, &alice(), 1_000);
    s.protocol
        .underlying_mut(usd)
        .unwrap()
        .set_fee(Exp::from_mantissa(E18 / 100));
    let journaled = s.protocol.events().len();

    let err = s.protocol.mint(&alice(), usd, u(1_000)).unwrap_err();
    assert!(matches!(
        err.ledger(),
        Some(LedgerError::BalanceMismatch { .. })
    ));

    let market = s.protocol.market(usd).unwrap();
    assert_eq!(market.total_supply(), U256::ZERO);
    assert_eq!(market.balance_of(&alice()), U256::ZERO);
    assert_eq!(s.protocol.underlying_balance(usd, &alice()).unwrap(), u(1_000));
    assert_eq!(s.protocol.events().len(), journaled);
}

#[test]
fn test_liquidation_flow() {
    let (mut s, eth, usd) = borrowing_setup();
    s.fund(usd, &bob(), 10_000 * E18);

    // Healthy borrower: aborted, nothing journaled
    let journaled = s.protocol.events().len();
    let err = s
        .protocol
        .liquidate_borrow(&bob(), &alice(), usd, eth, u(1_000 * E18))
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(
        err.failure().unwrap().detail,
        Some(ControllerError::InsufficientShortfall)
    );
    assert_eq!(s.protocol.events().len(), journaled);

    // ETH drops to 1500: 11_250 of collateral against 15_000 borrowed
    s.oracle.set_price(eth, Exp::from_mantissa(1_500 * E18));
    let liquidity = s.protocol.account_liquidity(&alice()).unwrap();
    assert_eq!(liquidity.shortfall, u(3_750 * E18));

    // Close factor 0.5 caps a single repay at 7_500
    let err = s
        .protocol
        .liquidate_borrow(&bob(), &alice(), usd, eth, u(7_501 * E18))
        .unwrap_err();
    assert_eq!(
        err.failure().unwrap().detail,
        Some(ControllerError::TooMuchRepay)
    );
    assert_eq!(
        s.protocol.underlying_balance(usd, &bob()).unwrap(),
        u(10_000 * E18)
    );

    let receipt = s
        .protocol
        .liquidate_borrow(&bob(), &alice(), usd, eth, u(3_000 * E18))
        .unwrap();

    // 3000 * 1.08 * 1.0 / (1500 * 1.0)
    assert_eq!(receipt.seize_tokens, u(2_160_000_000_000_000_000));
    assert_eq!(
        s.protocol.borrow_balance_stored(usd, &alice()).unwrap(),
        u(12_000 * E18)
    );
    assert_eq!(
        s.protocol.balance_of(eth, &alice()).unwrap(),
        u(7_840_000_000_000_000_000)
    );
    assert_eq!(
        s.protocol.balance_of(eth, &bob()).unwrap(),
        u(2_160_000_000_000_000_000)
    );
    assert_eq!(
        s.protocol.underlying_balance(usd, &bob()).unwrap(),
        u(7_000 * E18)
    );
    assert!(matches!(
        s.protocol.events().last().unwrap().event,
        ProtocolEvent::LiquidateBorrow { .. }
    ));
    assert_exchange_rate_bound(&s.protocol, eth);
    assert_exchange_rate_bound(&s.protocol, usd);
}

#[test]
fn test_liquidation_requires_fresh_and_distinct_accounts() {
    let (mut s, eth, usd) = borrowing_setup();
    s.oracle.set_price(eth, Exp::from_mantissa(1_500 * E18));
    s.fund(usd, &alice(), 1_000 * E18);

    let err = s
        .protocol
        .liquidate_borrow(&alice(), &alice(), usd, eth, u(100 * E18))
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidAccountPair));
    assert!(err.is_fatal());

    let err = s
        .protocol
        .liquidate_borrow(&bob(), &alice(), usd, MarketId::new(7), u(100 * E18))
        .unwrap_err();
    assert!(matches!(err.ledger(), Some(LedgerError::Aborted(_))));
}

#[test]
fn test_seize_tokens_closed_form() {
    let mut s = Setup::new();
    let borrowed = s.market(MarketParams::new("cB", Exp::ONE), 18, zero_rate());
    let collateral = s.market(
        MarketParams::new("cC", Exp::from_mantissa(2 * E18)),
        18,
        zero_rate(),
    );
    s.protocol
        .set_liquidation_incentive(&admin(), Exp::from_mantissa(11 * E18 / 10))
        .unwrap();
    s.oracle.set_price(borrowed, Exp::from_mantissa(20_000_000_000));
    s.oracle.set_price(collateral, Exp::ONE);

    assert_eq!(
        s.protocol
            .liquidate_calculate_seize_tokens(borrowed, collateral, u(E18))
            .unwrap(),
        u(11_000_000_000)
    );

    s.oracle.remove_price(collateral);
    assert!(matches!(
        s.protocol
            .liquidate_calculate_seize_tokens(borrowed, collateral, u(E18)),
        Err(ProtocolError::Controller(ControllerError::PriceError))
    ));
}

#[test]
fn test_seize_tokens_monotonic() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..500 {
        let repay: u128 = rng.gen_range(1..1_000_000 * E18);
        let incentive: u128 = rng.gen_range(E18..3 * E18 / 2);
        let price_borrowed: u128 = rng.gen_range(1_000_000..10_000 * E18);
        let price_collateral: u128 = rng.gen_range(1_000_000..10_000 * E18);
        let rate: u128 = rng.gen_range(E18 / 100..10 * E18);

        let seize = |repay: u128, incentive: u128, price_collateral: u128| {
            calculate_seize_tokens(
                u(repay),
                Exp::from_mantissa(incentive),
                Exp::from_mantissa(price_borrowed),
                Exp::from_mantissa(price_collateral),
                Exp::from_mantissa(rate),
            )
            .unwrap()
        };

        let base = seize(repay, incentive, price_collateral);
        assert!(seize(repay + 1, incentive, price_collateral) >= base);
        assert!(seize(repay, incentive + 1, price_collateral) >= base);
        assert!(seize(repay, incentive, price_collateral + 1) <= base);
    }
}

fn interest_setup() -> (Setup, MarketId, MarketId) {
    let mut s = Setup::new();
    let eth = s.plain_market("cETH", E18, E18 / 2);
    // 0.000001 + 0.000002 * utilization per block, 10% to reserves
    let model = Arc::new(WhitePaperRateModel {
        base_rate_per_block: Exp::from_mantissa(1_000_000_000_000),
        multiplier_per_block: Exp::from_mantissa(2_000_000_000_000),
    });
    let usd = s.market(
        MarketParams::new("cUSD", Exp::from_mantissa(E18 / 50))
            .with_reserve_factor(Exp::from_mantissa(E18 / 10)),
        18,
        model,
    );
    s.oracle.set_price(usd, Exp::ONE);

    s.supply(eth, &alice(), 1_000 * E18);
    s.protocol.enter_market(&alice(), eth).unwrap();
    s.supply(usd, &bob(), 1_000 * E18);
    s.protocol.borrow(&alice(), usd, u(100 * E18)).unwrap();
    (s, eth, usd)
}

#[test]
fn test_interest_accrual() {
    let (mut s, _, usd) = interest_setup();
    let index_before = s.protocol.market(usd).unwrap().borrow_index();

    s.protocol.advance_blocks(1_000);
    let owed = s.protocol.borrow_balance_current(usd, &alice()).unwrap();
    assert!(owed > u(100 * E18));

    let market = s.protocol.market(usd).unwrap();
    assert_eq!(market.accrual_block(), 1_000);
    assert!(market.borrow_index() > index_before);
    assert!(market.total_reserves() > U256::ZERO);
    assert_eq!(market.total_borrows(), owed);
    assert!(s.protocol.exchange_rate_stored(usd).unwrap() > Exp::from_mantissa(E18 / 50));
    assert!(s.protocol.supply_rate_per_block(usd).unwrap() > Exp::ZERO);
    assert!(
        s.protocol.supply_rate_per_block(usd).unwrap()
            < s.protocol.borrow_rate_per_block(usd).unwrap()
    );
    assert_exchange_rate_bound(&s.protocol, usd);

    let accrued = s
        .protocol
        .events()
        .iter()
        .filter(|r| matches!(r.event, ProtocolEvent::AccrueInterest { .. }))
        .count();
    assert_eq!(accrued, 1);
}

#[test]
fn test_mint_then_redeem_never_profits() {
    let (mut s, _, usd) = interest_setup();
    s.protocol.advance_blocks(777);
    s.protocol.accrue_interest(usd).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let amount: u128 = rng.gen_range(1..10_000 * E18);
        s.fund(usd, &carol(), amount);
        let minted = s.protocol.mint(&carol(), usd, u(amount)).unwrap();
        let redeemed = s
            .protocol
            .redeem(&carol(), usd, minted.mint_tokens)
            .unwrap();
        assert!(redeemed.redeem_amount <= u(amount));
        assert_exchange_rate_bound(&s.protocol, usd);
    }
}

#[test]
fn test_hypothetical_with_no_change_equals_account_liquidity() {
    let (mut s, eth, usd) = interest_setup();
    s.protocol.advance_blocks(50);
    s.protocol.accrue_interest(usd).unwrap();

    for account in [alice(), bob(), carol()] {
        let current = s.protocol.account_liquidity(&account).unwrap();
        for market in [eth, usd] {
            let unchanged = s
                .protocol
                .hypothetical_account_liquidity(&account, Hypothetical::borrow(market, U256::ZERO))
                .unwrap();
            assert_eq!(unchanged, current);
        }
    }
}

#[test]
fn test_reserves_administration() {
    let (mut s, _, usd) = interest_setup();
    s.protocol.advance_blocks(10_000);

    let err = s
        .protocol
        .reduce_reserves(&alice(), usd, u(1))
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::Unauthorized));

    let err = s
        .protocol
        .set_reserve_factor(&admin(), usd, Exp::from_mantissa(E18 + 1))
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadInput));

    s.fund(usd, &carol(), 500);
    let total = s.protocol.add_reserves(&carol(), usd, u(500)).unwrap();
    assert!(total > u(500));

    let err = s
        .protocol
        .reduce_reserves(&admin(), usd, total + u(1))
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadInput));

    let left = s.protocol.reduce_reserves(&admin(), usd, u(500)).unwrap();
    assert_eq!(left, total - u(500));
    assert_eq!(s.protocol.underlying_balance(usd, &admin()).unwrap(), u(500));
    assert_exchange_rate_bound(&s.protocol, usd);
}

#[test]
fn test_set_interest_rate_model_accrues_first() {
    let (mut s, _, usd) = interest_setup();
    s.protocol.advance_blocks(20);
    s.protocol
        .set_interest_rate_model(&admin(), usd, zero_rate())
        .unwrap();

    let market = s.protocol.market(usd).unwrap();
    assert_eq!(market.accrual_block(), 20);
    assert_eq!(market.rate_model().name(), "white-paper");
    assert_eq!(s.protocol.borrow_rate_per_block(usd).unwrap(), Exp::ZERO);
}

#[test]
fn test_borrow_rate_ceiling_is_fatal() {
    let mut s = Setup::new();
    let hot = Arc::new(WhitePaperRateModel {
        base_rate_per_block: Exp::from_mantissa(E18 / 100),
        multiplier_per_block: Exp::ZERO,
    });
    let market = s.market(MarketParams::new("cHOT", Exp::ONE), 18, hot);
    s.supply(market, &alice(), 1_000);

    s.protocol.advance_blocks(1);
    let err = s.protocol.mint(&alice(), market, U256::ZERO).unwrap_err();
    assert!(matches!(
        err.ledger(),
        Some(LedgerError::BorrowRateTooHigh { .. })
    ));
    assert_eq!(s.protocol.market(market).unwrap().accrual_block(), 0);
}

#[test]
fn test_transfer_out_failure_rolls_back() {
    let (mut s, _, usd) = borrowing_setup();
    let journaled = s.protocol.events().len();
    s.protocol.underlying_mut(usd).unwrap().set_paused(true);

    let err = s.protocol.redeem(&bob(), usd, u(E18)).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err.ledger(),
        Some(LedgerError::Transfer(TransferError::Paused(_)))
    ));

    assert_eq!(s.protocol.balance_of(usd, &bob()).unwrap(), u(20_000 * E18));
    assert_eq!(s.protocol.get_cash(usd).unwrap(), u(5_000 * E18));
    assert_eq!(s.protocol.events().len(), journaled);
}

#[test]
fn test_borrow_transfer_out_failure_keeps_membership_unchanged() {
    let mut s = Setup::new();
    let eth = s.plain_market("cETH", 2_000 * E18, 3 * E18 / 4);
    let usd = s.plain_market("cUSD", E18, 3 * E18 / 4);
    s.supply(eth, &alice(), 10 * E18);
    s.protocol.enter_market(&alice(), eth).unwrap();
    s.supply(usd, &bob(), 1_000 * E18);
    s.protocol.underlying_mut(usd).unwrap().set_paused(true);

    let err = s.protocol.borrow(&alice(), usd, u(100 * E18)).unwrap_err();
    assert!(err.is_fatal());
    assert!(!s.protocol.check_membership(&alice(), usd));
    assert_eq!(
        s.protocol.borrow_balance_stored(usd, &alice()).unwrap(),
        U256::ZERO
    );
}

#[test]
fn test_fee_on_repay_aborts() {
    let (mut s, _, usd) = borrowing_setup();
    s.protocol
        .approve_underlying(&alice(), usd, U256::MAX)
        .unwrap();
    s.protocol
        .underlying_mut(usd)
        .unwrap()
        .set_fee(Exp::from_mantissa(E18 / 1_000));

    let err = s
        .protocol
        .repay_borrow(&alice(), usd, u(1_000 * E18))
        .unwrap_err();
    assert!(matches!(
        err.ledger(),
        Some(LedgerError::BalanceMismatch { .. })
    ));
    assert_eq!(
        s.protocol.borrow_balance_stored(usd, &alice()).unwrap(),
        u(15_000 * E18)
    );
    assert_eq!(
        s.protocol.underlying_balance(usd, &alice()).unwrap(),
        u(15_000 * E18)
    );
}

#[test]
fn test_exit_market_rules() {
    let (mut s, eth, usd) = borrowing_setup();

    let err = s.protocol.exit_market(&alice(), usd).unwrap_err();
    assert_eq!(
        err.failure().unwrap().detail,
        Some(ControllerError::NonzeroBorrowBalance)
    );

    let err = s.protocol.exit_market(&alice(), eth).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InsufficientLiquidity));
    assert_eq!(s.protocol.assets_in(&alice()), &[eth, usd]);

    s.protocol
        .approve_underlying(&alice(), usd, U256::MAX)
        .unwrap();
    let repaid = s.protocol.repay_borrow(&alice(), usd, U256::MAX).unwrap();
    assert_eq!(repaid.repay_amount, u(15_000 * E18));
    assert_eq!(repaid.account_borrows, U256::ZERO);

    s.protocol.exit_market(&alice(), usd).unwrap();
    s.protocol.exit_market(&alice(), eth).unwrap();
    assert!(s.protocol.assets_in(&alice()).is_empty());
}

#[test]
fn test_repay_behalf_caps_at_balance() {
    let (mut s, _, usd) = borrowing_setup();
    s.fund(usd, &carol(), 20_000 * E18);

    let receipt = s
        .protocol
        .repay_borrow_behalf(&carol(), &alice(), usd, u(16_000 * E18))
        .unwrap();
    assert_eq!(receipt.repay_amount, u(15_000 * E18));
    assert_eq!(
        s.protocol.underlying_balance(usd, &carol()).unwrap(),
        u(5_000 * E18)
    );
    assert_eq!(s.protocol.market(usd).unwrap().total_borrows(), U256::ZERO);
}

#[test]
fn test_stale_price_blocks_borrow() {
    let mut s = Setup::with_oracle(MockOracle::new().with_max_age(60));
    let eth = s.plain_market("cETH", 2_000 * E18, 3 * E18 / 4);
    let usd = s.plain_market("cUSD", E18, 3 * E18 / 4);
    s.supply(eth, &alice(), 10 * E18);
    s.protocol.enter_market(&alice(), eth).unwrap();
    s.supply(usd, &bob(), 1_000 * E18);

    let two_hours_ago = chrono::Utc::now() - chrono::Duration::hours(2);
    s.oracle
        .set_price_at(usd, Exp::from_mantissa(E18), two_hours_ago);

    let err = s.protocol.borrow(&alice(), usd, u(E18)).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::PriceError));
    assert!(!err.is_fatal());

    // A stale collateral price stops the liquidity computation too
    s.oracle.set_price(usd, Exp::ONE);
    s.oracle
        .set_price_at(eth, Exp::from_mantissa(2_000 * E18), two_hours_ago);
    assert!(matches!(
        s.protocol.account_liquidity(&alice()),
        Err(ProtocolError::Controller(ControllerError::PriceError))
    ));
}

#[test]
fn test_claim_token_transfers() {
    let (mut s, eth, _) = borrowing_setup();
    s.supply(eth, &carol(), 5 * E18);

    // alice's ETH collateral is fully used
    let err = s
        .protocol
        .transfer(&alice(), &bob(), eth, u(E18))
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InsufficientLiquidity));

    let err = s
        .protocol
        .transfer(&carol(), &carol(), eth, u(E18))
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadInput));

    s.protocol.transfer(&carol(), &bob(), eth, u(E18)).unwrap();
    assert_eq!(s.protocol.balance_of(eth, &bob()).unwrap(), u(E18));

    let err = s
        .protocol
        .transfer_from(&bob(), &carol(), &bob(), eth, u(E18))
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InsufficientAllowance));

    s.protocol
        .approve(&carol(), &bob(), eth, u(2 * E18))
        .unwrap();
    s.protocol
        .transfer_from(&bob(), &carol(), &bob(), eth, u(2 * E18))
        .unwrap();
    assert_eq!(s.protocol.balance_of(eth, &carol()).unwrap(), u(2 * E18));
    assert_eq!(s.protocol.balance_of(eth, &bob()).unwrap(), u(3 * E18));
    assert_eq!(s.protocol.market(eth).unwrap().allowance(&carol(), &bob()), U256::ZERO);
    assert_exchange_rate_bound(&s.protocol, eth);
}

#[test]
fn test_enter_markets_reports_each_result() {
    let mut s = Setup::new();
    let a = s.plain_market("cA", E18, 0);
    let unlisted = s
        .protocol
        .create_market(
            &admin(),
            MarketParams::new("cB", Exp::ONE),
            lendbank_ledger::Erc20Token::new("B", 18),
            zero_rate(),
        )
        .unwrap();

    let results = s.protocol.enter_markets(&alice(), &[a, unlisted]);
    assert!(results[0].is_ok());
    assert_eq!(
        results[1].as_ref().unwrap_err().code(),
        Some(ErrorCode::MarketNotListed)
    );
    assert_eq!(s.protocol.assets_in(&alice()), &[a]);

    s.protocol.support_market(&admin(), unlisted).unwrap();
    s.protocol.enter_market(&alice(), unlisted).unwrap();
    assert!(s.protocol.check_membership(&alice(), unlisted));
}

#[test]
fn test_journal_persists_and_replays() -> anyhow::Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let oracle = Arc::new(MockOracle::new());

    let written = {
        let mut protocol = Protocol::new(admin(), oracle.clone(), RiskParams::default())
            .with_journal(dir.path())?;
        let market = protocol.add_market(
            &admin(),
            MarketParams::new("cUSD", Exp::ONE),
            lendbank_ledger::Erc20Token::new("USD", 18),
            zero_rate(),
        )?;
        protocol.faucet(market, &alice(), u(100))?;
        protocol.approve_underlying(&alice(), market, U256::MAX)?;
        protocol.mint(&alice(), market, u(100))?;

        // No oracle price: rejected, and the rejection is journaled
        let err = protocol.borrow(&alice(), market, u(50)).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::PriceError));
        protocol.events().to_vec()
    };

    let replayed = EventReader::from_directory(dir.path())?.replay()?;
    assert_eq!(replayed, written);
    assert!(replayed.last().map(|r| r.event.is_failure()).unwrap_or(false));

    let reopened = Protocol::new(admin(), oracle, RiskParams::default()).with_journal(dir.path())?;
    assert_eq!(reopened.next_sequence(), written.len() as u64);
    Ok(())
}

#[test]
fn test_from_config() -> anyhow::Result<()> {
    init_tracing();
    let oracle = Arc::new(MockOracle::new());
    oracle.set_price(MarketId::new(0), Exp::from_mantissa(2_000 * E18));
    oracle.set_price(MarketId::new(1), Exp::from_mantissa(1_000_000_000_000 * E18));

    let config = ProtocolConfig::from_json(
        r#"{
            "close_factor": "0.4",
            "markets": [
                { "symbol": "cETH", "underlying": "ETH", "collateral_factor": "0.75" },
                {
                    "symbol": "cUSDC",
                    "underlying": "USDC",
                    "decimals": 6,
                    "initial_exchange_rate": "0.0002",
                    "reserve_factor": "0.1",
                    "rate_model": {
                        "kind": "jump_rate",
                        "base_rate_per_year": "0",
                        "multiplier_per_year": "0.04",
                        "jump_multiplier_per_year": "1.09",
                        "kink": "0.8"
                    }
                }
            ]
        }"#,
    )?;
    let protocol = Protocol::from_config(&config, oracle)?;

    assert_eq!(protocol.markets().len(), 2);
    let eth = MarketId::new(0);
    let usdc = MarketId::new(1);
    assert!(protocol.controller().is_listed(eth));
    assert!(protocol.controller().is_listed(usdc));
    assert_eq!(
        protocol.controller().collateral_factor(eth),
        Exp::from_mantissa(3 * E18 / 4)
    );
    assert_eq!(
        protocol.controller().params().close_factor,
        Exp::from_mantissa(4 * E18 / 10)
    );
    assert_eq!(protocol.market(usdc)?.underlying().decimals(), 6);
    assert_eq!(protocol.market(usdc)?.rate_model().name(), "jump-rate");
    assert_eq!(
        protocol.market(usdc)?.reserve_factor(),
        Exp::from_mantissa(E18 / 10)
    );

    let created = protocol
        .events()
        .iter()
        .filter(|r| matches!(r.event, ProtocolEvent::MarketCreated { .. }))
        .count();
    assert_eq!(created, 2);
    Ok(())
}
