//! Protocol context - wires markets, controller, oracle and journal together
//!
//! Every public operation runs as one transaction against a working copy of
//! the state:
//!
//! - success: the copy replaces the state and its events are journaled
//! - soft rejection: the copy is kept (interest accrued before the
//!   rejection persists) and a `Failure` event is journaled
//! - fatal error: the copy is dropped and nothing is journaled

use lendbank_core::{AccountId, Exp, MarketId, MathError, U256};
use lendbank_events::{EventError, EventReader, EventRecord, EventStore, ProtocolEvent};
use lendbank_ledger::{
    add_reserves_fresh, approve, borrow_fresh, mint_fresh, redeem_fresh, reduce_reserves_fresh,
    repay_borrow_fresh, set_interest_rate_model_fresh, set_reserve_factor_fresh, transfer_tokens,
    AccountSnapshot, BorrowReceipt, ControllerError, Erc20Token, ErrorCode, Failure, FailureInfo,
    InterestRateModel, LedgerError, Market, MarketParams, Markets, MintReceipt, RedeemAmount,
    RedeemReceipt, RepayReceipt,
};
use lendbank_oracle::PriceOracle;
use lendbank_risk::{
    liquidate_borrow_fresh, AccountLiquidity, Hypothetical, LiquidationReceipt, RiskController,
    RiskParams,
};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{ConfigError, ProtocolConfig};

/// Errors returned by [`Protocol`]
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error("Unknown market: {0}")]
    UnknownMarket(MarketId),

    #[error("Event store error: {0}")]
    Event(#[from] EventError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<MathError> for ProtocolError {
    fn from(e: MathError) -> Self {
        ProtocolError::Ledger(e.into())
    }
}

impl ProtocolError {
    pub fn ledger(&self) -> Option<&LedgerError> {
        match self {
            ProtocolError::Ledger(e) => Some(e),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.ledger().and_then(LedgerError::failure)
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.failure().map(|f| f.error)
    }

    /// Whether the operation was aborted with no effect at all
    pub fn is_fatal(&self) -> bool {
        match self {
            ProtocolError::Ledger(e) => e.is_fatal(),
            ProtocolError::Event(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct State {
    markets: Markets,
    controller: RiskController,
}

/// Working copy of the state for one transaction
struct Tx {
    state: State,
    block: u64,
    events: Vec<ProtocolEvent>,
}

impl Tx {
    fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    fn accrue(&mut self, market: MarketId) -> Result<(), LedgerError> {
        if let Some(accrual) = self.state.markets.accrue_interest(market, self.block)? {
            tracing::debug!(
                market = %market,
                block = self.block,
                interest = %accrual.interest_accumulated,
                "Interest accrued"
            );
            self.emit(ProtocolEvent::AccrueInterest {
                market,
                cash_prior: accrual.cash_prior,
                interest_accumulated: accrual.interest_accumulated,
                borrow_index: accrual.borrow_index,
                total_borrows: accrual.total_borrows,
            });
        }
        Ok(())
    }

    fn ensure_admin(&self, caller: &AccountId, operation: FailureInfo) -> Result<(), LedgerError> {
        self.state.controller.ensure_admin(caller, operation)
    }

    fn create_market(
        &mut self,
        caller: &AccountId,
        params: MarketParams,
        underlying: Erc20Token,
        rate_model: Arc<dyn InterestRateModel>,
    ) -> Result<MarketId, LedgerError> {
        self.ensure_admin(caller, FailureInfo::SupportMarket)?;
        let symbol = params.symbol.clone();
        let underlying_symbol = underlying.symbol().to_string();
        let market = self
            .state
            .markets
            .create(params, underlying, rate_model, self.block);
        self.emit(ProtocolEvent::MarketCreated {
            market,
            symbol,
            underlying: underlying_symbol,
        });
        Ok(market)
    }

    fn support_market(&mut self, caller: &AccountId, market: MarketId) -> Result<(), LedgerError> {
        self.state
            .controller
            .support_market(caller, &self.state.markets, market)?;
        self.emit(ProtocolEvent::MarketListed { market });
        Ok(())
    }
}

/// The lending protocol: all markets, the risk controller and the journal
pub struct Protocol {
    state: State,
    block: u64,
    journal: Vec<EventRecord>,
    next_sequence: u64,
    store: Option<EventStore>,
}

impl Protocol {
    /// Empty protocol at block 0 with an in-memory journal
    pub fn new(admin: AccountId, oracle: Arc<dyn PriceOracle>, params: RiskParams) -> Self {
        Self {
            state: State {
                markets: Markets::new(),
                controller: RiskController::new(admin, oracle, params),
            },
            block: 0,
            journal: Vec::new(),
            next_sequence: 0,
            store: None,
        }
    }

    /// Also persist journaled events under `path`, continuing the sequence
    /// of any records already there
    pub fn with_journal(mut self, path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let store = EventStore::new(path)?;
        let reader = EventReader::from_directory(path)?;
        if let Some(last) = reader.last_sequence()? {
            self.next_sequence = last + 1;
        }
        tracing::info!(
            path = %path.display(),
            next_sequence = self.next_sequence,
            "Event journal opened"
        );
        self.store = Some(store);
        Ok(self)
    }

    /// Build a protocol with every configured market created and listed.
    ///
    /// Markets with a nonzero collateral factor need an oracle price first.
    pub fn from_config(
        config: &ProtocolConfig,
        oracle: Arc<dyn PriceOracle>,
    ) -> Result<Self, ProtocolError> {
        let admin = config.admin()?;
        let mut protocol = Self::new(admin.clone(), oracle, config.risk_params()?);
        protocol.block = config.start_block;
        if let Some(path) = &config.journal_path {
            protocol = protocol.with_journal(path)?;
        }

        for market in &config.markets {
            let id = protocol.add_market(
                &admin,
                market.params()?,
                Erc20Token::new(&market.underlying, market.decimals),
                market.rate_model.build(config.blocks_per_year)?,
            )?;
            let factor = market.collateral_factor()?;
            if !factor.is_zero() {
                protocol.set_collateral_factor(&admin, id, factor)?;
            }
        }

        tracing::info!(markets = protocol.state.markets.len(), "Protocol configured");
        Ok(protocol)
    }

    fn transact<T>(
        &mut self,
        operation: FailureInfo,
        body: impl FnOnce(&mut Tx) -> Result<T, LedgerError>,
    ) -> Result<T, ProtocolError> {
        let mut tx = Tx {
            state: self.state.clone(),
            block: self.block,
            events: Vec::new(),
        };
        match body(&mut tx) {
            Ok(value) => {
                self.commit(tx)?;
                Ok(value)
            }
            Err(e) if !e.is_fatal() => {
                if let Some(failure) = e.failure() {
                    tracing::warn!(operation = %operation, error = %failure, "Operation rejected");
                    tx.emit(ProtocolEvent::Failure { failure: *failure });
                }
                self.commit(tx)?;
                Err(e.into())
            }
            Err(e) => {
                tracing::error!(
                    operation = %operation,
                    block = self.block,
                    error = %e,
                    "Transaction aborted, state discarded"
                );
                Err(e.into())
            }
        }
    }

    fn commit(&mut self, tx: Tx) -> Result<(), ProtocolError> {
        let correlation_id = Uuid::new_v4();
        let records: Vec<EventRecord> = tx
            .events
            .into_iter()
            .zip(self.next_sequence..)
            .map(|(event, sequence)| EventRecord::new(sequence, correlation_id, tx.block, event))
            .collect();

        // Journal first: a state change that cannot be recorded is not applied
        if let Some(store) = self.store.as_mut() {
            store.append_all(&records)?;
        }

        self.next_sequence += records.len() as u64;
        self.journal.extend(records);
        self.state = tx.state;
        Ok(())
    }

    // === Markets ===

    /// Create a market without listing it
    pub fn create_market(
        &mut self,
        caller: &AccountId,
        params: MarketParams,
        underlying: Erc20Token,
        rate_model: Arc<dyn InterestRateModel>,
    ) -> Result<MarketId, ProtocolError> {
        self.transact(FailureInfo::SupportMarket, |tx| {
            tx.create_market(caller, params, underlying, rate_model)
        })
    }

    pub fn support_market(
        &mut self,
        caller: &AccountId,
        market: MarketId,
    ) -> Result<(), ProtocolError> {
        self.transact(FailureInfo::SupportMarket, |tx| {
            tx.support_market(caller, market)
        })
    }

    /// Create and list a market in one step
    pub fn add_market(
        &mut self,
        caller: &AccountId,
        params: MarketParams,
        underlying: Erc20Token,
        rate_model: Arc<dyn InterestRateModel>,
    ) -> Result<MarketId, ProtocolError> {
        self.transact(FailureInfo::SupportMarket, |tx| {
            let market = tx.create_market(caller, params, underlying, rate_model)?;
            tx.support_market(caller, market)?;
            Ok(market)
        })
    }

    pub fn accrue_interest(&mut self, market: MarketId) -> Result<(), ProtocolError> {
        self.transact(FailureInfo::AccrueInterest, |tx| tx.accrue(market))
    }

    // === Supply ===

    pub fn mint(
        &mut self,
        minter: &AccountId,
        market: MarketId,
        amount: U256,
    ) -> Result<MintReceipt, ProtocolError> {
        self.transact(FailureInfo::Mint, |tx| {
            tx.accrue(market)?;
            let receipt = mint_fresh(
                &mut tx.state.markets,
                &tx.state.controller,
                market,
                minter,
                amount,
                tx.block,
            )?;
            tx.emit(ProtocolEvent::Mint {
                market,
                minter: minter.clone(),
                mint_amount: receipt.mint_amount,
                mint_tokens: receipt.mint_tokens,
            });
            Ok(receipt)
        })
    }

    /// Redeem `tokens` claim tokens
    pub fn redeem(
        &mut self,
        redeemer: &AccountId,
        market: MarketId,
        tokens: U256,
    ) -> Result<RedeemReceipt, ProtocolError> {
        self.redeem_with(redeemer, market, RedeemAmount::Tokens(tokens))
    }

    /// Redeem enough claim tokens to receive `amount` underlying
    pub fn redeem_underlying(
        &mut self,
        redeemer: &AccountId,
        market: MarketId,
        amount: U256,
    ) -> Result<RedeemReceipt, ProtocolError> {
        self.redeem_with(redeemer, market, RedeemAmount::Underlying(amount))
    }

    fn redeem_with(
        &mut self,
        redeemer: &AccountId,
        market: MarketId,
        amount: RedeemAmount,
    ) -> Result<RedeemReceipt, ProtocolError> {
        self.transact(FailureInfo::Redeem, |tx| {
            tx.accrue(market)?;
            let receipt = redeem_fresh(
                &mut tx.state.markets,
                &tx.state.controller,
                market,
                redeemer,
                amount,
                tx.block,
            )?;
            tx.emit(ProtocolEvent::Redeem {
                market,
                redeemer: redeemer.clone(),
                redeem_amount: receipt.redeem_amount,
                redeem_tokens: receipt.redeem_tokens,
            });
            Ok(receipt)
        })
    }

    pub fn transfer(
        &mut self,
        src: &AccountId,
        dst: &AccountId,
        market: MarketId,
        tokens: U256,
    ) -> Result<(), ProtocolError> {
        self.transfer_from(src, src, dst, market, tokens)
    }

    /// Move claim tokens on behalf of `src`, spending `spender`'s allowance
    /// unless `spender == src`
    pub fn transfer_from(
        &mut self,
        spender: &AccountId,
        src: &AccountId,
        dst: &AccountId,
        market: MarketId,
        tokens: U256,
    ) -> Result<(), ProtocolError> {
        self.transact(FailureInfo::Transfer, |tx| {
            transfer_tokens(
                &mut tx.state.markets,
                &tx.state.controller,
                market,
                spender,
                src,
                dst,
                tokens,
            )?;
            tx.emit(ProtocolEvent::Transfer {
                market,
                from: src.clone(),
                to: dst.clone(),
                amount: tokens,
            });
            Ok(())
        })
    }

    pub fn approve(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        market: MarketId,
        amount: U256,
    ) -> Result<(), ProtocolError> {
        self.transact(FailureInfo::Transfer, |tx| {
            approve(&mut tx.state.markets, market, owner, spender, amount)?;
            tx.emit(ProtocolEvent::Approval {
                market,
                owner: owner.clone(),
                spender: spender.clone(),
                amount,
            });
            Ok(())
        })
    }

    // === Borrow ===

    pub fn borrow(
        &mut self,
        borrower: &AccountId,
        market: MarketId,
        amount: U256,
    ) -> Result<BorrowReceipt, ProtocolError> {
        self.transact(FailureInfo::Borrow, |tx| {
            tx.accrue(market)?;
            let was_member = tx.state.controller.check_membership(borrower, market);
            let result = borrow_fresh(
                &mut tx.state.markets,
                &mut tx.state.controller,
                market,
                borrower,
                amount,
                tx.block,
            );
            // The entry survives a soft rejection raised after the hook
            if !was_member && tx.state.controller.check_membership(borrower, market) {
                tx.emit(ProtocolEvent::MarketEntered {
                    market,
                    account: borrower.clone(),
                });
            }
            let receipt = result?;
            tx.emit(ProtocolEvent::Borrow {
                market,
                borrower: borrower.clone(),
                borrow_amount: receipt.borrow_amount,
                account_borrows: receipt.account_borrows,
                total_borrows: receipt.total_borrows,
            });
            Ok(receipt)
        })
    }

    /// Repay the payer's own borrow; `U256::MAX` repays it in full
    pub fn repay_borrow(
        &mut self,
        payer: &AccountId,
        market: MarketId,
        amount: U256,
    ) -> Result<RepayReceipt, ProtocolError> {
        self.repay_borrow_behalf(payer, payer, market, amount)
    }

    pub fn repay_borrow_behalf(
        &mut self,
        payer: &AccountId,
        borrower: &AccountId,
        market: MarketId,
        amount: U256,
    ) -> Result<RepayReceipt, ProtocolError> {
        self.transact(FailureInfo::RepayBorrow, |tx| {
            tx.accrue(market)?;
            let receipt = repay_borrow_fresh(
                &mut tx.state.markets,
                &tx.state.controller,
                market,
                payer,
                borrower,
                amount,
                tx.block,
            )?;
            tx.emit(ProtocolEvent::RepayBorrow {
                market,
                payer: payer.clone(),
                borrower: borrower.clone(),
                repay_amount: receipt.repay_amount,
                account_borrows: receipt.account_borrows,
                total_borrows: receipt.total_borrows,
            });
            Ok(receipt)
        })
    }

    /// Repay `repay_amount` of `borrower`'s debt in `borrowed` and seize
    /// collateral tokens of `collateral`. Any failure aborts.
    pub fn liquidate_borrow(
        &mut self,
        liquidator: &AccountId,
        borrower: &AccountId,
        borrowed: MarketId,
        collateral: MarketId,
        repay_amount: U256,
    ) -> Result<LiquidationReceipt, ProtocolError> {
        self.transact(FailureInfo::LiquidateBorrow, |tx| {
            tx.accrue(borrowed).map_err(LedgerError::escalate)?;
            tx.accrue(collateral).map_err(LedgerError::escalate)?;
            let receipt = liquidate_borrow_fresh(
                &mut tx.state.markets,
                &tx.state.controller,
                borrowed,
                collateral,
                liquidator,
                borrower,
                repay_amount,
                tx.block,
            )?;
            tx.emit(ProtocolEvent::LiquidateBorrow {
                borrowed,
                collateral,
                liquidator: liquidator.clone(),
                borrower: borrower.clone(),
                repay_amount: receipt.repay_amount,
                seize_tokens: receipt.seize_tokens,
            });
            Ok(receipt)
        })
    }

    // === Membership ===

    /// Enter each market independently; one result per market
    pub fn enter_markets(
        &mut self,
        account: &AccountId,
        markets: &[MarketId],
    ) -> Vec<Result<(), ProtocolError>> {
        markets
            .iter()
            .map(|&market| self.enter_market(account, market))
            .collect()
    }

    pub fn enter_market(&mut self, account: &AccountId, market: MarketId) -> Result<(), ProtocolError> {
        self.transact(FailureInfo::EnterMarket, |tx| {
            let was_member = tx.state.controller.check_membership(account, market);
            tx.state.controller.enter_market(account, market)?;
            if !was_member {
                tx.emit(ProtocolEvent::MarketEntered {
                    market,
                    account: account.clone(),
                });
            }
            Ok(())
        })
    }

    pub fn exit_market(&mut self, account: &AccountId, market: MarketId) -> Result<(), ProtocolError> {
        self.transact(FailureInfo::ExitMarket, |tx| {
            let was_member = tx.state.controller.check_membership(account, market);
            tx.state
                .controller
                .exit_market(&tx.state.markets, account, market)?;
            if was_member {
                tx.emit(ProtocolEvent::MarketExited {
                    market,
                    account: account.clone(),
                });
            }
            Ok(())
        })
    }

    // === Admin ===

    /// Returns the old factor
    pub fn set_collateral_factor(
        &mut self,
        caller: &AccountId,
        market: MarketId,
        factor: Exp,
    ) -> Result<Exp, ProtocolError> {
        self.transact(FailureInfo::SetCollateralFactor, |tx| {
            let old = tx
                .state
                .controller
                .set_collateral_factor(caller, market, factor)?;
            tx.emit(ProtocolEvent::NewCollateralFactor {
                market,
                old,
                new: factor,
            });
            Ok(old)
        })
    }

    pub fn set_close_factor(&mut self, caller: &AccountId, factor: Exp) -> Result<Exp, ProtocolError> {
        self.transact(FailureInfo::SetCloseFactor, |tx| {
            let old = tx.state.controller.set_close_factor(caller, factor)?;
            tx.emit(ProtocolEvent::NewCloseFactor { old, new: factor });
            Ok(old)
        })
    }

    pub fn set_liquidation_incentive(
        &mut self,
        caller: &AccountId,
        incentive: Exp,
    ) -> Result<Exp, ProtocolError> {
        self.transact(FailureInfo::SetLiquidationIncentive, |tx| {
            let old = tx
                .state
                .controller
                .set_liquidation_incentive(caller, incentive)?;
            tx.emit(ProtocolEvent::NewLiquidationIncentive {
                old,
                new: incentive,
            });
            Ok(old)
        })
    }

    pub fn set_max_assets(
        &mut self,
        caller: &AccountId,
        max_assets: usize,
    ) -> Result<usize, ProtocolError> {
        self.transact(FailureInfo::SetMaxAssets, |tx| {
            let old = tx.state.controller.set_max_assets(caller, max_assets)?;
            tx.emit(ProtocolEvent::NewMaxAssets {
                old,
                new: max_assets,
            });
            Ok(old)
        })
    }

    /// Returns the old reserve factor
    pub fn set_reserve_factor(
        &mut self,
        caller: &AccountId,
        market: MarketId,
        factor: Exp,
    ) -> Result<Exp, ProtocolError> {
        self.transact(FailureInfo::SetReserveFactor, |tx| {
            tx.ensure_admin(caller, FailureInfo::SetReserveFactor)?;
            tx.accrue(market)?;
            let old = set_reserve_factor_fresh(&mut tx.state.markets, market, factor, tx.block)?;
            tx.emit(ProtocolEvent::NewReserveFactor {
                market,
                old,
                new: factor,
            });
            Ok(old)
        })
    }

    /// Donate underlying to the market's reserves; returns the new total
    pub fn add_reserves(
        &mut self,
        benefactor: &AccountId,
        market: MarketId,
        amount: U256,
    ) -> Result<U256, ProtocolError> {
        self.transact(FailureInfo::AddReserves, |tx| {
            tx.accrue(market)?;
            let total_reserves =
                add_reserves_fresh(&mut tx.state.markets, market, benefactor, amount, tx.block)?;
            tx.emit(ProtocolEvent::ReservesAdded {
                market,
                benefactor: benefactor.clone(),
                amount,
                total_reserves,
            });
            Ok(total_reserves)
        })
    }

    /// Withdraw reserves to the admin; returns the new total
    pub fn reduce_reserves(
        &mut self,
        caller: &AccountId,
        market: MarketId,
        amount: U256,
    ) -> Result<U256, ProtocolError> {
        self.transact(FailureInfo::ReduceReserves, |tx| {
            tx.ensure_admin(caller, FailureInfo::ReduceReserves)?;
            tx.accrue(market)?;
            let total_reserves =
                reduce_reserves_fresh(&mut tx.state.markets, market, caller, amount, tx.block)?;
            tx.emit(ProtocolEvent::ReservesReduced {
                market,
                recipient: caller.clone(),
                amount,
                total_reserves,
            });
            Ok(total_reserves)
        })
    }

    pub fn set_interest_rate_model(
        &mut self,
        caller: &AccountId,
        market: MarketId,
        rate_model: Arc<dyn InterestRateModel>,
    ) -> Result<(), ProtocolError> {
        self.transact(FailureInfo::SetInterestRateModel, |tx| {
            tx.ensure_admin(caller, FailureInfo::SetInterestRateModel)?;
            tx.accrue(market)?;
            let old = tx
                .state
                .markets
                .market(market, FailureInfo::SetInterestRateModel)?
                .rate_model()
                .name()
                .to_string();
            let new = rate_model.name().to_string();
            set_interest_rate_model_fresh(&mut tx.state.markets, market, rate_model, tx.block)?;
            tx.emit(ProtocolEvent::NewInterestRateModel { market, old, new });
            Ok(())
        })
    }

    // === Simulation ===

    pub fn block(&self) -> u64 {
        self.block
    }

    pub fn advance_blocks(&mut self, blocks: u64) {
        self.block = self.block.saturating_add(blocks);
    }

    /// The market's underlying token, for simulating its holders and
    /// misbehavior (fees, pauses)
    pub fn underlying_mut(&mut self, market: MarketId) -> Result<&mut Erc20Token, ProtocolError> {
        self.state
            .markets
            .get_mut(market)
            .map(Market::underlying_mut)
            .ok_or(ProtocolError::UnknownMarket(market))
    }

    /// Mint underlying to `account`
    pub fn faucet(
        &mut self,
        market: MarketId,
        account: &AccountId,
        amount: U256,
    ) -> Result<(), ProtocolError> {
        self.underlying_mut(market)?
            .mint(account, amount)
            .map_err(LedgerError::from)?;
        Ok(())
    }

    /// Let the market pull `amount` of `owner`'s underlying
    pub fn approve_underlying(
        &mut self,
        owner: &AccountId,
        market: MarketId,
        amount: U256,
    ) -> Result<(), ProtocolError> {
        let vault = market.vault();
        self.underlying_mut(market)?.approve(owner, &vault, amount);
        Ok(())
    }

    pub fn underlying_balance(
        &self,
        market: MarketId,
        account: &AccountId,
    ) -> Result<U256, ProtocolError> {
        Ok(self.market(market)?.underlying().balance_of(account))
    }

    // === Views ===

    pub fn markets(&self) -> &Markets {
        &self.state.markets
    }

    pub fn controller(&self) -> &RiskController {
        &self.state.controller
    }

    pub fn market(&self, market: MarketId) -> Result<&Market, ProtocolError> {
        self.state
            .markets
            .get(market)
            .ok_or(ProtocolError::UnknownMarket(market))
    }

    pub fn exchange_rate_stored(&self, market: MarketId) -> Result<Exp, ProtocolError> {
        Ok(self.market(market)?.exchange_rate_stored()?)
    }

    pub fn exchange_rate_current(&mut self, market: MarketId) -> Result<Exp, ProtocolError> {
        self.accrue_interest(market)?;
        self.exchange_rate_stored(market)
    }

    pub fn balance_of(&self, market: MarketId, account: &AccountId) -> Result<U256, ProtocolError> {
        Ok(self.market(market)?.balance_of(account))
    }

    /// Claim-token balance valued in underlying, after accruing
    pub fn balance_of_underlying(
        &mut self,
        market: MarketId,
        account: &AccountId,
    ) -> Result<U256, ProtocolError> {
        self.accrue_interest(market)?;
        Ok(self.market(market)?.balance_of_underlying_stored(account)?)
    }

    pub fn borrow_balance_stored(
        &self,
        market: MarketId,
        account: &AccountId,
    ) -> Result<U256, ProtocolError> {
        Ok(self.market(market)?.borrow_balance_stored(account)?)
    }

    pub fn borrow_balance_current(
        &mut self,
        market: MarketId,
        account: &AccountId,
    ) -> Result<U256, ProtocolError> {
        self.accrue_interest(market)?;
        self.borrow_balance_stored(market, account)
    }

    pub fn total_borrows_current(&mut self, market: MarketId) -> Result<U256, ProtocolError> {
        self.accrue_interest(market)?;
        Ok(self.market(market)?.total_borrows())
    }

    pub fn account_snapshot(
        &self,
        market: MarketId,
        account: &AccountId,
    ) -> Result<AccountSnapshot, ProtocolError> {
        Ok(self.market(market)?.account_snapshot(account)?)
    }

    pub fn borrow_rate_per_block(&self, market: MarketId) -> Result<Exp, ProtocolError> {
        Ok(self.market(market)?.borrow_rate_per_block()?)
    }

    pub fn supply_rate_per_block(&self, market: MarketId) -> Result<Exp, ProtocolError> {
        Ok(self.market(market)?.supply_rate_per_block()?)
    }

    pub fn get_cash(&self, market: MarketId) -> Result<U256, ProtocolError> {
        Ok(self.market(market)?.cash())
    }

    pub fn assets_in(&self, account: &AccountId) -> &[MarketId] {
        self.state.controller.assets_in(account)
    }

    pub fn check_membership(&self, account: &AccountId, market: MarketId) -> bool {
        self.state.controller.check_membership(account, market)
    }

    pub fn account_liquidity(&self, account: &AccountId) -> Result<AccountLiquidity, ProtocolError> {
        Ok(self
            .state
            .controller
            .account_liquidity(&self.state.markets, account)?)
    }

    pub fn hypothetical_account_liquidity(
        &self,
        account: &AccountId,
        change: Hypothetical,
    ) -> Result<AccountLiquidity, ProtocolError> {
        Ok(self
            .state
            .controller
            .hypothetical_account_liquidity(&self.state.markets, account, change)?)
    }

    pub fn liquidate_calculate_seize_tokens(
        &self,
        borrowed: MarketId,
        collateral: MarketId,
        repay_amount: U256,
    ) -> Result<U256, ProtocolError> {
        Ok(self.state.controller.liquidate_calculate_seize_tokens(
            &self.state.markets,
            borrowed,
            collateral,
            repay_amount,
        )?)
    }

    // === Journal ===

    /// Events journaled since this protocol was built
    pub fn events(&self) -> &[EventRecord] {
        &self.journal
    }

    /// Sequence number the next journaled event will get
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}
