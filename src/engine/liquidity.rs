//! Pool creation and liquidity provision.
//!
//! State is mutated first, then the external transfers run under the same pool lock. A failed
//! transfer restores the captured state and reverses whatever already moved.

use super::core::{ensure_active, ensure_live, Engine, Rollback};
use super::results::{AddLiquidityResult, CreatePoolResult, EngineError, RemoveLiquidityResult};
use crate::events::{EventPayload, LiquidityAddedEvent, LiquidityRemovedEvent, PoolCreatedEvent};
use crate::fees;
use crate::ledger::CredentialTokenLookup;
use crate::liquidity;
use crate::pool::{Delta, LiquidityPool};
use crate::registry::PoolState;
use crate::transfer::TransferBatch;
use crate::types::{Address, Amount, Asset, CredentialId, Shares, Timestamp};

impl Engine {
    pub fn create_pool(
        &self,
        caller: Address,
        credential_id: CredentialId,
        token_address: Address,
        token_amount: Amount,
        settlement_amount: Amount,
        deadline: Timestamp,
    ) -> Result<CreatePoolResult, EngineError> {
        let now = self.check_deadline(deadline)?;
        tracing::debug!(%credential_id, %caller, token_amount, settlement_amount, "create_pool");

        if token_amount == 0 || settlement_amount == 0 {
            return Err(EngineError::InvalidParameters("both initial amounts must be non-zero".into()));
        }
        if token_address.is_zero() {
            return Err(EngineError::InvalidParameters("token address is zero".into()));
        }
        let token_ledger = self.token_ledger(token_address)?;
        let settlement_ledger = self.settlement_ledger();

        let shares = liquidity::initial_shares(token_amount, settlement_amount)?;
        let pool = LiquidityPool::new(credential_id, token_address, token_amount, settlement_amount, shares, now);
        let mut state = PoolState::new(pool);
        {
            let (pool, position) = state.pool_and_position(caller, now);
            position.record_deposit(shares, token_amount, settlement_amount, now)?;
            fees::rebase_debt(position, pool)?;
        }
        let snapshot = state.pool.snapshot();

        let vault = self.vault();
        self.registry.create(state, |_: &mut PoolState| -> Result<(), EngineError> {
            let mut batch = TransferBatch::new("create_pool");
            batch
                .push(Asset::Token, token_ledger, caller, vault, token_amount)
                .push(Asset::Settlement, settlement_ledger, caller, vault, settlement_amount);
            batch.execute()?;

            self.emit_event(
                now,
                EventPayload::PoolCreated(PoolCreatedEvent {
                    credential_id,
                    token_address,
                    creator: caller,
                    token_amount,
                    settlement_amount,
                    shares_minted: shares,
                    state: snapshot,
                }),
            );
            Ok(())
        })?;

        tracing::info!(%credential_id, %caller, shares, "pool created");
        Ok(CreatePoolResult {
            credential_id,
            token_address,
            shares_minted: shares,
            state: snapshot,
        })
    }

    /// Create a pool for a credential whose token address comes from the token registry.
    pub fn create_pool_for_credential(
        &self,
        lookup: &dyn CredentialTokenLookup,
        caller: Address,
        credential_id: CredentialId,
        token_amount: Amount,
        settlement_amount: Amount,
        deadline: Timestamp,
    ) -> Result<CreatePoolResult, EngineError> {
        let token_address = lookup.token_address_for(&credential_id).ok_or_else(|| {
            EngineError::InvalidParameters(format!("credential {} has no token", credential_id))
        })?;
        self.create_pool(caller, credential_id, token_address, token_amount, settlement_amount, deadline)
    }

    pub fn add_liquidity(
        &self,
        caller: Address,
        credential_id: CredentialId,
        token_amount: Amount,
        settlement_amount: Amount,
        min_shares: Shares,
        deadline: Timestamp,
    ) -> Result<AddLiquidityResult, EngineError> {
        let now = self.check_deadline(deadline)?;
        let handle = self.registry.handle(&credential_id)?;
        let mut state = handle.write();
        ensure_active(&state)?;

        if token_amount == 0 || settlement_amount == 0 {
            return Err(EngineError::InvalidParameters("both deposit amounts must be non-zero".into()));
        }

        let shares = liquidity::shares_for_deposit(&state.pool, token_amount, settlement_amount)?;
        if shares == 0 {
            return Err(liquidity::LiquidityError::NothingMinted.into());
        }
        if shares < min_shares {
            tracing::warn!(%credential_id, shares, min_shares, "add_liquidity slippage");
            return Err(EngineError::SlippageExceeded {
                field: "shares",
                actual: shares,
                limit: min_shares,
            });
        }

        let token_ledger = self.token_ledger(state.pool.token_address)?;
        let rollback = Rollback::capture(&state, Some(caller));
        let position_shares = match deposit(&mut state, caller, shares, token_amount, settlement_amount, now) {
            Ok(held) => held,
            Err(e) => {
                rollback.restore(&mut state);
                return Err(e);
            }
        };

        let mut batch = TransferBatch::new("add_liquidity");
        batch
            .push(Asset::Token, token_ledger, caller, self.vault(), token_amount)
            .push(Asset::Settlement, self.settlement_ledger(), caller, self.vault(), settlement_amount);
        if let Err(e) = batch.execute() {
            rollback.restore(&mut state);
            return Err(e.into());
        }

        let snapshot = state.pool.snapshot();
        self.emit_event(
            now,
            EventPayload::LiquidityAdded(LiquidityAddedEvent {
                credential_id,
                provider: caller,
                token_amount,
                settlement_amount,
                shares_minted: shares,
                state: snapshot,
            }),
        );
        tracing::info!(%credential_id, %caller, shares, "liquidity added");

        Ok(AddLiquidityResult {
            shares_minted: shares,
            token_amount,
            settlement_amount,
            position_shares,
            state: snapshot,
        })
    }

    /// Burn shares for the proportional slice of the pool. pending fees are paid out too.
    /// Works on inactive pools so providers can always exit.
    pub fn remove_liquidity(
        &self,
        caller: Address,
        credential_id: CredentialId,
        shares: Shares,
        min_token_out: Amount,
        min_settlement_out: Amount,
        deadline: Timestamp,
    ) -> Result<RemoveLiquidityResult, EngineError> {
        let now = self.check_deadline(deadline)?;
        let handle = self.registry.handle(&credential_id)?;
        let mut state = handle.write();
        ensure_live(&state)?;

        if shares == 0 {
            return Err(EngineError::InvalidParameters("share amount must be non-zero".into()));
        }
        let held = state.position(&caller).map(|p| p.shares).unwrap_or(0);
        if held < shares {
            return Err(EngineError::InsufficientShares {
                requested: shares,
                available: held,
            });
        }

        let payout = liquidity::withdrawal_amounts(&state.pool, shares)?;
        if payout.token < min_token_out {
            tracing::warn!(%credential_id, got = payout.token, min_token_out, "remove_liquidity slippage");
            return Err(EngineError::SlippageExceeded {
                field: "token_out",
                actual: payout.token,
                limit: min_token_out,
            });
        }
        if payout.settlement < min_settlement_out {
            tracing::warn!(%credential_id, got = payout.settlement, min_settlement_out, "remove_liquidity slippage");
            return Err(EngineError::SlippageExceeded {
                field: "settlement_out",
                actual: payout.settlement,
                limit: min_settlement_out,
            });
        }

        let token_ledger = self.token_ledger(state.pool.token_address)?;
        let rollback = Rollback::capture(&state, Some(caller));
        let (harvested, position_shares) = match withdraw(&mut state, caller, shares, payout, now) {
            Ok(done) => done,
            Err(e) => {
                rollback.restore(&mut state);
                return Err(e);
            }
        };

        let token_out = payout.token.saturating_add(harvested.token);
        let settlement_out = payout.settlement.saturating_add(harvested.settlement);
        let mut batch = TransferBatch::new("remove_liquidity");
        batch
            .push(Asset::Token, token_ledger, self.vault(), caller, token_out)
            .push(Asset::Settlement, self.settlement_ledger(), self.vault(), caller, settlement_out);
        if let Err(e) = batch.execute() {
            rollback.restore(&mut state);
            return Err(e.into());
        }

        let snapshot = state.pool.snapshot();
        self.emit_event(
            now,
            EventPayload::LiquidityRemoved(LiquidityRemovedEvent {
                credential_id,
                provider: caller,
                shares_burned: shares,
                token_amount: payout.token,
                settlement_amount: payout.settlement,
                fees_harvested: harvested,
                state: snapshot,
            }),
        );
        tracing::info!(%credential_id, %caller, shares, "liquidity removed");

        Ok(RemoveLiquidityResult {
            shares_burned: shares,
            token_amount: payout.token,
            settlement_amount: payout.settlement,
            fees_harvested: harvested,
            position_shares,
            state: snapshot,
        })
    }

    /// Settlement amount that pairs with `token_amount` at the pool's current ratio.
    pub fn proportional_settlement(
        &self,
        credential_id: CredentialId,
        token_amount: Amount,
    ) -> Result<Amount, EngineError> {
        let handle = self.registry.handle(&credential_id)?;
        let state = handle.read();
        ensure_live(&state)?;
        Ok(liquidity::proportional_settlement(&state.pool, token_amount)?)
    }
}

// returns the caller's share balance afterwards
fn deposit(
    state: &mut PoolState,
    caller: Address,
    shares: Shares,
    token_amount: Amount,
    settlement_amount: Amount,
    now: Timestamp,
) -> Result<Shares, EngineError> {
    let (pool, position) = state.pool_and_position(caller, now);
    fees::checkpoint(position, pool)?;

    pool.apply_reserve_delta(Asset::Token, Delta::Increase(token_amount))?;
    pool.apply_reserve_delta(Asset::Settlement, Delta::Increase(settlement_amount))?;
    pool.apply_share_delta(Delta::Increase(shares))?;
    pool.last_updated = now;

    position.record_deposit(shares, token_amount, settlement_amount, now)?;
    fees::rebase_debt(position, pool)?;
    Ok(position.shares)
}

// pays pending fees at the old share count, then burns
fn withdraw(
    state: &mut PoolState,
    caller: Address,
    shares: Shares,
    payout: liquidity::WithdrawalAmounts,
    now: Timestamp,
) -> Result<(fees::FeeAmounts, Shares), EngineError> {
    let (pool, position) = state.pool_and_position(caller, now);
    let harvested = fees::settle_claim(position, pool)?;

    pool.outstanding_provider_fees.debit(Asset::Token, harvested.token)?;
    pool.outstanding_provider_fees.debit(Asset::Settlement, harvested.settlement)?;
    pool.apply_reserve_delta(Asset::Token, Delta::Decrease(payout.token.saturating_add(harvested.token)))?;
    pool.apply_reserve_delta(
        Asset::Settlement,
        Delta::Decrease(payout.settlement.saturating_add(harvested.settlement)),
    )?;
    pool.apply_share_delta(Delta::Decrease(shares))?;
    pool.release_fee_dust();
    pool.last_updated = now;

    position.record_withdrawal(shares, now)?;
    fees::rebase_debt(position, pool)?;
    Ok((harvested, position.shares))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::AmmConfig;
    use crate::ledger::{InMemoryCredentialDirectory, InMemoryLedgers, TokenLedger};
    use crate::math::{ONE_SETTLEMENT, ONE_TOKEN};
    use std::sync::Arc;

    const FAR: Timestamp = Timestamp::MAX;

    fn setup_engine() -> (Engine, Arc<InMemoryLedgers>, Arc<ManualClock>) {
        let ledgers = Arc::new(InMemoryLedgers::new());
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_000)));
        let engine = Engine::with_clock(AmmConfig::default(), ledgers.clone(), clock.clone()).unwrap();
        (engine, ledgers, clock)
    }

    fn funded(ledgers: &InMemoryLedgers, token: Address, who: Address) {
        ledgers.register_token(token).mint(who, 1_000_000 * ONE_TOKEN);
        ledgers.settlement().mint(who, 1_000_000 * ONE_SETTLEMENT);
    }

    #[test]
    fn create_pool_moves_funds_and_mints_shares() {
        let (engine, ledgers, _) = setup_engine();
        let alice = Address::from_u64(1);
        let token = Address::from_u64(0xABC);
        let id = CredentialId::from_u64(1);
        funded(&ledgers, token, alice);

        let result = engine
            .create_pool(alice, id, token, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT, FAR)
            .unwrap();

        // sqrt(1e21 * 1e9 * 1e12)
        assert_eq!(result.shares_minted, 1_000 * ONE_TOKEN);
        assert_eq!(result.state.token_reserves, 1_000 * ONE_TOKEN);
        assert_eq!(ledgers.token(token).unwrap().balance_of(engine.vault()), 1_000 * ONE_TOKEN);
        assert_eq!(ledgers.settlement().balance_of(engine.vault()), 1_000 * ONE_SETTLEMENT);

        let position = engine.get_position(id, alice).unwrap();
        assert_eq!(position.shares, result.shares_minted);
        assert_eq!(position.cumulative_settlement_deposited, 1_000 * ONE_SETTLEMENT);

        let events = engine.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].payload, EventPayload::PoolCreated(_)));
    }

    #[test]
    fn create_pool_rejects_bad_input() {
        let (engine, ledgers, _) = setup_engine();
        let alice = Address::from_u64(1);
        let token = Address::from_u64(0xABC);
        let id = CredentialId::from_u64(1);
        funded(&ledgers, token, alice);

        let zero = engine.create_pool(alice, id, token, 0, ONE_SETTLEMENT, FAR);
        assert!(matches!(zero, Err(EngineError::InvalidParameters(_))));

        let no_token = engine.create_pool(alice, id, Address::ZERO, ONE_TOKEN, ONE_SETTLEMENT, FAR);
        assert!(matches!(no_token, Err(EngineError::InvalidParameters(_))));

        let unknown = engine.create_pool(alice, id, Address::from_u64(0xDEF), ONE_TOKEN, ONE_SETTLEMENT, FAR);
        assert!(matches!(unknown, Err(EngineError::InvalidParameters(_))));

        engine.create_pool(alice, id, token, ONE_TOKEN, ONE_SETTLEMENT, FAR).unwrap();
        let again = engine.create_pool(alice, id, token, ONE_TOKEN, ONE_SETTLEMENT, FAR);
        assert_eq!(again.unwrap_err(), EngineError::PoolAlreadyExists(id));
    }

    #[test]
    fn create_pool_for_credential_uses_directory() {
        let (engine, ledgers, _) = setup_engine();
        let alice = Address::from_u64(1);
        let token = Address::from_u64(0xABC);
        funded(&ledgers, token, alice);

        let directory = InMemoryCredentialDirectory::new();
        let bound = CredentialId::from_u64(1);
        directory.bind(bound, token);

        let result = engine
            .create_pool_for_credential(&directory, alice, bound, ONE_TOKEN, ONE_SETTLEMENT, FAR)
            .unwrap();
        assert_eq!(result.token_address, token);

        let unbound = engine.create_pool_for_credential(
            &directory,
            alice,
            CredentialId::from_u64(2),
            ONE_TOKEN,
            ONE_SETTLEMENT,
            FAR,
        );
        assert!(matches!(unbound, Err(EngineError::InvalidParameters(_))));
    }

    #[test]
    fn add_liquidity_mints_proportionally() {
        let (engine, ledgers, _) = setup_engine();
        let alice = Address::from_u64(1);
        let bob = Address::from_u64(2);
        let token = Address::from_u64(0xABC);
        let id = CredentialId::from_u64(1);
        funded(&ledgers, token, alice);
        funded(&ledgers, token, bob);
        engine
            .create_pool(alice, id, token, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT, FAR)
            .unwrap();

        // the smaller leg decides
        let added = engine
            .add_liquidity(bob, id, 100 * ONE_TOKEN, 200 * ONE_SETTLEMENT, 0, FAR)
            .unwrap();
        assert_eq!(added.shares_minted, 100 * ONE_TOKEN);
        assert_eq!(added.position_shares, 100 * ONE_TOKEN);
        assert_eq!(added.state.total_liquidity_shares, 1_100 * ONE_TOKEN);
        assert_eq!(added.state.settlement_reserves, 1_200 * ONE_SETTLEMENT);
    }

    #[test]
    fn add_liquidity_min_shares_guard_leaves_reserves() {
        let (engine, ledgers, _) = setup_engine();
        let alice = Address::from_u64(1);
        let token = Address::from_u64(0xABC);
        let id = CredentialId::from_u64(1);
        funded(&ledgers, token, alice);
        engine
            .create_pool(alice, id, token, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT, FAR)
            .unwrap();
        let before = engine.get_reserves(id).unwrap();

        let err = engine
            .add_liquidity(alice, id, 10 * ONE_TOKEN, 10 * ONE_SETTLEMENT, 10 * ONE_TOKEN + 1, FAR)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::SlippageExceeded {
                field: "shares",
                actual: 10 * ONE_TOKEN,
                limit: 10 * ONE_TOKEN + 1,
            }
        );
        assert_eq!(engine.get_reserves(id).unwrap(), before);
        assert_eq!(engine.events().len(), 1);
    }

    #[test]
    fn add_liquidity_dust_mints_nothing() {
        let (engine, ledgers, _) = setup_engine();
        let alice = Address::from_u64(1);
        let token = Address::from_u64(0xABC);
        let id = CredentialId::from_u64(1);
        funded(&ledgers, token, alice);
        engine
            .create_pool(alice, id, token, 4_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT, FAR)
            .unwrap();

        // one token wei is worth half a share here
        let err = engine.add_liquidity(alice, id, 1, 1, 0, FAR).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
    }

    #[test]
    fn remove_liquidity_pays_slice() {
        let (engine, ledgers, _) = setup_engine();
        let alice = Address::from_u64(1);
        let token = Address::from_u64(0xABC);
        let id = CredentialId::from_u64(1);
        funded(&ledgers, token, alice);
        let created = engine
            .create_pool(alice, id, token, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT, FAR)
            .unwrap();
        let settlement_before = ledgers.settlement().balance_of(alice);

        let removed = engine
            .remove_liquidity(alice, id, created.shares_minted / 4, 0, 0, FAR)
            .unwrap();
        assert_eq!(removed.token_amount, 250 * ONE_TOKEN);
        assert_eq!(removed.settlement_amount, 250 * ONE_SETTLEMENT);
        assert!(removed.fees_harvested.is_zero());
        assert_eq!(removed.position_shares, 750 * ONE_TOKEN);
        assert_eq!(ledgers.settlement().balance_of(alice), settlement_before + 250 * ONE_SETTLEMENT);
    }

    #[test]
    fn remove_liquidity_rejections() {
        let (engine, ledgers, _) = setup_engine();
        let alice = Address::from_u64(1);
        let bob = Address::from_u64(2);
        let token = Address::from_u64(0xABC);
        let id = CredentialId::from_u64(1);
        funded(&ledgers, token, alice);
        let created = engine
            .create_pool(alice, id, token, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT, FAR)
            .unwrap();

        let zero = engine.remove_liquidity(alice, id, 0, 0, 0, FAR);
        assert!(matches!(zero, Err(EngineError::InvalidParameters(_))));

        let stranger = engine.remove_liquidity(bob, id, 1, 0, 0, FAR).unwrap_err();
        assert_eq!(stranger, EngineError::InsufficientShares { requested: 1, available: 0 });

        let greedy = engine
            .remove_liquidity(alice, id, created.shares_minted / 2, 600 * ONE_TOKEN, 0, FAR)
            .unwrap_err();
        assert!(matches!(greedy, EngineError::SlippageExceeded { field: "token_out", .. }));

        let greedy = engine
            .remove_liquidity(alice, id, created.shares_minted / 2, 0, 600 * ONE_SETTLEMENT, FAR)
            .unwrap_err();
        assert!(matches!(greedy, EngineError::SlippageExceeded { field: "settlement_out", .. }));

        assert_eq!(engine.get_position(id, alice).unwrap().shares, created.shares_minted);
    }

    #[test]
    fn inactive_pool_still_allows_exit() {
        let (engine, ledgers, _) = setup_engine();
        let alice = Address::from_u64(1);
        let token = Address::from_u64(0xABC);
        let id = CredentialId::from_u64(1);
        funded(&ledgers, token, alice);
        let created = engine
            .create_pool(alice, id, token, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT, FAR)
            .unwrap();
        engine.deactivate_pool(id).unwrap();

        let add = engine.add_liquidity(alice, id, ONE_TOKEN, ONE_SETTLEMENT, 0, FAR);
        assert_eq!(add.unwrap_err(), EngineError::PoolInactive(id));

        engine
            .remove_liquidity(alice, id, created.shares_minted, 0, 0, FAR)
            .unwrap();
        assert_eq!(engine.get_reserves(id).unwrap(), (0, 0));
    }

    #[test]
    fn expired_deadline_rejected() {
        let (engine, ledgers, clock) = setup_engine();
        let alice = Address::from_u64(1);
        let token = Address::from_u64(0xABC);
        let id = CredentialId::from_u64(1);
        funded(&ledgers, token, alice);

        let deadline = clock.now();
        // equal to now is still valid
        engine
            .create_pool(alice, id, token, ONE_TOKEN, ONE_SETTLEMENT, deadline)
            .unwrap();

        clock.advance(1);
        let err = engine
            .add_liquidity(alice, id, ONE_TOKEN, ONE_SETTLEMENT, 0, deadline)
            .unwrap_err();
        assert_eq!(err, EngineError::Expired { deadline, now: clock.now() });
    }
}
