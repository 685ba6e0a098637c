//! Stress tests
//!
//! These tests hammer the engine from many threads and with extreme trades to verify
//! the pools stay solvent and consistent under load.

use credential_amm::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;

const FAR: Timestamp = Timestamp::MAX;
const TOKEN: u64 = 0xABC;

fn setup(config: AmmConfig) -> (Engine, Arc<InMemoryLedgers>) {
    let ledgers = Arc::new(InMemoryLedgers::new());
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_000)));
    let engine = Engine::with_clock(config, ledgers.clone(), clock).unwrap();
    (engine, ledgers)
}

fn open_pool(
    engine: &Engine,
    ledgers: &InMemoryLedgers,
    id: CredentialId,
    token: Address,
    tokens: Amount,
    settlement: Amount,
) {
    let creator = Address::from_u64(1);
    ledgers.register_token(token).mint(creator, tokens);
    ledgers.settlement().mint(creator, settlement);
    engine.create_pool(creator, id, token, tokens, settlement, FAR).unwrap();
}

fn assert_consistent(engine: &Engine, ledgers: &InMemoryLedgers, id: CredentialId) {
    let pool = engine.get_pool(id).unwrap();
    let token_ledger = ledgers.token(pool.token_address).unwrap();
    assert_eq!(token_ledger.balance_of(engine.vault()), pool.token_reserves);
    let shares: Shares = engine.positions(id).unwrap().iter().map(|p| p.shares).sum();
    assert_eq!(shares, pool.total_liquidity_shares);
}

/// Many threads trading and providing on the same pool.
mod concurrency_tests {
    use super::*;

    #[test]
    fn concurrent_swaps_keep_custody_exact() {
        let (engine, ledgers) = setup(AmmConfig::mainnet());
        let id = CredentialId::from_u64(1);
        let token = Address::from_u64(TOKEN);
        open_pool(&engine, &ledgers, id, token, 1_000_000 * ONE_TOKEN, 1_000_000 * ONE_SETTLEMENT);

        let traders: Vec<Address> = (10..26).map(Address::from_u64).collect();
        for &trader in &traders {
            ledgers.token(token).unwrap().mint(trader, 10_000 * ONE_TOKEN);
            ledgers.settlement().mint(trader, 10_000 * ONE_SETTLEMENT);
        }
        let k_start = engine.get_pool(id).unwrap().k();

        thread::scope(|s| {
            for (i, &trader) in traders.iter().enumerate() {
                let engine = &engine;
                s.spawn(move || {
                    for round in 0..50u128 {
                        let direction = if (i as u128 + round) % 2 == 0 {
                            SwapDirection::SettlementToToken
                        } else {
                            SwapDirection::TokenToSettlement
                        };
                        let amount = match direction {
                            SwapDirection::SettlementToToken => (round + 1) * ONE_SETTLEMENT,
                            SwapDirection::TokenToSettlement => (round + 1) * ONE_TOKEN,
                        };
                        engine.swap(trader, id, amount, 0, FAR, direction).unwrap();
                    }
                });
            }
        });

        let pool = engine.get_pool(id).unwrap();
        assert_eq!(pool.swap_count, 16 * 50);
        assert!(pool.k() >= k_start);
        assert_eq!(ledgers.settlement().balance_of(engine.vault()), pool.settlement_reserves);
        assert_consistent(&engine, &ledgers, id);

        // every swap produced exactly one event, ids strictly increasing
        let swaps: Vec<Event> = engine
            .pool_events(id)
            .into_iter()
            .filter(|e| matches!(e.payload, EventPayload::Swapped(_)))
            .collect();
        assert_eq!(swaps.len(), 16 * 50);
        assert!(swaps.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn liquidity_churn_during_trading() {
        let (engine, ledgers) = setup(AmmConfig::mainnet());
        let id = CredentialId::from_u64(1);
        let token = Address::from_u64(TOKEN);
        open_pool(&engine, &ledgers, id, token, 100_000 * ONE_TOKEN, 100_000 * ONE_SETTLEMENT);

        let providers: Vec<Address> = (100..108).map(Address::from_u64).collect();
        let traders: Vec<Address> = (200..208).map(Address::from_u64).collect();
        for &who in providers.iter().chain(traders.iter()) {
            ledgers.token(token).unwrap().mint(who, 100_000 * ONE_TOKEN);
            ledgers.settlement().mint(who, 100_000 * ONE_SETTLEMENT);
        }

        thread::scope(|s| {
            for &provider in &providers {
                let engine = &engine;
                s.spawn(move || {
                    for _ in 0..20 {
                        let tokens = 500 * ONE_TOKEN;
                        let settlement = engine.proportional_settlement(id, tokens).unwrap();
                        // the ratio can move between the two calls, so the deposit may mint a bit less
                        if engine.add_liquidity(provider, id, tokens, settlement, 0, FAR).is_err() {
                            continue;
                        }
                        let held = engine.get_position(id, provider).unwrap().shares;
                        engine.remove_liquidity(provider, id, held / 2, 0, 0, FAR).unwrap();
                        let _ = engine.claim_fees(provider, id);
                    }
                });
            }
            for &trader in &traders {
                let engine = &engine;
                s.spawn(move || {
                    for round in 0..40 {
                        let direction = if round % 2 == 0 {
                            SwapDirection::SettlementToToken
                        } else {
                            SwapDirection::TokenToSettlement
                        };
                        let amount = match direction {
                            SwapDirection::SettlementToToken => 250 * ONE_SETTLEMENT,
                            SwapDirection::TokenToSettlement => 250 * ONE_TOKEN,
                        };
                        engine.swap(trader, id, amount, 0, FAR, direction).unwrap();
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..10 {
                    engine.collect_protocol_fees(id).unwrap();
                }
            });
        });

        assert_consistent(&engine, &ledgers, id);
        assert_eq!(ledgers.settlement().balance_of(engine.vault()), engine.get_pool(id).unwrap().settlement_reserves);

        // everyone can still leave
        let mut holders = vec![Address::from_u64(1)];
        holders.extend(providers.iter().copied());
        for provider in holders {
            let held = engine.get_position(id, provider).map(|p| p.shares).unwrap_or(0);
            if held > 0 {
                engine.remove_liquidity(provider, id, held, 0, 0, FAR).unwrap();
            }
        }
        let pool = engine.get_pool(id).unwrap();
        assert_eq!(pool.total_liquidity_shares, 0);
        assert_consistent(&engine, &ledgers, id);
    }

    #[test]
    fn pools_trade_independently_in_parallel() {
        let (engine, ledgers) = setup(AmmConfig::default());
        let ids: Vec<CredentialId> = (1..=8).map(CredentialId::from_u64).collect();
        for (i, &id) in ids.iter().enumerate() {
            let token = Address::from_u64(TOKEN + i as u64);
            open_pool(&engine, &ledgers, id, token, 10_000 * ONE_TOKEN, 10_000 * ONE_SETTLEMENT);
        }

        let trader = Address::from_u64(50);
        ledgers.settlement().mint(trader, 1_000_000 * ONE_SETTLEMENT);

        thread::scope(|s| {
            for &id in &ids {
                let engine = &engine;
                s.spawn(move || {
                    for _ in 0..25 {
                        engine
                            .swap(trader, id, 10 * ONE_SETTLEMENT, 0, FAR, SwapDirection::SettlementToToken)
                            .unwrap();
                    }
                });
            }
        });

        // identical pools, identical trade sequences: identical end states
        let first = engine.get_pool(ids[0]).unwrap().snapshot();
        for &id in &ids {
            assert_eq!(engine.get_pool(id).unwrap().snapshot(), first);
            assert_consistent(&engine, &ledgers, id);
        }
        assert_eq!(
            ledgers.settlement().balance_of(trader),
            1_000_000 * ONE_SETTLEMENT - 8 * 25 * 10 * ONE_SETTLEMENT
        );
    }

    #[test]
    fn racing_creators_produce_one_pool() {
        let (engine, ledgers) = setup(AmmConfig::default());
        let id = CredentialId::from_u64(7);
        let token = Address::from_u64(TOKEN);
        let token_ledger = ledgers.register_token(token);

        let creators: Vec<Address> = (1..=12).map(Address::from_u64).collect();
        for &creator in &creators {
            token_ledger.mint(creator, 1_000 * ONE_TOKEN);
            ledgers.settlement().mint(creator, 1_000 * ONE_SETTLEMENT);
        }

        let outcomes: Vec<Result<CreatePoolResult, EngineError>> = thread::scope(|s| {
            let handles: Vec<_> = creators
                .iter()
                .map(|&creator| {
                    let engine = &engine;
                    s.spawn(move || {
                        engine.create_pool(creator, id, token, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT, FAR)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(outcomes
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, EngineError::PoolAlreadyExists(_))));

        // losers keep their funds
        assert_eq!(token_ledger.balance_of(engine.vault()), 1_000 * ONE_TOKEN);
        assert_eq!(engine.positions(id).unwrap().len(), 1);
        assert_consistent(&engine, &ledgers, id);
    }
}

/// Extreme sizes and long sequences on a single thread.
mod extreme_trade_tests {
    use super::*;

    #[test]
    fn whale_swap_cannot_drain_pool() {
        let (engine, ledgers) = setup(AmmConfig::default());
        let id = CredentialId::from_u64(1);
        let token = Address::from_u64(TOKEN);
        open_pool(&engine, &ledgers, id, token, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT);

        let whale = Address::from_u64(2);
        let size = 1_000_000_000_000 * ONE_SETTLEMENT;
        ledgers.settlement().mint(whale, size);

        let result = engine
            .swap(whale, id, size, 0, FAR, SwapDirection::SettlementToToken)
            .unwrap();
        assert!(result.amount_out < 1_000 * ONE_TOKEN);
        let (t, s) = engine.get_reserves(id).unwrap();
        assert!(t > 0);
        assert!(s > size);
        assert_consistent(&engine, &ledgers, id);
    }

    #[test]
    fn thousands_of_small_swaps_accrue_fees() {
        let (engine, ledgers) = setup(AmmConfig::mainnet());
        let id = CredentialId::from_u64(1);
        let token = Address::from_u64(TOKEN);
        open_pool(&engine, &ledgers, id, token, 10_000 * ONE_TOKEN, 10_000 * ONE_SETTLEMENT);

        let trader = Address::from_u64(2);
        ledgers.settlement().mint(trader, 100_000 * ONE_SETTLEMENT);
        ledgers.token(token).unwrap().mint(trader, 100_000 * ONE_TOKEN);

        let mut fees_paid = 0u128;
        for i in 0..2_000u128 {
            let (direction, amount) = if i % 2 == 0 {
                (SwapDirection::SettlementToToken, ONE_SETTLEMENT)
            } else {
                (SwapDirection::TokenToSettlement, ONE_TOKEN)
            };
            let result = engine.swap(trader, id, amount, 0, FAR, direction).unwrap();
            if direction == SwapDirection::SettlementToToken {
                fees_paid += result.fee_amount;
            }
        }

        let creator = Address::from_u64(1);
        let pending = engine.pending_fees(id, creator).unwrap();
        let pool = engine.get_pool(id).unwrap();
        // the sole provider owns every provider fee, less index rounding
        assert!(pending.settlement <= pool.outstanding_provider_fees.settlement);
        assert!(pool.outstanding_provider_fees.settlement - pending.settlement <= 2_000);
        assert_eq!(
            pool.outstanding_provider_fees.settlement + pool.protocol_fees.settlement,
            fees_paid
        );
        assert_consistent(&engine, &ledgers, id);
    }

    #[test]
    fn price_survives_one_sided_pressure() {
        let (engine, ledgers) = setup(AmmConfig::default());
        let id = CredentialId::from_u64(1);
        let token = Address::from_u64(TOKEN);
        open_pool(&engine, &ledgers, id, token, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT);
        assert_eq!(engine.get_price_decimal(id).unwrap(), dec!(1));

        let buyer = Address::from_u64(2);
        ledgers.settlement().mint(buyer, 1_000_000 * ONE_SETTLEMENT);

        let mut last = engine.get_price(id).unwrap();
        for _ in 0..100 {
            engine
                .swap(buyer, id, 1_000 * ONE_SETTLEMENT, 0, FAR, SwapDirection::SettlementToToken)
                .unwrap();
            let price = engine.get_price(id).unwrap();
            assert!(price > last, "buying must push the price up");
            last = price;
        }
        assert!(engine.get_price_decimal(id).unwrap() > dec!(1000));
        assert_consistent(&engine, &ledgers, id);
    }
}
