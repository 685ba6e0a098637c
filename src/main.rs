//! Credential AMM simulation.
//!
//! Runs the engine against in-memory ledgers: pool bootstrap, swaps, fee accrual and claims,
//! rejected trades, a rollback after a failed transfer, and concurrent traders.

use credential_amm::*;
use rust_decimal::Decimal;
use std::error::Error;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

type SimResult = Result<(), Box<dyn Error>>;

const FAR_FUTURE: Timestamp = Timestamp::MAX;

fn main() -> SimResult {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    println!("Credential AMM Engine Simulation");
    println!("Isolated Pools, Constant Product, Atomic Settlement\n");

    scenario_1_bootstrap_and_swap()?;
    scenario_2_fee_accrual()?;
    scenario_3_rejections()?;
    scenario_4_transfer_rollback()?;
    scenario_5_exact_output()?;
    scenario_6_concurrent_traders()?;
    scenario_7_pool_shutdown()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// Engine plus ledgers with one registered credential token.
struct Sim {
    engine: Engine,
    ledgers: Arc<InMemoryLedgers>,
    clock: Arc<ManualClock>,
    token: Address,
    credential: CredentialId,
}

impl Sim {
    fn new(config: AmmConfig) -> Result<Self, Box<dyn Error>> {
        let ledgers = Arc::new(InMemoryLedgers::new());
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
        let engine = Engine::with_clock(config, ledgers.clone(), clock.clone())?;
        let token = Address::from_u64(0xC0FFEE);
        ledgers.register_token(token);
        Ok(Self {
            engine,
            ledgers,
            clock,
            token,
            credential: CredentialId::from_u64(1),
        })
    }

    fn fund(&self, who: Address, tokens: Amount, settlement: Amount) {
        if let Some(ledger) = self.ledgers.token(self.token) {
            ledger.mint(who, tokens);
        }
        self.ledgers.settlement().mint(who, settlement);
    }

    fn bootstrap(&self, creator: Address, tokens: Amount, settlement: Amount) -> Result<CreatePoolResult, EngineError> {
        self.fund(creator, tokens, settlement);
        self.engine
            .create_pool(creator, self.credential, self.token, tokens, settlement, FAR_FUTURE)
    }
}

fn tokens(amount: Amount) -> String {
    scaled(amount, 18)
}

fn usd(amount: Amount) -> String {
    scaled(amount, 6)
}

fn scaled(amount: Amount, decimals: u32) -> String {
    i128::try_from(amount)
        .ok()
        .and_then(|n| Decimal::try_from_i128_with_scale(n, decimals).ok())
        .map(|d| d.round_dp(4).normalize().to_string())
        .unwrap_or_else(|| amount.to_string())
}

/// Pool creation and the reference 100 USD swap.
fn scenario_1_bootstrap_and_swap() -> SimResult {
    println!("Scenario 1: Bootstrap and First Swap\n");

    let sim = Sim::new(AmmConfig::default())?;
    let alice = Address::from_u64(1);
    let bob = Address::from_u64(2);

    let created = sim.bootstrap(alice, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT)?;
    println!("  Alice seeds 1000 tokens + 1000 USD, receives {} shares", tokens(created.shares_minted));
    println!("  Spot price: {} USD/token\n", sim.engine.get_price_decimal(sim.credential)?);

    sim.fund(bob, 0, 500 * ONE_SETTLEMENT);
    let quote = sim
        .engine
        .quote(sim.credential, 100 * ONE_SETTLEMENT, SwapDirection::SettlementToToken)?;
    println!("  Quote for 100 USD: {} tokens, fee {} USD", tokens(quote.amount_out), usd(quote.fee_amount));

    let result = sim.engine.swap(
        bob,
        sim.credential,
        100 * ONE_SETTLEMENT,
        quote.amount_out,
        FAR_FUTURE,
        SwapDirection::SettlementToToken,
    )?;
    println!("  Bob swaps 100 USD -> {} tokens", tokens(result.amount_out));

    let (token_reserves, settlement_reserves) = sim.engine.get_reserves(sim.credential)?;
    println!("  Reserves: {} tokens, {} USD", tokens(token_reserves), usd(settlement_reserves));
    println!("  Price impact: {}bps, new price {} USD/token\n", quote.price_impact_bps, sim.engine.get_price_decimal(sim.credential)?);
    Ok(())
}

/// Two providers, a stream of trades, claims and the treasury cut.
fn scenario_2_fee_accrual() -> SimResult {
    println!("Scenario 2: Fee Accrual\n");

    let sim = Sim::new(AmmConfig::mainnet())?;
    let alice = Address::from_u64(1);
    let carol = Address::from_u64(3);
    let trader = Address::from_u64(4);

    sim.bootstrap(alice, 1_000 * ONE_TOKEN, 2_000 * ONE_SETTLEMENT)?;
    sim.fund(carol, 500 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT);
    let added = sim.engine.add_liquidity(
        carol,
        sim.credential,
        500 * ONE_TOKEN,
        1_000 * ONE_SETTLEMENT,
        0,
        FAR_FUTURE,
    )?;
    println!("  Carol adds 500 tokens + 1000 USD, receives {} shares", tokens(added.shares_minted));

    sim.fund(trader, 1_000 * ONE_TOKEN, 10_000 * ONE_SETTLEMENT);
    for round in 0..10 {
        sim.clock.advance(60_000);
        if round % 2 == 0 {
            sim.engine.swap(trader, sim.credential, 200 * ONE_SETTLEMENT, 0, FAR_FUTURE, SwapDirection::SettlementToToken)?;
        } else {
            sim.engine.swap(trader, sim.credential, 80 * ONE_TOKEN, 0, FAR_FUTURE, SwapDirection::TokenToSettlement)?;
        }
    }
    println!("  10 alternating swaps executed");

    for (name, who) in [("Alice", alice), ("Carol", carol)] {
        let pending = sim.engine.pending_fees(sim.credential, who)?;
        println!("  {} pending: {} tokens, {} USD", name, tokens(pending.token), usd(pending.settlement));
    }

    let claim = sim.engine.claim_fees(carol, sim.credential)?;
    println!("  Carol claims {} tokens + {} USD", tokens(claim.amounts.token), usd(claim.amounts.settlement));

    let collected = sim.engine.collect_protocol_fees(sim.credential)?;
    println!(
        "  Treasury collects {} tokens + {} USD\n",
        tokens(collected.amounts.token),
        usd(collected.amounts.settlement)
    );
    Ok(())
}

/// Slippage, deadline and dust rejections leave the pool untouched.
fn scenario_3_rejections() -> SimResult {
    println!("Scenario 3: Rejected Operations\n");

    let sim = Sim::new(AmmConfig::default())?;
    let alice = Address::from_u64(1);
    let bob = Address::from_u64(2);
    sim.bootstrap(alice, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT)?;
    sim.fund(bob, 100 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT);
    let before = sim.engine.get_reserves(sim.credential)?;

    let attempts: Vec<(&str, Result<SwapResult, EngineError>)> = vec![
        (
            "min out too high",
            sim.engine.swap(bob, sim.credential, 10 * ONE_SETTLEMENT, 10 * ONE_TOKEN, FAR_FUTURE, SwapDirection::SettlementToToken),
        ),
        (
            "deadline passed",
            sim.engine.swap(bob, sim.credential, 10 * ONE_SETTLEMENT, 0, sim.engine.now().plus_millis(-1), SwapDirection::SettlementToToken),
        ),
        (
            "dust input",
            sim.engine.swap(bob, sim.credential, 1, 0, FAR_FUTURE, SwapDirection::TokenToSettlement),
        ),
    ];
    for (label, result) in attempts {
        match result {
            Ok(_) => println!("  {}: unexpectedly accepted", label),
            Err(e) => println!("  {}: {}", label, e),
        }
    }

    let shares = sim.engine.add_liquidity(bob, sim.credential, 10 * ONE_TOKEN, 10 * ONE_SETTLEMENT, u128::MAX, FAR_FUTURE);
    if let Err(e) = shares {
        println!("  add with impossible min shares: {}", e);
    }

    let after = sim.engine.get_reserves(sim.credential)?;
    println!("  Reserves unchanged: {}\n", before == after);
    Ok(())
}

/// A transfer that fails after the pool was updated rolls everything back.
fn scenario_4_transfer_rollback() -> SimResult {
    println!("Scenario 4: Transfer Failure Rollback\n");

    let sim = Sim::new(AmmConfig::default())?;
    let alice = Address::from_u64(1);
    let mallory = Address::from_u64(6);
    sim.bootstrap(alice, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT)?;
    sim.fund(mallory, 0, 100 * ONE_SETTLEMENT);

    // the token ledger refuses to pay mallory, after the settlement leg already went through
    if let Some(ledger) = sim.ledgers.token(sim.token) {
        ledger.block_recipient(mallory);
    }
    let before = sim.engine.get_pool(sim.credential);
    let result = sim.engine.swap(mallory, sim.credential, 50 * ONE_SETTLEMENT, 0, FAR_FUTURE, SwapDirection::SettlementToToken);
    if let Err(e) = &result {
        println!("  Swap failed: {}", e);
    }

    println!("  Pool state restored: {}", before == sim.engine.get_pool(sim.credential));
    println!(
        "  Mallory settlement balance: {} USD\n",
        usd(sim.ledgers.settlement().balance_of(mallory))
    );
    Ok(())
}

/// Buying an exact number of tokens.
fn scenario_5_exact_output() -> SimResult {
    println!("Scenario 5: Exact Output Swap\n");

    let sim = Sim::new(AmmConfig::default())?;
    let alice = Address::from_u64(1);
    let bob = Address::from_u64(2);
    sim.bootstrap(alice, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT)?;
    sim.fund(bob, 0, 1_000 * ONE_SETTLEMENT);

    let wanted = 50 * ONE_TOKEN;
    let quote = sim
        .engine
        .quote_exact_output(sim.credential, wanted, SwapDirection::SettlementToToken)?;
    println!("  50 tokens cost {} USD", usd(quote.amount_in));

    let result = sim.engine.swap_exact_output(
        bob,
        sim.credential,
        wanted,
        quote.amount_in,
        FAR_FUTURE,
        SwapDirection::SettlementToToken,
    )?;
    println!("  Bob pays {} USD, receives {} tokens\n", usd(result.amount_in), tokens(result.amount_out));
    Ok(())
}

/// Many traders on one pool from several threads.
fn scenario_6_concurrent_traders() -> SimResult {
    println!("Scenario 6: Concurrent Traders\n");

    let sim = Sim::new(AmmConfig::default())?;
    let alice = Address::from_u64(1);
    sim.bootstrap(alice, 100_000 * ONE_TOKEN, 100_000 * ONE_SETTLEMENT)?;

    let traders: Vec<Address> = (100..116).map(Address::from_u64).collect();
    for trader in &traders {
        sim.fund(*trader, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT);
    }
    let k_before = sim.engine.get_pool(sim.credential).map(|p| p.k());

    let executed: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = traders
            .iter()
            .enumerate()
            .map(|(i, trader)| {
                let engine = &sim.engine;
                let credential = sim.credential;
                scope.spawn(move || {
                    let mut ok = 0;
                    for n in 0..50u128 {
                        let result = if (i as u128 + n) % 2 == 0 {
                            engine.swap(*trader, credential, 5 * ONE_SETTLEMENT, 0, FAR_FUTURE, SwapDirection::SettlementToToken)
                        } else {
                            engine.swap(*trader, credential, 4 * ONE_TOKEN, 0, FAR_FUTURE, SwapDirection::TokenToSettlement)
                        };
                        if result.is_ok() {
                            ok += 1;
                        }
                    }
                    ok
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap_or(0)).sum()
    });

    let pool = sim.engine.get_pool(sim.credential).ok_or("pool missing")?;
    let vault = sim.engine.vault();
    let token_vault = sim.ledgers.token(sim.token).map(|l| l.balance_of(vault)).unwrap_or(0);
    println!("  {} swaps executed across {} threads", executed, traders.len());
    println!("  k never decreased: {}", k_before.is_some_and(|k| pool.k() >= k));
    println!(
        "  Vault matches reserves: {}\n",
        token_vault == pool.token_reserves && sim.ledgers.settlement().balance_of(vault) == pool.settlement_reserves
    );
    Ok(())
}

/// Deactivated pools stop trading but providers can still leave.
fn scenario_7_pool_shutdown() -> SimResult {
    println!("Scenario 7: Pool Shutdown\n");

    let sim = Sim::new(AmmConfig::testnet())?;
    let alice = Address::from_u64(1);
    let bob = Address::from_u64(2);
    let created = sim.bootstrap(alice, 1_000 * ONE_TOKEN, 1_000 * ONE_SETTLEMENT)?;
    sim.fund(bob, 0, 100 * ONE_SETTLEMENT);
    sim.engine.swap(bob, sim.credential, 100 * ONE_SETTLEMENT, 0, FAR_FUTURE, SwapDirection::SettlementToToken)?;

    sim.engine.deactivate_pool(sim.credential)?;
    if let Err(e) = sim.engine.swap(bob, sim.credential, ONE_SETTLEMENT, 0, FAR_FUTURE, SwapDirection::SettlementToToken) {
        println!("  Swap on inactive pool: {}", e);
    }

    let exit = sim
        .engine
        .remove_liquidity(alice, sim.credential, created.shares_minted, 0, 0, FAR_FUTURE)?;
    println!(
        "  Alice exits with {} tokens + {} USD (fees harvested: {} USD)",
        tokens(exit.token_amount),
        usd(exit.settlement_amount),
        usd(exit.fees_harvested.settlement)
    );
    println!("  Events recorded: {}", sim.engine.events().len());
    Ok(())
}
