// credential-amm: constant-product AMM for credential tokens.
// one isolated pool per credential, credential token against a 6-decimal settlement asset.
// integer math only; balances live in external ledgers, reached through traits.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: CredentialId, Address, Asset, SwapDirection, Bps, Timestamp
//   2.x  math.rs: U256 mul_div, isqrt, decimal scale constants
//   3.x  pool.rs: pool state, curve vs liquidity reserves
//   4.x  position.rs: provider positions
//   5.x  fees.rs: fee split, per-share fee index, pending fees
//   6.x  liquidity.rs: share minting and withdrawal math
//   6.1  swap.rs: constant-product quotes, exact-in and exact-out
//   7.x  config.rs: fee rates, system accounts, env presets, TOML loading
//   8.x  engine/: coordinator: create/add/remove, swaps, claims, queries
//   9.x  ledger.rs: token ledger traits + in-memory ledgers
//   9.1  transfer.rs: transfer batches with compensating reversal
//   10.x registry.rs: credential -> pool map, per-pool locks
//   11.x events.rs: state transition events for indexers
//   12.x clock.rs: time source for deadlines

// core amm modules
pub mod engine;
pub mod fees;
pub mod liquidity;
pub mod math;
pub mod pool;
pub mod position;
pub mod registry;
pub mod swap;
pub mod types;

// integration modules
pub mod clock;
pub mod config;
pub mod events;
pub mod ledger;
pub mod transfer;

// re exports for convenience
pub use engine::*;
pub use events::*;
pub use types::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AccountsConfig, AmmConfig, ConfigError, Environment, FeeConfig};
pub use fees::FeeAmounts;
pub use ledger::{
    CredentialTokenLookup, InMemoryCredentialDirectory, InMemoryLedger, InMemoryLedgers, LedgerProvider,
    TokenLedger, TransferError,
};
pub use math::{MathError, ONE_SETTLEMENT, ONE_TOKEN, PRICE_PRECISION, PRICE_SCALE};
pub use pool::{LiquidityPool, ReserveSnapshot};
pub use position::LiquidityPosition;
pub use registry::{PoolHandle, PoolRegistry, PoolState, RegistryError};
pub use swap::{SwapError, SwapQuote};
pub use transfer::{BatchError, BatchStatus, TransferBatch};
