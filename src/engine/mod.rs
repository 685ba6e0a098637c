// 8.0: core AMM engine. coordinates pool creation, liquidity, swaps and fee claims.
// every mutation holds one pool's lock from validation through the external transfers,
// so operations on a pool are linearized and a failed transfer leaves no trace.

mod config;
mod core;
mod fees;
mod liquidity;
mod queries;
mod results;
mod swaps;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{
    AddLiquidityResult, CreatePoolResult, EngineError, FeeClaim, RemoveLiquidityResult, SwapResult,
};
