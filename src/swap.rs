//! Constant-product swap math.
//!
//! `quote_exact_input` is the single source of truth for swap pricing: the engine's `quote`
//! and `swap` both call it, so a quote and an execution against the same pool state always agree.
//!
//! fee     = amount_in * total_fee_bps / 10_000
//! net     = amount_in - fee
//! out     = reserve_out * net / (reserve_in + net)
//!
//! The whole `amount_in` (fee included) is added to the input reserve, so `k` never decreases.

use crate::config::FeeConfig;
use crate::fees::{self, FeeSplit};
use crate::math::{self, MathError, BPS_DENOMINATOR, PRICE_SCALE};
use crate::pool::{Delta, LiquidityPool};
use crate::types::{Amount, Asset, SwapDirection, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    #[error("swap amount must be non-zero")]
    ZeroAmount,

    #[error("trade too small to produce any output")]
    NoOutput,

    #[error("pool has no liquidity")]
    NoLiquidity,

    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },

    #[error(transparent)]
    Math(#[from] MathError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub direction: SwapDirection,
    pub amount_in: Amount,
    pub amount_out: Amount,
    /// Total fee, charged in the input asset.
    pub fee_amount: Amount,
    pub protocol_fee: Amount,
    pub provider_fee: Amount,
    /// Spot price move caused by the trade, informational.
    pub price_impact_bps: u32,
}

impl SwapQuote {
    pub fn fee_split(&self) -> FeeSplit {
        FeeSplit {
            total: self.fee_amount,
            protocol: self.protocol_fee,
            provider: self.provider_fee,
        }
    }
}

pub fn quote_exact_input(
    pool: &LiquidityPool,
    amount_in: Amount,
    direction: SwapDirection,
    fee_config: &FeeConfig,
) -> Result<SwapQuote, SwapError> {
    if amount_in == 0 {
        return Err(SwapError::ZeroAmount);
    }
    if !pool.is_tradeable() {
        return Err(SwapError::NoLiquidity);
    }

    let (reserve_in, reserve_out) = pool.reserves_for(direction);
    let fee = math::bps_of(amount_in, fee_config.total_fee_bps)?;
    let split = fees::split_fee(fee, fee_config.protocol_fee_share_bps)?;
    let amount_in_net = math::sub(amount_in, fee)?;

    let amount_out = math::mul_div(reserve_out, amount_in_net, math::add(reserve_in, amount_in_net)?)?;
    if amount_out == 0 {
        return Err(SwapError::NoOutput);
    }

    // the output may not dig into fees that are already earmarked in the output reserve
    let earmarked_out = pool.earmarked(direction.output_asset())?;
    let remaining_out = math::sub(reserve_out, amount_out)?;
    if remaining_out <= earmarked_out {
        return Err(SwapError::InsufficientLiquidity {
            requested: amount_out,
            available: reserve_out.saturating_sub(earmarked_out).saturating_sub(1),
        });
    }

    let price_impact_bps = price_impact_bps(
        pool,
        direction,
        math::add(reserve_in, amount_in)?,
        remaining_out,
    )?;

    Ok(SwapQuote {
        direction,
        amount_in,
        amount_out,
        fee_amount: fee,
        protocol_fee: split.protocol,
        provider_fee: split.provider,
        price_impact_bps,
    })
}

/// Smallest input whose exact-input execution pays out at least `amount_out`.
pub fn quote_exact_output(
    pool: &LiquidityPool,
    amount_out: Amount,
    direction: SwapDirection,
    fee_config: &FeeConfig,
) -> Result<SwapQuote, SwapError> {
    if amount_out == 0 {
        return Err(SwapError::ZeroAmount);
    }
    if !pool.is_tradeable() {
        return Err(SwapError::NoLiquidity);
    }

    let (reserve_in, reserve_out) = pool.reserves_for(direction);
    let available = pool.liquidity_reserve(direction.output_asset())?;
    if amount_out >= available {
        return Err(SwapError::InsufficientLiquidity {
            requested: amount_out,
            available: available.saturating_sub(1),
        });
    }

    let required_net = math::mul_div_up(reserve_in, amount_out, math::sub(reserve_out, amount_out)?)?;
    let fee_keep = math::sub(BPS_DENOMINATOR, fee_config.total_fee_bps as u128)?;
    let amount_in = math::mul_div_up(required_net, BPS_DENOMINATOR, fee_keep)?;

    quote_exact_input(pool, amount_in, direction, fee_config)
}

/// Commit a quote to the pool: reserves first, then fee bookkeeping.
pub(crate) fn apply_swap(pool: &mut LiquidityPool, quote: &SwapQuote, now: Timestamp) -> Result<(), SwapError> {
    let input = quote.direction.input_asset();
    let output = quote.direction.output_asset();

    pool.apply_reserve_delta(input, Delta::Increase(quote.amount_in))?;
    pool.apply_reserve_delta(output, Delta::Decrease(quote.amount_out))?;

    pool.protocol_fees.credit(input, quote.protocol_fee)?;
    pool.outstanding_provider_fees.credit(input, quote.provider_fee)?;
    let increment = fees::index_increment(quote.provider_fee, pool.total_liquidity_shares)?;
    pool.advance_fee_index(input, increment)?;

    match input {
        Asset::Settlement => {
            pool.accumulated_provider_fees = math::add(pool.accumulated_provider_fees, quote.provider_fee)?;
        }
        Asset::Token => {
            pool.accumulated_provider_token_fees =
                math::add(pool.accumulated_provider_token_fees, quote.provider_fee)?;
        }
    }

    pool.swap_count += 1;
    pool.last_updated = now;
    Ok(())
}

fn price_impact_bps(
    pool: &LiquidityPool,
    direction: SwapDirection,
    reserve_in_after: Amount,
    reserve_out_after: Amount,
) -> Result<u32, SwapError> {
    let (token_after, settlement_after) = match direction {
        SwapDirection::SettlementToToken => (reserve_out_after, reserve_in_after),
        SwapDirection::TokenToSettlement => (reserve_in_after, reserve_out_after),
    };
    // informational only: a price that no longer fits is reported as off the scale
    let (before, after) = match (pool.price(), math::mul_div(settlement_after, PRICE_SCALE, token_after)) {
        (Ok(before), Ok(after)) => (before, after),
        (Err(MathError::Overflow), _) | (_, Err(MathError::Overflow)) => return Ok(u32::MAX),
        (Err(e), _) | (_, Err(e)) => return Err(e.into()),
    };
    if before == 0 {
        return Ok(0);
    }
    let impact = math::mul_div(before.abs_diff(after), BPS_DENOMINATOR, before).unwrap_or(u128::MAX);
    Ok(u32::try_from(impact).unwrap_or(u32::MAX))
}
