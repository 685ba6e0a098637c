// 6.0 liquidity.rs: share math for deposits and withdrawals.
// first deposit mints the geometric mean of both legs (settlement lifted to 18 decimals).
// later deposits are priced at the current liquidity-reserve ratio, the smaller leg wins.
// withdrawals pay the proportional slice of liquidity reserves.

use crate::math::{self, MathError};
use crate::pool::LiquidityPool;
use crate::types::{Amount, Asset, Shares};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiquidityError {
    #[error("both deposit amounts must be non-zero")]
    ZeroAmount,

    #[error("share amount must be non-zero")]
    ZeroShares,

    #[error("deposit too small to mint any shares")]
    NothingMinted,

    #[error("requested {requested} shares but the pool only has {total}")]
    ExceedsSupply { requested: Shares, total: Shares },

    #[error(transparent)]
    Math(#[from] MathError),
}

/// Payout of a withdrawal, before any fee harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalAmounts {
    pub token: Amount,
    pub settlement: Amount,
}

pub fn initial_shares(token_amount: Amount, settlement_amount: Amount) -> Result<Shares, LiquidityError> {
    if token_amount == 0 || settlement_amount == 0 {
        return Err(LiquidityError::ZeroAmount);
    }
    let shares = math::geometric_mean(token_amount, settlement_amount)?;
    if shares == 0 {
        return Err(LiquidityError::NothingMinted);
    }
    Ok(shares)
}

/// Shares minted for a deposit. an empty pool is bootstrapped like a new one.
pub fn shares_for_deposit(
    pool: &LiquidityPool,
    token_amount: Amount,
    settlement_amount: Amount,
) -> Result<Shares, LiquidityError> {
    if token_amount == 0 || settlement_amount == 0 {
        return Err(LiquidityError::ZeroAmount);
    }
    let total = pool.total_liquidity_shares;
    if total == 0 {
        return initial_shares(token_amount, settlement_amount);
    }

    let by_token = math::mul_div(total, token_amount, pool.liquidity_reserve(Asset::Token)?)?;
    let by_settlement = math::mul_div(total, settlement_amount, pool.liquidity_reserve(Asset::Settlement)?)?;
    Ok(by_token.min(by_settlement))
}

pub fn withdrawal_amounts(pool: &LiquidityPool, shares: Shares) -> Result<WithdrawalAmounts, LiquidityError> {
    if shares == 0 {
        return Err(LiquidityError::ZeroShares);
    }
    let total = pool.total_liquidity_shares;
    if shares > total {
        return Err(LiquidityError::ExceedsSupply { requested: shares, total });
    }
    Ok(WithdrawalAmounts {
        token: math::mul_div(pool.liquidity_reserve(Asset::Token)?, shares, total)?,
        settlement: math::mul_div(pool.liquidity_reserve(Asset::Settlement)?, shares, total)?,
    })
}

/// Settlement amount that matches `token_amount` at the current ratio, rounded up so the
/// token leg decides the mint.
pub fn proportional_settlement(pool: &LiquidityPool, token_amount: Amount) -> Result<Amount, LiquidityError> {
    let token_reserve = pool.liquidity_reserve(Asset::Token)?;
    let settlement_reserve = pool.liquidity_reserve(Asset::Settlement)?;
    Ok(math::mul_div_up(token_amount, settlement_reserve, token_reserve)?)
}
