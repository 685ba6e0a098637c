// 2.0 math.rs: integer fixed-point helpers. every product of two amounts goes through a 256-bit
// intermediate, so only a result that does not fit u128 is an overflow.
// 2.1 scale constants: the token has 18 decimals, the settlement asset 6.

use crate::types::Amount;

#[allow(clippy::all)]
mod wide {
    uint::construct_uint! {
        /// 256-bit unsigned integer for intermediate products.
        pub struct U256(4);
    }
}

pub use wide::U256;

pub const TOKEN_DECIMALS: u32 = 18;
pub const SETTLEMENT_DECIMALS: u32 = 6;

/// One whole credential token in base units.
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000;
/// One whole settlement unit in base units.
pub const ONE_SETTLEMENT: Amount = 1_000_000;

/// Lifts a 6-decimal settlement amount to 18-decimal token precision.
pub const DECIMAL_SCALE_FACTOR: u128 = 1_000_000_000_000;

/// Fixed-point precision of a price value. 10^18 == 1.0 settlement per token.
pub const PRICE_PRECISION: u128 = 1_000_000_000_000_000_000;

/// `settlement * PRICE_SCALE / token` is settlement-per-whole-token at `PRICE_PRECISION`.
pub const PRICE_SCALE: u128 = DECIMAL_SCALE_FACTOR * PRICE_PRECISION;

pub const BPS_DENOMINATOR: u128 = 10_000;

/// Precision of the per-share fee index.
pub const FEE_INDEX_PRECISION: u128 = 1_000_000_000_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,
}

fn narrow(value: U256) -> Result<u128, MathError> {
    if value > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(value.low_u128())
}

/// floor(a * b / c)
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128, MathError> {
    if c == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    narrow(product / U256::from(c))
}

/// ceil(a * b / c)
pub fn mul_div_up(a: u128, b: u128, c: u128) -> Result<u128, MathError> {
    if c == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    let divisor = U256::from(c);
    let mut quotient = product / divisor;
    if !(product % divisor).is_zero() {
        quotient = quotient + U256::one();
    }
    narrow(quotient)
}

/// Floor square root via Newton iteration.
pub fn isqrt(value: U256) -> U256 {
    if value.is_zero() {
        return U256::zero();
    }
    let two = U256::from(2u8);
    let mut x = value;
    let mut y = value / two + value % two;
    while y < x {
        x = y;
        y = (x + value / x) / two;
    }
    x
}

/// Settlement amount expressed at token precision.
pub fn normalize_settlement(amount: Amount) -> U256 {
    U256::from(amount) * U256::from(DECIMAL_SCALE_FACTOR)
}

/// floor(sqrt(token * settlement * 10^12)): geometric mean with both legs at 18 decimals.
pub fn geometric_mean(token_amount: Amount, settlement_amount: Amount) -> Result<u128, MathError> {
    let product = U256::from(token_amount)
        .checked_mul(normalize_settlement(settlement_amount))
        .ok_or(MathError::Overflow)?;
    narrow(isqrt(product))
}

/// Constant-product invariant k = x * y.
pub fn product(x: Amount, y: Amount) -> U256 {
    U256::from(x) * U256::from(y)
}

/// floor(amount * bps / 10_000)
pub fn bps_of(amount: Amount, bps: u32) -> Result<Amount, MathError> {
    mul_div(amount, bps as u128, BPS_DENOMINATOR)
}

pub fn add(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

pub fn sub(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}
