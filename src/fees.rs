// 5.0 fees.rs: fee split and provider fee bookkeeping.
// the provider cut of every swap fee advances a per-share index; a position's claimable fees are
// what the index accrued on its shares since its last checkpoint, plus anything checkpointed earlier.
// for a position whose share count never changed this equals
// accumulated_provider_fees * shares / total_shares - fees_claimed.

use crate::math::{self, MathError, FEE_INDEX_PRECISION};
use crate::pool::LiquidityPool;
use crate::position::LiquidityPosition;
use crate::types::{Amount, Asset, Shares};
use serde::{Deserialize, Serialize};

/// A pair of amounts, one per pool asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAmounts {
    pub token: Amount,
    pub settlement: Amount,
}

impl FeeAmounts {
    pub fn new(token: Amount, settlement: Amount) -> Self {
        Self { token, settlement }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn get(&self, asset: Asset) -> Amount {
        match asset {
            Asset::Token => self.token,
            Asset::Settlement => self.settlement,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.token == 0 && self.settlement == 0
    }

    pub fn credit(&mut self, asset: Asset, amount: Amount) -> Result<(), MathError> {
        let slot = self.slot_mut(asset);
        *slot = math::add(*slot, amount)?;
        Ok(())
    }

    pub fn debit(&mut self, asset: Asset, amount: Amount) -> Result<(), MathError> {
        let slot = self.slot_mut(asset);
        *slot = math::sub(*slot, amount)?;
        Ok(())
    }

    pub fn checked_add(&self, other: FeeAmounts) -> Result<FeeAmounts, MathError> {
        Ok(FeeAmounts {
            token: math::add(self.token, other.token)?,
            settlement: math::add(self.settlement, other.settlement)?,
        })
    }

    fn slot_mut(&mut self, asset: Asset) -> &mut Amount {
        match asset {
            Asset::Token => &mut self.token,
            Asset::Settlement => &mut self.settlement,
        }
    }
}

/// How a single swap fee is divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub total: Amount,
    pub protocol: Amount,
    pub provider: Amount,
}

/// protocol = floor(fee * share / 10_000), providers get the rest.
pub fn split_fee(fee: Amount, protocol_fee_share_bps: u32) -> Result<FeeSplit, MathError> {
    let protocol = math::bps_of(fee, protocol_fee_share_bps)?;
    Ok(FeeSplit {
        total: fee,
        protocol,
        provider: math::sub(fee, protocol)?,
    })
}

pub fn index_increment(provider_fee: Amount, total_shares: Shares) -> Result<u128, MathError> {
    math::mul_div(provider_fee, FEE_INDEX_PRECISION, total_shares)
}

fn accrued(shares: Shares, index: u128) -> Result<Amount, MathError> {
    math::mul_div(shares, index, FEE_INDEX_PRECISION)
}

fn accrued_pair(shares: Shares, pool: &LiquidityPool) -> Result<FeeAmounts, MathError> {
    Ok(FeeAmounts {
        token: accrued(shares, pool.token_fee_index)?,
        settlement: accrued(shares, pool.settlement_fee_index)?,
    })
}

/// Fees the position could claim right now.
///
/// Flooring at each checkpoint can overstate a position by a base unit, so the result is capped
/// at what the pool still holds for providers.
pub fn pending_fees(position: &LiquidityPosition, pool: &LiquidityPool) -> Result<FeeAmounts, MathError> {
    let accrued = accrued_pair(position.shares, pool)?;
    let token = math::add(
        position.unclaimed_fees.token,
        accrued.token.saturating_sub(position.fee_debt.token),
    )?;
    let settlement = math::add(
        position.unclaimed_fees.settlement,
        accrued.settlement.saturating_sub(position.fee_debt.settlement),
    )?;
    Ok(FeeAmounts {
        token: token.min(pool.outstanding_provider_fees.token),
        settlement: settlement.min(pool.outstanding_provider_fees.settlement),
    })
}

/// Freeze what the position has earned so far. call before its share count changes.
pub fn checkpoint(position: &mut LiquidityPosition, pool: &LiquidityPool) -> Result<(), MathError> {
    position.unclaimed_fees = pending_fees(position, pool)?;
    rebase_debt(position, pool)
}

/// Reset the debt to the current index for the position's current share count.
pub fn rebase_debt(position: &mut LiquidityPosition, pool: &LiquidityPool) -> Result<(), MathError> {
    position.fee_debt = accrued_pair(position.shares, pool)?;
    Ok(())
}

/// Mark everything pending as paid. returns the payout.
pub fn settle_claim(position: &mut LiquidityPosition, pool: &LiquidityPool) -> Result<FeeAmounts, MathError> {
    let payout = pending_fees(position, pool)?;
    position.unclaimed_fees = FeeAmounts::zero();
    rebase_debt(position, pool)?;
    position.fees_claimed = math::add(position.fees_claimed, payout.settlement)?;
    position.token_fees_claimed = math::add(position.token_fees_claimed, payout.token)?;
    Ok(payout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, CredentialId, Timestamp};

    fn pool_with_shares(total: Shares) -> LiquidityPool {
        LiquidityPool::new(
            CredentialId::from_u64(1),
            Address::from_u64(100),
            1_000,
            1_000,
            total,
            Timestamp::from_millis(0),
        )
    }

    fn position(shares: Shares, pool: &LiquidityPool) -> LiquidityPosition {
        let mut p = LiquidityPosition::new(pool.credential_id, Address::from_u64(1), Timestamp::from_millis(0));
        p.shares = shares;
        rebase_debt(&mut p, pool).unwrap();
        p
    }

    fn accrue(pool: &mut LiquidityPool, asset: Asset, provider_fee: Amount) {
        let inc = index_increment(provider_fee, pool.total_liquidity_shares).unwrap();
        pool.advance_fee_index(asset, inc).unwrap();
        pool.outstanding_provider_fees.credit(asset, provider_fee).unwrap();
    }

    #[test]
    fn split_gives_protocol_its_share() {
        let split = split_fee(300_000, 500).unwrap();
        assert_eq!(split.protocol, 15_000);
        assert_eq!(split.provider, 285_000);
        assert_eq!(split.protocol + split.provider, split.total);

        let none = split_fee(300_000, 0).unwrap();
        assert_eq!(none.provider, 300_000);
    }

    #[test]
    fn pending_matches_proportional_formula() {
        let mut pool = pool_with_shares(1_000);
        let a = position(250, &pool);
        let b = position(750, &pool);

        accrue(&mut pool, Asset::Settlement, 4_000);

        assert_eq!(pending_fees(&a, &pool).unwrap().settlement, 1_000);
        assert_eq!(pending_fees(&b, &pool).unwrap().settlement, 3_000);
        assert_eq!(pending_fees(&a, &pool).unwrap().token, 0);
    }

    #[test]
    fn late_joiner_does_not_take_earlier_fees() {
        let mut pool = pool_with_shares(1_000);
        let early = position(1_000, &pool);
        accrue(&mut pool, Asset::Settlement, 5_000);

        // a second provider joins with the same share count
        pool.total_liquidity_shares = 2_000;
        let late = position(1_000, &pool);
        assert_eq!(pending_fees(&late, &pool).unwrap().settlement, 0);

        accrue(&mut pool, Asset::Settlement, 2_000);
        assert_eq!(pending_fees(&early, &pool).unwrap().settlement, 6_000);
        assert_eq!(pending_fees(&late, &pool).unwrap().settlement, 1_000);
    }

    #[test]
    fn checkpoint_survives_share_change() {
        let mut pool = pool_with_shares(1_000);
        let mut p = position(1_000, &pool);
        accrue(&mut pool, Asset::Token, 900);

        checkpoint(&mut p, &pool).unwrap();
        p.shares = 400;
        rebase_debt(&mut p, &pool).unwrap();
        assert_eq!(pending_fees(&p, &pool).unwrap().token, 900);
    }

    #[test]
    fn settle_claim_zeroes_pending() {
        let mut pool = pool_with_shares(1_000);
        let mut p = position(1_000, &pool);
        accrue(&mut pool, Asset::Settlement, 700);

        let paid = settle_claim(&mut p, &pool).unwrap();
        assert_eq!(paid.settlement, 700);
        assert_eq!(p.fees_claimed, 700);
        assert!(pending_fees(&p, &pool).unwrap().is_zero());

        // second claim without new fees pays nothing
        let again = settle_claim(&mut p, &pool).unwrap();
        assert!(again.is_zero());
        assert_eq!(p.fees_claimed, 700);
    }

    #[test]
    fn pending_never_exceeds_earmark() {
        let mut pool = pool_with_shares(3);
        let p = position(1, &pool);
        accrue(&mut pool, Asset::Settlement, 10);
        // index rounding gives 3 per share; pretend 2 of the 10 were already paid out elsewhere
        pool.outstanding_provider_fees.debit(Asset::Settlement, 8).unwrap();
        assert_eq!(pending_fees(&p, &pool).unwrap().settlement, 2);
    }

    #[test]
    fn fee_amounts_debit_underflow() {
        let mut amounts = FeeAmounts::new(5, 0);
        assert_eq!(amounts.debit(Asset::Settlement, 1), Err(MathError::Underflow));
        amounts.debit(Asset::Token, 5).unwrap();
        assert!(amounts.is_zero());
    }
}
