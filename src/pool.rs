//! Liquidity pool state.
//!
//! One pool per credential. The curve reserves hold everything the vault holds for the pool,
//! including swap fees that are earmarked for providers or the protocol treasury. Share pricing
//! uses the liquidity reserves, which exclude those earmarks.

use crate::fees::FeeAmounts;
use crate::math::{self, MathError, U256, PRICE_SCALE};
use crate::types::{Address, Amount, Asset, CredentialId, Shares, SwapDirection, Timestamp};
use serde::{Deserialize, Serialize};

/// Signed change applied to a reserve or to the share supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Increase(u128),
    Decrease(u128),
}

impl Delta {
    fn apply(self, value: u128) -> Result<u128, MathError> {
        match self {
            Delta::Increase(amount) => math::add(value, amount),
            Delta::Decrease(amount) => math::sub(value, amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub credential_id: CredentialId,
    /// Ledger of the traded token. never changes after creation.
    pub token_address: Address,
    pub token_reserves: Amount,
    pub settlement_reserves: Amount,
    pub total_liquidity_shares: Shares,
    /// Lifetime provider fees charged in the settlement asset.
    pub accumulated_provider_fees: Amount,
    /// Lifetime provider fees charged in the token.
    pub accumulated_provider_token_fees: Amount,
    /// Provider fees booked but not yet paid out. part of the curve reserves.
    pub outstanding_provider_fees: FeeAmounts,
    /// Protocol cut owed to the treasury. part of the curve reserves.
    pub protocol_fees: FeeAmounts,
    pub token_fee_index: u128,
    pub settlement_fee_index: u128,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub last_updated: Timestamp,
    pub swap_count: u64,
}

/// Reserves and share supply at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub token_reserves: Amount,
    pub settlement_reserves: Amount,
    pub total_liquidity_shares: Shares,
}

impl LiquidityPool {
    pub fn new(
        credential_id: CredentialId,
        token_address: Address,
        token_amount: Amount,
        settlement_amount: Amount,
        initial_shares: Shares,
        created_at: Timestamp,
    ) -> Self {
        Self {
            credential_id,
            token_address,
            token_reserves: token_amount,
            settlement_reserves: settlement_amount,
            total_liquidity_shares: initial_shares,
            accumulated_provider_fees: 0,
            accumulated_provider_token_fees: 0,
            outstanding_provider_fees: FeeAmounts::zero(),
            protocol_fees: FeeAmounts::zero(),
            token_fee_index: 0,
            settlement_fee_index: 0,
            is_active: true,
            created_at,
            last_updated: created_at,
            swap_count: 0,
        }
    }

    pub fn reserve(&self, asset: Asset) -> Amount {
        match asset {
            Asset::Token => self.token_reserves,
            Asset::Settlement => self.settlement_reserves,
        }
    }

    /// (reserve_in, reserve_out) for a swap direction.
    pub fn reserves_for(&self, direction: SwapDirection) -> (Amount, Amount) {
        (
            self.reserve(direction.input_asset()),
            self.reserve(direction.output_asset()),
        )
    }

    pub fn earmarked(&self, asset: Asset) -> Result<Amount, MathError> {
        math::add(self.outstanding_provider_fees.get(asset), self.protocol_fees.get(asset))
    }

    /// Curve reserve minus fee earmarks: what backs the liquidity shares.
    pub fn liquidity_reserve(&self, asset: Asset) -> Result<Amount, MathError> {
        math::sub(self.reserve(asset), self.earmarked(asset)?)
    }

    pub fn k(&self) -> U256 {
        math::product(self.token_reserves, self.settlement_reserves)
    }

    /// settlement * PRICE_SCALE / token. 10^18 means one settlement unit per whole token.
    pub fn price(&self) -> Result<u128, MathError> {
        math::mul_div(self.settlement_reserves, PRICE_SCALE, self.token_reserves)
    }

    pub fn is_tradeable(&self) -> bool {
        self.total_liquidity_shares > 0 && self.token_reserves > 0 && self.settlement_reserves > 0
    }

    pub fn fee_index(&self, asset: Asset) -> u128 {
        match asset {
            Asset::Token => self.token_fee_index,
            Asset::Settlement => self.settlement_fee_index,
        }
    }

    pub(crate) fn advance_fee_index(&mut self, asset: Asset, increment: u128) -> Result<(), MathError> {
        let slot = match asset {
            Asset::Token => &mut self.token_fee_index,
            Asset::Settlement => &mut self.settlement_fee_index,
        };
        *slot = math::add(*slot, increment)?;
        Ok(())
    }

    pub(crate) fn apply_reserve_delta(&mut self, asset: Asset, delta: Delta) -> Result<(), MathError> {
        match asset {
            Asset::Token => self.token_reserves = delta.apply(self.token_reserves)?,
            Asset::Settlement => self.settlement_reserves = delta.apply(self.settlement_reserves)?,
        }
        Ok(())
    }

    pub(crate) fn apply_share_delta(&mut self, delta: Delta) -> Result<(), MathError> {
        self.total_liquidity_shares = delta.apply(self.total_liquidity_shares)?;
        Ok(())
    }

    /// Provider fee rounding dust has no owner once the last share is gone.
    pub(crate) fn release_fee_dust(&mut self) {
        if self.total_liquidity_shares == 0 {
            self.outstanding_provider_fees = FeeAmounts::zero();
        }
    }

    pub fn snapshot(&self) -> ReserveSnapshot {
        ReserveSnapshot {
            token_reserves: self.token_reserves,
            settlement_reserves: self.settlement_reserves,
            total_liquidity_shares: self.total_liquidity_shares,
        }
    }
}
