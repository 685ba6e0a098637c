//! Read-only views. every read takes the pool's shared lock, so reserves are never torn.

use super::core::{ensure_live, Engine};
use super::results::EngineError;
use crate::fees::{self, FeeAmounts};
use crate::math::{MathError, TOKEN_DECIMALS};
use crate::pool::LiquidityPool;
use crate::position::LiquidityPosition;
use crate::registry::PoolState;
use crate::types::{Address, Amount, Asset, CredentialId};
use rust_decimal::Decimal;

impl Engine {
    pub fn pool_exists(&self, credential_id: CredentialId) -> bool {
        self.registry.exists(&credential_id)
    }

    pub fn get_pool(&self, credential_id: CredentialId) -> Option<LiquidityPool> {
        self.registry.get(&credential_id)
    }

    pub fn pool_ids(&self) -> Vec<CredentialId> {
        self.registry.pool_ids()
    }

    /// (token_reserves, settlement_reserves), fee earmarks included.
    pub fn get_reserves(&self, credential_id: CredentialId) -> Result<(Amount, Amount), EngineError> {
        self.read_pool(credential_id, |state| {
            Ok((state.pool.token_reserves, state.pool.settlement_reserves))
        })
    }

    /// Reserves backing the liquidity shares, fee earmarks excluded.
    pub fn get_liquidity_reserves(&self, credential_id: CredentialId) -> Result<(Amount, Amount), EngineError> {
        self.read_pool(credential_id, |state| {
            Ok((
                state.pool.liquidity_reserve(Asset::Token)?,
                state.pool.liquidity_reserve(Asset::Settlement)?,
            ))
        })
    }

    /// settlement_reserves * PRICE_SCALE / token_reserves. 10^18 is one settlement unit per token.
    pub fn get_price(&self, credential_id: CredentialId) -> Result<u128, EngineError> {
        self.read_pool(credential_id, |state| {
            if !state.pool.is_tradeable() {
                return Err(EngineError::InsufficientLiquidity {
                    requested: 0,
                    available: 0,
                });
            }
            Ok(state.pool.price()?)
        })
    }

    /// Spot price as a decimal number of settlement units per whole token.
    pub fn get_price_decimal(&self, credential_id: CredentialId) -> Result<Decimal, EngineError> {
        let scaled = self.get_price(credential_id)?;
        let scaled = i128::try_from(scaled).map_err(|_| MathError::Overflow)?;
        Decimal::try_from_i128_with_scale(scaled, TOKEN_DECIMALS).map_err(|_| MathError::Overflow.into())
    }

    /// None when the pool or the position does not exist.
    pub fn get_position(&self, credential_id: CredentialId, provider: Address) -> Option<LiquidityPosition> {
        self.read_pool(credential_id, |state| Ok(state.position(&provider).cloned()))
            .ok()
            .flatten()
    }

    pub fn positions(&self, credential_id: CredentialId) -> Result<Vec<LiquidityPosition>, EngineError> {
        self.read_pool(credential_id, |state| {
            let mut positions: Vec<LiquidityPosition> = state.positions.values().cloned().collect();
            positions.sort_by_key(|p| p.provider);
            Ok(positions)
        })
    }

    /// What `claim_fees` would pay the provider right now.
    pub fn pending_fees(&self, credential_id: CredentialId, provider: Address) -> Result<FeeAmounts, EngineError> {
        self.read_pool(credential_id, |state| match state.position(&provider) {
            Some(position) => Ok(fees::pending_fees(position, &state.pool)?),
            None => Ok(FeeAmounts::zero()),
        })
    }

    fn read_pool<T>(
        &self,
        credential_id: CredentialId,
        read: impl FnOnce(&PoolState) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let handle = self.registry.handle(&credential_id)?;
        let state = handle.read();
        ensure_live(&state)?;
        read(&state)
    }
}
