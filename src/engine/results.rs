// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::fees::FeeAmounts;
use crate::liquidity::LiquidityError;
use crate::math::MathError;
use crate::pool::ReserveSnapshot;
use crate::registry::RegistryError;
use crate::swap::SwapError;
use crate::transfer::BatchError;
use crate::types::{Address, Amount, CredentialId, Shares, SwapDirection, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePoolResult {
    pub credential_id: CredentialId,
    pub token_address: Address,
    pub shares_minted: Shares,
    pub state: ReserveSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLiquidityResult {
    pub shares_minted: Shares,
    pub token_amount: Amount,
    pub settlement_amount: Amount,
    // caller's share balance afterwards
    pub position_shares: Shares,
    pub state: ReserveSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLiquidityResult {
    pub shares_burned: Shares,
    pub token_amount: Amount,
    pub settlement_amount: Amount,
    pub fees_harvested: FeeAmounts,
    pub position_shares: Shares,
    pub state: ReserveSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResult {
    pub direction: SwapDirection,
    pub amount_in: Amount,
    pub amount_out: Amount,
    pub fee_amount: Amount,
    pub protocol_fee: Amount,
    pub provider_fee: Amount,
    pub state: ReserveSnapshot,
}

/// Fees paid out by a provider claim or a treasury collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeClaim {
    pub credential_id: CredentialId,
    pub recipient: Address,
    pub amounts: FeeAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Pool for credential {0} already exists")]
    PoolAlreadyExists(CredentialId),

    #[error("No pool for credential {0}")]
    PoolNotFound(CredentialId),

    #[error("Pool for credential {0} is not active")]
    PoolInactive(CredentialId),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Deadline {deadline} passed (now {now})")]
    Expired { deadline: Timestamp, now: Timestamp },

    #[error("Slippage exceeded on {field}: got {actual}, limit {limit}")]
    SlippageExceeded {
        field: &'static str,
        actual: u128,
        limit: u128,
    },

    #[error("Insufficient shares: requested {requested}, held {available}")]
    InsufficientShares { requested: Shares, available: Shares },

    #[error("Insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },

    #[error("{provider} has no position in pool {credential_id}")]
    NoPosition {
        credential_id: CredentialId,
        provider: Address,
    },

    #[error("Transfer failed: {0}")]
    TransferFailed(#[from] BatchError),

    #[error("Math error: {0}")]
    MathOverflow(#[from] MathError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<RegistryError> for EngineError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::AlreadyExists(id) => EngineError::PoolAlreadyExists(id),
            RegistryError::NotFound(id) => EngineError::PoolNotFound(id),
        }
    }
}

impl From<SwapError> for EngineError {
    fn from(error: SwapError) -> Self {
        match error {
            SwapError::ZeroAmount | SwapError::NoOutput => EngineError::InvalidAmount(error.to_string()),
            SwapError::NoLiquidity => EngineError::InsufficientLiquidity {
                requested: 0,
                available: 0,
            },
            SwapError::InsufficientLiquidity { requested, available } => {
                EngineError::InsufficientLiquidity { requested, available }
            }
            SwapError::Math(e) => EngineError::MathOverflow(e),
        }
    }
}

impl From<LiquidityError> for EngineError {
    fn from(error: LiquidityError) -> Self {
        match error {
            LiquidityError::ZeroAmount | LiquidityError::ZeroShares => {
                EngineError::InvalidParameters(error.to_string())
            }
            LiquidityError::NothingMinted => EngineError::InvalidAmount(error.to_string()),
            LiquidityError::ExceedsSupply { requested, total } => EngineError::InsufficientShares {
                requested,
                available: total,
            },
            LiquidityError::Math(e) => EngineError::MathOverflow(e),
        }
    }
}
