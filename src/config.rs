// 7.0 config.rs: all settings in one place. fee rates, system accounts, engine limits.
// 7.1 presets per environment, validate() before use, TOML loading for deployments.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::EngineConfig;
use crate::math::BPS_DENOMINATOR;
use crate::types::{Address, Bps};

/// Above this a fee is treated as a typo, not a business decision.
pub const MAX_TOTAL_FEE_BPS: u32 = 1_000;

/** 7.2: swap fee settings. 100 bps = 1% */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    // total fee charged on every swap input
    pub total_fee_bps: u32,
    // part of the fee routed to the treasury, in bps of the fee (500 = 5% of the fee)
    pub protocol_fee_share_bps: u32,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            total_fee_bps: 30,          // 0.30%
            protocol_fee_share_bps: 500, // 5% of the fee
        }
    }
}

impl FeeConfig {
    pub fn total_fee(&self) -> Bps {
        Bps::new(self.total_fee_bps)
    }

    /// Fraction of every swap input that ends up with providers.
    pub fn provider_rate(&self) -> Decimal {
        let share = Decimal::ONE - Bps::new(self.protocol_fee_share_bps).as_fraction();
        self.total_fee().as_fraction() * share
    }
}

// 7.3: accounts the engine moves funds through. the vault holds every pool's reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsConfig {
    pub vault: Address,
    pub treasury: Address,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            vault: Address::from_u64(0x7661_756c_74),         // "vault"
            treasury: Address::from_u64(0x7472_6561_7375_7279), // "treasury"
        }
    }
}

// The complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmmConfig {
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AmmConfig {
    // cheap swaps, everything goes to providers
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.fees.total_fee_bps = 10;
        config.fees.protocol_fee_share_bps = 0;
        config.engine.log_events = true;
        config
    }

    pub fn mainnet() -> Self {
        let mut config = Self::default();
        config.fees.total_fee_bps = 30;
        config.fees.protocol_fee_share_bps = 1_000; // 10% of the fee
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fees.total_fee_bps as u128 >= BPS_DENOMINATOR {
            return Err(ConfigError::InvalidFees {
                reason: "total fee must be below 100%".to_string(),
            });
        }
        if self.fees.total_fee_bps > MAX_TOTAL_FEE_BPS {
            return Err(ConfigError::InvalidFees {
                reason: format!("total fee too high (>{})", Bps::new(MAX_TOTAL_FEE_BPS)),
            });
        }
        if self.fees.protocol_fee_share_bps as u128 > BPS_DENOMINATOR {
            return Err(ConfigError::InvalidFees {
                reason: "protocol share cannot exceed the whole fee".to_string(),
            });
        }

        if self.accounts.vault == self.accounts.treasury {
            return Err(ConfigError::InvalidAccounts {
                reason: "vault and treasury must be different accounts".to_string(),
            });
        }

        if self.engine.max_events == 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "max_events must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Parse and validate a TOML document. missing sections fall back to defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: AmmConfig = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid fees: {reason}")]
    InvalidFees { reason: String },

    #[error("invalid accounts: {reason}")]
    InvalidAccounts { reason: String },

    #[error("invalid engine settings: {reason}")]
    InvalidEngine { reason: String },

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> AmmConfig {
        match self {
            Environment::Development => AmmConfig::default(),
            Environment::Testnet => AmmConfig::testnet(),
            Environment::Mainnet => AmmConfig::mainnet(),
        }
    }
}
