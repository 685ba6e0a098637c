// 1.0: all the primitives live here. nothing in the engine works without these types.
// ids, principals, amounts, fee rates, timestamps. ids are newtypes so the compiler catches mixups.

use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Raw amount in an asset's base units (10^-18 token, 10^-6 settlement asset).
pub type Amount = u128;

/// Liquidity share units.
pub type Shares = u128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

fn parse_hex_bytes<const N: usize>(s: &str) -> Result<[u8; N], ParseIdError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| ParseIdError::InvalidHex(e.to_string()))?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ParseIdError::WrongLength { expected: N, actual })
}

fn u64_tail<const N: usize>(n: u64) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes[N - 8..].copy_from_slice(&n.to_be_bytes());
    bytes
}

// 1.1: opaque 32-byte credential key. one pool per credential.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialId(pub [u8; 32]);

impl CredentialId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    // handy for tests and simulations: n in the low 8 bytes
    pub fn from_u64(n: u64) -> Self {
        Self(u64_tail(n))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialId({})", self)
    }
}

impl FromStr for CredentialId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_bytes::<32>(s).map(Self)
    }
}

impl Serialize for CredentialId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CredentialId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// 1.2: 20-byte principal. callers, providers, the vault, the treasury and token ledgers all use it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_u64(n: u64) -> Self {
        Self(u64_tail(n))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_bytes::<20>(s).map(Self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// 1.3: the two assets a pool holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Token,
    Settlement,
}

impl Asset {
    pub fn decimals(&self) -> u32 {
        match self {
            Asset::Token => crate::math::TOKEN_DECIMALS,
            Asset::Settlement => crate::math::SETTLEMENT_DECIMALS,
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Asset::Token => Asset::Settlement,
            Asset::Settlement => Asset::Token,
        }
    }
}

// 1.4: which way a swap goes. SettlementToToken = buying the credential token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    SettlementToToken,
    TokenToSettlement,
}

impl SwapDirection {
    pub fn input_asset(&self) -> Asset {
        match self {
            SwapDirection::SettlementToToken => Asset::Settlement,
            SwapDirection::TokenToSettlement => Asset::Token,
        }
    }

    pub fn output_asset(&self) -> Asset {
        self.input_asset().other()
    }

    pub fn opposite(&self) -> Self {
        match self {
            SwapDirection::SettlementToToken => SwapDirection::TokenToSettlement,
            SwapDirection::TokenToSettlement => SwapDirection::SettlementToToken,
        }
    }
}

// 1.5: basis points. 100 bps = 1%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bps(u32);

impl Bps {
    pub fn new(bps: u32) -> Self {
        Self(bps)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(self.0 as i64, 4)
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

// 1.6: millisecond timestamp. deadlines use the same unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn plus_millis(&self, ms: i64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn credential_id_hex_round_trip() {
        let id = CredentialId::from_u64(42);
        let text = id.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.len(), 2 + 64);
        assert_eq!(text.parse::<CredentialId>().unwrap(), id);
    }

    #[test]
    fn address_rejects_wrong_length() {
        let err = "0xdeadbeef".parse::<Address>().unwrap_err();
        assert_eq!(err, ParseIdError::WrongLength { expected: 20, actual: 4 });
        assert!(matches!("0xzz".parse::<Address>(), Err(ParseIdError::InvalidHex(_))));
    }

    #[test]
    fn address_serializes_as_hex_string() {
        let addr = Address::from_u64(7);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn direction_assets() {
        let buy = SwapDirection::SettlementToToken;
        assert_eq!(buy.input_asset(), Asset::Settlement);
        assert_eq!(buy.output_asset(), Asset::Token);
        assert_eq!(buy.opposite(), SwapDirection::TokenToSettlement);
        assert_eq!(Asset::Token.decimals(), 18);
        assert_eq!(Asset::Settlement.decimals(), 6);
    }

    #[test]
    fn bps_conversion() {
        assert_eq!(Bps::new(30).as_fraction(), dec!(0.003)); // 0.3%
        assert_eq!(Bps::new(500).as_fraction(), dec!(0.05)); // 5%
    }

    #[test]
    fn timestamp_saturates() {
        assert_eq!(Timestamp::MAX.plus_millis(1), Timestamp::MAX);
        assert_eq!(Timestamp::from_secs(2).as_millis(), 2_000);
    }
}
