// 4.0: a provider's stake in one pool. created on first deposit, kept (zeroed) after a full exit.
// the liquidity engine moves shares and deposit totals, the fee ledger moves the fee fields.

use crate::fees::FeeAmounts;
use crate::math::{self, MathError};
use crate::types::{Address, Amount, CredentialId, Shares, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPosition {
    pub credential_id: CredentialId,
    pub provider: Address,
    pub shares: Shares,
    pub cumulative_token_deposited: Amount,
    pub cumulative_settlement_deposited: Amount,
    /// Settlement-asset fees paid out so far.
    pub fees_claimed: Amount,
    /// Token fees paid out so far.
    pub token_fees_claimed: Amount,
    /// Index value times shares at the last checkpoint.
    pub fee_debt: FeeAmounts,
    /// Fees earned before the last share change and not yet paid.
    pub unclaimed_fees: FeeAmounts,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl LiquidityPosition {
    pub fn new(credential_id: CredentialId, provider: Address, timestamp: Timestamp) -> Self {
        Self {
            credential_id,
            provider,
            shares: 0,
            cumulative_token_deposited: 0,
            cumulative_settlement_deposited: 0,
            fees_claimed: 0,
            token_fees_claimed: 0,
            fee_debt: FeeAmounts::zero(),
            unclaimed_fees: FeeAmounts::zero(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn has_shares(&self) -> bool {
        self.shares > 0
    }

    pub(crate) fn record_deposit(
        &mut self,
        shares: Shares,
        token_amount: Amount,
        settlement_amount: Amount,
        timestamp: Timestamp,
    ) -> Result<(), MathError> {
        self.shares = math::add(self.shares, shares)?;
        self.cumulative_token_deposited = math::add(self.cumulative_token_deposited, token_amount)?;
        self.cumulative_settlement_deposited =
            math::add(self.cumulative_settlement_deposited, settlement_amount)?;
        self.updated_at = timestamp;
        Ok(())
    }

    pub(crate) fn record_withdrawal(&mut self, shares: Shares, timestamp: Timestamp) -> Result<(), MathError> {
        self.shares = math::sub(self.shares, shares)?;
        self.updated_at = timestamp;
        Ok(())
    }
}
