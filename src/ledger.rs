//! External token ledgers.
//!
//! The engine never owns balances. It moves them through [`TokenLedger`] implementations: one for
//! the settlement asset and one per credential token, resolved by token address through a
//! [`LedgerProvider`]. Ledgers must not call back into the engine.
//!
//! The in-memory implementations back the tests and the simulator. They can be told to reject
//! transfers to a given recipient, which is how rollback paths get exercised.

use crate::types::{Address, Amount, CredentialId};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("{owner} holds {available}, needs {required}")]
    InsufficientBalance {
        owner: Address,
        required: Amount,
        available: Amount,
    },

    #[error("transfers to {0} are rejected")]
    RecipientRejected(Address),

    #[error("no ledger for token {0}")]
    UnknownToken(Address),

    #[error("ledger error: {0}")]
    Other(String),
}

pub trait TokenLedger: Send + Sync {
    /// Move `amount` from `from` to `to`. all or nothing.
    fn transfer_from(&self, from: Address, to: Address, amount: Amount) -> Result<(), TransferError>;

    fn balance_of(&self, owner: Address) -> Amount;
}

/// Resolves the ledger for each asset a pool touches.
pub trait LedgerProvider: Send + Sync {
    fn settlement_ledger(&self) -> Arc<dyn TokenLedger>;

    fn token_ledger(&self, token_address: Address) -> Option<Arc<dyn TokenLedger>>;
}

/// Credential -> token contract lookup, kept by the token registry.
pub trait CredentialTokenLookup: Send + Sync {
    fn token_address_for(&self, credential_id: &CredentialId) -> Option<Address>;
}

// in-memory ledger

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    name: String,
    balances: Mutex<HashMap<Address, Amount>>,
    rejected_recipients: Mutex<HashSet<Address>>,
}

impl InMemoryLedger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mint(&self, owner: Address, amount: Amount) {
        let mut balances = self.balances.lock();
        let balance = balances.entry(owner).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Make every transfer to `recipient` fail until unblocked.
    pub fn block_recipient(&self, recipient: Address) {
        self.rejected_recipients.lock().insert(recipient);
    }

    pub fn unblock_recipient(&self, recipient: Address) {
        self.rejected_recipients.lock().remove(&recipient);
    }

    pub fn total_supply(&self) -> Amount {
        self.balances.lock().values().fold(0u128, |acc, b| acc.saturating_add(*b))
    }
}

impl TokenLedger for InMemoryLedger {
    fn transfer_from(&self, from: Address, to: Address, amount: Amount) -> Result<(), TransferError> {
        if self.rejected_recipients.lock().contains(&to) {
            return Err(TransferError::RecipientRejected(to));
        }

        let mut balances = self.balances.lock();
        let available = balances.get(&from).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                owner: from,
                required: amount,
                available,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }

        balances.insert(from, available - amount);
        let credited = balances.entry(to).or_insert(0);
        *credited = credited
            .checked_add(amount)
            .ok_or_else(|| TransferError::Other(format!("{} balance overflow for {}", self.name, to)))?;
        Ok(())
    }

    fn balance_of(&self, owner: Address) -> Amount {
        self.balances.lock().get(&owner).copied().unwrap_or(0)
    }
}

/// One settlement ledger plus a ledger per registered token address.
#[derive(Debug)]
pub struct InMemoryLedgers {
    settlement: Arc<InMemoryLedger>,
    tokens: RwLock<HashMap<Address, Arc<InMemoryLedger>>>,
}

impl Default for InMemoryLedgers {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgers {
    pub fn new() -> Self {
        Self {
            settlement: Arc::new(InMemoryLedger::new("settlement")),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    pub fn settlement(&self) -> Arc<InMemoryLedger> {
        Arc::clone(&self.settlement)
    }

    /// Register (or fetch) the ledger for a token address.
    pub fn register_token(&self, token_address: Address) -> Arc<InMemoryLedger> {
        let mut tokens = self.tokens.write();
        let ledger = tokens
            .entry(token_address)
            .or_insert_with(|| Arc::new(InMemoryLedger::new(format!("token {}", token_address))));
        Arc::clone(ledger)
    }

    pub fn token(&self, token_address: Address) -> Option<Arc<InMemoryLedger>> {
        self.tokens.read().get(&token_address).cloned()
    }
}

impl LedgerProvider for InMemoryLedgers {
    fn settlement_ledger(&self) -> Arc<dyn TokenLedger> {
        self.settlement.clone()
    }

    fn token_ledger(&self, token_address: Address) -> Option<Arc<dyn TokenLedger>> {
        self.tokens
            .read()
            .get(&token_address)
            .map(|ledger| ledger.clone() as Arc<dyn TokenLedger>)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialDirectory {
    tokens: RwLock<HashMap<CredentialId, Address>>,
}

impl InMemoryCredentialDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, credential_id: CredentialId, token_address: Address) {
        self.tokens.write().insert(credential_id, token_address);
    }
}

impl CredentialTokenLookup for InMemoryCredentialDirectory {
    fn token_address_for(&self, credential_id: &CredentialId) -> Option<Address> {
        self.tokens.read().get(credential_id).copied()
    }
}
