//! Pool registry.
//!
//! Maps each credential to its pool. Every pool lives behind its own `RwLock` together with the
//! positions of its providers, so operations on one pool are linearized while different pools
//! proceed in parallel. The registry lock only guards the map itself.
//!
//! Lock order: registry, then pool. Never take the registry lock while holding a pool lock.

use crate::pool::LiquidityPool;
use crate::position::LiquidityPosition;
use crate::types::{Address, CredentialId, Shares, Timestamp};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("pool for credential {0} already exists")]
    AlreadyExists(CredentialId),

    #[error("no pool for credential {0}")]
    NotFound(CredentialId),
}

/// A pool plus the positions held in it. guarded as one unit.
#[derive(Debug, Clone)]
pub struct PoolState {
    pub pool: LiquidityPool,
    pub positions: HashMap<Address, LiquidityPosition>,
    retired: bool,
}

impl PoolState {
    pub fn new(pool: LiquidityPool) -> Self {
        Self {
            pool,
            positions: HashMap::new(),
            retired: false,
        }
    }

    /// Set when funding a new pool failed. a retired pool is no longer in the registry.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn position(&self, provider: &Address) -> Option<&LiquidityPosition> {
        self.positions.get(provider)
    }

    pub fn position_entry(&mut self, provider: Address, now: Timestamp) -> &mut LiquidityPosition {
        let credential_id = self.pool.credential_id;
        self.positions
            .entry(provider)
            .or_insert_with(|| LiquidityPosition::new(credential_id, provider, now))
    }

    /// Pool and the provider's position, borrowed together. creates an empty position if needed.
    pub fn pool_and_position(
        &mut self,
        provider: Address,
        now: Timestamp,
    ) -> (&mut LiquidityPool, &mut LiquidityPosition) {
        let credential_id = self.pool.credential_id;
        let position = self
            .positions
            .entry(provider)
            .or_insert_with(|| LiquidityPosition::new(credential_id, provider, now));
        (&mut self.pool, position)
    }

    /// Sum of all position shares. equals `pool.total_liquidity_shares` between operations.
    pub fn shares_outstanding(&self) -> Shares {
        self.positions.values().map(|p| p.shares).sum()
    }
}

/// Cheap, cloneable reference to one pool's lock.
#[derive(Debug, Clone)]
pub struct PoolHandle {
    credential_id: CredentialId,
    state: Arc<RwLock<PoolState>>,
}

impl PoolHandle {
    fn new(state: PoolState) -> Self {
        Self {
            credential_id: state.pool.credential_id,
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn credential_id(&self) -> CredentialId {
        self.credential_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PoolState> {
        self.state.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, PoolState> {
        self.state.write()
    }

    fn same_pool(&self, other: &PoolHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: RwLock<HashMap<CredentialId, PoolHandle>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new pool and fund it while holding its exclusive lock.
    ///
    /// The pool becomes visible before `fund` runs, but nobody can read or trade it until `fund`
    /// returns. If `fund` fails the pool is retired and unpublished, and the error is returned.
    pub fn create<E, F>(&self, state: PoolState, fund: F) -> Result<PoolHandle, E>
    where
        E: From<RegistryError>,
        F: FnOnce(&mut PoolState) -> Result<(), E>,
    {
        let credential_id = state.pool.credential_id;
        let handle = PoolHandle::new(state);

        let mut guard = {
            let mut pools = self.pools.write();
            if pools.contains_key(&credential_id) {
                return Err(RegistryError::AlreadyExists(credential_id).into());
            }
            // nobody else has seen this handle, so this never blocks
            let guard = handle.state.write();
            pools.insert(credential_id, handle.clone());
            guard
        };

        match fund(&mut *guard) {
            Ok(()) => {
                drop(guard);
                Ok(handle)
            }
            Err(error) => {
                guard.retired = true;
                guard.pool.is_active = false;
                drop(guard);

                let mut pools = self.pools.write();
                if pools.get(&credential_id).is_some_and(|h| h.same_pool(&handle)) {
                    pools.remove(&credential_id);
                }
                tracing::debug!(%credential_id, "pool creation rolled back");
                Err(error)
            }
        }
    }

    pub fn handle(&self, credential_id: &CredentialId) -> Result<PoolHandle, RegistryError> {
        self.pools
            .read()
            .get(credential_id)
            .cloned()
            .ok_or(RegistryError::NotFound(*credential_id))
    }

    /// Snapshot of the pool, read under its shared lock.
    pub fn get(&self, credential_id: &CredentialId) -> Option<LiquidityPool> {
        let handle = self.handle(credential_id).ok()?;
        let state = handle.read();
        if state.is_retired() {
            return None;
        }
        Some(state.pool.clone())
    }

    pub fn exists(&self, credential_id: &CredentialId) -> bool {
        self.get(credential_id).is_some()
    }

    pub fn pool_ids(&self) -> Vec<CredentialId> {
        let mut ids: Vec<CredentialId> = self.pools.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }
}
