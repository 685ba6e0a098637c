// 8.0 engine/core.rs: main engine. holds the pool registry, the ledgers, the clock and the event log.
// 8.0.1 every operation takes &self. per-pool locks live in the registry.

use super::results::EngineError;
use crate::clock::{self, Clock, SystemClock};
use crate::config::AmmConfig;
use crate::events::{Event, EventId, EventLog, EventPayload, PoolStatusChangedEvent};
use crate::ledger::{LedgerProvider, TokenLedger};
use crate::pool::LiquidityPool;
use crate::position::LiquidityPosition;
use crate::registry::{PoolRegistry, PoolState};
use crate::types::{Address, Asset, CredentialId, Timestamp};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/** 8.1: main engine struct. all state lives here */
pub struct Engine {
    pub(super) config: AmmConfig,
    pub(super) registry: PoolRegistry,
    pub(super) ledgers: Arc<dyn LedgerProvider>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) events: Mutex<EventLog>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("pools", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(config: AmmConfig, ledgers: Arc<dyn LedgerProvider>) -> Result<Self, EngineError> {
        Self::with_clock(config, ledgers, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AmmConfig,
        ledgers: Arc<dyn LedgerProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let events = EventLog::new(config.engine.max_events);
        Ok(Self {
            config,
            registry: PoolRegistry::new(),
            ledgers,
            clock,
            events: Mutex::new(events),
        })
    }

    pub fn config(&self) -> &AmmConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn vault(&self) -> Address {
        self.config.accounts.vault
    }

    pub fn treasury(&self) -> Address {
        self.config.accounts.treasury
    }

    pub fn deactivate_pool(&self, credential_id: CredentialId) -> Result<(), EngineError> {
        self.set_pool_status(credential_id, false)
    }

    pub fn activate_pool(&self, credential_id: CredentialId) -> Result<(), EngineError> {
        self.set_pool_status(credential_id, true)
    }

    // no event when the status does not change
    fn set_pool_status(&self, credential_id: CredentialId, is_active: bool) -> Result<(), EngineError> {
        let handle = self.registry.handle(&credential_id)?;
        let mut state = handle.write();
        ensure_live(&state)?;

        if state.pool.is_active == is_active {
            return Ok(());
        }
        let now = self.now();
        state.pool.is_active = is_active;
        state.pool.last_updated = now;

        tracing::info!(%credential_id, is_active, "pool status changed");
        self.emit_event(
            now,
            EventPayload::PoolStatusChanged(PoolStatusChangedEvent {
                credential_id,
                is_active,
            }),
        );
        Ok(())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().all()
    }

    pub fn recent_events(&self, count: usize) -> Vec<Event> {
        self.events.lock().recent(count)
    }

    pub fn events_since(&self, after: EventId) -> Vec<Event> {
        self.events.lock().since(after)
    }

    pub fn pool_events(&self, credential_id: CredentialId) -> Vec<Event> {
        self.events.lock().for_pool(credential_id)
    }

    // callers hold the pool lock, so per-pool event order matches the order of commits
    pub(super) fn emit_event(&self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let mut log = self.events.lock();
        let event = log.append(timestamp, payload);

        if self.config.engine.log_events {
            tracing::info!(id = event.id.0, kind = event.payload.kind(), payload = ?event.payload, "event");
        }
        event.id
    }

    pub(super) fn check_deadline(&self, deadline: Timestamp) -> Result<Timestamp, EngineError> {
        let now = self.now();
        if clock::is_expired(now, deadline) {
            tracing::warn!(%deadline, %now, "deadline passed");
            return Err(EngineError::Expired { deadline, now });
        }
        Ok(now)
    }

    pub(super) fn settlement_ledger(&self) -> Arc<dyn TokenLedger> {
        self.ledgers.settlement_ledger()
    }

    pub(super) fn token_ledger(&self, token_address: Address) -> Result<Arc<dyn TokenLedger>, EngineError> {
        self.ledgers
            .token_ledger(token_address)
            .ok_or_else(|| EngineError::InvalidParameters(format!("no ledger for token {}", token_address)))
    }

    pub(super) fn ledger_for(&self, pool: &LiquidityPool, asset: Asset) -> Result<Arc<dyn TokenLedger>, EngineError> {
        match asset {
            Asset::Token => self.token_ledger(pool.token_address),
            Asset::Settlement => Ok(self.settlement_ledger()),
        }
    }
}

/// A retired pool failed its initial funding. callers that raced its creation treat it as absent.
pub(super) fn ensure_live(state: &PoolState) -> Result<(), EngineError> {
    if state.is_retired() {
        return Err(EngineError::PoolNotFound(state.pool.credential_id));
    }
    Ok(())
}

pub(super) fn ensure_active(state: &PoolState) -> Result<(), EngineError> {
    ensure_live(state)?;
    if !state.pool.is_active {
        return Err(EngineError::PoolInactive(state.pool.credential_id));
    }
    Ok(())
}

/// Pool and one position as they were before a mutation. restoring it undoes the mutation.
pub(super) struct Rollback {
    pool: LiquidityPool,
    provider: Option<Address>,
    position: Option<LiquidityPosition>,
}

impl Rollback {
    pub(super) fn capture(state: &PoolState, provider: Option<Address>) -> Self {
        Self {
            pool: state.pool.clone(),
            provider,
            position: provider.and_then(|p| state.position(&p).cloned()),
        }
    }

    pub(super) fn restore(self, state: &mut PoolState) {
        state.pool = self.pool;
        if let Some(provider) = self.provider {
            match self.position {
                Some(position) => {
                    state.positions.insert(provider, position);
                }
                None => {
                    state.positions.remove(&provider);
                }
            }
        }
    }
}
