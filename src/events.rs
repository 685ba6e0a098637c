// 11.0: every committed state change produces an event. indexers and analytics consume them;
// each payload carries the pool id, the principal, the amounts and the pool state afterwards.
// 11.1: EventLog keeps the most recent events in memory and drops the oldest past its cap.

use crate::fees::FeeAmounts;
use crate::pool::ReserveSnapshot;
use crate::types::{Address, Amount, CredentialId, Shares, SwapDirection, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    // Pool lifecycle
    PoolCreated(PoolCreatedEvent),
    PoolStatusChanged(PoolStatusChangedEvent),

    // Liquidity events
    LiquidityAdded(LiquidityAddedEvent),
    LiquidityRemoved(LiquidityRemovedEvent),

    // Trade events
    Swapped(SwappedEvent),

    // Fee events
    FeesClaimed(FeesClaimedEvent),
    ProtocolFeesCollected(ProtocolFeesCollectedEvent),
}

impl EventPayload {
    pub fn credential_id(&self) -> CredentialId {
        match self {
            EventPayload::PoolCreated(e) => e.credential_id,
            EventPayload::PoolStatusChanged(e) => e.credential_id,
            EventPayload::LiquidityAdded(e) => e.credential_id,
            EventPayload::LiquidityRemoved(e) => e.credential_id,
            EventPayload::Swapped(e) => e.credential_id,
            EventPayload::FeesClaimed(e) => e.credential_id,
            EventPayload::ProtocolFeesCollected(e) => e.credential_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::PoolCreated(_) => "pool_created",
            EventPayload::PoolStatusChanged(_) => "pool_status_changed",
            EventPayload::LiquidityAdded(_) => "liquidity_added",
            EventPayload::LiquidityRemoved(_) => "liquidity_removed",
            EventPayload::Swapped(_) => "swapped",
            EventPayload::FeesClaimed(_) => "fees_claimed",
            EventPayload::ProtocolFeesCollected(_) => "protocol_fees_collected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCreatedEvent {
    pub credential_id: CredentialId,
    pub token_address: Address,
    pub creator: Address,
    pub token_amount: Amount,
    pub settlement_amount: Amount,
    pub shares_minted: Shares,
    pub state: ReserveSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatusChangedEvent {
    pub credential_id: CredentialId,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityAddedEvent {
    pub credential_id: CredentialId,
    pub provider: Address,
    pub token_amount: Amount,
    pub settlement_amount: Amount,
    pub shares_minted: Shares,
    pub state: ReserveSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityRemovedEvent {
    pub credential_id: CredentialId,
    pub provider: Address,
    pub shares_burned: Shares,
    pub token_amount: Amount,
    pub settlement_amount: Amount,
    // pending fees paid out with the withdrawal
    pub fees_harvested: FeeAmounts,
    pub state: ReserveSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwappedEvent {
    pub credential_id: CredentialId,
    pub trader: Address,
    pub direction: SwapDirection,
    pub amount_in: Amount,
    pub amount_out: Amount,
    pub fee_amount: Amount,
    pub protocol_fee: Amount,
    pub provider_fee: Amount,
    pub state: ReserveSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeesClaimedEvent {
    pub credential_id: CredentialId,
    pub provider: Address,
    pub amounts: FeeAmounts,
    pub state: ReserveSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolFeesCollectedEvent {
    pub credential_id: CredentialId,
    pub treasury: Address,
    pub amounts: FeeAmounts,
    pub state: ReserveSnapshot,
}

/// Bounded, ordered event store. ids keep increasing after old events are dropped.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<Event>,
    next_id: u64,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 1,
            max_events: max_events.max(1),
        }
    }

    pub fn append(&mut self, timestamp: Timestamp, payload: EventPayload) -> &Event {
        let event = Event::new(EventId(self.next_id), timestamp, payload);
        self.next_id += 1;

        while self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
        &self.events[self.events.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events ever appended, including dropped ones.
    pub fn total_emitted(&self) -> u64 {
        self.next_id - 1
    }

    pub fn all(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    pub fn recent(&self, count: usize) -> Vec<Event> {
        let start = self.events.len().saturating_sub(count);
        self.events.iter().skip(start).cloned().collect()
    }

    /// Retained events with id > `after`, oldest first.
    pub fn since(&self, after: EventId) -> Vec<Event> {
        self.events.iter().filter(|e| e.id > after).cloned().collect()
    }

    pub fn for_pool(&self, credential_id: CredentialId) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.payload.credential_id() == credential_id)
            .cloned()
            .collect()
    }
}
