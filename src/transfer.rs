// 9.1 transfer.rs: external transfers for one operation, executed as a unit.
// legs run in order. if one fails, the legs that already went through are sent back in reverse
// order so the ledgers end where they started. a reversal that itself fails is logged loudly;
// there is nothing left to retry from inside the engine.

use crate::ledger::{TokenLedger, TransferError};
use crate::types::{Address, Amount, Asset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Committed,
    Reverted,
    // a compensating transfer failed; ledgers may be out of step with the engine
    Inconsistent,
}

/// One external transfer, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeg {
    pub asset: Asset,
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{asset:?} transfer {from} -> {to} of {amount} failed: {source}")]
pub struct BatchError {
    pub asset: Asset,
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    pub source: TransferError,
    /// Completed legs that could not be sent back.
    pub unreverted: usize,
}

struct PlannedLeg {
    leg: TransferLeg,
    ledger: Arc<dyn TokenLedger>,
}

impl fmt::Debug for PlannedLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.leg.fmt(f)
    }
}

#[derive(Debug)]
pub struct TransferBatch {
    label: &'static str,
    legs: Vec<PlannedLeg>,
    status: BatchStatus,
}

impl TransferBatch {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            legs: Vec::new(),
            status: BatchStatus::Pending,
        }
    }

    /// Queue a transfer. zero amounts are skipped.
    pub fn push(
        &mut self,
        asset: Asset,
        ledger: Arc<dyn TokenLedger>,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> &mut Self {
        if amount > 0 {
            self.legs.push(PlannedLeg {
                leg: TransferLeg { asset, from, to, amount },
                ledger,
            });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn legs(&self) -> impl Iterator<Item = &TransferLeg> {
        self.legs.iter().map(|planned| &planned.leg)
    }

    pub fn execute(&mut self) -> Result<(), BatchError> {
        for (index, planned) in self.legs.iter().enumerate() {
            let leg = planned.leg;
            if let Err(source) = planned.ledger.transfer_from(leg.from, leg.to, leg.amount) {
                tracing::warn!(batch = self.label, ?leg, error = %source, "transfer failed, reverting");
                let unreverted = self.revert(index);
                self.status = if unreverted == 0 {
                    BatchStatus::Reverted
                } else {
                    BatchStatus::Inconsistent
                };
                return Err(BatchError {
                    asset: leg.asset,
                    from: leg.from,
                    to: leg.to,
                    amount: leg.amount,
                    source,
                    unreverted,
                });
            }
        }
        self.status = BatchStatus::Committed;
        Ok(())
    }

    // send back legs [0, completed) newest first. returns how many could not be reversed.
    fn revert(&self, completed: usize) -> usize {
        let mut failures = 0;
        for planned in self.legs[..completed].iter().rev() {
            let leg = planned.leg;
            if let Err(error) = planned.ledger.transfer_from(leg.to, leg.from, leg.amount) {
                failures += 1;
                tracing::error!(batch = self.label, ?leg, %error, "compensating transfer failed");
            }
        }
        failures
    }
}
