//! Fee claims: providers claim their share, the treasury collects the protocol cut.
//! Both stay available on inactive pools.

use super::core::{ensure_live, Engine, Rollback};
use super::results::{EngineError, FeeClaim};
use crate::events::{EventPayload, FeesClaimedEvent, ProtocolFeesCollectedEvent};
use crate::fees::{self, FeeAmounts};
use crate::pool::{Delta, LiquidityPool};
use crate::position::LiquidityPosition;
use crate::transfer::TransferBatch;
use crate::types::{Address, Asset, CredentialId, Timestamp};

impl Engine {
    /// Pay the caller's pending provider fees in both assets. nothing pending is not an error.
    pub fn claim_fees(&self, caller: Address, credential_id: CredentialId) -> Result<FeeClaim, EngineError> {
        let handle = self.registry.handle(&credential_id)?;
        let mut state = handle.write();
        ensure_live(&state)?;

        let has_shares = state.position(&caller).is_some_and(|p| p.has_shares());
        if !has_shares {
            return Err(EngineError::NoPosition {
                credential_id,
                provider: caller,
            });
        }

        let now = self.now();
        let token_ledger = self.token_ledger(state.pool.token_address)?;
        let rollback = Rollback::capture(&state, Some(caller));

        let payout = {
            let (pool, position) = state.pool_and_position(caller, now);
            claim_position(pool, position, now)
        };
        let payout = match payout {
            Ok(paid) => paid,
            Err(e) => {
                rollback.restore(&mut state);
                return Err(e);
            }
        };

        let mut batch = TransferBatch::new("claim_fees");
        batch
            .push(Asset::Token, token_ledger, self.vault(), caller, payout.token)
            .push(Asset::Settlement, self.settlement_ledger(), self.vault(), caller, payout.settlement);
        if let Err(e) = batch.execute() {
            rollback.restore(&mut state);
            return Err(e.into());
        }

        self.emit_event(
            now,
            EventPayload::FeesClaimed(FeesClaimedEvent {
                credential_id,
                provider: caller,
                amounts: payout,
                state: state.pool.snapshot(),
            }),
        );
        tracing::info!(%credential_id, %caller, token = payout.token, settlement = payout.settlement, "fees claimed");

        Ok(FeeClaim {
            credential_id,
            recipient: caller,
            amounts: payout,
        })
    }

    /// Send the pool's protocol fees to the treasury.
    pub fn collect_protocol_fees(&self, credential_id: CredentialId) -> Result<FeeClaim, EngineError> {
        let handle = self.registry.handle(&credential_id)?;
        let mut state = handle.write();
        ensure_live(&state)?;

        let now = self.now();
        let treasury = self.treasury();
        let token_ledger = self.token_ledger(state.pool.token_address)?;
        let rollback = Rollback::capture(&state, None);

        let amounts = state.pool.protocol_fees;
        if let Err(e) = pay_out(&mut state.pool, amounts, PayoutSource::Protocol) {
            rollback.restore(&mut state);
            return Err(e);
        }
        state.pool.last_updated = now;

        let mut batch = TransferBatch::new("collect_protocol_fees");
        batch
            .push(Asset::Token, token_ledger, self.vault(), treasury, amounts.token)
            .push(Asset::Settlement, self.settlement_ledger(), self.vault(), treasury, amounts.settlement);
        if let Err(e) = batch.execute() {
            rollback.restore(&mut state);
            return Err(e.into());
        }

        self.emit_event(
            now,
            EventPayload::ProtocolFeesCollected(ProtocolFeesCollectedEvent {
                credential_id,
                treasury,
                amounts,
                state: state.pool.snapshot(),
            }),
        );
        tracing::info!(
            %credential_id,
            token = amounts.token,
            settlement = amounts.settlement,
            "protocol fees collected"
        );

        Ok(FeeClaim {
            credential_id,
            recipient: treasury,
            amounts,
        })
    }
}

fn claim_position(
    pool: &mut LiquidityPool,
    position: &mut LiquidityPosition,
    now: Timestamp,
) -> Result<FeeAmounts, EngineError> {
    let paid = fees::settle_claim(position, pool)?;
    pay_out(pool, paid, PayoutSource::Providers)?;
    position.updated_at = now;
    pool.last_updated = now;
    Ok(paid)
}

#[derive(Clone, Copy)]
enum PayoutSource {
    Providers,
    Protocol,
}

// fees leave the curve reserves together with their earmark
fn pay_out(pool: &mut LiquidityPool, amounts: FeeAmounts, source: PayoutSource) -> Result<(), EngineError> {
    for asset in [Asset::Token, Asset::Settlement] {
        let amount = amounts.get(asset);
        match source {
            PayoutSource::Providers => pool.outstanding_provider_fees.debit(asset, amount)?,
            PayoutSource::Protocol => pool.protocol_fees.debit(asset, amount)?,
        }
        pool.apply_reserve_delta(asset, Delta::Decrease(amount))?;
    }
    Ok(())
}
