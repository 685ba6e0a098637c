//! Swap execution and quoting.

use super::core::{ensure_active, Engine, Rollback};
use super::results::{EngineError, SwapResult};
use crate::events::{EventPayload, SwappedEvent};
use crate::registry::PoolState;
use crate::swap::{self, SwapQuote};
use crate::transfer::TransferBatch;
use crate::types::{Address, Amount, CredentialId, SwapDirection, Timestamp};

impl Engine {
    /// Read-only quote. `swap` with the same inputs against the same pool state pays exactly
    /// `amount_out`.
    pub fn quote(
        &self,
        credential_id: CredentialId,
        amount_in: Amount,
        direction: SwapDirection,
    ) -> Result<SwapQuote, EngineError> {
        let handle = self.registry.handle(&credential_id)?;
        let state = handle.read();
        ensure_active(&state)?;
        Ok(swap::quote_exact_input(&state.pool, amount_in, direction, &self.config.fees)?)
    }

    /// Smallest input that buys at least `amount_out`.
    pub fn quote_exact_output(
        &self,
        credential_id: CredentialId,
        amount_out: Amount,
        direction: SwapDirection,
    ) -> Result<SwapQuote, EngineError> {
        let handle = self.registry.handle(&credential_id)?;
        let state = handle.read();
        ensure_active(&state)?;
        Ok(swap::quote_exact_output(&state.pool, amount_out, direction, &self.config.fees)?)
    }

    pub fn swap(
        &self,
        caller: Address,
        credential_id: CredentialId,
        amount_in: Amount,
        min_amount_out: Amount,
        deadline: Timestamp,
        direction: SwapDirection,
    ) -> Result<SwapResult, EngineError> {
        let now = self.check_deadline(deadline)?;
        let handle = self.registry.handle(&credential_id)?;
        let mut state = handle.write();
        ensure_active(&state)?;

        if amount_in == 0 {
            return Err(EngineError::InvalidAmount("swap amount must be non-zero".into()));
        }
        tracing::debug!(%credential_id, %caller, amount_in, ?direction, "swap");

        let quote = swap::quote_exact_input(&state.pool, amount_in, direction, &self.config.fees)?;
        self.execute_swap(&mut state, caller, quote, min_amount_out, now)
    }

    /// Buy exactly-or-more `amount_out`, paying at most `max_amount_in`.
    pub fn swap_exact_output(
        &self,
        caller: Address,
        credential_id: CredentialId,
        amount_out: Amount,
        max_amount_in: Amount,
        deadline: Timestamp,
        direction: SwapDirection,
    ) -> Result<SwapResult, EngineError> {
        let now = self.check_deadline(deadline)?;
        let handle = self.registry.handle(&credential_id)?;
        let mut state = handle.write();
        ensure_active(&state)?;

        if amount_out == 0 {
            return Err(EngineError::InvalidAmount("swap amount must be non-zero".into()));
        }
        tracing::debug!(%credential_id, %caller, amount_out, ?direction, "swap_exact_output");

        let quote = swap::quote_exact_output(&state.pool, amount_out, direction, &self.config.fees)?;
        if quote.amount_in > max_amount_in {
            tracing::warn!(%credential_id, needed = quote.amount_in, max_amount_in, "swap input above limit");
            return Err(EngineError::SlippageExceeded {
                field: "amount_in",
                actual: quote.amount_in,
                limit: max_amount_in,
            });
        }
        self.execute_swap(&mut state, caller, quote, amount_out, now)
    }

    // caller holds the pool write lock. state first, transfers second, event last.
    fn execute_swap(
        &self,
        state: &mut PoolState,
        caller: Address,
        quote: SwapQuote,
        min_amount_out: Amount,
        now: Timestamp,
    ) -> Result<SwapResult, EngineError> {
        let credential_id = state.pool.credential_id;
        if quote.amount_out < min_amount_out {
            tracing::warn!(%credential_id, got = quote.amount_out, min_amount_out, "swap slippage");
            return Err(EngineError::SlippageExceeded {
                field: "amount_out",
                actual: quote.amount_out,
                limit: min_amount_out,
            });
        }

        let input_ledger = self.ledger_for(&state.pool, quote.direction.input_asset())?;
        let output_ledger = self.ledger_for(&state.pool, quote.direction.output_asset())?;

        let rollback = Rollback::capture(state, None);
        if let Err(e) = swap::apply_swap(&mut state.pool, &quote, now) {
            rollback.restore(state);
            return Err(e.into());
        }

        let mut batch = TransferBatch::new("swap");
        batch
            .push(quote.direction.input_asset(), input_ledger, caller, self.vault(), quote.amount_in)
            .push(quote.direction.output_asset(), output_ledger, self.vault(), caller, quote.amount_out);
        if let Err(e) = batch.execute() {
            rollback.restore(state);
            return Err(e.into());
        }

        let snapshot = state.pool.snapshot();
        self.emit_event(
            now,
            EventPayload::Swapped(SwappedEvent {
                credential_id,
                trader: caller,
                direction: quote.direction,
                amount_in: quote.amount_in,
                amount_out: quote.amount_out,
                fee_amount: quote.fee_amount,
                protocol_fee: quote.protocol_fee,
                provider_fee: quote.provider_fee,
                state: snapshot,
            }),
        );
        tracing::info!(
            %credential_id,
            %caller,
            amount_in = quote.amount_in,
            amount_out = quote.amount_out,
            fee = quote.fee_amount,
            "swap executed"
        );

        Ok(SwapResult {
            direction: quote.direction,
            amount_in: quote.amount_in,
            amount_out: quote.amount_out,
            fee_amount: quote.fee_amount,
            protocol_fee: quote.protocol_fee,
            provider_fee: quote.provider_fee,
            state: snapshot,
        })
    }
}
