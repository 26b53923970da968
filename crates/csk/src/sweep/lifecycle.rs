//! Sweep lifecycle actions
//!
//! The action entry points exposed to the caller layer. Each validates the
//! state it is invoked in, performs the associated async work and publishes
//! the resulting state. The internal action lock guarantees that at most
//! one of these runs at a time for a given attempt.

use std::sync::Arc;

use csk_common::Psbt;
use tracing::instrument;

use super::error::Error;
use super::merge::merge_hardware_signed;
use super::state::{Error as StateError, SweepState};
use super::SweepService;

impl SweepService {
    /// Run the preparation task for the initial state.
    ///
    /// Asks the upstream collaborator to prepare a sweep, then applies the
    /// outcome: a prepared sweep awaits confirmation, a preparation failure
    /// becomes a retryable failure state, and an empty result resolves the
    /// attempt through the null-sweep policy.
    #[instrument(skip(self))]
    pub async fn generate(&self) -> Result<SweepState, Error> {
        let _guard = self.action_lock.lock().await;

        if !matches!(self.current_state(), SweepState::GeneratingPsbts) {
            return Err(StateError::NotAllowed {
                action: "generate",
                state: self.current_state().name(),
            }
            .into());
        }

        self.run_generation().await
    }

    /// User confirmed the sweep; start signing.
    ///
    /// A sweep with hardware-sign transactions first waits for the
    /// out-of-process hardware signer; everything else goes straight into
    /// the signing and broadcast pipeline.
    #[instrument(skip(self))]
    pub async fn confirm_and_start(&self) -> Result<SweepState, Error> {
        let _guard = self.action_lock.lock().await;

        let sweep = match self.current_state() {
            SweepState::PsbtsGenerated { sweep } => sweep,
            other => {
                return Err(StateError::NotAllowed {
                    action: "confirm_and_start",
                    state: other.name(),
                }
                .into())
            }
        };

        if sweep.requires_hardware_signing() {
            self.transition(SweepState::awaiting_hardware_signed_sweeps(sweep)?)?;
            return Ok(self.current_state());
        }

        let psbts = sweep.unsigned_psbts().to_vec();
        self.transition(SweepState::SignAndBroadcast {
            psbts: psbts.clone(),
            sweep: sweep.clone(),
        })?;
        self.run_pipeline(psbts, sweep).await
    }

    /// Hardware signatures arrived from the out-of-process signer; merge
    /// them into the sweep and start the pipeline
    #[instrument(skip_all)]
    pub async fn supplied_hardware_signatures(
        &self,
        hw_signed: Vec<Psbt>,
    ) -> Result<SweepState, Error> {
        let _guard = self.action_lock.lock().await;

        let sweep = match self.current_state() {
            SweepState::AwaitingHardwareSignedSweeps { sweep } => sweep,
            other => {
                return Err(StateError::NotAllowed {
                    action: "supplied_hardware_signatures",
                    state: other.name(),
                }
                .into())
            }
        };

        let psbts = merge_hardware_signed(sweep.unsigned_psbts(), hw_signed);
        self.transition(SweepState::SignAndBroadcast {
            psbts: psbts.clone(),
            sweep: sweep.clone(),
        })?;
        self.run_pipeline(psbts, sweep).await
    }

    /// User cancelled hardware signing; return to confirmation.
    ///
    /// No signer was called yet at this point, so there is nothing to
    /// discard; the original sweep is kept as prepared.
    #[instrument(skip(self))]
    pub async fn cancel_hardware_signing(&self) -> Result<SweepState, Error> {
        let _guard = self.action_lock.lock().await;

        let sweep = match self.current_state() {
            SweepState::AwaitingHardwareSignedSweeps { sweep } => sweep,
            other => {
                return Err(StateError::NotAllowed {
                    action: "cancel_hardware_signing",
                    state: other.name(),
                }
                .into())
            }
        };

        self.transition(SweepState::PsbtsGenerated { sweep })?;
        Ok(self.current_state())
    }

    /// User-initiated retry after a failure; restarts from a fresh
    /// preparation rather than resuming the failed sweep
    #[instrument(skip(self))]
    pub async fn retry(&self) -> Result<SweepState, Error> {
        let _guard = self.action_lock.lock().await;

        if !self.current_state().is_retryable() {
            return Err(StateError::NotAllowed {
                action: "retry",
                state: self.current_state().name(),
            }
            .into());
        }

        self.transition(SweepState::GeneratingPsbts)?;
        self.run_generation().await
    }

    async fn run_generation(&self) -> Result<SweepState, Error> {
        match self.preparer.prepare_sweep(self.context()).await {
            Ok(Some(sweep)) => {
                tracing::info!(
                    psbts = sweep.unsigned_psbts().len(),
                    hw_psbts = sweep.psbts_requiring_hw_sign().len(),
                    transfer = %sweep.total_transfer_amount(),
                    fee = %sweep.total_fee_amount(),
                    "sweep prepared"
                );
                self.transition(SweepState::PsbtsGenerated { sweep })?;
            }
            Ok(None) => return self.resolve_null_sweep().await,
            Err(err) => {
                let error = Arc::new(Error::PrepareSweep(err));
                tracing::warn!(%error, "sweep preparation failed");
                self.transition(SweepState::GeneratePsbtsFailed { error })?;
            }
        }

        Ok(self.current_state())
    }

    /// Nothing to sweep. Mark the attempt handled so later sessions do not
    /// re-prompt, then resolve: an account that already attempted a sweep
    /// gets the idempotent success state; a migration context hands control
    /// straight back to the caller with no intermediate visible state;
    /// everything else surfaces the no-funds state.
    async fn resolve_null_sweep(&self) -> Result<SweepState, Error> {
        let account_id = self.context().account_id;

        // Read before marking: the branch below uses the pre-marking value.
        let previously_attempted = match self.status_store.has_attempted_sweep(&account_id).await {
            Ok(attempted) => attempted,
            Err(err) => {
                let error = Arc::new(Error::Store(err));
                tracing::warn!(%error, "could not read sweep status");
                self.transition(SweepState::GeneratePsbtsFailed { error })?;
                return Ok(self.current_state());
            }
        };

        if let Err(err) = self.status_store.mark_sweep_handled(&account_id).await {
            // The marker is recoverable: a later session re-prompts and the
            // re-attempted sweep resolves to nothing again.
            tracing::error!(%account_id, "failed to persist sweep-handled marker: {err}");
        }

        if previously_attempted {
            tracing::info!(%account_id, "nothing to sweep, prior attempt recorded");
            self.transition(SweepState::SweepSuccessNoData)?;
        } else if self.context().is_migration() {
            tracing::info!(%account_id, "nothing to sweep in migration context");
            match &self.on_migration_complete {
                Some(callback) => callback(),
                None => {
                    tracing::warn!("no migration-complete callback configured");
                }
            }
        } else {
            tracing::info!(%account_id, "nothing to sweep");
            self.transition(SweepState::NoFundsFound)?;
        }

        Ok(self.current_state())
    }
}
