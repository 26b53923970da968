//! Sweep orchestration
//!
//! [`SweepService`] owns the lifecycle of one sweep attempt: it drives the
//! state machine in [`state`], launches the async work each state stands
//! for, and publishes every state change on a watch channel the UI layer
//! observes. One service instance covers exactly one sweep attempt for one
//! account; independent attempts get independent instances.

use std::fmt;
use std::sync::Arc;

use csk_common::signer::{
    CoSigner, SpendingWalletResolver, SweepPreparer, TransactionBroadcaster,
};
use csk_common::store::SweepStatusStore;
use csk_common::SweepContext;
use tokio::sync::{watch, Mutex};

pub mod error;
mod lifecycle;
pub mod merge;
mod pipeline;
pub mod state;

use error::Error;
use state::{check_sweep_state_transition, SweepState};

/// Callback invoked when a migration-context sweep resolves with nothing to
/// sweep; the caller navigates on it instead of rendering a no-funds state
pub type MigrationCompleteCallback = Arc<dyn Fn() + Send + Sync>;

/// Orchestrator for one recovery sweep attempt
pub struct SweepService {
    context: SweepContext,
    preparer: Arc<dyn SweepPreparer + Send + Sync>,
    wallets: Arc<dyn SpendingWalletResolver + Send + Sync>,
    co_signer: Arc<dyn CoSigner + Send + Sync>,
    broadcaster: Arc<dyn TransactionBroadcaster + Send + Sync>,
    status_store: Arc<dyn SweepStatusStore + Send + Sync>,
    on_migration_complete: Option<MigrationCompleteCallback>,
    state_tx: watch::Sender<SweepState>,
    // Serializes the action entry points so at most one state task runs per
    // attempt.
    action_lock: Mutex<()>,
}

impl SweepService {
    /// New sweep service in the initial [`SweepState::GeneratingPsbts`]
    /// state. Call [`SweepService::generate`] to run the preparation task.
    pub fn new(
        context: SweepContext,
        preparer: Arc<dyn SweepPreparer + Send + Sync>,
        wallets: Arc<dyn SpendingWalletResolver + Send + Sync>,
        co_signer: Arc<dyn CoSigner + Send + Sync>,
        broadcaster: Arc<dyn TransactionBroadcaster + Send + Sync>,
        status_store: Arc<dyn SweepStatusStore + Send + Sync>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SweepState::GeneratingPsbts);

        Self {
            context,
            preparer,
            wallets,
            co_signer,
            broadcaster,
            status_store,
            on_migration_complete: None,
            state_tx,
            action_lock: Mutex::new(()),
        }
    }

    /// Set the callback invoked when a migration-context sweep finds
    /// nothing to sweep
    pub fn set_migration_complete_callback(&mut self, callback: MigrationCompleteCallback) {
        self.on_migration_complete = Some(callback);
    }

    /// Read-only, continuously updated view of the current sweep state
    pub fn subscribe(&self) -> watch::Receiver<SweepState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the current sweep state
    pub fn current_state(&self) -> SweepState {
        self.state_tx.borrow().clone()
    }

    pub(crate) fn context(&self) -> &SweepContext {
        &self.context
    }

    /// Validate and publish a state change. Every transition goes through
    /// here so the transition table in [`state`] is authoritative.
    pub(crate) fn transition(&self, next: SweepState) -> Result<(), Error> {
        let current = self.state_tx.borrow().clone();
        check_sweep_state_transition(&current, &next)?;

        tracing::debug!(from = current.name(), to = next.name(), "sweep state transition");
        self.state_tx.send_replace(next);

        Ok(())
    }
}

impl fmt::Debug for SweepService {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SweepService")
            .field("context", &self.context)
            .field("state", &self.state_tx.borrow().name())
            .finish_non_exhaustive()
    }
}
