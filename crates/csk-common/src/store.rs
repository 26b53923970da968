//! Sweep status store
//!
//! The one piece of state that outlives a sweep attempt: a per-account
//! idempotency marker recording that a sweep was resolved (funds moved, or
//! nothing found to move) so later sessions do not prompt the user again.
//! Keeping it behind this trait keeps the orchestrator itself stateless
//! between attempts.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::context::AccountId;

/// Store Error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Store backend error
    #[error(transparent)]
    Store(Box<dyn std::error::Error + Send + Sync>),
}

/// Persisted per-account sweep status
#[async_trait]
pub trait SweepStatusStore: Debug {
    /// Whether a sweep was already attempted for this account in an earlier
    /// session
    async fn has_attempted_sweep(&self, account_id: &AccountId) -> Result<bool, Error>;

    /// Persist the marker that this account's sweep has been handled.
    ///
    /// Must be idempotent; the marker is written once per successful or
    /// no-funds resolution and may be re-written safely.
    async fn mark_sweep_handled(&self, account_id: &AccountId) -> Result<(), Error>;
}
