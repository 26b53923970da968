//! Sweep orchestration errors

use bitcoin::Txid;
use csk_common::signer;
use thiserror::Error;

/// CSK Sweep Error
#[derive(Debug, Error)]
pub enum Error {
    /// Sweep preparation failed; retryable by full restart
    #[error("Failed to prepare sweep")]
    PrepareSweep(#[source] signer::Error),
    /// App-key signing failed for one transaction
    #[error("App signing failed for `{txid}`")]
    AppSignature {
        /// Failing transaction
        txid: Txid,
        /// Causal signer error
        #[source]
        source: signer::Error,
    },
    /// Server co-signing failed for one transaction
    #[error("Server co-signing failed for `{txid}`")]
    ServerSignature {
        /// Failing transaction
        txid: Txid,
        /// Causal signer error
        #[source]
        source: signer::Error,
    },
    /// Network broadcast failed for one transaction
    #[error("Broadcast failed for `{txid}`")]
    Broadcast {
        /// Failing transaction
        txid: Txid,
        /// Causal signer error
        #[source]
        source: signer::Error,
    },
    /// One or more transactions in the batch failed. Transactions broadcast
    /// before or after the failing ones stay broadcast; the whole sweep is
    /// retried from the start.
    #[error("{failed} of {total} sweep transactions failed")]
    BatchIncomplete {
        /// Number of failed transactions
        failed: usize,
        /// Batch size
        total: usize,
        /// First per-transaction failure
        #[source]
        source: Box<Error>,
    },
    /// State transition Error
    #[error(transparent)]
    State(#[from] super::state::Error),
    /// Sweep data model Error
    #[error(transparent)]
    Sweep(#[from] csk_common::sweep::Error),
    /// Status store Error
    #[error(transparent)]
    Store(#[from] csk_common::store::Error),
}
