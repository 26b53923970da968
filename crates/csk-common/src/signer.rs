//! Collaborator interfaces
//!
//! The sweep orchestrator coordinates three independently failing signing
//! capabilities and a broadcaster. Each is consumed behind a trait here so
//! the orchestrator never sees transports, key material or UTXO scanning:
//! concrete implementations live with the wallet, the server client and the
//! network layer. The hardware signer has no trait; it signs out of process
//! and its results are handed to the orchestrator as ready-made [`Psbt`]s.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{AccountId, Environment, SweepContext};
use crate::sweep::{KeysetId, Psbt, SourceKeyset, Sweep};

/// Collaborator Error
#[derive(Debug, Error)]
pub enum Error {
    /// No spending wallet exists for the keyset
    #[error("No spending wallet for keyset `{0}`")]
    UnknownKeyset(KeysetId),
    /// Transaction rejected by the network
    #[error("Transaction `{0}` rejected by the network: {1}")]
    BroadcastRejected(Txid, String),
    /// Failure inside the collaborator's backend
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
    /// Custom
    #[error("`{0}`")]
    Custom(String),
}

/// Priority class a transaction is broadcast with
///
/// Sweeps are not time-sensitive but should not risk indefinite
/// non-confirmation, so they carry their own class distinct from ordinary
/// sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeePriority {
    /// Ordinary user-initiated send
    Regular,
    /// Recovery sweep
    Sweep,
}

/// Acknowledgement that the network accepted a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReceipt {
    /// Id of the accepted transaction
    pub txid: Txid,
}

/// Prepares a sweep for the current wallet
///
/// Scans prior key configurations for remaining funds and builds the
/// candidate transactions. Deciding which UTXOs to move and what the fee
/// plan looks like happens entirely behind this interface.
#[async_trait]
pub trait SweepPreparer: Debug {
    /// Prepare a sweep for the wallet identified by `context`.
    ///
    /// Returns `None` when there is nothing to sweep.
    async fn prepare_sweep(&self, context: &SweepContext) -> Result<Option<Sweep>, Error>;
}

/// Resolves the wallet able to spend from a historical keyset
#[async_trait]
pub trait SpendingWalletResolver: Debug {
    /// Spending wallet for `keyset`
    async fn spending_wallet(
        &self,
        keyset: &SourceKeyset,
    ) -> Result<Arc<dyn SpendingWallet + Send + Sync>, Error>;
}

/// Application-key signing capability of a spending wallet
#[async_trait]
pub trait SpendingWallet: Debug {
    /// Sign `psbt` with the application key and return the updated psbt
    async fn sign_psbt(&self, psbt: &Psbt) -> Result<Psbt, Error>;
}

/// Server-side co-signing service
#[async_trait]
pub trait CoSigner: Debug {
    /// Request a server co-signature over `psbt`.
    ///
    /// The service may validate signatures already present, so the app
    /// signature must be applied before calling this.
    async fn sign_with_keyset(
        &self,
        environment: Environment,
        account_id: &AccountId,
        server_keyset_id: &KeysetId,
        psbt: &Psbt,
    ) -> Result<Psbt, Error>;
}

/// Submits fully signed transactions to the bitcoin network
///
/// Re-broadcasting a transaction that is already in the mempool or
/// confirmed is expected to be a harmless duplicate, which is what makes
/// failed sweep batches safe to retry from the start.
#[async_trait]
pub trait TransactionBroadcaster: Debug {
    /// Broadcast `psbt` with the given priority class
    async fn broadcast(
        &self,
        psbt: &Psbt,
        priority: FeePriority,
    ) -> Result<BroadcastReceipt, Error>;
}
