//! Signing and broadcast pipeline
//!
//! Applies the required signatures to each transaction of a batch and
//! broadcasts the result. Per transaction the order is fixed: app signature
//! first (the server validates it), then the server co-signature, then the
//! broadcast. The batch processes every transaction even after a failure;
//! broadcasts cannot be rolled back, so stopping early would neither undo
//! anything nor move more funds. A failed batch is reported as a whole and
//! retried from the start.

use std::sync::Arc;

use csk_common::signer::{BroadcastReceipt, FeePriority};
use csk_common::{Sweep, SweepPsbt};
use tracing::instrument;

use super::error::Error;
use super::state::SweepState;
use super::SweepService;

impl SweepService {
    /// Run the pipeline over `psbts` and resolve the attempt.
    ///
    /// The sweep-handled marker is only written after the full batch
    /// succeeded; a failed batch leaves the attempt eligible for a fresh
    /// retry that safely re-broadcasts anything already on the network.
    pub(crate) async fn run_pipeline(
        &self,
        psbts: Vec<SweepPsbt>,
        sweep: Sweep,
    ) -> Result<SweepState, Error> {
        match self.sign_and_broadcast_all(&psbts).await {
            Ok(receipts) => {
                tracing::info!(broadcast = receipts.len(), "sweep batch complete");

                if let Err(err) = self
                    .status_store
                    .mark_sweep_handled(&self.context().account_id)
                    .await
                {
                    // The funds moved; a missing marker only costs a
                    // harmless re-prompt in a later session.
                    tracing::error!("failed to persist sweep-handled marker: {err}");
                }

                self.transition(SweepState::SweepSuccess { sweep })?;
            }
            Err(error) => {
                let error = Arc::new(error);
                tracing::warn!(%error, "sweep batch failed");
                self.transition(SweepState::SweepFailed { error })?;
            }
        }

        Ok(self.current_state())
    }

    /// Sign and broadcast every transaction in the batch, reporting failure
    /// if any of them failed
    async fn sign_and_broadcast_all(
        &self,
        psbts: &[SweepPsbt],
    ) -> Result<Vec<BroadcastReceipt>, Error> {
        let total = psbts.len();
        let mut receipts = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for sweep_psbt in psbts {
            match self.sign_and_broadcast(sweep_psbt).await {
                Ok(receipt) => receipts.push(receipt),
                Err(error) => {
                    tracing::warn!(txid = %sweep_psbt.txid(), %error, "sweep transaction failed");
                    failures.push(error);
                }
            }
        }

        let failed = failures.len();
        match failures.into_iter().next() {
            None => Ok(receipts),
            Some(first) => Err(Error::BatchIncomplete {
                failed,
                total,
                source: Box::new(first),
            }),
        }
    }

    /// Apply the transaction's signature plan and broadcast the result
    #[instrument(skip(self, sweep_psbt), fields(txid = %sweep_psbt.txid()))]
    async fn sign_and_broadcast(&self, sweep_psbt: &SweepPsbt) -> Result<BroadcastReceipt, Error> {
        let txid = sweep_psbt.txid();
        let mut psbt = sweep_psbt.psbt.clone();

        if sweep_psbt.signature_plan.requires_app_signature {
            let wallet = self
                .wallets
                .spending_wallet(&sweep_psbt.source_keyset)
                .await
                .map_err(|source| Error::AppSignature { txid, source })?;

            psbt = wallet
                .sign_psbt(&psbt)
                .await
                .map_err(|source| Error::AppSignature { txid, source })?;
            tracing::debug!("applied app signature");
        }

        if sweep_psbt.signature_plan.requires_server_signature {
            psbt = self
                .co_signer
                .sign_with_keyset(
                    self.context().environment,
                    &self.context().account_id,
                    &sweep_psbt.source_keyset.server_keyset_id,
                    &psbt,
                )
                .await
                .map_err(|source| Error::ServerSignature { txid, source })?;
            tracing::debug!("applied server co-signature");
        }

        let receipt = self
            .broadcaster
            .broadcast(&psbt, FeePriority::Sweep)
            .await
            .map_err(|source| Error::Broadcast { txid, source })?;
        tracing::info!("sweep transaction broadcast");

        Ok(receipt)
    }
}
