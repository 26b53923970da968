//! CSK Fake Signers
//!
//! In-memory implementations of every collaborator trait, used for testing
//! the sweep orchestrator. Each fake records the calls it receives and can
//! be scripted to fail, per transaction where that makes sense, so tests
//! can drive every failure path of the lifecycle without any real wallet,
//! server or network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::Txid;
use csk_common::signer::{
    BroadcastReceipt, CoSigner, Error, FeePriority, SpendingWallet, SpendingWalletResolver,
    SweepPreparer, TransactionBroadcaster,
};
use csk_common::store::{self, SweepStatusStore};
use csk_common::{
    AccountId, Amount, Environment, KeysetId, Psbt, SignaturePlan, SourceKeyset, Sweep,
    SweepContext, SweepPsbt,
};
use tokio::sync::RwLock;

/// Scripted outcome of one `prepare_sweep` call
#[derive(Debug, Clone)]
pub enum PrepareResponse {
    /// A prepared sweep
    Sweep(Sweep),
    /// Nothing to sweep
    Nothing,
    /// Preparation failure with the given message
    Fail(String),
}

/// Fake sweep preparer returning scripted responses in order
///
/// Responses are consumed front to back; once the script is exhausted every
/// further call reports nothing to sweep. The call counter lets tests
/// assert that a retry issued a fresh preparation.
#[derive(Debug, Default)]
pub struct FakeSweepPreparer {
    responses: RwLock<VecDeque<PrepareResponse>>,
    calls: AtomicUsize,
}

impl FakeSweepPreparer {
    /// Preparer scripted with `responses`
    pub fn new(responses: Vec<PrepareResponse>) -> Self {
        Self {
            responses: RwLock::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Preparer that always returns clones of one sweep
    pub fn with_sweep(sweep: Sweep) -> Self {
        Self::new(vec![PrepareResponse::Sweep(sweep)])
    }

    /// Number of `prepare_sweep` calls received so far
    pub fn prepare_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SweepPreparer for FakeSweepPreparer {
    async fn prepare_sweep(&self, _context: &SweepContext) -> Result<Option<Sweep>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.responses.write().await.pop_front() {
            Some(PrepareResponse::Sweep(sweep)) => Ok(Some(sweep)),
            Some(PrepareResponse::Fail(msg)) => Err(Error::Custom(msg)),
            Some(PrepareResponse::Nothing) | None => Ok(None),
        }
    }
}

#[derive(Debug, Default)]
struct AppSignerState {
    fail_txids: HashSet<Txid>,
    unknown_keysets: HashSet<KeysetId>,
    signed: Vec<Txid>,
}

/// Fake app signer covering both the wallet resolver and the spending
/// wallets it hands out
///
/// Signing stamps `+app` onto the psbt payload so tests can assert signer
/// ordering from the payload a later stage received.
#[derive(Debug, Clone, Default)]
pub struct FakeAppSigner {
    state: Arc<RwLock<AppSignerState>>,
}

impl FakeAppSigner {
    /// Fake app signer that signs everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Make signing fail for `txid`
    pub async fn fail_for(&self, txid: Txid) {
        self.state.write().await.fail_txids.insert(txid);
    }

    /// Make wallet resolution fail for `keyset_id`
    pub async fn forget_keyset(&self, keyset_id: KeysetId) {
        self.state.write().await.unknown_keysets.insert(keyset_id);
    }

    /// Txids signed so far, in call order
    pub async fn signed(&self) -> Vec<Txid> {
        self.state.read().await.signed.clone()
    }
}

#[async_trait]
impl SpendingWalletResolver for FakeAppSigner {
    async fn spending_wallet(
        &self,
        keyset: &SourceKeyset,
    ) -> Result<Arc<dyn SpendingWallet + Send + Sync>, Error> {
        let state = self.state.read().await;
        if state.unknown_keysets.contains(&keyset.keyset_id) {
            return Err(Error::UnknownKeyset(keyset.keyset_id.clone()));
        }

        Ok(Arc::new(FakeSpendingWallet {
            state: self.state.clone(),
        }))
    }
}

/// Spending wallet handed out by [`FakeAppSigner`]
#[derive(Debug)]
pub struct FakeSpendingWallet {
    state: Arc<RwLock<AppSignerState>>,
}

#[async_trait]
impl SpendingWallet for FakeSpendingWallet {
    async fn sign_psbt(&self, psbt: &Psbt) -> Result<Psbt, Error> {
        let mut state = self.state.write().await;
        if state.fail_txids.contains(&psbt.txid) {
            return Err(Error::Custom("app signer unavailable".to_string()));
        }

        state.signed.push(psbt.txid);
        Ok(Psbt {
            txid: psbt.txid,
            base64: format!("{}+app", psbt.base64),
        })
    }
}

/// One recorded co-signing request
#[derive(Debug, Clone)]
pub struct CoSignRequest {
    /// Environment the request was made in
    pub environment: Environment,
    /// Requesting account
    pub account_id: AccountId,
    /// Server-side keyset the signature was requested under
    pub server_keyset_id: KeysetId,
    /// The psbt as received, before the co-signature
    pub psbt: Psbt,
}

/// Fake server co-signer
///
/// Stamps `+server` onto the payload and records every request, including
/// the psbt as received so tests can check the app signature was already
/// applied.
#[derive(Debug, Default)]
pub struct FakeCoSigner {
    fail_txids: RwLock<HashSet<Txid>>,
    requests: RwLock<Vec<CoSignRequest>>,
}

impl FakeCoSigner {
    /// Fake co-signer that signs everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Make co-signing fail for `txid`
    pub async fn fail_for(&self, txid: Txid) {
        self.fail_txids.write().await.insert(txid);
    }

    /// Requests received so far, in call order
    pub async fn requests(&self) -> Vec<CoSignRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl CoSigner for FakeCoSigner {
    async fn sign_with_keyset(
        &self,
        environment: Environment,
        account_id: &AccountId,
        server_keyset_id: &KeysetId,
        psbt: &Psbt,
    ) -> Result<Psbt, Error> {
        self.requests.write().await.push(CoSignRequest {
            environment,
            account_id: *account_id,
            server_keyset_id: server_keyset_id.clone(),
            psbt: psbt.clone(),
        });

        if self.fail_txids.read().await.contains(&psbt.txid) {
            return Err(Error::Custom("co-signing service rejected psbt".to_string()));
        }

        Ok(Psbt {
            txid: psbt.txid,
            base64: format!("{}+server", psbt.base64),
        })
    }
}

/// Fake network broadcaster recording every broadcast
#[derive(Debug, Default)]
pub struct FakeBroadcaster {
    fail_txids: RwLock<HashSet<Txid>>,
    broadcasts: RwLock<Vec<(Psbt, FeePriority)>>,
}

impl FakeBroadcaster {
    /// Fake broadcaster that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Make broadcasting fail for `txid`
    pub async fn fail_for(&self, txid: Txid) {
        self.fail_txids.write().await.insert(txid);
    }

    /// Every broadcast received so far, in call order
    pub async fn broadcasts(&self) -> Vec<(Psbt, FeePriority)> {
        self.broadcasts.read().await.clone()
    }

    /// How many times `txid` was broadcast
    pub async fn broadcast_count(&self, txid: Txid) -> usize {
        self.broadcasts
            .read()
            .await
            .iter()
            .filter(|(psbt, _)| psbt.txid == txid)
            .count()
    }
}

#[async_trait]
impl TransactionBroadcaster for FakeBroadcaster {
    async fn broadcast(
        &self,
        psbt: &Psbt,
        priority: FeePriority,
    ) -> Result<BroadcastReceipt, Error> {
        self.broadcasts
            .write()
            .await
            .push((psbt.clone(), priority));

        if self.fail_txids.read().await.contains(&psbt.txid) {
            return Err(Error::BroadcastRejected(
                psbt.txid,
                "rejected by network".to_string(),
            ));
        }

        Ok(BroadcastReceipt { txid: psbt.txid })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct AccountStatus {
    attempted: bool,
    handled: bool,
}

/// In-memory sweep status store
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    accounts: RwLock<HashMap<AccountId, AccountStatus>>,
    mark_calls: AtomicUsize,
}

impl MemoryStatusStore {
    /// Empty store: no account has attempted or handled a sweep
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `account_id` already attempted a sweep in an earlier
    /// session
    pub async fn set_attempted(&self, account_id: AccountId) {
        self.accounts
            .write()
            .await
            .entry(account_id)
            .or_default()
            .attempted = true;
    }

    /// Whether the handled marker is set for `account_id`
    pub async fn is_handled(&self, account_id: AccountId) -> bool {
        self.accounts
            .read()
            .await
            .get(&account_id)
            .map(|status| status.handled)
            .unwrap_or(false)
    }

    /// Number of `mark_sweep_handled` calls received so far
    pub fn mark_calls(&self) -> usize {
        self.mark_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SweepStatusStore for MemoryStatusStore {
    async fn has_attempted_sweep(&self, account_id: &AccountId) -> Result<bool, store::Error> {
        Ok(self
            .accounts
            .read()
            .await
            .get(account_id)
            .map(|status| status.attempted)
            .unwrap_or(false))
    }

    async fn mark_sweep_handled(&self, account_id: &AccountId) -> Result<(), store::Error> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        self.accounts
            .write()
            .await
            .entry(*account_id)
            .or_default()
            .handled = true;
        Ok(())
    }
}

/// Deterministic txid for test fixtures
pub fn fake_txid(n: u8) -> Txid {
    Txid::from_byte_array([n; 32])
}

/// Unsigned psbt fixture with a deterministic txid
pub fn fake_psbt(n: u8) -> Psbt {
    Psbt {
        txid: fake_txid(n),
        base64: format!("psbt-{n}"),
    }
}

/// Sweep transaction fixture over [`fake_psbt`]
pub fn fake_sweep_psbt(n: u8, plan: SignaturePlan) -> SweepPsbt {
    SweepPsbt {
        psbt: fake_psbt(n),
        source_keyset: SourceKeyset {
            keyset_id: KeysetId::new(format!("keyset-{n}")),
            server_keyset_id: KeysetId::new(format!("server-keyset-{n}")),
        },
        signature_plan: plan,
    }
}

/// Sweep fixture over the given transactions
///
/// `hw_sign` selects by txid which of `psbts` also need the hardware
/// signer.
pub fn fake_sweep(psbts: Vec<SweepPsbt>, hw_sign: &[Txid]) -> Sweep {
    let hw_psbts = psbts
        .iter()
        .filter(|psbt| hw_sign.contains(&psbt.txid()))
        .cloned()
        .collect();

    Sweep::new(
        psbts,
        hw_psbts,
        Amount::from(600),
        Amount::from(40000),
        "bc1qsweepdestination".to_string(),
    )
    .expect("valid sweep fixture")
}
