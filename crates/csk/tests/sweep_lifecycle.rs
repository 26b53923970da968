//! Sweep lifecycle integration tests
//!
//! Drive [`SweepService`] end to end against the fake collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use csk::signer::FeePriority;
use csk::sweep::state::SweepState;
use csk::{
    AccountId, Amount, Environment, Psbt, SignaturePlan, SweepContext, SweepMode, SweepService,
};
use csk_fake_signers::{
    fake_psbt, fake_sweep, fake_sweep_psbt, fake_txid, FakeAppSigner, FakeBroadcaster,
    FakeCoSigner, FakeSweepPreparer, MemoryStatusStore, PrepareResponse,
};

const APP_ONLY: SignaturePlan = SignaturePlan {
    requires_app_signature: true,
    requires_server_signature: false,
};

const APP_AND_SERVER: SignaturePlan = SignaturePlan {
    requires_app_signature: true,
    requires_server_signature: true,
};

const FULLY_SIGNED: SignaturePlan = SignaturePlan {
    requires_app_signature: false,
    requires_server_signature: false,
};

struct Harness {
    service: SweepService,
    preparer: Arc<FakeSweepPreparer>,
    app_signer: Arc<FakeAppSigner>,
    co_signer: Arc<FakeCoSigner>,
    broadcaster: Arc<FakeBroadcaster>,
    store: Arc<MemoryStatusStore>,
    context: SweepContext,
}

fn harness(mode: SweepMode, responses: Vec<PrepareResponse>) -> Harness {
    let context = SweepContext {
        environment: Environment::Development,
        account_id: AccountId::new(),
        mode,
    };

    let preparer = Arc::new(FakeSweepPreparer::new(responses));
    let app_signer = Arc::new(FakeAppSigner::new());
    let co_signer = Arc::new(FakeCoSigner::new());
    let broadcaster = Arc::new(FakeBroadcaster::new());
    let store = Arc::new(MemoryStatusStore::new());

    let service = SweepService::new(
        context.clone(),
        preparer.clone(),
        app_signer.clone(),
        co_signer.clone(),
        broadcaster.clone(),
        store.clone(),
    );

    Harness {
        service,
        preparer,
        app_signer,
        co_signer,
        broadcaster,
        store,
        context,
    }
}

/// The §-defining end-to-end path: one app-only transaction, no hardware
/// signing, success surfaces the original totals and marks the sweep
/// handled exactly once.
#[tokio::test]
async fn test_sweep_success_without_hardware_signing() {
    let sweep = fake_sweep(vec![fake_sweep_psbt(1, APP_ONLY)], &[]);
    let h = harness(
        SweepMode::Recovery,
        vec![PrepareResponse::Sweep(sweep.clone())],
    );

    let state = h.service.generate().await.unwrap();
    assert!(matches!(state, SweepState::PsbtsGenerated { .. }));

    // No hardware-sign transactions: confirmation goes straight to the
    // pipeline, never through the hardware-wait state.
    let state = h.service.confirm_and_start().await.unwrap();
    let success = match state {
        SweepState::SweepSuccess { sweep } => sweep,
        other => panic!("expected SweepSuccess, got {}", other.name()),
    };

    assert_eq!(success.total_fee_amount(), Amount::from(600));
    assert_eq!(success.total_transfer_amount(), Amount::from(40000));
    assert_eq!(success.destination_address(), sweep.destination_address());

    let broadcasts = h.broadcaster.broadcasts().await;
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].0.base64, "psbt-1+app");
    assert_eq!(broadcasts[0].1, FeePriority::Sweep);

    assert_eq!(h.store.mark_calls(), 1);
    assert!(h.store.is_handled(h.context.account_id).await);
}

#[tokio::test]
async fn test_hardware_path_merges_signatures_before_pipeline() {
    let sweep = fake_sweep(
        vec![
            fake_sweep_psbt(1, APP_ONLY),
            fake_sweep_psbt(2, APP_AND_SERVER),
        ],
        &[fake_txid(2)],
    );
    let h = harness(SweepMode::Recovery, vec![PrepareResponse::Sweep(sweep)]);

    h.service.generate().await.unwrap();
    let state = h.service.confirm_and_start().await.unwrap();
    assert!(matches!(
        state,
        SweepState::AwaitingHardwareSignedSweeps { .. }
    ));

    // Hand back the hardware-signed payload for tx 2 plus a stray entry
    // that matches nothing; the stray is dead data and ignored.
    let hw_signed = vec![
        Psbt {
            txid: fake_txid(2),
            base64: "psbt-2+hw".to_string(),
        },
        fake_psbt(9),
    ];
    let state = h
        .service
        .supplied_hardware_signatures(hw_signed)
        .await
        .unwrap();
    assert!(matches!(state, SweepState::SweepSuccess { .. }));

    let broadcasts = h.broadcaster.broadcasts().await;
    assert_eq!(broadcasts.len(), 2);
    assert_eq!(broadcasts[0].0.base64, "psbt-1+app");
    // The merged hardware payload went through the remaining signers.
    assert_eq!(broadcasts[1].0.base64, "psbt-2+hw+app+server");
}

#[tokio::test]
async fn test_signing_order_is_app_then_server_then_broadcast() {
    let sweep = fake_sweep(vec![fake_sweep_psbt(1, APP_AND_SERVER)], &[]);
    let h = harness(SweepMode::Recovery, vec![PrepareResponse::Sweep(sweep)]);

    h.service.generate().await.unwrap();
    h.service.confirm_and_start().await.unwrap();

    // The co-signer saw the app signature already applied.
    let requests = h.co_signer.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].psbt.base64, "psbt-1+app");
    assert_eq!(requests[0].environment, Environment::Development);
    assert_eq!(requests[0].account_id, h.context.account_id);
    assert_eq!(
        requests[0].server_keyset_id,
        fake_sweep_psbt(1, APP_AND_SERVER).source_keyset.server_keyset_id
    );

    let broadcasts = h.broadcaster.broadcasts().await;
    assert_eq!(broadcasts[0].0.base64, "psbt-1+app+server");
}

#[tokio::test]
async fn test_fully_signed_plan_skips_both_signers() {
    let sweep = fake_sweep(vec![fake_sweep_psbt(1, FULLY_SIGNED)], &[]);
    let h = harness(SweepMode::Recovery, vec![PrepareResponse::Sweep(sweep)]);

    h.service.generate().await.unwrap();
    let state = h.service.confirm_and_start().await.unwrap();
    assert!(matches!(state, SweepState::SweepSuccess { .. }));

    assert!(h.app_signer.signed().await.is_empty());
    assert!(h.co_signer.requests().await.is_empty());
    assert_eq!(h.broadcaster.broadcast_count(fake_txid(1)).await, 1);
}

/// Batch failure: the first transaction goes through and stays broadcast,
/// the second fails at the co-signer. The batch reports failure and the
/// handled marker is not written.
#[tokio::test]
async fn test_batch_failure_keeps_earlier_broadcasts_and_skips_marker() {
    let sweep = fake_sweep(
        vec![
            fake_sweep_psbt(1, APP_AND_SERVER),
            fake_sweep_psbt(2, APP_AND_SERVER),
        ],
        &[],
    );
    let h = harness(SweepMode::Recovery, vec![PrepareResponse::Sweep(sweep)]);
    h.co_signer.fail_for(fake_txid(2)).await;

    h.service.generate().await.unwrap();
    let state = h.service.confirm_and_start().await.unwrap();
    assert!(matches!(state, SweepState::SweepFailed { .. }));

    assert_eq!(h.broadcaster.broadcast_count(fake_txid(1)).await, 1);
    assert_eq!(h.broadcaster.broadcast_count(fake_txid(2)).await, 0);
    assert_eq!(h.store.mark_calls(), 0);
    assert!(!h.store.is_handled(h.context.account_id).await);
}

/// The batch processes every transaction: a failure on the first one does
/// not stop the second from being signed and broadcast.
#[tokio::test]
async fn test_batch_processes_remaining_transactions_after_failure() {
    let sweep = fake_sweep(
        vec![fake_sweep_psbt(1, APP_ONLY), fake_sweep_psbt(2, APP_ONLY)],
        &[],
    );
    let h = harness(SweepMode::Recovery, vec![PrepareResponse::Sweep(sweep)]);
    h.app_signer.fail_for(fake_txid(1)).await;

    h.service.generate().await.unwrap();
    let state = h.service.confirm_and_start().await.unwrap();

    let error = match state {
        SweepState::SweepFailed { error } => error,
        other => panic!("expected SweepFailed, got {}", other.name()),
    };
    assert!(error.to_string().contains("1 of 2"));

    assert_eq!(h.broadcaster.broadcast_count(fake_txid(1)).await, 0);
    assert_eq!(h.broadcaster.broadcast_count(fake_txid(2)).await, 1);
}

#[tokio::test]
async fn test_cancelling_hardware_signing_returns_to_confirmation() {
    let sweep = fake_sweep(vec![fake_sweep_psbt(1, APP_ONLY)], &[fake_txid(1)]);
    let h = harness(
        SweepMode::Recovery,
        vec![PrepareResponse::Sweep(sweep.clone())],
    );

    h.service.generate().await.unwrap();
    h.service.confirm_and_start().await.unwrap();

    let state = h.service.cancel_hardware_signing().await.unwrap();
    let returned = match state {
        SweepState::PsbtsGenerated { sweep } => sweep,
        other => panic!("expected PsbtsGenerated, got {}", other.name()),
    };

    // The original sweep, unchanged, and no signer was ever called.
    assert_eq!(returned, sweep);
    assert!(h.app_signer.signed().await.is_empty());
    assert!(h.co_signer.requests().await.is_empty());
    assert!(h.broadcaster.broadcasts().await.is_empty());
    assert_eq!(h.store.mark_calls(), 0);
}

#[tokio::test]
async fn test_retry_after_preparation_failure_requests_fresh_sweep() {
    let sweep = fake_sweep(vec![fake_sweep_psbt(1, APP_ONLY)], &[]);
    let h = harness(
        SweepMode::Recovery,
        vec![
            PrepareResponse::Fail("wallet scan timed out".to_string()),
            PrepareResponse::Sweep(sweep),
        ],
    );

    let state = h.service.generate().await.unwrap();
    assert!(matches!(state, SweepState::GeneratePsbtsFailed { .. }));

    let state = h.service.retry().await.unwrap();
    assert!(matches!(state, SweepState::PsbtsGenerated { .. }));
    assert_eq!(h.preparer.prepare_calls(), 2);
}

#[tokio::test]
async fn test_retry_after_sweep_failure_regenerates_instead_of_replaying() {
    let first = fake_sweep(vec![fake_sweep_psbt(1, APP_ONLY)], &[]);
    let second = fake_sweep(vec![fake_sweep_psbt(3, APP_ONLY)], &[]);
    let h = harness(
        SweepMode::Recovery,
        vec![
            PrepareResponse::Sweep(first),
            PrepareResponse::Sweep(second),
        ],
    );
    h.broadcaster.fail_for(fake_txid(1)).await;

    h.service.generate().await.unwrap();
    let state = h.service.confirm_and_start().await.unwrap();
    assert!(matches!(state, SweepState::SweepFailed { .. }));

    let state = h.service.retry().await.unwrap();
    let sweep = match state {
        SweepState::PsbtsGenerated { sweep } => sweep,
        other => panic!("expected PsbtsGenerated, got {}", other.name()),
    };

    assert_eq!(h.preparer.prepare_calls(), 2);
    assert_eq!(sweep.unsigned_psbts()[0].txid(), fake_txid(3));
}

#[tokio::test]
async fn test_null_sweep_with_prior_attempt_is_idempotent_success() {
    let h = harness(SweepMode::Recovery, vec![PrepareResponse::Nothing]);
    h.store.set_attempted(h.context.account_id).await;

    let state = h.service.generate().await.unwrap();
    assert!(matches!(state, SweepState::SweepSuccessNoData));
    assert!(h.store.is_handled(h.context.account_id).await);
}

#[tokio::test]
async fn test_null_sweep_without_prior_attempt_surfaces_no_funds() {
    let h = harness(SweepMode::Recovery, vec![PrepareResponse::Nothing]);

    let state = h.service.generate().await.unwrap();
    assert!(matches!(state, SweepState::NoFundsFound));
    assert!(h.store.is_handled(h.context.account_id).await);
}

#[tokio::test]
async fn test_null_sweep_in_migration_invokes_callback_without_visible_state() {
    let mut h = harness(SweepMode::Migration, vec![PrepareResponse::Nothing]);

    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();
    h.service
        .set_migration_complete_callback(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

    let state = h.service.generate().await.unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    // No no-funds or success-no-data state is ever published; the caller
    // navigates away on the callback.
    assert!(matches!(state, SweepState::GeneratingPsbts));
    assert!(h.store.is_handled(h.context.account_id).await);
}

#[tokio::test]
async fn test_actions_rejected_outside_their_state() {
    let sweep = fake_sweep(vec![fake_sweep_psbt(1, APP_ONLY)], &[]);
    let h = harness(SweepMode::Recovery, vec![PrepareResponse::Sweep(sweep)]);

    // Nothing prepared yet.
    assert!(h.service.confirm_and_start().await.is_err());
    assert!(h.service.cancel_hardware_signing().await.is_err());
    assert!(h.service.retry().await.is_err());
    assert!(h
        .service
        .supplied_hardware_signatures(vec![fake_psbt(1)])
        .await
        .is_err());

    h.service.generate().await.unwrap();

    // A second generation on the same attempt is rejected too.
    assert!(h.service.generate().await.is_err());
}

#[tokio::test]
async fn test_state_watch_reflects_transitions() {
    let sweep = fake_sweep(vec![fake_sweep_psbt(1, APP_ONLY)], &[]);
    let h = harness(SweepMode::Recovery, vec![PrepareResponse::Sweep(sweep)]);

    let rx = h.service.subscribe();
    assert!(matches!(*rx.borrow(), SweepState::GeneratingPsbts));

    h.service.generate().await.unwrap();
    assert!(matches!(*rx.borrow(), SweepState::PsbtsGenerated { .. }));

    h.service.confirm_and_start().await.unwrap();
    assert!(matches!(*rx.borrow(), SweepState::SweepSuccess { .. }));
}
