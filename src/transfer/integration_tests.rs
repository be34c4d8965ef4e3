//! Integration Tests for Volume Transfer
//!
//! Full create/accept/delete flows over the in-memory store, the in-memory
//! quota ledger and a recording notification sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::context::RequestContext;
use crate::memory::MemoryStore;
use crate::notify::RecordingSink;
use crate::quota::{
    GIGABYTES, InMemoryQuotaLedger, QuotaDeltas, QuotaError, QuotaLedger, QuotaLimits, QuotaUsage,
    Reservation, VOLUMES,
};
use crate::transfer::{AuthKeyHasher, TransferError, TransferManager, TransferStore};
use crate::volume::{VolumeRecord, VolumeStatus, VolumeStore, VolumeType};

const PROJECT_A: &str = "project_id";
const PROJECT_B: &str = "new_project_id";

/// Quota ledger that can park the next `reserve` call, so a test can
/// interleave another operation at a known point of an accept
#[derive(Default)]
struct ReserveGate {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl ReserveGate {
    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

struct GatedLedger {
    inner: Arc<InMemoryQuotaLedger>,
    gate: Arc<ReserveGate>,
}

#[async_trait]
impl QuotaLedger for GatedLedger {
    async fn reserve(
        &self,
        project_id: &str,
        deltas: &QuotaDeltas,
    ) -> Result<Reservation, QuotaError> {
        if self.gate.armed.swap(false, Ordering::SeqCst) {
            self.gate.entered.notify_one();
            self.gate.release.notified().await;
        }
        self.inner.reserve(project_id, deltas).await
    }

    async fn commit(&self, reservation: &Reservation) -> Result<(), QuotaError> {
        self.inner.commit(reservation).await
    }

    async fn rollback(&self, reservation: &Reservation) -> Result<(), QuotaError> {
        self.inner.rollback(reservation).await
    }

    async fn usage(&self, project_id: &str, resource: &str) -> Result<QuotaUsage, QuotaError> {
        self.inner.usage(project_id, resource).await
    }

    async fn expire(&self, now: DateTime<Utc>) -> Result<usize, QuotaError> {
        self.inner.expire(now).await
    }
}

struct TestHarness {
    manager: Arc<TransferManager>,
    store: Arc<MemoryStore>,
    quotas: Arc<InMemoryQuotaLedger>,
    gate: Arc<ReserveGate>,
    sink: Arc<RecordingSink>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_limits(QuotaLimits::default())
    }

    fn with_limits(limits: QuotaLimits) -> Self {
        let store = Arc::new(MemoryStore::new());
        let quotas = Arc::new(InMemoryQuotaLedger::new(limits));
        let gate = Arc::new(ReserveGate::default());
        let sink = Arc::new(RecordingSink::new());
        let manager = TransferManager::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(GatedLedger {
                inner: quotas.clone(),
                gate: gate.clone(),
            }),
            sink.clone(),
            AuthKeyHasher::new(16, 1024, 1).unwrap(),
        );
        Self {
            manager: Arc::new(manager),
            store,
            quotas,
            gate,
            sink,
        }
    }

    fn owner(&self) -> RequestContext {
        RequestContext::new("user_id", PROJECT_A)
    }

    fn recipient(&self) -> RequestContext {
        RequestContext::new("new_user_id", PROJECT_B)
    }

    /// Volume owned by project A with its quota already charged
    async fn volume(&self, size: i64, type_name: Option<&str>) -> VolumeRecord {
        let mut volume = VolumeRecord::new(PROJECT_A, "user_id", size);
        if let Some(name) = type_name {
            let type_id = format!("type-{}", name);
            self.store
                .add_volume_type(VolumeType {
                    id: type_id.clone(),
                    name: name.to_string(),
                    extra_specs: Default::default(),
                })
                .unwrap();
            volume = volume.with_volume_type(type_id);
        }
        VolumeStore::create(self.store.as_ref(), &volume).await.unwrap();

        let charge = self
            .quotas
            .reserve(PROJECT_A, &QuotaDeltas::for_volume(size, type_name))
            .await
            .unwrap();
        self.quotas.commit(&charge).await.unwrap();
        volume
    }

    async fn stored(&self, volume: &VolumeRecord) -> VolumeRecord {
        VolumeStore::get(self.store.as_ref(), volume.id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn in_use(&self, project: &str, resource: &str) -> i64 {
        self.quotas.usage(project, resource).await.unwrap().in_use
    }
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_then_get() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;

    let transfer = h
        .manager
        .create(&h.owner(), volume.id, Some("Description"))
        .await
        .unwrap();
    assert_eq!(transfer.volume_id, volume.id);
    assert_eq!(transfer.display_name.as_deref(), Some("Description"));

    let info = h.manager.get(&h.owner(), transfer.id).await.unwrap();
    assert_eq!(info.volume_id, volume.id);
    assert_eq!(h.stored(&volume).await.status, VolumeStatus::AwaitingTransfer);
}

#[tokio::test]
async fn test_create_rejects_non_available() {
    let h = TestHarness::new();
    for status in [
        VolumeStatus::InUse,
        VolumeStatus::AwaitingTransfer,
        VolumeStatus::Error,
        VolumeStatus::Deleting,
        VolumeStatus::Other("wrong".into()),
    ] {
        let volume = VolumeRecord::new(PROJECT_A, "user_id", 1).with_status(status.clone());
        VolumeStore::create(h.store.as_ref(), &volume).await.unwrap();

        let err = h.manager.create(&h.owner(), volume.id, None).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidVolume(_)), "status {}", status);
        assert_eq!(h.stored(&volume).await.status, status);
    }
    assert_eq!(h.store.transfer_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_single_winner() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;

    let volume_id = volume.id;
    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = h.manager.clone();
        let ctx = h.owner();
        handles.push(tokio::spawn(async move {
            manager.create(&ctx, volume_id, None).await
        }));
    }

    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(e) => assert!(matches!(e, TransferError::InvalidVolume(_))),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(h.store.transfer_count(), 1);
    // Losers of the status race emit nothing
    assert_eq!(
        h.sink.event_types(),
        vec!["transfer.create.start", "transfer.create.end"]
    );
}

#[tokio::test]
async fn test_create_and_delete_notifications() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;

    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();
    h.manager.delete(&h.owner(), transfer.id).await.unwrap();

    assert_eq!(
        h.sink.event_types(),
        vec![
            "transfer.create.start",
            "transfer.create.end",
            "transfer.delete.start",
            "transfer.delete.end",
        ]
    );
    assert_eq!(h.stored(&volume).await.status, VolumeStatus::Available);
    let err = h.manager.get(&h.owner(), transfer.id).await.unwrap_err();
    assert!(matches!(err, TransferError::TransferNotFound(_)));
}

// ============================================================================
// Accept
// ============================================================================

#[tokio::test]
async fn test_accept_moves_volume() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;

    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();
    let accepted = h
        .manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap();
    assert_eq!(accepted.id, transfer.id);
    assert_eq!(accepted.volume_id, volume.id);

    let moved = h.stored(&volume).await;
    assert_eq!(moved.project_id, PROJECT_B);
    assert_eq!(moved.user_id, "new_user_id");
    assert_eq!(moved.status, VolumeStatus::Available);

    let err = h.manager.get(&h.owner(), transfer.id).await.unwrap_err();
    assert!(matches!(err, TransferError::TransferNotFound(_)));
    assert_eq!(h.store.transfer_count(), 0);

    let events = h.sink.event_types();
    assert_eq!(&events[2..], ["transfer.accept.start", "transfer.accept.end"]);
    let end = h.sink.notifications().pop().unwrap();
    assert_eq!(end.payload.tenant_id, PROJECT_B);
}

#[tokio::test]
async fn test_accept_moves_quota() {
    let h = TestHarness::new();
    let volume = h.volume(5, None).await;

    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();
    h.manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap();

    assert_eq!(h.in_use(PROJECT_A, VOLUMES).await, 0);
    assert_eq!(h.in_use(PROJECT_B, VOLUMES).await, 1);
    assert_eq!(h.in_use(PROJECT_A, GIGABYTES).await, 0);
    assert_eq!(h.in_use(PROJECT_B, GIGABYTES).await, 5);
    assert_eq!(h.quotas.usage(PROJECT_B, VOLUMES).await.unwrap().reserved, 0);
    assert_eq!(h.quotas.outstanding(), 0);
}

#[tokio::test]
async fn test_accept_moves_typed_quota() {
    let h = TestHarness::new();
    let volume = h.volume(2, Some("ssd")).await;

    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();
    h.manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap();

    assert_eq!(h.in_use(PROJECT_A, "volumes_ssd").await, 0);
    assert_eq!(h.in_use(PROJECT_B, "volumes_ssd").await, 1);
    assert_eq!(h.in_use(PROJECT_A, "gigabytes_ssd").await, 0);
    assert_eq!(h.in_use(PROJECT_B, "gigabytes_ssd").await, 2);
}

#[tokio::test]
async fn test_accept_wrong_key() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    let err = h
        .manager
        .accept(&h.recipient(), transfer.id, "wrong_auth_key")
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::InvalidAuthKey));

    let stored = h.stored(&volume).await;
    assert_eq!(stored.project_id, PROJECT_A);
    assert_eq!(stored.status, VolumeStatus::AwaitingTransfer);
    assert_eq!(h.in_use(PROJECT_A, VOLUMES).await, 1);
    assert_eq!(h.in_use(PROJECT_B, VOLUMES).await, 0);
    // No accept events for a rejected key
    assert_eq!(h.sink.count(), 2);
}

#[tokio::test]
async fn test_accept_unknown_id() {
    let h = TestHarness::new();
    let err = h
        .manager
        .accept(&h.recipient(), uuid::Uuid::new_v4(), "whatever")
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::TransferNotFound(_)));
}

#[tokio::test]
async fn test_accept_twice() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    h.manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap();
    let err = h
        .manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::TransferNotFound(_)));
    assert_eq!(h.in_use(PROJECT_B, VOLUMES).await, 1);
}

#[tokio::test]
async fn test_accept_after_status_drift() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    assert!(h.store.force_status(volume.id, VolumeStatus::InUse).unwrap());

    let err = h
        .manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::InvalidVolume(_)));

    // Record survives, ownership and quota untouched
    assert!(TransferStore::get(h.store.as_ref(), transfer.id).await.unwrap().is_some());
    let stored = h.stored(&volume).await;
    assert_eq!(stored.project_id, PROJECT_A);
    assert_eq!(stored.status, VolumeStatus::InUse);
    assert_eq!(h.in_use(PROJECT_A, VOLUMES).await, 1);
    assert_eq!(h.quotas.outstanding(), 0);

    // Start without end marks the aborted accept
    assert_eq!(
        h.sink.event_types(),
        vec![
            "transfer.create.start",
            "transfer.create.end",
            "transfer.accept.start",
        ]
    );
}

#[tokio::test]
async fn test_accept_over_quota_leaves_transfer_live() {
    let limits = QuotaLimits {
        project_limits: HashMap::from([(
            PROJECT_B.to_string(),
            HashMap::from([(VOLUMES.to_string(), 0)]),
        )]),
        ..QuotaLimits::default()
    };
    let h = TestHarness::with_limits(limits);
    let volume = h.volume(1, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    let err = h
        .manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::QuotaExceeded(_)));
    assert_eq!(err.code(), "VOLUME_LIMIT_EXCEEDED");

    let stored = h.stored(&volume).await;
    assert_eq!(stored.project_id, PROJECT_A);
    assert_eq!(stored.status, VolumeStatus::AwaitingTransfer);
    assert_eq!(h.in_use(PROJECT_A, VOLUMES).await, 1);
    assert_eq!(h.quotas.usage(PROJECT_B, VOLUMES).await.unwrap().reserved, 0);
    assert_eq!(h.quotas.outstanding(), 0);

    // Caller may retry once the owner frees quota; the record is still there
    assert!(h.manager.get(&h.owner(), transfer.id).await.is_ok());
}

#[tokio::test]
async fn test_accept_gigabyte_quota_code() {
    let limits = QuotaLimits {
        project_limits: HashMap::from([(
            PROJECT_B.to_string(),
            HashMap::from([(GIGABYTES.to_string(), 3)]),
        )]),
        ..QuotaLimits::default()
    };
    let h = TestHarness::with_limits(limits);
    let volume = h.volume(4, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    let err = h
        .manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VOLUME_SIZE_EXCEEDS_AVAILABLE_QUOTA");
}

#[tokio::test]
async fn test_accept_unknown_volume_type() {
    let h = TestHarness::new();
    let volume = VolumeRecord::new(PROJECT_A, "user_id", 1).with_volume_type("gone");
    VolumeStore::create(h.store.as_ref(), &volume).await.unwrap();
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    let err = h
        .manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::InvalidVolume(_)));
    assert_eq!(h.stored(&volume).await.project_id, PROJECT_A);
    assert_eq!(h.quotas.usage(PROJECT_B, VOLUMES).await.unwrap().reserved, 0);
    assert!(h.manager.get(&h.owner(), transfer.id).await.is_ok());
}

// ============================================================================
// Races
// ============================================================================

#[tokio::test]
async fn test_delete_wins_over_parked_accept() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    // Accept passes the key and status checks, then parks before consuming
    h.gate.arm();
    let accept = {
        let manager = h.manager.clone();
        let ctx = h.recipient();
        let key = transfer.auth_key.clone();
        tokio::spawn(async move { manager.accept(&ctx, transfer.id, &key).await })
    };
    h.gate.entered.notified().await;

    h.manager.delete(&h.owner(), transfer.id).await.unwrap();
    h.gate.release.notify_one();

    let err = accept.await.unwrap().unwrap_err();
    assert!(matches!(err, TransferError::TransferNotFound(_)));

    let stored = h.stored(&volume).await;
    assert_eq!(stored.project_id, PROJECT_A);
    assert_eq!(stored.status, VolumeStatus::Available);
    assert_eq!(h.in_use(PROJECT_A, VOLUMES).await, 1);
    assert_eq!(h.in_use(PROJECT_B, VOLUMES).await, 0);
    assert_eq!(h.quotas.usage(PROJECT_B, VOLUMES).await.unwrap().reserved, 0);
    assert_eq!(h.quotas.outstanding(), 0);
}

#[tokio::test]
async fn test_accept_wins_over_later_delete() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    h.manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap();
    let err = h.manager.delete(&h.owner(), transfer.id).await.unwrap_err();
    assert!(matches!(err, TransferError::TransferNotFound(_)));
    assert_eq!(h.stored(&volume).await.project_id, PROJECT_B);
}

#[tokio::test]
async fn test_second_accept_loses_while_first_parked() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    h.gate.arm();
    let parked = {
        let manager = h.manager.clone();
        let ctx = h.recipient();
        let key = transfer.auth_key.clone();
        tokio::spawn(async move { manager.accept(&ctx, transfer.id, &key).await })
    };
    h.gate.entered.notified().await;

    let other = RequestContext::new("third_user", "third_project");
    h.manager
        .accept(&other, transfer.id, &transfer.auth_key)
        .await
        .unwrap();
    h.gate.release.notify_one();

    let err = parked.await.unwrap().unwrap_err();
    assert!(matches!(err, TransferError::TransferNotFound(_)));

    assert_eq!(h.stored(&volume).await.project_id, "third_project");
    assert_eq!(h.in_use("third_project", VOLUMES).await, 1);
    assert_eq!(h.in_use(PROJECT_B, VOLUMES).await, 0);
    assert_eq!(h.in_use(PROJECT_A, VOLUMES).await, 0);
    assert_eq!(h.quotas.usage(PROJECT_B, VOLUMES).await.unwrap().reserved, 0);
    assert_eq!(h.quotas.outstanding(), 0);
}

#[tokio::test]
async fn test_drift_while_parked_reinstates_transfer() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    h.gate.arm();
    let parked = {
        let manager = h.manager.clone();
        let ctx = h.recipient();
        let key = transfer.auth_key.clone();
        tokio::spawn(async move { manager.accept(&ctx, transfer.id, &key).await })
    };
    h.gate.entered.notified().await;
    assert!(h.store.force_status(volume.id, VolumeStatus::InUse).unwrap());
    h.gate.release.notify_one();

    let err = parked.await.unwrap().unwrap_err();
    assert!(matches!(err, TransferError::InvalidVolume(_)));

    // The record is back and the reservation is gone
    assert!(TransferStore::get(h.store.as_ref(), transfer.id).await.unwrap().is_some());
    assert_eq!(h.stored(&volume).await.project_id, PROJECT_A);
    assert_eq!(h.quotas.outstanding(), 0);
    assert_eq!(h.quotas.usage(PROJECT_B, VOLUMES).await.unwrap().reserved, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accept_single_winner() {
    let h = TestHarness::new();
    let volume = h.volume(2, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..6 {
        let manager = h.manager.clone();
        let ctx = RequestContext::new(format!("user_{}", i), format!("racer_{}", i));
        let key = transfer.auth_key.clone();
        handles.push(tokio::spawn(async move {
            manager.accept(&ctx, transfer.id, &key).await.map(|_| i)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(i) => winners.push(i),
            Err(e) => assert!(
                matches!(e, TransferError::TransferNotFound(_) | TransferError::InvalidVolume(_)),
                "unexpected error {}",
                e
            ),
        }
    }
    assert_eq!(winners.len(), 1);

    let owner = format!("racer_{}", winners[0]);
    assert_eq!(h.stored(&volume).await.project_id, owner);
    for i in 0..6 {
        let project = format!("racer_{}", i);
        let expected = if project == owner { 1 } else { 0 };
        assert_eq!(h.in_use(&project, VOLUMES).await, expected);
        assert_eq!(h.quotas.usage(&project, VOLUMES).await.unwrap().reserved, 0);
    }
    assert_eq!(h.in_use(PROJECT_A, GIGABYTES).await, 0);
    assert_eq!(h.quotas.outstanding(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accept_and_delete_single_winner() {
    for _ in 0..20 {
        let h = TestHarness::new();
        let volume = h.volume(1, None).await;
        let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

        let accept = {
            let manager = h.manager.clone();
            let ctx = h.recipient();
            let key = transfer.auth_key.clone();
            tokio::spawn(async move { manager.accept(&ctx, transfer.id, &key).await })
        };
        let delete = {
            let manager = h.manager.clone();
            let ctx = h.owner();
            tokio::spawn(async move { manager.delete(&ctx, transfer.id).await })
        };
        let accepted = accept.await.unwrap().is_ok();
        let deleted = delete.await.unwrap().is_ok();
        assert!(accepted != deleted, "accepted={} deleted={}", accepted, deleted);

        let stored = h.stored(&volume).await;
        assert_eq!(stored.status, VolumeStatus::Available);
        let expected_owner = if accepted { PROJECT_B } else { PROJECT_A };
        assert_eq!(stored.project_id, expected_owner);
        assert_eq!(h.in_use(expected_owner, VOLUMES).await, 1);
        assert_eq!(h.quotas.outstanding(), 0);
    }
}

// ============================================================================
// Visibility
// ============================================================================

#[tokio::test]
async fn test_visibility_is_owner_scoped() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    let err = h.manager.get(&h.recipient(), transfer.id).await.unwrap_err();
    assert!(matches!(err, TransferError::TransferNotFound(_)));
    assert!(h.manager.get_all(&h.recipient()).await.unwrap().is_empty());
    assert_eq!(h.manager.get_all(&h.owner()).await.unwrap().len(), 1);

    // Yet the id plus key is enough to accept
    h.manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_admin_sees_all_projects() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();

    let admin = RequestContext::admin("admin", "admin_project");
    assert_eq!(h.manager.get(&admin, transfer.id).await.unwrap().id, transfer.id);
    assert_eq!(h.manager.get_all(&admin).await.unwrap().len(), 1);
}

// ============================================================================
// Cascade
// ============================================================================

#[tokio::test]
async fn test_volume_destroy_cascades() {
    let h = TestHarness::new();
    let volume = h.volume(1, None).await;
    let transfer = h.manager.create(&h.owner(), volume.id, None).await.unwrap();
    let events_before = h.sink.count();

    assert!(h.store.destroy(volume.id).await.unwrap());

    let err = h.manager.get(&h.owner(), transfer.id).await.unwrap_err();
    assert!(matches!(err, TransferError::TransferNotFound(_)));
    let err = h
        .manager
        .accept(&h.recipient(), transfer.id, &transfer.auth_key)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::TransferNotFound(_)));
    assert_eq!(h.sink.count(), events_before);
}
