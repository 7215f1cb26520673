//! Bootstrap and registration against a mock certificate authority.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use claimnet_fabric::{
    EnrollmentRequest, FabricError, IdentityRegistrar, NewIdentity, Provisioner,
    RegistrationRequest,
};
use claimnet_wallet::{
    CredentialStore, FileCredentialStore, Identity, IdentityAttributes, Label, LabelLocks,
    MemoryCredentialStore, PutOutcome, Role, WalletResult,
    testutil::{sample_identity, sample_registrar},
};
use common::{ADMIN_ID, ADMIN_SECRET, CaFault, MockCertificateAuthority};
use tokio::task::JoinSet;

const MSP_ID: &str = "Org1MSP";

fn label(s: &str) -> Label {
    Label::new(s).expect("valid label")
}

fn admin_request() -> EnrollmentRequest {
    EnrollmentRequest::new(ADMIN_ID, ADMIN_SECRET)
}

async fn bootstrapped(
    store: &Arc<MemoryCredentialStore>,
    ca: &MockCertificateAuthority,
) -> claimnet_wallet::Identity {
    Provisioner::new(Arc::clone(store), ca.clone(), MSP_ID)
        .bootstrap(&label("admin"), &admin_request())
        .await
        .expect("bootstrap should succeed")
        .identity()
        .clone()
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn bootstrap_twice_enrolls_once() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    let provisioner = Provisioner::new(Arc::clone(&store), ca.clone(), MSP_ID);

    let first = provisioner.bootstrap(&label("admin"), &admin_request()).await.unwrap();
    assert!(first.is_enrolled());
    assert_eq!(ca.enroll_calls(), 1);

    let second = provisioner.bootstrap(&label("admin"), &admin_request()).await.unwrap();
    assert!(!second.is_enrolled());
    assert_eq!(ca.enroll_calls(), 1, "second bootstrap must not contact the CA");

    assert_eq!(store.labels().await.unwrap(), vec![label("admin")]);
    assert_eq!(second.identity().certificate, first.identity().certificate);
}

#[tokio::test]
async fn bootstrap_is_idempotent_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let ca = MockCertificateAuthority::new();

    let store = FileCredentialStore::open(dir.path()).await.unwrap();
    let outcome = Provisioner::new(store, ca.clone(), MSP_ID)
        .bootstrap(&label("admin"), &admin_request())
        .await
        .unwrap();
    assert!(outcome.is_enrolled());

    let reopened = FileCredentialStore::open(dir.path()).await.unwrap();
    let outcome = Provisioner::new(reopened, ca.clone(), MSP_ID)
        .bootstrap(&label("admin"), &admin_request())
        .await
        .unwrap();
    assert!(!outcome.is_enrolled());
    assert_eq!(ca.enroll_calls(), 1);
}

#[tokio::test]
async fn bootstrapped_registrar_has_no_attributes() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();

    let identity = bootstrapped(&store, &ca).await;
    assert!(identity.attributes.is_none());
    assert_eq!(identity.msp_id, MSP_ID);

    let stored = store.get(&label("admin")).await.unwrap().unwrap();
    assert!(!stored.is_operational());
}

#[tokio::test]
async fn bootstrap_with_bad_secret_stores_nothing() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();

    let err = Provisioner::new(Arc::clone(&store), ca.clone(), MSP_ID)
        .bootstrap(&label("admin"), &EnrollmentRequest::new(ADMIN_ID, "wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, FabricError::Auth { .. }));
    assert!(store.is_empty());
}

#[tokio::test]
async fn bootstrap_with_unreachable_ca_stores_nothing() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    ca.set_fault(Some(CaFault::Unreachable));

    let err = Provisioner::new(Arc::clone(&store), ca, MSP_ID)
        .bootstrap(&label("admin"), &admin_request())
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert!(store.is_empty());
}

#[tokio::test]
async fn bootstrap_refuses_label_holding_operational_identity() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    let _ = store.put_if_absent(sample_identity("admin", Role::Hospital)).await.unwrap();

    let err = Provisioner::new(Arc::clone(&store), ca.clone(), MSP_ID)
        .bootstrap(&label("admin"), &admin_request())
        .await
        .unwrap_err();

    assert!(matches!(err, FabricError::InvalidRegistrar { .. }));
    assert_eq!(ca.enroll_calls(), 0);
}

/// Store whose label gets bound by another writer between the first lookup
/// and the write.
struct BoundMidway {
    inner: MemoryCredentialStore,
    intruder: Identity,
    first_lookup_done: AtomicBool,
}

#[async_trait]
impl CredentialStore for BoundMidway {
    async fn get(&self, label: &Label) -> WalletResult<Option<Identity>> {
        if !self.first_lookup_done.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get(label).await
    }

    async fn put_if_absent(&self, _identity: Identity) -> WalletResult<PutOutcome> {
        let _ = self.inner.put_if_absent(self.intruder.clone()).await?;
        Ok(PutOutcome::AlreadyPresent)
    }

    async fn labels(&self) -> WalletResult<Vec<Label>> {
        self.inner.labels().await
    }
}

#[tokio::test]
async fn bootstrap_refuses_operational_identity_bound_concurrently() {
    let store = Arc::new(BoundMidway {
        inner: MemoryCredentialStore::new(),
        intruder: sample_identity("admin", Role::Hospital),
        first_lookup_done: AtomicBool::new(false),
    });
    let ca = MockCertificateAuthority::new();

    let err = Provisioner::new(Arc::clone(&store), ca.clone(), MSP_ID)
        .bootstrap(&label("admin"), &admin_request())
        .await
        .unwrap_err();

    assert!(matches!(err, FabricError::InvalidRegistrar { .. }), "got {err:?}");
    assert_eq!(ca.enroll_calls(), 1);
    let stored = store.get(&label("admin")).await.unwrap().unwrap();
    assert_eq!(stored.role(), Some(Role::Hospital));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bootstraps_enroll_at_most_once() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    ca.set_enroll_delay(Duration::from_millis(20));
    let provisioner = Arc::new(Provisioner::new(Arc::clone(&store), ca.clone(), MSP_ID));

    let mut set = JoinSet::new();
    for _ in 0..8 {
        let provisioner = Arc::clone(&provisioner);
        set.spawn(async move {
            provisioner.bootstrap(&label("admin"), &admin_request()).await.unwrap().is_enrolled()
        });
    }

    let mut enrolled = 0;
    while let Some(result) = set.join_next().await {
        if result.unwrap() {
            enrolled += 1;
        }
    }

    assert_eq!(enrolled, 1);
    assert_eq!(ca.enroll_calls(), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bootstraps_of_distinct_labels_do_not_serialize() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    ca.set_enroll_delay(Duration::from_millis(200));
    let provisioner = Arc::new(Provisioner::new(Arc::clone(&store), ca.clone(), MSP_ID));

    let started = std::time::Instant::now();
    let mut set = JoinSet::new();
    for name in ["admin", "admin2", "admin3", "admin4"] {
        let provisioner = Arc::clone(&provisioner);
        set.spawn(async move { provisioner.bootstrap(&label(name), &admin_request()).await });
    }
    while let Some(result) = set.join_next().await {
        assert!(result.unwrap().unwrap().is_enrolled());
    }

    assert_eq!(ca.enroll_calls(), 4);
    assert!(started.elapsed() < Duration::from_millis(700), "distinct labels ran serially");
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn register_and_enroll_carries_attributes() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    bootstrapped(&store, &ca).await;

    let registrar = IdentityRegistrar::new(Arc::clone(&store), ca.clone());
    let new = NewIdentity::new(label("doctor7"), IdentityAttributes::new(Role::Doctor, "u-7"));
    let identity = registrar.register_and_enroll(&label("admin"), &new).await.unwrap();

    assert_eq!(identity.attributes, Some(IdentityAttributes::new(Role::Doctor, "u-7")));
    assert_eq!(identity.msp_id, MSP_ID);

    let stored = store.get(&label("doctor7")).await.unwrap().unwrap();
    assert!(stored.has_role(Role::Doctor));
    assert_eq!(stored.attributes.unwrap().user_uuid, "u-7");

    // The registrar record is untouched.
    let admin = store.get(&label("admin")).await.unwrap().unwrap();
    assert!(admin.attributes.is_none());

    let registration = ca.registration("doctor7").unwrap();
    assert_eq!(registration.affiliation, "org1.department1");
    assert_eq!(registration.max_enrollments, 1);
    assert_eq!(ca.registrars(), vec![label("admin")]);
}

#[tokio::test]
async fn register_rejects_shared_label() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    bootstrapped(&store, &ca).await;

    let new = NewIdentity::new(label("admin"), IdentityAttributes::new(Role::Insurer, "u-1"));
    let err = IdentityRegistrar::new(Arc::clone(&store), ca.clone())
        .register_and_enroll(&label("admin"), &new)
        .await
        .unwrap_err();

    assert!(matches!(err, FabricError::InvalidRegistrar { .. }));
    assert_eq!(ca.register_calls(), 0);
}

#[tokio::test]
async fn register_rejects_operational_registrar() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    let _ = store.put_if_absent(sample_identity("hospital01", Role::Hospital)).await.unwrap();

    let new = NewIdentity::new(label("doctor7"), IdentityAttributes::new(Role::Doctor, "u-7"));
    let err = IdentityRegistrar::new(Arc::clone(&store), ca.clone())
        .register_and_enroll(&label("hospital01"), &new)
        .await
        .unwrap_err();

    assert!(matches!(err, FabricError::InvalidRegistrar { .. }));
    assert_eq!(ca.register_calls(), 0);
}

#[tokio::test]
async fn register_with_missing_registrar_is_unknown_identity() {
    let store = Arc::new(MemoryCredentialStore::new());
    let new = NewIdentity::new(label("doctor7"), IdentityAttributes::new(Role::Doctor, "u-7"));

    let err = IdentityRegistrar::new(Arc::clone(&store), MockCertificateAuthority::new())
        .register_and_enroll(&label("admin"), &new)
        .await
        .unwrap_err();

    assert!(matches!(err, FabricError::UnknownIdentity { label } if label.as_str() == "admin"));
}

#[tokio::test]
async fn register_existing_label_is_already_registered() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    let _ = store.put_if_absent(sample_registrar("admin")).await.unwrap();
    let _ = store.put_if_absent(sample_identity("doctor7", Role::Doctor)).await.unwrap();

    let new = NewIdentity::new(label("doctor7"), IdentityAttributes::new(Role::Doctor, "u-7"));
    let err = IdentityRegistrar::new(Arc::clone(&store), ca.clone())
        .register_and_enroll(&label("admin"), &new)
        .await
        .unwrap_err();

    assert!(matches!(err, FabricError::AlreadyRegistered { .. }));
    assert_eq!(ca.register_calls(), 0, "a bound label must not reach the CA");
}

#[tokio::test]
async fn register_id_known_to_ca_is_already_registered() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    bootstrapped(&store, &ca).await;
    ca.preregister(RegistrationRequest::new(
        "doctor7",
        "org1.department1",
        IdentityAttributes::new(Role::Doctor, "u-7"),
    ));

    let new = NewIdentity::new(label("doctor7"), IdentityAttributes::new(Role::Doctor, "u-7"));
    let err = IdentityRegistrar::new(Arc::clone(&store), ca.clone())
        .register_and_enroll(&label("admin"), &new)
        .await
        .unwrap_err();

    assert!(matches!(err, FabricError::AlreadyRegistered { id } if id == "doctor7"));
    assert!(store.get(&label("doctor7")).await.unwrap().is_none());
}

#[tokio::test]
async fn registrar_auth_failure_surfaces() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    bootstrapped(&store, &ca).await;
    ca.set_fault(Some(CaFault::RejectRegistrar));

    let new = NewIdentity::new(label("doctor7"), IdentityAttributes::new(Role::Doctor, "u-7"));
    let err = IdentityRegistrar::new(Arc::clone(&store), ca.clone())
        .register_and_enroll(&label("admin"), &new)
        .await
        .unwrap_err();

    assert!(matches!(err, FabricError::RegistrarAuth { .. }));
    assert!(store.get(&label("doctor7")).await.unwrap().is_none());
}

#[tokio::test]
async fn custom_enrollment_id_and_affiliation() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    bootstrapped(&store, &ca).await;

    let new = NewIdentity::new(label("insurer01"), IdentityAttributes::new(Role::Insurer, "u-9"))
        .with_enrollment_id("acme-insurer")
        .with_affiliation("org1.claims");
    let identity = IdentityRegistrar::new(Arc::clone(&store), ca.clone())
        .register_and_enroll(&label("admin"), &new)
        .await
        .unwrap();

    assert_eq!(identity.label, label("insurer01"));
    assert_eq!(ca.registration("acme-insurer").unwrap().affiliation, "org1.claims");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registration_of_one_label_yields_one_identity() {
    let store = Arc::new(MemoryCredentialStore::new());
    let ca = MockCertificateAuthority::new();
    bootstrapped(&store, &ca).await;
    ca.set_enroll_delay(Duration::from_millis(20));

    let registrar = Arc::new(
        IdentityRegistrar::new(Arc::clone(&store), ca.clone()).with_label_locks(LabelLocks::new()),
    );
    let new = NewIdentity::new(label("patient5"), IdentityAttributes::new(Role::Patient, "u-5"));

    let mut set = JoinSet::new();
    for _ in 0..6 {
        let registrar = Arc::clone(&registrar);
        let new = new.clone();
        set.spawn(async move { registrar.register_and_enroll(&label("admin"), &new).await });
    }

    let mut ok = 0;
    while let Some(result) = set.join_next().await {
        match result.unwrap() {
            Ok(_) => ok += 1,
            Err(FabricError::AlreadyRegistered { .. }) => {},
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(ca.register_calls(), 1);
    assert_eq!(store.len(), 2);
}
