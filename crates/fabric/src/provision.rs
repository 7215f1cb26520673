//! Idempotent bootstrap of the registrar identity.
//!
//! [`Provisioner::bootstrap`] holds the label's lock for the whole
//! check → enroll → store sequence, so concurrent bootstraps of one label
//! issue at most one CA enrollment. A label that is already bound is reused
//! without contacting the CA.

use claimnet_wallet::{CredentialStore, Identity, Label, LabelLocks, PutOutcome};

use crate::{
    ca::{CertificateAuthority, EnrollmentRequest},
    error::{FabricError, Result},
};

/// Result of a bootstrap.
#[derive(Debug, Clone)]
pub enum ProvisionOutcome {
    /// The CA was contacted and the new identity stored.
    Enrolled(Identity),
    /// The label was already bound; nothing changed.
    AlreadyProvisioned(Identity),
}

impl ProvisionOutcome {
    /// Returns the identity bound to the label.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        match self {
            Self::Enrolled(identity) | Self::AlreadyProvisioned(identity) => identity,
        }
    }

    /// Returns `true` if this call enrolled with the CA.
    #[must_use]
    pub fn is_enrolled(&self) -> bool {
        matches!(self, Self::Enrolled(_))
    }
}

/// Enrolls registrar identities into a credential store.
///
/// # Example
///
/// ```no_run
/// use claimnet_fabric::{CaConfig, EnrollmentRequest, HttpCertificateAuthority, Provisioner};
/// use claimnet_wallet::{FileCredentialStore, Label};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let ca = HttpCertificateAuthority::new(
///     CaConfig::builder().url("https://ca.org1.example.com:7054").ca_name("ca-org1").build()?,
/// )?;
/// let store = FileCredentialStore::open("wallet").await?;
///
/// let provisioner = Provisioner::new(store, ca, "Org1MSP");
/// let outcome = provisioner
///     .bootstrap(&Label::new("admin")?, &EnrollmentRequest::new("admin", "adminpw"))
///     .await?;
/// println!("enrolled: {}", outcome.is_enrolled());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Provisioner<S, C> {
    store: S,
    ca: C,
    msp_id: String,
    locks: LabelLocks,
}

impl<S: CredentialStore, C: CertificateAuthority> Provisioner<S, C> {
    /// Creates a provisioner storing identities for the `msp_id` organization.
    #[must_use]
    pub fn new(store: S, ca: C, msp_id: impl Into<String>) -> Self {
        Self { store, ca, msp_id: msp_id.into(), locks: LabelLocks::new() }
    }

    /// Shares a lock registry with other provisioning components.
    #[must_use]
    pub fn with_label_locks(mut self, locks: LabelLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Returns the credential store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Enrolls `request` and binds the result to `label`, unless `label` is
    /// already bound.
    ///
    /// The stored identity carries no attributes: it may register others but
    /// can never authorise a ledger write.
    ///
    /// # Errors
    ///
    /// - [`FabricError::InvalidRegistrar`] if `label` holds an operational identity.
    /// - [`FabricError::Auth`] / [`FabricError::Network`] from the CA.
    /// - [`FabricError::Wallet`] if the store fails. No partial entry is left.
    #[tracing::instrument(
        skip(self, request),
        fields(label = %label, enrollment_id = %request.enrollment_id)
    )]
    pub async fn bootstrap(
        &self,
        label: &Label,
        request: &EnrollmentRequest,
    ) -> Result<ProvisionOutcome> {
        let _guard = self.locks.lock(label).await;

        if let Some(existing) = self.store.get(label).await? {
            let existing = registrar_only(label, existing)?;
            tracing::info!("identity already provisioned, skipping enrollment");
            return Ok(ProvisionOutcome::AlreadyProvisioned(existing));
        }

        let identity = self.ca.enroll(request).await?.into_identity(
            label.clone(),
            self.msp_id.clone(),
            None,
        );

        match self.store.put_if_absent(identity.clone()).await? {
            PutOutcome::Inserted => {
                tracing::info!(msp_id = %self.msp_id, "registrar identity stored");
                Ok(ProvisionOutcome::Enrolled(identity))
            },
            PutOutcome::AlreadyPresent => {
                // Another process bound the label between our check and write.
                tracing::warn!("label bound concurrently, discarding fresh enrollment");
                let stored = self.store.get(label).await?.ok_or_else(|| {
                    FabricError::UnknownIdentity { label: label.clone() }
                })?;
                Ok(ProvisionOutcome::AlreadyProvisioned(registrar_only(label, stored)?))
            },
        }
    }
}

/// Rejects an identity found under a registrar label if it carries attributes.
fn registrar_only(label: &Label, identity: Identity) -> Result<Identity> {
    if identity.is_operational() {
        return Err(FabricError::InvalidRegistrar {
            label: label.to_string(),
            reason: "label is bound to an operational identity",
        });
    }
    Ok(identity)
}
