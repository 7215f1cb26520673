//! Registration of role-scoped operational identities.
//!
//! The registrar identity and the identities it mints always live under
//! different labels. The registrar label is chosen per call, and an
//! operational identity is never accepted as a registrar.

use claimnet_wallet::{CredentialStore, Identity, IdentityAttributes, Label, LabelLocks, PutOutcome};

use crate::{
    ca::{CertificateAuthority, EnrollmentRequest, RegistrationRequest},
    error::{FabricError, Result},
};

/// Affiliation used when none is given.
pub const DEFAULT_AFFILIATION: &str = "org1.department1";

/// An operational identity to mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIdentity {
    /// Label to store the identity under. Also the default enrollment id.
    pub label: Label,
    /// Enrollment id registered at the CA.
    pub enrollment_id: String,
    /// CA affiliation.
    pub affiliation: String,
    /// Role attributes embedded in the certificate and stored with it.
    pub attributes: IdentityAttributes,
}

impl NewIdentity {
    /// Creates a request enrolling under the label's own name.
    #[must_use]
    pub fn new(label: Label, attributes: IdentityAttributes) -> Self {
        Self {
            enrollment_id: label.to_string(),
            label,
            affiliation: DEFAULT_AFFILIATION.to_owned(),
            attributes,
        }
    }

    /// Overrides the CA enrollment id.
    #[must_use]
    pub fn with_enrollment_id(mut self, enrollment_id: impl Into<String>) -> Self {
        self.enrollment_id = enrollment_id.into();
        self
    }

    /// Overrides the CA affiliation.
    #[must_use]
    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = affiliation.into();
        self
    }
}

/// Registers and enrolls operational identities using a stored registrar.
#[derive(Debug)]
pub struct IdentityRegistrar<S, C> {
    store: S,
    ca: C,
    locks: LabelLocks,
}

impl<S: CredentialStore, C: CertificateAuthority> IdentityRegistrar<S, C> {
    /// Creates a registrar over `store` and `ca`.
    #[must_use]
    pub fn new(store: S, ca: C) -> Self {
        Self { store, ca, locks: LabelLocks::new() }
    }

    /// Shares a lock registry with other provisioning components.
    #[must_use]
    pub fn with_label_locks(mut self, locks: LabelLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Registers `new` under the authority of the identity stored at
    /// `registrar_label`, enrolls it with the returned secret, and stores it
    /// under `new.label` with `new.attributes`.
    ///
    /// The new identity inherits the registrar's MSP id.
    ///
    /// # Errors
    ///
    /// - [`FabricError::InvalidRegistrar`] if the labels coincide or the
    ///   registrar is an operational identity.
    /// - [`FabricError::UnknownIdentity`] if no registrar is stored.
    /// - [`FabricError::AlreadyRegistered`] if the label is already bound or
    ///   the CA knows the enrollment id.
    /// - [`FabricError::RegistrarAuth`], [`FabricError::Auth`], or
    ///   [`FabricError::Network`] from the CA.
    #[tracing::instrument(
        skip(self, new),
        fields(
            registrar = %registrar_label,
            label = %new.label,
            enrollment_id = %new.enrollment_id,
            role = %new.attributes.role,
        )
    )]
    pub async fn register_and_enroll(
        &self,
        registrar_label: &Label,
        new: &NewIdentity,
    ) -> Result<Identity> {
        if registrar_label == &new.label {
            return Err(FabricError::InvalidRegistrar {
                label: registrar_label.to_string(),
                reason: "registrar and new identity must use different labels",
            });
        }

        let registrar = self.registrar(registrar_label).await?;

        let _guard = self.locks.lock(&new.label).await;
        if self.store.get(&new.label).await?.is_some() {
            return Err(FabricError::AlreadyRegistered { id: new.label.to_string() });
        }

        let registration = RegistrationRequest::new(
            new.enrollment_id.clone(),
            new.affiliation.clone(),
            new.attributes.clone(),
        );
        let secret = self.ca.register(&registration, &registrar).await?;

        let enrollment =
            EnrollmentRequest { enrollment_id: new.enrollment_id.clone(), secret };
        let identity = self.ca.enroll(&enrollment).await?.into_identity(
            new.label.clone(),
            registrar.msp_id.clone(),
            Some(new.attributes.clone()),
        );

        match self.store.put_if_absent(identity.clone()).await? {
            PutOutcome::Inserted => {
                tracing::info!("operational identity stored");
                Ok(identity)
            },
            PutOutcome::AlreadyPresent => {
                Err(FabricError::AlreadyRegistered { id: new.label.to_string() })
            },
        }
    }

    async fn registrar(&self, label: &Label) -> Result<Identity> {
        let registrar = self
            .store
            .get(label)
            .await?
            .ok_or_else(|| FabricError::UnknownIdentity { label: label.clone() })?;

        if registrar.is_operational() {
            return Err(FabricError::InvalidRegistrar {
                label: label.to_string(),
                reason: "operational identities cannot register others",
            });
        }
        Ok(registrar)
    }
}
