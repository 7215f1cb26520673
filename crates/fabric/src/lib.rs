//! Certificate authority provisioning and ledger gateway for ClaimNet.
//!
//! This crate turns a [`CredentialStore`](claimnet_wallet::CredentialStore)
//! into working ledger access:
//!
//! - [`Provisioner`] enrolls the bootstrap registrar identity, once.
//! - [`IdentityRegistrar`] uses that registrar to mint role-scoped
//!   operational identities.
//! - [`LedgerGateway`] opens a session per call, bound to the caller's
//!   identity, runs one chaincode operation, and always closes the session.
//! - [`query`] normalizes query payloads into record lists.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        HTTP controllers (name, args, caller label)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  LedgerOperation parse  │  LedgerGateway  │  query parser   │
//! ├──────────────────────────┬──────────────────────────────────┤
//! │  Provisioner / Registrar │  LedgerConnector / LedgerSession │
//! │  CertificateAuthority    │  RestLedgerConnector (mTLS)      │
//! ├──────────────────────────┴──────────────────────────────────┤
//! │               claimnet-wallet CredentialStore               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use claimnet_fabric::{
//!     ConnectionProfile, EnrollmentRequest, HttpCertificateAuthority, IdentityRegistrar,
//!     InsecureTls, NewIdentity, Provisioner,
//! };
//! use claimnet_wallet::{FileCredentialStore, IdentityAttributes, Label, LabelLocks, Role};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let profile = ConnectionProfile::from_path("connection-org1.json").await?;
//!     let ca_config = profile.ca_config("Org1", InsecureTls::Deny)?;
//!     let ca = Arc::new(HttpCertificateAuthority::new(ca_config)?);
//!     let store = Arc::new(FileCredentialStore::open("wallet").await?);
//!     let locks = LabelLocks::new();
//!
//!     let admin = Label::new("admin")?;
//!     Provisioner::new(Arc::clone(&store), Arc::clone(&ca), profile.msp_id("Org1")?)
//!         .with_label_locks(locks.clone())
//!         .bootstrap(&admin, &EnrollmentRequest::new("admin", "adminpw"))
//!         .await?;
//!
//!     let doctor = NewIdentity::new(
//!         Label::new("doctor7")?,
//!         IdentityAttributes::new(Role::Doctor, "6f1c2a"),
//!     );
//!     IdentityRegistrar::new(store, ca)
//!         .with_label_locks(locks)
//!         .register_and_enroll(&admin, &doctor)
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`failpoints`**: Activates `fail` injection points (`retry-before-sleep`).

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Certificate authority client.
pub mod ca;
mod config;
mod error;
/// Ledger gateway.
pub mod gateway;
/// Supported chaincode operations.
pub mod operation;
mod profile;
/// Registrar bootstrap.
pub mod provision;
pub mod query;
/// Operational identity registration.
pub mod registrar;
/// HTTPS ledger transport.
pub mod rest;
mod retry;
/// Ledger session abstraction.
pub mod session;
mod signer;
mod tls;

/// Certificate authority types.
pub use ca::{
    CertificateAuthority, EnrolledCredentials, EnrollmentRequest, HttpCertificateAuthority,
    RegistrationRequest,
};
/// Configuration types and default constants.
pub use config::{
    CaConfig, DEFAULT_CA_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_EVALUATE_TIMEOUT,
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES, DEFAULT_SUBMIT_TIMEOUT,
    GatewayConfig, RetryConfig, TlsSettings, TlsVerification,
};
/// Error type and result alias.
pub use error::{FabricError, Result};
/// Ledger gateway.
pub use gateway::{LedgerGateway, LedgerResponse};
/// Operation types.
pub use operation::{
    Arguments, ClaimCommand, ClaimQuery, ClaimStatus, LedgerOperation, NewClaim,
};
/// Connection profile parsing.
pub use profile::{ConnectionProfile, InsecureTls};
/// Provisioning types.
pub use provision::{ProvisionOutcome, Provisioner};
/// Query payload parsing.
pub use query::{MalformedPayload, decode_records, parse_record, parse_records};
/// Registration types.
pub use registrar::{DEFAULT_AFFILIATION, IdentityRegistrar, NewIdentity};
/// HTTPS ledger transport.
pub use rest::{RestLedgerConnector, RestLedgerSession};
/// Session types.
pub use session::{LedgerConnector, LedgerSession, SessionGuard, TransactionId};
