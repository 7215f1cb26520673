//! Network connection profile.
//!
//! The profile is the JSON document a ledger network publishes to describe
//! its organizations and certificate authorities. Only the parts needed to
//! reach an organization's CA are read; everything else is ignored.
//!
//! ```json
//! {
//!   "organizations": {
//!     "Org1": { "mspid": "Org1MSP", "certificateAuthorities": ["ca.org1.example.com"] }
//!   },
//!   "certificateAuthorities": {
//!     "ca.org1.example.com": {
//!       "url": "https://localhost:7054",
//!       "caName": "ca-org1",
//!       "tlsCACerts": { "pem": ["-----BEGIN CERTIFICATE-----\n..."] },
//!       "httpOptions": { "verify": false }
//!     }
//!   }
//! }
//! ```
//!
//! `httpOptions.verify: false` is only honoured with [`InsecureTls::Allow`].

use std::{collections::BTreeMap, path::Path};

use serde::Deserialize;

use crate::{
    config::{CaConfig, TlsVerification},
    error::{FabricError, Result},
};

/// Whether a profile may turn off CA certificate verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsecureTls {
    /// Ignore `httpOptions.verify: false` and keep verifying.
    #[default]
    Deny,
    /// Honour `httpOptions.verify: false`.
    Allow,
}

/// Parsed connection profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    #[serde(default)]
    organizations: BTreeMap<String, Organization>,
    #[serde(default)]
    certificate_authorities: BTreeMap<String, CertificateAuthorityEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Organization {
    mspid: String,
    #[serde(default)]
    certificate_authorities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateAuthorityEntry {
    url: String,
    ca_name: Option<String>,
    #[serde(rename = "tlsCACerts")]
    tls_ca_certs: Option<TlsCaCerts>,
    #[serde(default)]
    http_options: HttpOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct TlsCaCerts {
    pem: Option<PemList>,
    path: Option<String>,
}

/// `pem` is either one string or an array of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PemList {
    One(String),
    Many(Vec<String>),
}

impl PemList {
    fn into_vec(self) -> Vec<String> {
        match self {
            PemList::One(pem) => vec![pem],
            PemList::Many(pems) => pems,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HttpOptions {
    verify: Option<bool>,
}

impl ConnectionProfile {
    /// Parses a profile from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Config`] if the text is not a valid profile.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| FabricError::Config(format!("invalid connection profile: {e}")))
    }

    /// Reads and parses a profile file.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Config`] if the file cannot be read or parsed.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            FabricError::Config(format!("cannot read connection profile {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Returns the MSP id of `org`.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Config`] if the organization is not defined.
    pub fn msp_id(&self, org: &str) -> Result<&str> {
        Ok(&self.organization(org)?.mspid)
    }

    /// Builds the CA configuration for `org`'s first certificate authority.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Config`] if the organization or its CA is not
    /// defined, the CA entry is incomplete, or the resulting configuration
    /// does not validate.
    pub fn ca_config(&self, org: &str, insecure: InsecureTls) -> Result<CaConfig> {
        let organization = self.organization(org)?;
        let ca_key = organization.certificate_authorities.first().ok_or_else(|| {
            FabricError::Config(format!("organization '{org}' lists no certificate authority"))
        })?;
        let entry = self.certificate_authorities.get(ca_key).ok_or_else(|| {
            FabricError::Config(format!("certificate authority '{ca_key}' is not defined"))
        })?;

        let trusted_roots = match entry.tls_ca_certs.clone() {
            Some(TlsCaCerts { pem: Some(pem), .. }) => pem.into_vec(),
            Some(TlsCaCerts { pem: None, path: Some(path) }) => {
                return Err(FabricError::Config(format!(
                    "certificate authority '{ca_key}' references tlsCACerts.path '{path}'; \
                     inline the PEM instead"
                )));
            },
            _ => Vec::new(),
        };

        let tls_verification = match (entry.http_options.verify, insecure) {
            (Some(false), InsecureTls::Allow) => TlsVerification::InsecureSkipVerify,
            (Some(false), InsecureTls::Deny) => {
                tracing::warn!(
                    ca = %ca_key,
                    "connection profile disables TLS verification; ignoring without explicit opt-in"
                );
                TlsVerification::Verify
            },
            _ => TlsVerification::Verify,
        };

        CaConfig::builder()
            .url(entry.url.clone())
            .ca_name(entry.ca_name.clone().unwrap_or_else(|| ca_key.clone()))
            .trusted_roots(trusted_roots)
            .tls_verification(tls_verification)
            .build()
    }

    fn organization(&self, org: &str) -> Result<&Organization> {
        self.organizations
            .get(org)
            .ok_or_else(|| FabricError::Config(format!("organization '{org}' is not defined")))
    }
}
