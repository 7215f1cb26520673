//! HTTPS client construction shared by the CA client and the ledger transport.

use std::time::Duration;

use claimnet_wallet::Identity;
use reqwest::{Certificate, Client, ClientBuilder};
use zeroize::Zeroizing;

use crate::{
    config::{TlsSettings, TlsVerification},
    error::{FabricError, Result},
};

/// Timeouts applied to every request a client makes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClientTimeouts {
    pub(crate) connect: Duration,
    pub(crate) request: Option<Duration>,
}

/// Builds a rustls-backed client for `endpoint`.
///
/// Configured trust roots replace the built-in roots. When `client_identity`
/// is given its certificate and key are presented for mutual TLS.
pub(crate) fn build_client(
    endpoint: &str,
    tls: &TlsSettings,
    timeouts: ClientTimeouts,
    client_identity: Option<&Identity>,
) -> Result<Client> {
    let mut builder = Client::builder().use_rustls_tls().connect_timeout(timeouts.connect);
    if let Some(request) = timeouts.request {
        builder = builder.timeout(request);
    }

    builder = apply_trust(builder, endpoint, tls)?;

    if let Some(identity) = client_identity {
        let pem = Zeroizing::new(
            [identity.private_key.as_bytes(), &b"\n"[..], identity.certificate.as_bytes()].concat(),
        );
        let client_identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
            FabricError::Crypto(format!(
                "credentials of '{}' are not usable for TLS: {e}",
                identity.label
            ))
        });
        builder = builder.identity(client_identity?);
    }

    builder
        .build()
        .map_err(|e| {
            FabricError::Config(format!("failed to build HTTPS client for {endpoint}: {e}"))
        })
}

fn apply_trust(
    mut builder: ClientBuilder,
    endpoint: &str,
    tls: &TlsSettings,
) -> Result<ClientBuilder> {
    if !tls.trusted_roots.is_empty() {
        builder = builder.tls_built_in_root_certs(false);
        for pem in &tls.trusted_roots {
            let certs = Certificate::from_pem_bundle(pem.as_bytes()).map_err(|e| {
                FabricError::Config(format!("invalid trust root for {endpoint}: {e}"))
            })?;
            if certs.is_empty() {
                return Err(FabricError::Config(format!(
                    "trust root for {endpoint} contains no certificates"
                )));
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
    }

    if tls.verification == TlsVerification::InsecureSkipVerify {
        tracing::warn!(
            endpoint,
            "TLS certificate verification DISABLED by configuration; the peer is not authenticated"
        );
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder)
}
