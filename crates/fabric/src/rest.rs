//! HTTPS ledger transport.
//!
//! Each session owns a client authenticated with the caller's certificate
//! and key (mutual TLS) and talks to the gateway's contract endpoints under
//! `{endpoint}/channels/{channel}/contracts/{contract}`:
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | evaluate | `POST .../evaluate` `{function, args}` | raw payload |
//! | submit | `POST .../submit` `{function, args}` | `{transactionId}` |
//!
//! Closing a session drops its client and with it the connection pool.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use claimnet_wallet::{Identity, Label};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    config::GatewayConfig,
    error::{FabricError, Result},
    session::{LedgerConnector, LedgerSession, TransactionId},
    tls::{ClientTimeouts, build_client},
};

/// Opens [`RestLedgerSession`]s against a gateway endpoint.
#[derive(Debug, Clone)]
pub struct RestLedgerConnector {
    config: Arc<GatewayConfig>,
}

impl RestLedgerConnector {
    /// Creates a connector.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Config`] if the configuration is invalid.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config: Arc::new(config) })
    }
}

#[async_trait]
impl LedgerConnector for RestLedgerConnector {
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn LedgerSession>> {
        let client = build_client(
            self.config.endpoint(),
            self.config.tls(),
            ClientTimeouts { connect: self.config.connect_timeout(), request: None },
            Some(identity),
        )?;
        tracing::debug!(
            label = %identity.label,
            endpoint = self.config.endpoint(),
            "ledger session opened"
        );
        Ok(Box::new(RestLedgerSession {
            client: Some(client),
            config: Arc::clone(&self.config),
            label: identity.label.clone(),
        }))
    }
}

/// A mutually-authenticated session for one identity.
#[derive(Debug)]
pub struct RestLedgerSession {
    client: Option<Client>,
    config: Arc<GatewayConfig>,
    label: Label,
}

impl RestLedgerSession {
    async fn call(&self, action: &str, function: &'static str, args: &[String]) -> Result<Bytes> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| FabricError::network("ledger session is closed"))?;
        let url = self.config.contract_url(action)?;

        let response =
            client.post(url).json(&ContractCall { function, args }).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return Ok(body);
        }

        let message =
            format!("HTTP {}: {}", status.as_u16(), String::from_utf8_lossy(&body).trim());
        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(FabricError::network(message));
        }
        Err(match action {
            "submit" => FabricError::ledger_write(function, message),
            _ => FabricError::ledger_read(function, message),
        })
    }
}

#[async_trait]
impl LedgerSession for RestLedgerSession {
    async fn evaluate(&self, function: &'static str, args: &[String]) -> Result<Bytes> {
        self.call("evaluate", function, args).await
    }

    async fn submit(&self, function: &'static str, args: &[String]) -> Result<TransactionId> {
        let body = self.call("submit", function, args).await?;
        let receipt: SubmitReceipt = serde_json::from_slice(&body).map_err(|e| {
            FabricError::ledger_write(function, format!("unreadable submit receipt: {e}"))
        })?;
        Ok(receipt.transaction_id)
    }

    async fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            tracing::debug!(label = %self.label, "ledger session closed");
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.client = None;
    }
}

#[derive(Serialize)]
struct ContractCall<'a> {
    function: &'static str,
    args: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitReceipt {
    transaction_id: TransactionId,
}
