//! Per-call ledger access on behalf of stored identities.
//!
//! Every [`invoke`](LedgerGateway::invoke) and [`query`](LedgerGateway::query)
//! follows the same shape:
//!
//! 1. Resolve the caller's label in the credential store.
//! 2. For writes, check the identity's role attribute.
//! 3. Open a session bound to that identity (bounded by `connect_timeout`).
//! 4. Run the operation (bounded by `submit_timeout` / `evaluate_timeout`).
//! 5. Close the session, whatever step 4 returned.
//!
//! Sessions are never shared between calls. If the calling future is dropped
//! mid-flight, the session guard aborts the session on drop.
//!
//! # Failure asymmetry
//!
//! Write failures always propagate. Read failures at the transport or
//! chaincode level propagate too, but a payload that arrives and cannot be
//! read as records becomes an empty result (see [`crate::query`]).

use std::{sync::Arc, time::Instant};

use bytes::Bytes;
use claimnet_wallet::{CredentialStore, Identity, Label};
use serde_json::Value;

use crate::{
    config::GatewayConfig,
    error::{FabricError, Result},
    operation::{Arguments, ClaimCommand, ClaimQuery, LedgerOperation},
    query::{parse_record, parse_records},
    retry::evaluate_with_retry,
    session::{LedgerConnector, SessionGuard, TransactionId},
};

/// Outcome of [`LedgerGateway::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerResponse {
    /// A write committed under this transaction.
    Committed(TransactionId),
    /// A read returned this raw payload.
    Evaluated(Bytes),
}

impl LedgerResponse {
    /// Returns the transaction id of a committed write.
    #[must_use]
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        match self {
            Self::Committed(transaction_id) => Some(transaction_id),
            Self::Evaluated(_) => None,
        }
    }

    /// Returns the payload of a read.
    #[must_use]
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            Self::Committed(_) => None,
            Self::Evaluated(payload) => Some(payload),
        }
    }
}

/// Brokers ledger calls for identities held in a credential store.
///
/// # Example
///
/// ```no_run
/// use claimnet_fabric::{GatewayConfig, LedgerGateway, RestLedgerConnector};
/// use claimnet_wallet::{FileCredentialStore, Label};
/// use serde_json::json;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = GatewayConfig::builder()
///     .endpoint("https://gateway.org1.example.com:8443")
///     .channel("claims")
///     .contract("claimcc")
///     .build()?;
/// let gateway = LedgerGateway::new(
///     FileCredentialStore::open("wallet").await?,
///     RestLedgerConnector::new(config.clone())?,
///     config,
/// );
///
/// let args = json!({ "status": "pending" });
/// let claims = gateway
///     .query_named("getClaimsByStatus", args.as_object().unwrap(), &Label::new("hospital01")?)
///     .await?;
/// println!("{} pending claims", claims.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LedgerGateway<S, C> {
    store: S,
    connector: C,
    config: Arc<GatewayConfig>,
}

impl<S: CredentialStore, C: LedgerConnector> LedgerGateway<S, C> {
    /// Creates a gateway.
    #[must_use]
    pub fn new(store: S, connector: C, config: GatewayConfig) -> Self {
        Self { store, connector, config: Arc::new(config) }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Submits `command` as the identity stored under `label`.
    ///
    /// # Errors
    ///
    /// - [`FabricError::UnknownIdentity`] if `label` is not bound.
    /// - [`FabricError::MissingRole`] if the identity may not submit `command`.
    /// - [`FabricError::LedgerWrite`] if the submit fails or times out.
    #[tracing::instrument(
        skip(self, command),
        fields(
            label = %label,
            operation = command.function_name(),
            channel = self.config.channel(),
            contract = self.config.contract(),
        )
    )]
    pub async fn invoke(&self, command: &ClaimCommand, label: &Label) -> Result<TransactionId> {
        let operation = command.function_name();
        let identity = self.resolve(label).await?;
        authorise(&identity, command)?;

        let started = Instant::now();
        let args = command.chaincode_args();
        let guard = self.open(&identity).await.map_err(|e| e.into_write_failure(operation))?;
        drop(identity);

        let submit_timeout = self.config.submit_timeout();
        let submit = async { guard.session()?.submit(operation, &args).await };
        let result = match tokio::time::timeout(submit_timeout, submit).await {
            Ok(result) => result.map_err(|e| e.into_write_failure(operation)),
            Err(_) => Err(FabricError::ledger_write(
                operation,
                format!("timed out after {}ms", submit_timeout.as_millis()),
            )),
        };

        self.release(guard).await;

        match &result {
            Ok(transaction_id) => tracing::info!(
                %transaction_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "transaction committed"
            ),
            Err(e) => tracing::warn!(error = %e, "ledger write failed"),
        }
        result
    }

    /// Evaluates `query` as the identity stored under `label` and returns the
    /// raw payload.
    ///
    /// Transient failures are retried within `evaluate_timeout`.
    ///
    /// # Errors
    ///
    /// - [`FabricError::UnknownIdentity`] if `label` is not bound.
    /// - [`FabricError::LedgerRead`] if the evaluate fails or times out.
    #[tracing::instrument(
        skip(self, query),
        fields(
            label = %label,
            operation = query.function_name(),
            channel = self.config.channel(),
            contract = self.config.contract(),
        )
    )]
    pub async fn query(&self, query: &ClaimQuery, label: &Label) -> Result<Bytes> {
        let operation = query.function_name();
        let identity = self.resolve(label).await?;

        let started = Instant::now();
        let args = query.chaincode_args();
        let guard = self.open(&identity).await.map_err(|e| e.into_read_failure(operation))?;
        drop(identity);

        let result = match guard.session() {
            Ok(session) => evaluate_with_retry(
                &self.config.retry,
                self.config.evaluate_timeout(),
                operation,
                || session.evaluate(operation, &args),
            )
            .await
            .map_err(|e| e.into_read_failure(operation)),
            Err(e) => Err(e.into_read_failure(operation)),
        };

        self.release(guard).await;

        match &result {
            Ok(payload) => tracing::debug!(
                payload_len = payload.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "query evaluated"
            ),
            Err(e) => tracing::warn!(error = %e, "ledger read failed"),
        }
        result
    }

    /// Evaluates `query` and normalizes the payload into records.
    ///
    /// List queries yield the decoded list. Single-record queries yield zero
    /// or one record. Malformed payloads yield an empty list.
    ///
    /// # Errors
    ///
    /// As for [`query`](Self::query).
    pub async fn query_records(&self, query: &ClaimQuery, label: &Label) -> Result<Vec<Value>> {
        let payload = self.query(query, label).await?;
        if query.returns_list() {
            Ok(parse_records(&payload))
        } else {
            Ok(parse_record(&payload).into_iter().collect())
        }
    }

    /// Parses a named write and submits it.
    ///
    /// # Errors
    ///
    /// [`FabricError::UnsupportedOperation`] or
    /// [`FabricError::InvalidArguments`] before any lookup, then as for
    /// [`invoke`](Self::invoke).
    pub async fn invoke_named(
        &self,
        name: &str,
        args: &Arguments,
        label: &Label,
    ) -> Result<TransactionId> {
        let command = ClaimCommand::parse(name, args)?;
        self.invoke(&command, label).await
    }

    /// Parses a named query and returns the raw payload.
    ///
    /// # Errors
    ///
    /// [`FabricError::UnsupportedOperation`] or
    /// [`FabricError::InvalidArguments`] before any lookup, then as for
    /// [`query`](Self::query).
    pub async fn evaluate_named(
        &self,
        name: &str,
        args: &Arguments,
        label: &Label,
    ) -> Result<Bytes> {
        let query = ClaimQuery::parse(name, args)?;
        self.query(&query, label).await
    }

    /// Parses a named query, evaluates it, and normalizes the payload.
    ///
    /// # Errors
    ///
    /// [`FabricError::UnsupportedOperation`] or
    /// [`FabricError::InvalidArguments`] before any lookup, then as for
    /// [`query`](Self::query).
    pub async fn query_named(
        &self,
        name: &str,
        args: &Arguments,
        label: &Label,
    ) -> Result<Vec<Value>> {
        let query = ClaimQuery::parse(name, args)?;
        self.query_records(&query, label).await
    }

    /// Runs `operation` as a submit or an evaluate, by its kind.
    ///
    /// # Errors
    ///
    /// As for [`invoke`](Self::invoke) or [`query`](Self::query).
    pub async fn execute(
        &self,
        operation: &LedgerOperation,
        label: &Label,
    ) -> Result<LedgerResponse> {
        match operation {
            LedgerOperation::Command(command) => {
                self.invoke(command, label).await.map(LedgerResponse::Committed)
            },
            LedgerOperation::Query(query) => {
                self.query(query, label).await.map(LedgerResponse::Evaluated)
            },
        }
    }

    /// Parses any supported operation by name and runs it.
    ///
    /// # Errors
    ///
    /// [`FabricError::UnsupportedOperation`] or
    /// [`FabricError::InvalidArguments`] before any lookup, then as for
    /// [`execute`](Self::execute).
    pub async fn execute_named(
        &self,
        name: &str,
        args: &Arguments,
        label: &Label,
    ) -> Result<LedgerResponse> {
        let operation = LedgerOperation::parse(name, args)?;
        self.execute(&operation, label).await
    }

    async fn resolve(&self, label: &Label) -> Result<Identity> {
        self.store
            .get(label)
            .await?
            .ok_or_else(|| FabricError::UnknownIdentity { label: label.clone() })
    }

    async fn open(&self, identity: &Identity) -> Result<SessionGuard> {
        let connect_timeout = self.config.connect_timeout();
        match tokio::time::timeout(connect_timeout, self.connector.connect(identity)).await {
            Ok(session) => Ok(SessionGuard::new(identity.label.clone(), session?)),
            Err(_) => Err(FabricError::network(format!(
                "opening ledger session timed out after {}ms",
                connect_timeout.as_millis()
            ))),
        }
    }

    async fn release(&self, guard: SessionGuard) {
        let label = guard.label().clone();
        // A close that outlives the bound is dropped, and the guard aborts.
        match tokio::time::timeout(self.config.connect_timeout(), guard.close()).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => tracing::warn!(%label, error = %e, "failed to close ledger session"),
            Err(_) => tracing::warn!(%label, "closing ledger session timed out"),
        }
    }
}

/// Rejects identities whose role may not submit `command`.
fn authorise(identity: &Identity, command: &ClaimCommand) -> Result<()> {
    let allowed = command.allowed_roles();
    match identity.role() {
        Some(role) if allowed.contains(&role) => Ok(()),
        _ => Err(FabricError::MissingRole {
            label: identity.label.clone(),
            operation: command.function_name(),
            required: allowed,
        }),
    }
}
