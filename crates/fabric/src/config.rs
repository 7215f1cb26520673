//! Configuration for the CA client and the ledger gateway.
//!
//! All types deserialize from JSON/TOML with `humantime` durations
//! (`"30s"`, `"250ms"`) and have validating builders.
//!
//! # TLS verification
//!
//! Certificate-chain verification is on by default. Turning it off requires
//! spelling out [`TlsVerification::InsecureSkipVerify`]; every client built
//! with it logs a warning naming the endpoint.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{FabricError, Result};

/// Default CA request timeout (30 seconds).
pub const DEFAULT_CA_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a ledger evaluate, retries included (15 seconds).
pub const DEFAULT_EVALUATE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bound on a ledger submit (60 seconds).
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum retries for transient read failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default initial backoff between retries.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Default cap on backoff between retries.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Server certificate verification mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsVerification {
    /// Verify the server chain against the configured trust roots.
    #[default]
    Verify,
    /// Accept any server certificate. Audited opt-in only.
    InsecureSkipVerify,
}

/// TLS settings shared by CA and gateway clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsSettings {
    /// PEM trust roots. Empty means the built-in web PKI roots.
    #[serde(default)]
    pub trusted_roots: Vec<String>,

    /// Verification mode.
    #[serde(default)]
    pub verification: TlsVerification,
}

/// Parses an endpoint URL and requires `https`.
fn parse_https_url(field: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| FabricError::Config(format!("{field} '{raw}' is not a valid URL: {e}")))?;
    if url.scheme() != "https" {
        return Err(FabricError::Config(format!("{field} '{raw}' must use https")));
    }
    Ok(url)
}

/// Retry policy for transient failures.
///
/// Backoff doubles per attempt from `initial_backoff`, is capped at
/// `max_backoff`, and gets 0–50% random jitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum retries after the first attempt. Zero disables retry.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    pub initial_backoff: Duration,

    /// Upper bound on the delay between retries.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    pub max_backoff: Duration,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}

fn default_max_backoff() -> Duration {
    DEFAULT_MAX_BACKOFF
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

#[bon::bon]
impl RetryConfig {
    /// Creates a retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Config`] if `initial_backoff` is zero or
    /// exceeds `max_backoff`.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_RETRIES)] max_retries: u32,
        #[builder(default = DEFAULT_INITIAL_BACKOFF)] initial_backoff: Duration,
        #[builder(default = DEFAULT_MAX_BACKOFF)] max_backoff: Duration,
    ) -> Result<Self> {
        if initial_backoff.is_zero() {
            return Err(FabricError::Config("initial_backoff must be greater than zero".into()));
        }
        if initial_backoff > max_backoff {
            return Err(FabricError::Config(
                "initial_backoff must not exceed max_backoff".into(),
            ));
        }
        Ok(Self { max_retries, initial_backoff, max_backoff })
    }
}

/// Configuration for [`HttpCertificateAuthority`](crate::HttpCertificateAuthority).
///
/// # Example
///
/// ```
/// use claimnet_fabric::CaConfig;
///
/// let config = CaConfig::builder()
///     .url("https://ca.org1.example.com:7054")
///     .ca_name("ca-org1")
///     .trusted_roots(vec!["-----BEGIN CERTIFICATE-----\n...".to_owned()])
///     .build()?;
///
/// assert!(!config.tls().verification.eq(&claimnet_fabric::TlsVerification::InsecureSkipVerify));
/// # Ok::<(), claimnet_fabric::FabricError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaConfig {
    /// CA base URL.
    pub(crate) url: String,

    /// CA instance name on a multi-CA server.
    pub(crate) ca_name: String,

    /// TLS settings.
    #[serde(default)]
    pub(crate) tls: TlsSettings,

    /// Request timeout.
    #[serde(with = "humantime_serde", default = "default_ca_timeout")]
    pub(crate) timeout: Duration,

    /// Connection timeout.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub(crate) connect_timeout: Duration,
}

fn default_ca_timeout() -> Duration {
    DEFAULT_CA_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

#[bon::bon]
impl CaConfig {
    /// Creates a CA configuration, validating all fields.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Config`] if the URL is not `https`, the CA
    /// name is empty, or a timeout is zero.
    #[builder]
    pub fn new(
        #[builder(into)] url: String,
        #[builder(into)] ca_name: String,
        #[builder(default)] trusted_roots: Vec<String>,
        #[builder(default)] tls_verification: TlsVerification,
        #[builder(default = DEFAULT_CA_TIMEOUT)] timeout: Duration,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
    ) -> Result<Self> {
        let config = Self {
            url,
            ca_name,
            tls: TlsSettings { trusted_roots, verification: tls_verification },
            timeout,
            connect_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates a configuration, e.g. one obtained by deserialization.
    ///
    /// # Errors
    ///
    /// See [`CaConfig::builder`].
    pub fn validate(&self) -> Result<()> {
        parse_https_url("ca url", &self.url)?;
        if self.ca_name.trim().is_empty() {
            return Err(FabricError::Config("ca_name cannot be empty".into()));
        }
        if self.timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(FabricError::Config("CA timeouts must be greater than zero".into()));
        }
        Ok(())
    }

    /// Returns the CA base URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the CA name.
    #[must_use]
    pub fn ca_name(&self) -> &str {
        &self.ca_name
    }

    /// Returns the TLS settings.
    #[must_use]
    pub fn tls(&self) -> &TlsSettings {
        &self.tls
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Resolves `{url}/api/v1/{endpoint}`.
    pub(crate) fn endpoint(&self, endpoint: &str) -> Result<Url> {
        let base = parse_https_url("ca url", &self.url)?;
        let path = format!("{}/api/v1/{endpoint}", base.path().trim_end_matches('/'));
        let mut url = base;
        url.set_path(&path);
        Ok(url)
    }
}

/// Configuration for the ledger gateway.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use claimnet_fabric::GatewayConfig;
///
/// let config = GatewayConfig::builder()
///     .endpoint("https://gateway.org1.example.com:8443")
///     .channel("claims")
///     .contract("claimcc")
///     .evaluate_timeout(Duration::from_secs(5))
///     .build()?;
///
/// assert_eq!(config.channel(), "claims");
/// # Ok::<(), claimnet_fabric::FabricError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Gateway base URL.
    pub(crate) endpoint: String,

    /// Channel hosting the contract.
    pub(crate) channel: String,

    /// Chaincode contract name.
    pub(crate) contract: String,

    /// TLS settings.
    #[serde(default)]
    pub(crate) tls: TlsSettings,

    /// Bound on establishing a session.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub(crate) connect_timeout: Duration,

    /// Bound on an evaluate, retries included.
    #[serde(with = "humantime_serde", default = "default_evaluate_timeout")]
    pub(crate) evaluate_timeout: Duration,

    /// Bound on a submit.
    #[serde(with = "humantime_serde", default = "default_submit_timeout")]
    pub(crate) submit_timeout: Duration,

    /// Retry policy for evaluates.
    #[serde(default)]
    pub(crate) retry: RetryConfig,
}

fn default_evaluate_timeout() -> Duration {
    DEFAULT_EVALUATE_TIMEOUT
}

fn default_submit_timeout() -> Duration {
    DEFAULT_SUBMIT_TIMEOUT
}

#[bon::bon]
impl GatewayConfig {
    /// Creates a gateway configuration, validating all fields.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Config`] if the endpoint is not `https`, the
    /// channel or contract is empty, or a timeout is zero.
    #[builder]
    pub fn new(
        #[builder(into)] endpoint: String,
        #[builder(into)] channel: String,
        #[builder(into)] contract: String,
        #[builder(default)] trusted_roots: Vec<String>,
        #[builder(default)] tls_verification: TlsVerification,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(default = DEFAULT_EVALUATE_TIMEOUT)] evaluate_timeout: Duration,
        #[builder(default = DEFAULT_SUBMIT_TIMEOUT)] submit_timeout: Duration,
        #[builder(default)] retry: RetryConfig,
    ) -> Result<Self> {
        let config = Self {
            endpoint,
            channel,
            contract,
            tls: TlsSettings { trusted_roots, verification: tls_verification },
            connect_timeout,
            evaluate_timeout,
            submit_timeout,
            retry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates a configuration, e.g. one obtained by deserialization.
    ///
    /// # Errors
    ///
    /// See [`GatewayConfig::builder`].
    pub fn validate(&self) -> Result<()> {
        parse_https_url("gateway endpoint", &self.endpoint)?;
        if self.channel.trim().is_empty() {
            return Err(FabricError::Config("channel cannot be empty".into()));
        }
        if self.contract.trim().is_empty() {
            return Err(FabricError::Config("contract cannot be empty".into()));
        }
        if self.connect_timeout.is_zero()
            || self.evaluate_timeout.is_zero()
            || self.submit_timeout.is_zero()
        {
            return Err(FabricError::Config("gateway timeouts must be greater than zero".into()));
        }
        Ok(())
    }

    /// Returns the gateway endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns the contract name.
    #[must_use]
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Returns the TLS settings.
    #[must_use]
    pub fn tls(&self) -> &TlsSettings {
        &self.tls
    }

    /// Returns the session connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the evaluate timeout.
    #[must_use]
    pub fn evaluate_timeout(&self) -> Duration {
        self.evaluate_timeout
    }

    /// Returns the submit timeout.
    #[must_use]
    pub fn submit_timeout(&self) -> Duration {
        self.submit_timeout
    }

    /// Returns the evaluate retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Resolves `{endpoint}/channels/{channel}/contracts/{contract}/{action}`.
    pub(crate) fn contract_url(&self, action: &str) -> Result<Url> {
        let base = parse_https_url("gateway endpoint", &self.endpoint)?;
        let path = format!(
            "{}/channels/{}/contracts/{}/{action}",
            base.path().trim_end_matches('/'),
            self.channel,
            self.contract
        );
        let mut url = base;
        url.set_path(&path);
        Ok(url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ca() -> CaConfig {
        CaConfig::builder().url("https://localhost:7054").ca_name("ca-org1").build().unwrap()
    }

    #[test]
    fn test_ca_defaults_verify_tls() {
        let config = ca();
        assert_eq!(config.tls().verification, TlsVerification::Verify);
        assert_eq!(config.timeout(), DEFAULT_CA_TIMEOUT);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_ca_rejects_plain_http() {
        let result = CaConfig::builder().url("http://localhost:7054").ca_name("ca-org1").build();
        assert!(matches!(result, Err(FabricError::Config(msg)) if msg.contains("https")));
    }

    #[test]
    fn test_ca_rejects_empty_name() {
        let result = CaConfig::builder().url("https://localhost:7054").ca_name(" ").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_ca_endpoint_keeps_base_path() {
        let config = CaConfig::builder()
            .url("https://ca.example.com:7054/prefix/")
            .ca_name("ca")
            .build()
            .unwrap();
        assert_eq!(
            config.endpoint("enroll").unwrap().as_str(),
            "https://ca.example.com:7054/prefix/api/v1/enroll"
        );
        assert_eq!(
            ca().endpoint("register").unwrap().as_str(),
            "https://localhost:7054/api/v1/register"
        );
    }

    #[test]
    fn test_ca_deserialization_defaults_to_verify() {
        let json = r#"{ "url": "https://localhost:7054", "ca_name": "ca-org1" }"#;
        let config: CaConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.tls().verification, TlsVerification::Verify);
        assert_eq!(config.timeout(), DEFAULT_CA_TIMEOUT);
    }

    #[test]
    fn test_insecure_must_be_spelled_out() {
        let json = r#"{
            "url": "https://localhost:7054",
            "ca_name": "ca-org1",
            "tls": { "verification": "insecure_skip_verify" },
            "timeout": "10s"
        }"#;
        let config: CaConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.tls().verification, TlsVerification::InsecureSkipVerify);
        assert_eq!(config.timeout(), Duration::from_secs(10));

        let bogus = r#"{ "url": "https://x", "ca_name": "c", "tls": { "verification": false } }"#;
        assert!(serde_json::from_str::<CaConfig>(bogus).is_err());
    }

    #[test]
    fn test_gateway_contract_url() {
        let config = GatewayConfig::builder()
            .endpoint("https://gw.example.com:8443")
            .channel("claims")
            .contract("claimcc")
            .build()
            .unwrap();

        assert_eq!(
            config.contract_url("evaluate").unwrap().as_str(),
            "https://gw.example.com:8443/channels/claims/contracts/claimcc/evaluate"
        );
        assert_eq!(config.evaluate_timeout(), DEFAULT_EVALUATE_TIMEOUT);
        assert_eq!(config.submit_timeout(), DEFAULT_SUBMIT_TIMEOUT);
    }

    #[test]
    fn test_gateway_rejects_empty_channel_and_zero_timeout() {
        let result = GatewayConfig::builder()
            .endpoint("https://gw.example.com")
            .channel("")
            .contract("claimcc")
            .build();
        assert!(result.is_err());

        let result = GatewayConfig::builder()
            .endpoint("https://gw.example.com")
            .channel("claims")
            .contract("claimcc")
            .submit_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_retry_builder_validation() {
        assert!(RetryConfig::builder().initial_backoff(Duration::ZERO).build().is_err());
        assert!(
            RetryConfig::builder()
                .initial_backoff(Duration::from_secs(10))
                .max_backoff(Duration::from_secs(1))
                .build()
                .is_err()
        );

        let built = RetryConfig::builder().build().unwrap();
        assert_eq!(built, RetryConfig::default());
    }
}
