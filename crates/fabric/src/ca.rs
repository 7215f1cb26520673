//! Certificate authority client.
//!
//! [`CertificateAuthority`] is the seam between provisioning logic and the
//! CA. [`HttpCertificateAuthority`] speaks the Fabric CA REST protocol:
//!
//! - `POST /api/v1/enroll`, basic auth `enrollment_id:secret`, body carrying a
//!   CSR for a key generated in-process. The response holds the signed
//!   certificate, base64-encoded.
//! - `POST /api/v1/register`, authorised by a token signed with the
//!   registrar's key. The response holds the one-time
//!   enrollment secret for the new identity.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use claimnet_wallet::{Identity, IdentityAttributes, Label};
use reqwest::{StatusCode, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::{
    config::CaConfig,
    error::{FabricError, Result},
    signer::{RequestSigner, generate_csr},
    tls::{ClientTimeouts, build_client},
};

/// CA error code for an identity that is already registered.
const CODE_ALREADY_REGISTERED: i64 = 74;

/// CA error code for an authentication failure.
const CODE_AUTH_FAILURE: i64 = 20;

/// Credentials presented to enroll.
#[derive(Clone)]
pub struct EnrollmentRequest {
    /// Enrollment id known to the CA.
    pub enrollment_id: String,
    /// Enrollment secret.
    pub secret: Zeroizing<String>,
}

impl EnrollmentRequest {
    /// Creates an enrollment request.
    #[must_use]
    pub fn new(enrollment_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { enrollment_id: enrollment_id.into(), secret: Zeroizing::new(secret.into()) }
    }
}

impl fmt::Debug for EnrollmentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrollmentRequest")
            .field("enrollment_id", &self.enrollment_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Certificate and key produced by a successful enrollment.
#[derive(Clone)]
pub struct EnrolledCredentials {
    /// PEM enrollment certificate.
    pub certificate: String,
    /// PEM PKCS#8 private key generated for the enrollment.
    pub private_key: Zeroizing<String>,
}

impl EnrolledCredentials {
    /// Binds the credentials to a label, producing a storable [`Identity`].
    #[must_use]
    pub fn into_identity(
        self,
        label: Label,
        msp_id: impl Into<String>,
        attributes: Option<IdentityAttributes>,
    ) -> Identity {
        Identity::builder()
            .label(label)
            .certificate(self.certificate)
            .private_key(self.private_key)
            .msp_id(msp_id)
            .maybe_attributes(attributes)
            .build()
    }
}

impl fmt::Debug for EnrolledCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrolledCredentials")
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// A new identity to register at the CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    /// Enrollment id for the new identity.
    pub enrollment_id: String,
    /// Affiliation, e.g. `org1.department1`.
    pub affiliation: String,
    /// Attributes embedded into the enrollment certificate.
    pub attributes: IdentityAttributes,
    /// How many times the secret may be used. Zero means unlimited.
    pub max_enrollments: u32,
}

impl RegistrationRequest {
    /// Creates a request whose secret is good for a single enrollment.
    #[must_use]
    pub fn new(
        enrollment_id: impl Into<String>,
        affiliation: impl Into<String>,
        attributes: IdentityAttributes,
    ) -> Self {
        Self {
            enrollment_id: enrollment_id.into(),
            affiliation: affiliation.into(),
            attributes,
            max_enrollments: 1,
        }
    }
}

/// Enrollment and registration exchanges with a certificate authority.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Exchanges an enrollment id and secret for a certificate and key.
    ///
    /// # Errors
    ///
    /// - [`FabricError::Auth`] when the CA rejects the credentials.
    /// - [`FabricError::Network`] when the CA is unreachable, TLS fails, or the
    ///   request times out.
    async fn enroll(&self, request: &EnrollmentRequest) -> Result<EnrolledCredentials>;

    /// Registers a new identity under `registrar`'s authority and returns its
    /// one-time enrollment secret.
    ///
    /// # Errors
    ///
    /// - [`FabricError::AlreadyRegistered`] when the id is taken.
    /// - [`FabricError::RegistrarAuth`] when the CA rejects the registrar.
    /// - [`FabricError::Network`] as for [`enroll`](Self::enroll).
    async fn register(
        &self,
        request: &RegistrationRequest,
        registrar: &Identity,
    ) -> Result<Zeroizing<String>>;
}

#[async_trait]
impl<C: CertificateAuthority + ?Sized> CertificateAuthority for Arc<C> {
    async fn enroll(&self, request: &EnrollmentRequest) -> Result<EnrolledCredentials> {
        (**self).enroll(request).await
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
        registrar: &Identity,
    ) -> Result<Zeroizing<String>> {
        (**self).register(request, registrar).await
    }
}

/// Fabric CA REST client.
#[derive(Debug, Clone)]
pub struct HttpCertificateAuthority {
    config: Arc<CaConfig>,
    client: reqwest::Client,
}

impl HttpCertificateAuthority {
    /// Creates a client for the CA described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Config`] if the configuration is invalid or the
    /// trust roots cannot be loaded.
    pub fn new(config: CaConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(
            config.url(),
            config.tls(),
            ClientTimeouts { connect: config.connect_timeout(), request: Some(config.timeout()) },
            None,
        )?;
        Ok(Self { config: Arc::new(config), client })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CaConfig {
        &self.config
    }
}

#[async_trait]
impl CertificateAuthority for HttpCertificateAuthority {
    #[tracing::instrument(
        skip(self, request),
        fields(enrollment_id = %request.enrollment_id, ca = %self.config.ca_name())
    )]
    async fn enroll(&self, request: &EnrollmentRequest) -> Result<EnrolledCredentials> {
        let csr = generate_csr(&request.enrollment_id)?;
        let url = self.config.endpoint("enroll")?;
        let body = EnrollBody { certificate_request: &csr.csr_pem, caname: self.config.ca_name() };

        let response = self
            .client
            .post(url)
            .basic_auth(&request.enrollment_id, Some(request.secret.as_str()))
            .json(&body)
            .send()
            .await?;

        let call = CaCall::Enroll { enrollment_id: &request.enrollment_id };
        let result: EnrollResult = read_result(response, call).await?;

        let certificate = BASE64
            .decode(result.cert.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| FabricError::Ca {
                status: StatusCode::OK.as_u16(),
                code: None,
                message: "enrollment certificate is not base64 PEM".into(),
            })?;

        tracing::info!("enrollment succeeded");
        Ok(EnrolledCredentials { certificate, private_key: csr.private_key_pem })
    }

    #[tracing::instrument(
        skip(self, request, registrar),
        fields(
            enrollment_id = %request.enrollment_id,
            registrar = %registrar.label,
            role = %request.attributes.role,
        )
    )]
    async fn register(
        &self,
        request: &RegistrationRequest,
        registrar: &Identity,
    ) -> Result<Zeroizing<String>> {
        let url = self.config.endpoint("register")?;
        let body = RegisterBody::new(request, self.config.ca_name());
        let body = serde_json::to_vec(&body)
            .map_err(|e| FabricError::Crypto(format!("failed to encode registration: {e}")))?;

        let token = RequestSigner::from_identity(registrar)?.auth_token("POST", url.path(), &body)?;

        let response = self
            .client
            .post(url)
            .header(header::AUTHORIZATION, token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let call = CaCall::Register { registrar: &registrar.label, id: &request.enrollment_id };
        let result: RegisterResult = read_result(response, call).await?;

        tracing::info!("registration succeeded");
        Ok(result.secret)
    }
}

/// Which exchange a response belongs to, for error classification.
#[derive(Debug, Clone, Copy)]
enum CaCall<'a> {
    Enroll { enrollment_id: &'a str },
    Register { registrar: &'a Label, id: &'a str },
}

async fn read_result<T: DeserializeOwned>(
    response: reqwest::Response,
    call: CaCall<'_>,
) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await?;
    decode_envelope(call, status, &bytes)
}

/// Extracts `result` from a CA response envelope, or classifies its errors.
///
/// Error envelopes carry `"result": ""`, so `result` is only typed once the
/// envelope reports success.
fn decode_envelope<T: DeserializeOwned>(
    call: CaCall<'_>,
    status: StatusCode,
    bytes: &[u8],
) -> Result<T> {
    let malformed =
        |message: String| FabricError::Ca { status: status.as_u16(), code: None, message };

    match serde_json::from_slice::<CaResponse>(bytes) {
        Ok(envelope) if status.is_success() && envelope.success => match envelope.result {
            Value::Null => Err(malformed("response carried no result".into())),
            result => serde_json::from_value(result)
                .map_err(|e| malformed(format!("malformed CA result: {e}"))),
        },
        Ok(envelope) => Err(classify(call, status, &envelope.errors)),
        Err(e) if status.is_success() => Err(malformed(format!("malformed CA response: {e}"))),
        Err(_) => {
            let text = String::from_utf8_lossy(bytes);
            let message = CaMessage { code: None, message: text.chars().take(256).collect() };
            Err(classify(call, status, std::slice::from_ref(&message)))
        },
    }
}

/// Maps a CA error response onto the error taxonomy.
fn classify(call: CaCall<'_>, status: StatusCode, errors: &[CaMessage]) -> FabricError {
    let code = errors.iter().find_map(|e| e.code);
    let message = if errors.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_owned()
    } else {
        errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ")
    };

    let already_registered = code == Some(CODE_ALREADY_REGISTERED)
        || message.to_ascii_lowercase().contains("already registered");
    let unauthorised = status == StatusCode::UNAUTHORIZED || code == Some(CODE_AUTH_FAILURE);

    if matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    ) {
        let status = status.as_u16();
        return FabricError::network(format!("CA unavailable (HTTP {status}): {message}"));
    }

    match call {
        CaCall::Register { id, .. } if already_registered => {
            FabricError::AlreadyRegistered { id: id.to_owned() }
        },
        CaCall::Register { registrar, .. } if unauthorised || status == StatusCode::FORBIDDEN => {
            FabricError::RegistrarAuth { registrar: registrar.to_string(), message }
        },
        CaCall::Enroll { enrollment_id } if unauthorised => {
            FabricError::Auth { enrollment_id: enrollment_id.to_owned(), message }
        },
        _ => FabricError::Ca { status: status.as_u16(), code, message },
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EnrollBody<'a> {
    certificate_request: &'a str,
    caname: &'a str,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    identity_type: &'static str,
    affiliation: &'a str,
    max_enrollments: u32,
    attrs: Vec<CaAttribute<'a>>,
    caname: &'a str,
}

impl<'a> RegisterBody<'a> {
    fn new(request: &'a RegistrationRequest, caname: &'a str) -> Self {
        Self {
            id: &request.enrollment_id,
            identity_type: "client",
            affiliation: &request.affiliation,
            max_enrollments: request.max_enrollments,
            attrs: vec![
                CaAttribute { name: "role", value: request.attributes.role.as_str(), ecert: true },
                CaAttribute { name: "uuid", value: &request.attributes.user_uuid, ecert: true },
            ],
            caname,
        }
    }
}

#[derive(Serialize)]
struct CaAttribute<'a> {
    name: &'static str,
    value: &'a str,
    ecert: bool,
}

#[derive(Deserialize)]
struct CaResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    errors: Vec<CaMessage>,
}

#[derive(Deserialize)]
struct CaMessage {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct EnrollResult {
    #[serde(rename = "Cert")]
    cert: String,
}

#[derive(Deserialize)]
struct RegisterResult {
    secret: Zeroizing<String>,
}
