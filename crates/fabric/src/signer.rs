//! Key generation, CSRs, and CA request authentication.
//!
//! Enrollment keys are P-256, generated locally; only the CSR leaves the
//! process. Registrar requests carry a token of the form
//! `base64(cert_pem) "." base64(signature)` where the signature is
//! ECDSA-P256-SHA256 (DER, low-S) over
//! `METHOD "." base64(path) "." base64(body) "." base64(cert_pem)`.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use claimnet_wallet::Identity;
use rcgen::{CertificateParams, DnType, KeyPair};
use ring::{
    rand::SystemRandom,
    signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair},
};
use zeroize::Zeroizing;

use crate::error::{FabricError, Result};

/// P-256 group order.
const CURVE_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xBC, 0xE6, 0xFA, 0xAD, 0xA7, 0x17, 0x9E, 0x84, 0xF3, 0xB9, 0xCA, 0xC2, 0xFC, 0x63, 0x25, 0x51,
];

/// Half the P-256 group order, rounded down.
const HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0x80, 0x00, 0x00, 0x00, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xDE, 0x73, 0x7D, 0x56, 0xD3, 0x8B, 0xCF, 0x42, 0x79, 0xDC, 0xE5, 0x61, 0x7E, 0x31, 0x92, 0xA8,
];

/// A freshly generated key and the CSR that binds it to an enrollment id.
pub(crate) struct CertificateRequest {
    pub(crate) csr_pem: String,
    pub(crate) private_key_pem: Zeroizing<String>,
}

/// Generates a P-256 key and a PEM CSR with `CN=common_name`.
pub(crate) fn generate_csr(common_name: &str) -> Result<CertificateRequest> {
    let key_pair = KeyPair::generate()
        .map_err(|e| FabricError::Crypto(format!("key generation failed: {e}")))?;

    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| FabricError::Crypto(format!("invalid CSR parameters: {e}")))?;
    params.distinguished_name.push(DnType::CommonName, common_name);

    let csr_pem = params
        .serialize_request(&key_pair)
        .and_then(|csr| csr.pem())
        .map_err(|e| FabricError::Crypto(format!("CSR construction failed: {e}")))?;

    Ok(CertificateRequest { csr_pem, private_key_pem: Zeroizing::new(key_pair.serialize_pem()) })
}

/// Signs CA requests on behalf of a registrar identity.
pub(crate) struct RequestSigner {
    key: EcdsaKeyPair,
    cert_b64: String,
    rng: SystemRandom,
}

impl RequestSigner {
    /// Loads the registrar's PKCS#8 key.
    pub(crate) fn from_identity(identity: &Identity) -> Result<Self> {
        let key_pair = KeyPair::from_pem(&identity.private_key).map_err(|e| {
            FabricError::Crypto(format!("private key of '{}' is unreadable: {e}", identity.label))
        })?;
        let der = Zeroizing::new(key_pair.serialize_der());

        let rng = SystemRandom::new();
        let key = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &der, &rng).map_err(
            |e| {
                FabricError::Crypto(format!(
                    "private key of '{}' is not a P-256 key: {e}",
                    identity.label
                ))
            },
        )?;

        Ok(Self { key, cert_b64: BASE64.encode(identity.certificate.as_bytes()), rng })
    }

    /// Builds the `Authorization` token for `method path` carrying `body`.
    pub(crate) fn auth_token(&self, method: &str, path: &str, body: &[u8]) -> Result<String> {
        let message = signing_payload(method, path, body, &self.cert_b64);
        let signature = self
            .key
            .sign(&self.rng, message.as_bytes())
            .map_err(|_| FabricError::Crypto("request signing failed".into()))?;
        let der = normalize_low_s(signature.as_ref())?;
        Ok(format!("{}.{}", self.cert_b64, BASE64.encode(der)))
    }
}

fn signing_payload(method: &str, path: &str, body: &[u8], cert_b64: &str) -> String {
    format!("{method}.{}.{}.{cert_b64}", BASE64.encode(path), BASE64.encode(body))
}

/// Rewrites a DER ECDSA signature so that `s <= n/2`.
///
/// The CA rejects high-S signatures; ring emits either form.
fn normalize_low_s(der: &[u8]) -> Result<Vec<u8>> {
    let malformed = || FabricError::Crypto("malformed ECDSA signature".into());

    let body = match der {
        [0x30, len, rest @ ..] if usize::from(*len) == rest.len() => rest,
        _ => return Err(malformed()),
    };
    let (r, rest) = read_integer(body).ok_or_else(malformed)?;
    let (s, rest) = read_integer(rest).ok_or_else(malformed)?;
    if !rest.is_empty() {
        return Err(malformed());
    }

    let r = to_scalar(r).ok_or_else(malformed)?;
    let mut s = to_scalar(s).ok_or_else(malformed)?;
    if s > HALF_ORDER {
        s = sub_scalar(&CURVE_ORDER, &s);
    }

    let r = encode_integer(&r);
    let s = encode_integer(&s);
    let mut out = Vec::with_capacity(2 + r.len() + s.len());
    out.push(0x30);
    out.push(u8::try_from(r.len() + s.len()).map_err(|_| malformed())?);
    out.extend_from_slice(&r);
    out.extend_from_slice(&s);
    Ok(out)
}

fn read_integer(input: &[u8]) -> Option<(&[u8], &[u8])> {
    match input {
        [0x02, len, rest @ ..] if usize::from(*len) <= rest.len() => {
            Some(rest.split_at(usize::from(*len)))
        },
        _ => None,
    }
}

/// Left-pads a big-endian DER integer magnitude to 32 bytes.
fn to_scalar(bytes: &[u8]) -> Option<[u8; 32]> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let magnitude = &bytes[start..];
    if magnitude.len() > 32 {
        return None;
    }
    let mut out = [0u8; 32];
    out[32 - magnitude.len()..].copy_from_slice(magnitude);
    Some(out)
}

fn sub_scalar(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut diff = i16::from(a[i]) - i16::from(b[i]) - borrow;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = diff as u8;
    }
    out
}

fn encode_integer(scalar: &[u8; 32]) -> Vec<u8> {
    let start = scalar.iter().position(|&b| b != 0).unwrap_or(31);
    let magnitude = &scalar[start..];
    let pad = magnitude[0] & 0x80 != 0;

    let mut out = Vec::with_capacity(3 + magnitude.len());
    out.push(0x02);
    out.push((magnitude.len() + usize::from(pad)) as u8);
    if pad {
        out.push(0x00);
    }
    out.extend_from_slice(magnitude);
    out
}
