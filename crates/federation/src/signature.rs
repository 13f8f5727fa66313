//! HTTP Signature implementation for `ActivityPub`.
//!
//! Implements draft-cavage-http-signatures for signing and verifying
//! server-to-server requests. Only RSA keys with SHA-256 are supported, which
//! is what the fediverse uses in practice (`rsa-sha256`, or `hs2019` with an
//! RSA key).

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1v15::{SigningKey, VerifyingKey},
};
use sha2::{Digest, Sha256};
use signature::{SignatureEncoding, Signer, Verifier};
use tracing::{debug, warn};
use url::Url;

/// Pseudo-header covering method and path.
pub const REQUEST_TARGET: &str = "(request-target)";

/// HTTP Signature error.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The private key PEM could not be read.
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
    /// The public key PEM could not be read.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    /// RSA signing failed.
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    /// The signature bytes are malformed.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),
    /// A signed header is absent from the request.
    #[error("Missing header: {0}")]
    MissingHeader(String),
    /// `keyId` or `signature` is missing.
    #[error("Invalid signature header")]
    InvalidSignatureHeader,
    /// Neither `rsa-sha256` nor `hs2019`.
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The URL to sign has no host.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// A header value could not be encoded.
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(String),
    /// The `Date` header is in no known format.
    #[error("Invalid date header format: {0}")]
    InvalidDateFormat(String),
}

/// HTTP Signature signer for outgoing requests.
pub struct HttpSigner {
    private_key: RsaPrivateKey,
    key_id: String,
}

impl HttpSigner {
    /// Create a new HTTP signer from a PEM-encoded private key.
    pub fn new(private_key_pem: &str, key_id: String) -> Result<Self, SignatureError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .map_err(|e| SignatureError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self {
            private_key,
            key_id,
        })
    }

    /// Sign a request and return the `Host`, `Date`, `Digest` (when there is a
    /// body) and `Signature` headers to send with it.
    pub fn sign_request(
        &self,
        method: &str,
        url: &Url,
        body: Option<&[u8]>,
    ) -> Result<HeaderMap, SignatureError> {
        let host = url
            .host_str()
            .ok_or_else(|| SignatureError::InvalidUrl("No host in URL".to_string()))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let query = url.query().map_or(String::new(), |q| format!("?{q}"));
        let request_target = format!("{} {}{query}", method.to_lowercase(), url.path());
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let digest = body.map(calculate_digest);

        let mut signed = vec![
            (REQUEST_TARGET, request_target),
            ("host", host.clone()),
            ("date", date.clone()),
        ];
        if let Some(digest) = &digest {
            signed.push(("digest", digest.clone()));
        }

        let signing_string = signed
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\n");

        debug!(signing_string = %signing_string, "Signing string");

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature_bytes = signing_key
            .try_sign(signing_string.as_bytes())
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;
        let signature = BASE64.encode(signature_bytes.to_bytes());

        let signature_header = format!(
            "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
            self.key_id,
            signed
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(" "),
            signature
        );

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "host", &host)?;
        insert_header(&mut headers, "date", &date)?;
        if let Some(digest) = &digest {
            insert_header(&mut headers, "digest", digest)?;
        }
        insert_header(&mut headers, "signature", &signature_header)?;

        Ok(headers)
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), SignatureError> {
    let value =
        HeaderValue::from_str(value).map_err(|e| SignatureError::InvalidHeaderValue(e.to_string()))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// HTTP Signature verifier for incoming requests.
pub struct HttpVerifier;

impl HttpVerifier {
    /// Parse the Signature header into components.
    pub fn parse_signature_header(header: &str) -> Result<SignatureComponents, SignatureError> {
        let mut key_id = None;
        let mut algorithm = None;
        let mut headers_list = None;
        let mut signature = None;

        // Parse key="value" pairs
        for part in header.split(',') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                let value = value.trim_matches('"');
                match key.trim() {
                    "keyId" => key_id = Some(value.to_string()),
                    "algorithm" => algorithm = Some(value.to_string()),
                    "headers" => headers_list = Some(value.to_string()),
                    "signature" => signature = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        let algorithm = algorithm.unwrap_or_else(|| "rsa-sha256".to_string());
        if !matches!(algorithm.as_str(), "rsa-sha256" | "hs2019") {
            return Err(SignatureError::UnsupportedAlgorithm(algorithm));
        }

        Ok(SignatureComponents {
            key_id: key_id.ok_or(SignatureError::InvalidSignatureHeader)?,
            algorithm,
            headers: headers_list
                .unwrap_or_else(|| "date".to_string())
                .split_whitespace()
                .map(str::to_lowercase)
                .collect(),
            signature: signature.ok_or(SignatureError::InvalidSignatureHeader)?,
        })
    }

    /// Rebuild the signing string the sender must have signed.
    pub fn signing_string(
        components: &SignatureComponents,
        method: &str,
        path_and_query: &str,
        headers: &HeaderMap,
    ) -> Result<String, SignatureError> {
        let mut signing_parts = Vec::with_capacity(components.headers.len());
        for name in &components.headers {
            let value = if name == REQUEST_TARGET {
                format!("{} {path_and_query}", method.to_lowercase())
            } else {
                headers
                    .get(name.as_str())
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| SignatureError::MissingHeader(name.clone()))?
                    .to_string()
            };
            signing_parts.push(format!("{name}: {value}"));
        }
        Ok(signing_parts.join("\n"))
    }

    /// Verify an HTTP signature using the given public key.
    ///
    /// `Ok(false)` means the signature is well-formed but does not match.
    pub fn verify(
        public_key_pem: &str,
        components: &SignatureComponents,
        method: &str,
        path_and_query: &str,
        headers: &HeaderMap,
    ) -> Result<bool, SignatureError> {
        let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
            .map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))?;

        let signing_string = Self::signing_string(components, method, path_and_query, headers)?;

        debug!(signing_string = %signing_string, "Verifying signing string");

        let signature_bytes = BASE64
            .decode(&components.signature)
            .map_err(|e| SignatureError::VerificationFailed(e.to_string()))?;

        let verifying_key = VerifyingKey::<Sha256>::new(public_key);
        let signature = rsa::pkcs1v15::Signature::try_from(signature_bytes.as_slice())
            .map_err(|e| SignatureError::VerificationFailed(e.to_string()))?;

        match verifying_key.verify(signing_string.as_bytes(), &signature) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, key_id = %components.key_id, "Signature verification failed");
                Ok(false)
            }
        }
    }
}

/// Parsed signature header components.
#[derive(Debug, Clone)]
pub struct SignatureComponents {
    /// IRI of the signing key.
    pub key_id: String,
    /// `rsa-sha256` or `hs2019`.
    pub algorithm: String,
    /// Lowercased names of the signed headers, in signing order.
    pub headers: Vec<String>,
    /// Base64 signature value.
    pub signature: String,
}

/// Calculate SHA-256 digest of a body.
#[must_use]
pub fn calculate_digest(body: &[u8]) -> String {
    let hash = Sha256::digest(body);
    format!("SHA-256={}", BASE64.encode(hash))
}

/// Verify that a digest header matches the body.
///
/// The header may list several algorithms; its `SHA-256` entry must match.
#[must_use]
pub fn verify_digest(body: &[u8], digest_header: &str) -> bool {
    let expected = BASE64.encode(Sha256::digest(body));
    digest_header
        .split(',')
        .filter_map(|entry| entry.trim().split_once('='))
        .any(|(algorithm, value)| algorithm.eq_ignore_ascii_case("SHA-256") && value == expected)
}

/// Whether `headers` carries no `Digest`, or one matching `body`.
#[must_use]
pub fn digest_matches(headers: &HeaderMap, body: &[u8]) -> bool {
    match headers.get("digest") {
        None => true,
        Some(value) => value.to_str().is_ok_and(|digest| verify_digest(body, digest)),
    }
}

/// Parse an HTTP `Date` header.
pub fn parse_http_date(date_str: &str) -> Result<DateTime<Utc>, SignatureError> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Ok(dt.with_timezone(&Utc));
    }

    let formats = [
        "%a, %d %b %Y %H:%M:%S GMT", // RFC 7231
        "%A, %d-%b-%y %H:%M:%S GMT", // RFC 850
        "%a %b %e %H:%M:%S %Y",      // asctime()
    ];

    for format in &formats {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, format) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
        }
    }

    Err(SignatureError::InvalidDateFormat(date_str.to_string()))
}
