//! Request authentication.
//!
//! An [`Authenticator`] decides whether a request was signed by a known
//! actor. A negative answer is `Ok((ctx, false))`; `Err` is reserved for
//! failures to reach an answer at all, such as a key server that times out.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{Method, request::Parts};
use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::client::ApClient;
use crate::context::RequestContext;
use crate::error::OracleError;
use crate::signature::{HttpVerifier, REQUEST_TARGET, SignatureComponents, parse_http_date};

/// Decides whether a request comes from a known actor.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns the context, attributed to the requester when authenticated.
    async fn authenticate(
        &self,
        parts: &Parts,
        ctx: RequestContext,
    ) -> Result<(RequestContext, bool), OracleError>;
}

/// A public key and the actor it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedKey {
    /// Actor the key belongs to.
    pub owner: Url,
    /// SPKI PEM of the RSA public key.
    pub public_key_pem: String,
}

/// Looks up signing keys by `keyId`.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// `Ok(None)` when no such key exists.
    async fn resolve(&self, key_id: &Url) -> Result<Option<ResolvedKey>, OracleError>;
}

/// Keys registered up front.
#[derive(Default)]
pub struct StaticKeyResolver {
    keys: RwLock<HashMap<Url, ResolvedKey>>,
}

impl StaticKeyResolver {
    /// A resolver that knows no keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the key `key_id`.
    pub async fn insert(&self, key_id: Url, key: ResolvedKey) {
        self.keys.write().await.insert(key_id, key);
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, key_id: &Url) -> Result<Option<ResolvedKey>, OracleError> {
        Ok(self.keys.read().await.get(key_id).cloned())
    }
}

/// Dereferences `keyId` over HTTP.
///
/// Accepts both an actor document with an embedded `publicKey` and a bare
/// key document carrying `owner` and `publicKeyPem`.
#[derive(Clone)]
pub struct RemoteKeyResolver {
    client: ApClient,
}

impl RemoteKeyResolver {
    /// Fetch keys with `client`.
    #[must_use]
    pub const fn new(client: ApClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeyResolver for RemoteKeyResolver {
    async fn resolve(&self, key_id: &Url) -> Result<Option<ResolvedKey>, OracleError> {
        let mut document_iri = key_id.clone();
        document_iri.set_fragment(None);

        let document = match self.client.fetch_object(&document_iri).await {
            Ok(document) => document,
            Err(e) if e.is_gone() => {
                debug!(key_id = %key_id, "Signing key is gone");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(key_from_document(&document, key_id))
    }
}

/// Pick the key `key_id` out of an actor or key document.
fn key_from_document(document: &Value, key_id: &Url) -> Option<ResolvedKey> {
    let candidates: Vec<&Value> = match document.get("publicKey") {
        Some(Value::Array(keys)) => keys.iter().collect(),
        Some(key) => vec![key],
        None => vec![document],
    };

    candidates.into_iter().find_map(|key| {
        if key.get("id").and_then(Value::as_str) != Some(key_id.as_str()) {
            return None;
        }
        let owner = key
            .get("owner")
            .or_else(|| document.get("id"))
            .and_then(Value::as_str)
            .and_then(|s| Url::parse(s).ok())?;
        let public_key_pem = key.get("publicKeyPem").and_then(Value::as_str)?;

        Some(ResolvedKey {
            owner,
            public_key_pem: public_key_pem.to_string(),
        })
    })
}

/// The first header a signature over this request must cover but does not.
///
/// Requests that may carry a body must sign both the request target and
/// the body digest, or the signature could be replayed with another body.
fn uncovered_header(parts: &Parts, components: &SignatureComponents) -> Option<&'static str> {
    if parts.method == Method::GET || parts.method == Method::HEAD {
        return None;
    }
    [REQUEST_TARGET, "digest"]
        .into_iter()
        .find(|required| !components.headers.iter().any(|h| h.as_str() == *required))
}

/// Verifies draft-cavage HTTP signatures.
pub struct HttpSignatureAuthenticator<K> {
    resolver: K,
    max_clock_skew: Duration,
}

impl<K: KeyResolver> HttpSignatureAuthenticator<K> {
    /// Accept `Date` headers within `max_clock_skew_secs` of local time.
    #[must_use]
    pub const fn new(resolver: K, max_clock_skew_secs: i64) -> Self {
        Self {
            resolver,
            max_clock_skew: Duration::seconds(max_clock_skew_secs),
        }
    }

    fn date_in_window(&self, parts: &Parts) -> bool {
        let Some(date) = parts.headers.get("date").and_then(|v| v.to_str().ok()) else {
            debug!("Request has no Date header");
            return false;
        };

        match parse_http_date(date) {
            Ok(sent) => {
                let skew = Utc::now().signed_duration_since(sent);
                if skew.abs() > self.max_clock_skew {
                    warn!(
                        date_header = %date,
                        clock_skew_secs = skew.num_seconds(),
                        max_allowed_secs = self.max_clock_skew.num_seconds(),
                        "Signature expired due to clock skew"
                    );
                    false
                } else {
                    true
                }
            }
            Err(e) => {
                debug!(error = %e, "Unparseable Date header");
                false
            }
        }
    }
}

#[async_trait]
impl<K: KeyResolver> Authenticator for HttpSignatureAuthenticator<K> {
    async fn authenticate(
        &self,
        parts: &Parts,
        ctx: RequestContext,
    ) -> Result<(RequestContext, bool), OracleError> {
        let Some(header) = parts.headers.get("signature").and_then(|v| v.to_str().ok()) else {
            debug!("Request is not signed");
            return Ok((ctx, false));
        };

        let components = match HttpVerifier::parse_signature_header(header) {
            Ok(components) => components,
            Err(e) => {
                debug!(error = %e, "Invalid Signature header");
                return Ok((ctx, false));
            }
        };

        if let Some(missing) = uncovered_header(parts, &components) {
            debug!(header = missing, "Signature does not cover a required header");
            return Ok((ctx, false));
        }

        if !self.date_in_window(parts) {
            return Ok((ctx, false));
        }

        let Ok(key_id) = Url::parse(&components.key_id) else {
            debug!(key_id = %components.key_id, "keyId is not an IRI");
            return Ok((ctx, false));
        };

        let Some(key) = self.resolver.resolve(&key_id).await? else {
            debug!(key_id = %key_id, "Unknown signing key");
            return Ok((ctx, false));
        };

        let path_and_query = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path(), |pq| pq.as_str());

        match HttpVerifier::verify(
            &key.public_key_pem,
            &components,
            parts.method.as_str(),
            path_and_query,
            &parts.headers,
        ) {
            Ok(true) => {
                debug!(requester = %key.owner, "Request authenticated");
                Ok((ctx.with_requester(key.owner), true))
            }
            Ok(false) => Ok((ctx, false)),
            Err(e) => {
                debug!(error = %e, key_id = %key_id, "Signature could not be checked");
                Ok((ctx, false))
            }
        }
    }
}
