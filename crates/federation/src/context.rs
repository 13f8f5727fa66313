//! Per-request context threaded through inbox processing.
//!
//! [`RequestContext`] holds what is known before the body is read; the
//! authenticator adds the requester to it. Once the activity is resolved,
//! [`enrich`] turns it into a [`DeliveryContext`] listing every IRI the
//! activity touches, which is what authorization decides on.

use std::collections::BTreeSet;

use axum::http::{HeaderMap, header, request::Parts};
use url::Url;

use crate::activities::{Activity, ApObject, ObjectRef};

/// How deep embedded objects are followed when collecting IRIs.
const MAX_EMBED_DEPTH: usize = 8;

/// Request facts available before authentication.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// `User-Agent` of the request.
    pub user_agent: Option<String>,
    /// Request path, without the query.
    pub path: String,
    /// The actor that signed the request, once authenticated.
    pub requester: Option<Url>,
}

impl RequestContext {
    /// Capture the loggable facts of a request.
    #[must_use]
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            user_agent: header_str(&parts.headers, header::USER_AGENT.as_str()).map(String::from),
            path: parts.uri.path().to_string(),
            requester: None,
        }
    }

    /// The same context, attributed to `requester`.
    #[must_use]
    pub fn with_requester(self, requester: Url) -> Self {
        Self {
            requester: Some(requester),
            ..self
        }
    }
}

/// Everything authorization and side effects need to know about a delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryContext {
    /// What was known before the body was read.
    pub request: RequestContext,
    /// The IRI of the inbox the activity was POSTed to.
    pub inbox: Url,
    /// Owner of `inbox`; `None` for the shared inbox.
    pub receiver: Option<Url>,
    /// Id of the activity being delivered.
    pub activity_id: Url,
    /// IRIs in the activity's `actor` property.
    pub actors: BTreeSet<Url>,
    /// Every IRI the activity references, transitively, actors included.
    pub involved: BTreeSet<Url>,
}

impl DeliveryContext {
    /// The requester and the activity's actors.
    #[must_use]
    pub fn direct_parties(&self) -> BTreeSet<&Url> {
        self.request.requester.iter().chain(&self.actors).collect()
    }

    /// Involved IRIs that are neither a direct party nor the receiver.
    #[must_use]
    pub fn other_parties(&self) -> BTreeSet<&Url> {
        let direct = self.direct_parties();
        self.involved
            .iter()
            .filter(|iri| !direct.contains(iri) && self.receiver.as_ref() != Some(*iri))
            .collect()
    }
}

/// The inbox IRI could not be rebuilt from the request.
#[derive(Debug, thiserror::Error)]
#[error("could not build inbox IRI from {scheme}://{host}{path}: {source}")]
pub struct EnrichError {
    scheme: String,
    host: String,
    path: String,
    #[source]
    source: url::ParseError,
}

/// Build the delivery context for `activity`.
///
/// `scheme` replaces whatever scheme the request arrived with (TLS is
/// normally terminated in front of us); the host comes from the request.
pub fn enrich(
    request: RequestContext,
    parts: &Parts,
    scheme: &str,
    activity: &Activity,
) -> Result<DeliveryContext, EnrichError> {
    let inbox = request_iri(parts, scheme)?;
    let receiver = receiving_actor(&inbox);

    let actors: BTreeSet<Url> = activity.actor_iris().cloned().collect();

    let mut involved = BTreeSet::new();
    involved.insert(activity.id.clone());
    involved.extend(actors.iter().cloned());
    for reference in activity
        .object
        .iter()
        .chain(&activity.target)
        .chain(&activity.instrument)
        .chain(&activity.in_reply_to)
    {
        collect_ref(reference, &mut involved, 0);
    }
    // Addressing is only looked at one level deep.
    involved.extend(activity.to.iter().chain(&activity.cc).filter_map(ObjectRef::iri).cloned());

    Ok(DeliveryContext {
        request,
        inbox,
        receiver,
        activity_id: activity.id.clone(),
        actors,
        involved,
    })
}

fn collect_ref(reference: &ObjectRef, out: &mut BTreeSet<Url>, depth: usize) {
    if let Some(iri) = reference.iri() {
        out.insert(iri.clone());
    }
    if let Some(object) = reference.as_object() {
        collect_object(object, out, depth + 1);
    }
}

fn collect_object(object: &ApObject, out: &mut BTreeSet<Url>, depth: usize) {
    if depth > MAX_EMBED_DEPTH {
        return;
    }

    for reference in object
        .actor
        .iter()
        .chain(&object.attributed_to)
        .chain(&object.object)
        .chain(&object.target)
        .chain(&object.in_reply_to)
    {
        collect_ref(reference, out, depth);
    }

    // Mentions name accounts; hashtags and emoji do not.
    for tag in object.tag.iter().filter_map(ObjectRef::as_object) {
        if tag.type_names().any(|t| t == "Mention")
            && let Some(href) = &tag.href
        {
            out.insert(href.clone());
        }
    }

    if let Some(quote) = object.quote() {
        out.insert(quote.clone());
    }
}

/// The request URL with the serving host and `scheme`: for an inbox POST,
/// the IRI of the inbox.
pub fn request_iri(parts: &Parts, scheme: &str) -> Result<Url, EnrichError> {
    let host = request_host(parts).unwrap_or_default();
    let path = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);

    Url::parse(&format!("{scheme}://{host}{path}")).map_err(|source| EnrichError {
        scheme: scheme.to_string(),
        host,
        path,
        source,
    })
}

/// The actor owning `inbox`: `/users/alice/inbox` belongs to `/users/alice`.
/// The shared `/inbox` belongs to nobody.
#[must_use]
pub fn receiving_actor(inbox: &Url) -> Option<Url> {
    let owner_path = inbox.path().strip_suffix("/inbox")?;
    if owner_path.is_empty() {
        return None;
    }

    let mut owner = inbox.clone();
    owner.set_path(owner_path);
    owner.set_query(None);
    owner.set_fragment(None);
    Some(owner)
}

fn request_host(parts: &Parts) -> Option<String> {
    header_str(&parts.headers, header::HOST.as_str())
        .map(String::from)
        .or_else(|| parts.uri.authority().map(ToString::to_string))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
