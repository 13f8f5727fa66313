//! Inbox and outbox collections.
//!
//! Reading inboxes and outboxes and posting to an outbox are not part of
//! server-to-server delivery. The actor hands them to a [`CollectionDelegate`].

use async_trait::async_trait;
use axum::http::request::Parts;
use emissary_common::{AppError, AppResult};
use serde::Serialize;
use serde_json::{Value, json};
use url::Url;

/// `ActivityPub` `OrderedCollection`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedCollection {
    /// JSON-LD context.
    #[serde(rename = "@context")]
    pub context: Value,
    /// Always `OrderedCollection`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The collection's IRI.
    pub id: Url,
    /// Number of items across all pages.
    pub total_items: u64,
    /// First page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<Url>,
    /// Last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<Url>,
}

impl OrderedCollection {
    /// A collection with no items.
    #[must_use]
    pub fn empty(id: Url) -> Self {
        Self {
            context: json!("https://www.w3.org/ns/activitystreams"),
            kind: "OrderedCollection".to_string(),
            id,
            total_items: 0,
            first: None,
            last: None,
        }
    }
}

/// Serves the collection operations that delivery does not cover.
///
/// `iri` is the collection being requested, rebuilt with the serving scheme.
#[async_trait]
pub trait CollectionDelegate: Send + Sync {
    /// Serve an inbox GET.
    async fn get_inbox(&self, parts: &Parts, iri: &Url) -> AppResult<OrderedCollection>;

    /// Serve an outbox GET.
    async fn get_outbox(&self, parts: &Parts, iri: &Url) -> AppResult<OrderedCollection>;

    /// Accept a client-to-server outbox POST, returning the created IRI.
    async fn post_outbox(&self, parts: &Parts, iri: &Url, body: Value) -> AppResult<Url>;
}

/// Delegate for a server that only federates.
///
/// Collections are always empty and client-to-server posting is refused.
#[derive(Clone, Copy, Debug, Default)]
pub struct FederationOnlyDelegate;

#[async_trait]
impl CollectionDelegate for FederationOnlyDelegate {
    async fn get_inbox(&self, _parts: &Parts, iri: &Url) -> AppResult<OrderedCollection> {
        Ok(OrderedCollection::empty(iri.clone()))
    }

    async fn get_outbox(&self, _parts: &Parts, iri: &Url) -> AppResult<OrderedCollection> {
        Ok(OrderedCollection::empty(iri.clone()))
    }

    async fn post_outbox(&self, _parts: &Parts, _iri: &Url, _body: Value) -> AppResult<Url> {
        Err(AppError::MethodNotAllowed)
    }
}
