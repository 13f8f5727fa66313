//! Inbox forwarding.
//!
//! <https://www.w3.org/TR/activitypub/#inbox-forwarding>
//!
//! An activity is forwarded the first time it is seen, if it is addressed to
//! collections on this server and references something this server owns.
//! Forwarding runs after the delivery has been accepted; its errors are for
//! the caller to log, never to report to the peer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};
use url::Url;

use crate::activities::{Activity, ObjectRef};
use crate::context::DeliveryContext;
use crate::error::OracleError;
use crate::store::{ActivityStore, StoreError};

/// What forwarding decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardingDecision {
    /// The activity was seen before.
    AlreadyKnown,
    /// No local collection is addressed.
    NotAddressedLocally,
    /// Nothing local is referenced, so followers have no reason to see it.
    NotRelevant,
    /// Relayed to this many collections.
    Forwarded(usize),
}

/// Forwarding could not complete.
#[derive(Debug, thiserror::Error)]
pub enum ForwardingError {
    /// Recording the activity failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Relaying the activity failed.
    #[error("forwarding delivery failed: {0}")]
    Delivery(#[source] OracleError),
}

impl ForwardingError {
    /// Whether the activity had been recorded by someone else already.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::Store(StoreError::AlreadyExists(_)))
    }
}

/// Fans an activity out to the members of local collections.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Relay `raw` unchanged to the members of `collections`.
    async fn forward(
        &self,
        raw: &Map<String, Value>,
        collections: &[Url],
    ) -> Result<usize, OracleError>;
}

/// Forwarder that only records what would have been relayed.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingForwarder;

#[async_trait]
impl Forwarder for LoggingForwarder {
    async fn forward(
        &self,
        raw: &Map<String, Value>,
        collections: &[Url],
    ) -> Result<usize, OracleError> {
        let activity_id = raw.get("id").and_then(Value::as_str).unwrap_or_default();
        info!(
            activity_id,
            collections = collections.len(),
            "Forwarding activity"
        );
        Ok(collections.len())
    }
}

/// Decides whether an accepted activity is forwarded, and forwards it.
pub struct ForwardingDecider {
    store: Arc<dyn ActivityStore>,
    forwarder: Arc<dyn Forwarder>,
    local: Url,
}

impl ForwardingDecider {
    /// `local` is any IRI on this server; only its scheme, host and port
    /// are used.
    #[must_use]
    pub fn new(store: Arc<dyn ActivityStore>, forwarder: Arc<dyn Forwarder>, local: Url) -> Self {
        Self {
            store,
            forwarder,
            local,
        }
    }

    /// Record `activity` and forward it if this is its first sighting and
    /// it concerns local collections.
    pub async fn evaluate(
        &self,
        activity: &Activity,
        raw: &Map<String, Value>,
        ctx: &DeliveryContext,
    ) -> Result<ForwardingDecision, ForwardingError> {
        if self.store.exists(&activity.id).await? {
            debug!(activity_id = %activity.id, "Activity already known, not forwarding");
            return Ok(ForwardingDecision::AlreadyKnown);
        }

        self.store
            .insert(&activity.id, &Value::Object(raw.clone()))
            .await?;

        let collections = self.local_addressees(activity, &ctx.inbox);
        if collections.is_empty() {
            return Ok(ForwardingDecision::NotAddressedLocally);
        }

        if !self.references_local(activity) {
            return Ok(ForwardingDecision::NotRelevant);
        }

        let delivered = self
            .forwarder
            .forward(raw, &collections)
            .await
            .map_err(ForwardingError::Delivery)?;

        Ok(ForwardingDecision::Forwarded(delivered))
    }

    fn is_local(&self, iri: &Url) -> bool {
        iri.scheme() == self.local.scheme()
            && iri.host_str() == self.local.host_str()
            && iri.port_or_known_default() == self.local.port_or_known_default()
    }

    /// `to`, `cc` and `audience` entries on this server, minus the inbox
    /// the activity arrived in.
    fn local_addressees(&self, activity: &Activity, inbox: &Url) -> Vec<Url> {
        let public = activitypub_federation::kinds::public();
        let mut collections: Vec<Url> = Vec::new();

        for iri in activity
            .to
            .iter()
            .chain(&activity.cc)
            .chain(&activity.audience)
            .filter_map(ObjectRef::iri)
        {
            if iri == inbox || *iri == public || !self.is_local(iri) {
                continue;
            }
            if !collections.contains(iri) {
                collections.push(iri.clone());
            }
        }

        collections
    }

    fn references_local(&self, activity: &Activity) -> bool {
        let direct = activity
            .object
            .iter()
            .chain(&activity.target)
            .chain(&activity.in_reply_to)
            .filter_map(ObjectRef::iri);

        let nested = activity.embedded_objects().flat_map(|object| {
            object
                .in_reply_to
                .iter()
                .chain(&object.object)
                .chain(&object.target)
                .filter_map(ObjectRef::iri)
        });

        direct.chain(nested).any(|iri| self.is_local(iri))
    }
}
