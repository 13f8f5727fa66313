//! Outbound delivery of activities sent through a local outbox.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::activities::{Activity, ObjectRef};
use crate::client::ApClient;
use crate::error::OracleError;
use crate::signature::HttpSigner;

/// Delivers a local activity to the inboxes of its recipients.
#[async_trait]
pub trait Deliverer: Send + Sync {
    /// Returns the number of inboxes that accepted `raw`.
    async fn deliver(
        &self,
        activity: &Activity,
        raw: &Map<String, Value>,
    ) -> Result<usize, OracleError>;
}

/// Delivers over HTTP, signing every request with this server's key.
pub struct SignedDeliverer {
    client: ApClient,
    signer: HttpSigner,
    local: Url,
}

impl SignedDeliverer {
    /// `local` is any IRI on this server; recipients on the same origin are
    /// not delivered to.
    #[must_use]
    pub const fn new(client: ApClient, signer: HttpSigner, local: Url) -> Self {
        Self {
            client,
            signer,
            local,
        }
    }

    fn is_local(&self, iri: &Url) -> bool {
        iri.origin() == self.local.origin()
    }

    /// The inbox to deliver to for `recipient`, preferring a shared inbox.
    async fn inbox_of(&self, recipient: &Url) -> Result<Option<Url>, OracleError> {
        let document = match self.client.fetch_object(recipient).await {
            Ok(document) => document,
            Err(e) if e.is_gone() => {
                debug!(recipient = %recipient, "Recipient is gone");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(inbox_in(&document))
    }
}

#[async_trait]
impl Deliverer for SignedDeliverer {
    async fn deliver(
        &self,
        activity: &Activity,
        raw: &Map<String, Value>,
    ) -> Result<usize, OracleError> {
        let body = serde_json::to_vec(&without_blind_addressing(raw))
            .map_err(|e| OracleError::Backend(format!("error serializing activity: {e}")))?;

        let mut inboxes: Vec<Url> = Vec::new();
        for recipient in recipients(activity) {
            if self.is_local(recipient) {
                continue;
            }
            match self.inbox_of(recipient).await {
                Ok(Some(inbox)) if !inboxes.contains(&inbox) => inboxes.push(inbox),
                Ok(_) => {}
                Err(e) => warn!(recipient = %recipient, error = %e, "Could not resolve recipient"),
            }
        }

        let mut delivered = 0;
        for inbox in &inboxes {
            match self.client.deliver(inbox, body.clone(), &self.signer).await {
                Ok(()) => delivered += 1,
                Err(e) if e.is_gone() => debug!(inbox = %inbox, "Inbox is gone"),
                Err(e) => warn!(inbox = %inbox, error = %e, "Delivery failed"),
            }
        }

        Ok(delivered)
    }
}

/// Addressed IRIs other than the public collection, each once.
fn recipients(activity: &Activity) -> Vec<&Url> {
    let public = activitypub_federation::kinds::public();
    let mut recipients: Vec<&Url> = Vec::new();

    for iri in activity.addressing().filter_map(ObjectRef::iri) {
        if *iri != public && !recipients.contains(&iri) {
            recipients.push(iri);
        }
    }

    recipients
}

/// `bto` and `bcc` are never shown to recipients.
fn without_blind_addressing(raw: &Map<String, Value>) -> Map<String, Value> {
    let mut raw = raw.clone();
    raw.remove("bto");
    raw.remove("bcc");
    raw
}

fn inbox_in(document: &Value) -> Option<Url> {
    document
        .get("endpoints")
        .and_then(|endpoints| endpoints.get("sharedInbox"))
        .or_else(|| document.get("inbox"))
        .and_then(Value::as_str)
        .and_then(|s| Url::parse(s).ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resolver::resolve_document;
    use serde_json::json;

    fn resolve(doc: Value) -> (Activity, Map<String, Value>) {
        let Value::Object(raw) = doc else {
            panic!("expected object")
        };
        let resolved = resolve_document(raw).unwrap();
        (resolved.activity, resolved.raw)
    }

    #[test]
    fn test_recipients_skip_public_and_repeats() {
        let (activity, _) = resolve(json!({
            "type": "Create",
            "id": "https://local.example/activities/1",
            "actor": "https://local.example/users/bob",
            "to": [
                "https://www.w3.org/ns/activitystreams#Public",
                "https://remote.example/users/alice"
            ],
            "cc": ["https://remote.example/users/alice"],
            "bcc": ["https://third.example/users/carol"],
            "object": { "type": "Note", "content": "hi" }
        }));

        let recipients: Vec<&str> = recipients(&activity).into_iter().map(Url::as_str).collect();
        assert_eq!(
            recipients,
            vec![
                "https://remote.example/users/alice",
                "https://third.example/users/carol"
            ]
        );
    }

    #[test]
    fn test_blind_addressing_is_stripped() {
        let (_, raw) = resolve(json!({
            "type": "Follow",
            "id": "https://local.example/follows/1",
            "to": ["https://remote.example/users/alice"],
            "bto": ["https://third.example/users/carol"],
            "bcc": ["https://third.example/users/dave"],
            "object": "https://remote.example/users/alice"
        }));

        let sent = without_blind_addressing(&raw);
        assert!(sent.get("bto").is_none());
        assert!(sent.get("bcc").is_none());
        assert_eq!(sent["to"], raw["to"]);
        assert!(raw.contains_key("bcc"));
    }

    #[test]
    fn test_shared_inbox_is_preferred() {
        let actor = json!({
            "id": "https://remote.example/users/alice",
            "inbox": "https://remote.example/users/alice/inbox",
            "endpoints": { "sharedInbox": "https://remote.example/inbox" }
        });
        assert_eq!(
            inbox_in(&actor).map(|u| u.to_string()),
            Some("https://remote.example/inbox".to_string())
        );

        let collection = json!({
            "id": "https://remote.example/users/alice/followers",
            "type": "OrderedCollection"
        });
        assert!(inbox_in(&collection).is_none());
    }
}
