//! Delivery authorization.
//!
//! Blocks are checked in two tiers. A block on a direct party (the signer or
//! the activity's actor) is refused openly, since that party already knows
//! about it. A block on anyone else the activity touches is answered with a
//! silent drop so that third parties learn nothing about local moderation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::context::DeliveryContext;
use crate::error::OracleError;

/// Outcome of an authorization check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Nobody involved is blocked.
    Authorized,
    /// A direct party is blocked; refused with 403.
    BlockedDirect,
    /// Someone else involved is blocked; acknowledged and dropped.
    BlockedIndirect,
}

/// Decides whether a delivery may be processed.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Check every party of the delivery against block policy.
    async fn authorize(&self, ctx: &DeliveryContext) -> Result<Verdict, OracleError>;
}

/// Source of block relationships.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Whether every actor and object on `host` is refused.
    async fn is_domain_blocked(&self, host: &str) -> Result<bool, OracleError>;

    /// Whether the local actor `receiver` blocks `iri`.
    async fn is_blocked_by(&self, receiver: &Url, iri: &Url) -> Result<bool, OracleError>;
}

/// Block lists held in memory.
#[derive(Default)]
pub struct MemoryBlockStore {
    domains: RwLock<HashSet<String>>,
    actor_blocks: RwLock<HashMap<Url, HashSet<Url>>>,
}

impl MemoryBlockStore {
    /// A store with no blocks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with blocked domains.
    pub fn with_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: RwLock::new(
                domains
                    .into_iter()
                    .map(|d| d.as_ref().trim().to_ascii_lowercase())
                    .filter(|d| !d.is_empty())
                    .collect(),
            ),
            actor_blocks: RwLock::default(),
        }
    }

    /// Refuse everything from `host`.
    pub async fn block_domain(&self, host: &str) {
        self.domains.write().await.insert(host.to_ascii_lowercase());
    }

    /// Record that `receiver` blocks `blocked`.
    pub async fn block(&self, receiver: Url, blocked: Url) {
        self.actor_blocks
            .write()
            .await
            .entry(receiver)
            .or_default()
            .insert(blocked);
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn is_domain_blocked(&self, host: &str) -> Result<bool, OracleError> {
        Ok(self.domains.read().await.contains(&host.to_ascii_lowercase()))
    }

    async fn is_blocked_by(&self, receiver: &Url, iri: &Url) -> Result<bool, OracleError> {
        Ok(self
            .actor_blocks
            .read()
            .await
            .get(receiver)
            .is_some_and(|blocked| blocked.contains(iri)))
    }
}

/// Authorizes deliveries against a [`BlockStore`].
pub struct BlocklistAuthorizer<S> {
    store: S,
}

impl<S: BlockStore> BlocklistAuthorizer<S> {
    /// Authorize against `store`.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The store blocks are read from.
    pub const fn store(&self) -> &S {
        &self.store
    }

    async fn is_blocked(&self, receiver: Option<&Url>, iri: &Url) -> Result<bool, OracleError> {
        if let Some(host) = iri.host_str()
            && self.store.is_domain_blocked(host).await?
        {
            return Ok(true);
        }
        match receiver {
            Some(receiver) => self.store.is_blocked_by(receiver, iri).await,
            None => Ok(false),
        }
    }
}

#[async_trait]
impl<S: BlockStore> Authorizer for BlocklistAuthorizer<S> {
    async fn authorize(&self, ctx: &DeliveryContext) -> Result<Verdict, OracleError> {
        let receiver = ctx.receiver.as_ref();

        for iri in ctx.direct_parties() {
            if self.is_blocked(receiver, iri).await? {
                debug!(party = %iri, "Direct party is blocked");
                return Ok(Verdict::BlockedDirect);
            }
        }

        for iri in ctx.other_parties() {
            if self.is_blocked(receiver, iri).await? {
                debug!(party = %iri, "Involved party is blocked");
                return Ok(Verdict::BlockedIndirect);
            }
        }

        Ok(Verdict::Authorized)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use std::collections::BTreeSet;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn ctx(requester: &str, involved: &[&str]) -> DeliveryContext {
        let requester = url(requester);
        let mut all: BTreeSet<Url> = involved.iter().map(|s| url(s)).collect();
        all.insert(requester.clone());

        DeliveryContext {
            request: RequestContext::default().with_requester(requester.clone()),
            inbox: url("https://local.example/users/bob/inbox"),
            receiver: Some(url("https://local.example/users/bob")),
            activity_id: url("https://remote.example/activities/1"),
            actors: BTreeSet::from([requester]),
            involved: all,
        }
    }

    #[tokio::test]
    async fn test_nothing_blocked() {
        let authorizer = BlocklistAuthorizer::new(MemoryBlockStore::new());
        let verdict = authorizer
            .authorize(&ctx(
                "https://remote.example/users/alice",
                &["https://remote.example/notes/1"],
            ))
            .await
            .unwrap();

        assert_eq!(verdict, Verdict::Authorized);
    }

    #[tokio::test]
    async fn test_receiver_block_on_requester_is_direct() {
        let store = MemoryBlockStore::new();
        store
            .block(
                url("https://local.example/users/bob"),
                url("https://remote.example/users/alice"),
            )
            .await;
        let authorizer = BlocklistAuthorizer::new(store);

        let verdict = authorizer
            .authorize(&ctx("https://remote.example/users/alice", &[]))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::BlockedDirect);
    }

    #[tokio::test]
    async fn test_blocked_domain_of_requester_is_direct() {
        let authorizer =
            BlocklistAuthorizer::new(MemoryBlockStore::with_domains(["Remote.Example"]));

        let verdict = authorizer
            .authorize(&ctx("https://remote.example/users/alice", &[]))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::BlockedDirect);
    }

    #[tokio::test]
    async fn test_blocked_third_party_is_indirect() {
        let authorizer =
            BlocklistAuthorizer::new(MemoryBlockStore::with_domains(["spam.example"]));

        let verdict = authorizer
            .authorize(&ctx(
                "https://relay.example/actor",
                &["https://spam.example/notes/1", "https://spam.example/users/eve"],
            ))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::BlockedIndirect);
    }

    #[tokio::test]
    async fn test_direct_block_wins_over_indirect() {
        let store = MemoryBlockStore::with_domains(["spam.example"]);
        store.block_domain("relay.example").await;
        let authorizer = BlocklistAuthorizer::new(store);

        let verdict = authorizer
            .authorize(&ctx(
                "https://relay.example/actor",
                &["https://spam.example/notes/1"],
            ))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::BlockedDirect);
    }

    #[tokio::test]
    async fn test_shared_inbox_only_checks_domains() {
        let store = MemoryBlockStore::new();
        store
            .block(
                url("https://local.example/users/bob"),
                url("https://remote.example/users/alice"),
            )
            .await;
        let authorizer = BlocklistAuthorizer::new(store);

        let mut shared = ctx("https://remote.example/users/alice", &[]);
        shared.inbox = url("https://local.example/inbox");
        shared.receiver = None;

        assert_eq!(authorizer.authorize(&shared).await.unwrap(), Verdict::Authorized);
    }
}
