//! ActivityPub inbox delivery for emissary.
//!
//! Remote servers POST activities to an actor's inbox. This crate decides
//! what happens to each delivery:
//!
//! - **Content negotiation**: only the two ActivityStreams media types
//! - **Authentication**: HTTP signatures, keys resolved locally or remotely
//! - **Resolution**: the body is decoded into a typed [`Activity`]
//! - **Authorization**: direct blocks are refused, indirect ones silently dropped
//! - **Dispatch**: side effects are applied through a [`Dispatcher`]
//! - **Forwarding**: first sightings addressed to local collections are relayed
//!
//! [`FederatingActor`] runs these in order and [`handler::router`] exposes it
//! over HTTP. It can also send local activities out, signed, through a
//! [`Deliverer`]. Authentication, authorization, storage, dispatch and fan-out
//! are traits, so each can be replaced.

pub mod activities;
pub mod actor;
pub mod authenticate;
pub mod authorize;
pub mod client;
pub mod collections;
pub mod content_type;
pub mod context;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod forwarding;
pub mod handler;
pub mod resolver;
pub mod signature;
pub mod store;

pub use activities::{Activity, ActivityKind, ApObject, ObjectKind, ObjectRef};
pub use actor::{FederatingActor, InboxOutcome, Stage};
pub use authenticate::{
    Authenticator, HttpSignatureAuthenticator, KeyResolver, RemoteKeyResolver, ResolvedKey,
    StaticKeyResolver,
};
pub use authorize::{Authorizer, BlockStore, BlocklistAuthorizer, MemoryBlockStore, Verdict};
pub use client::{ApClient, ApClientError};
pub use collections::{CollectionDelegate, FederationOnlyDelegate, OrderedCollection};
pub use content_type::is_activity_streams_media_type;
pub use context::{DeliveryContext, RequestContext};
pub use delivery::{Deliverer, SignedDeliverer};
pub use dispatch::{
    ActivityHandler, DispatchError, Dispatcher, LoggingHandler, ValidatingDispatcher,
};
pub use error::OracleError;
pub use forwarding::{
    ForwardingDecider, ForwardingDecision, ForwardingError, Forwarder, LoggingForwarder,
};
pub use resolver::{ResolveError, ResolvedActivity};
pub use signature::{HttpSigner, HttpVerifier, SignatureComponents, SignatureError};
pub use store::{ActivityStore, MemoryActivityStore, RedisActivityStore, StoreError};
