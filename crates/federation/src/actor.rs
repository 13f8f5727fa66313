//! The federating actor: inbox delivery as a sequence of checks.
//!
//! A delivery moves through the [`Stage`]s in order. Any stage may end it
//! with a rejection or an internal error; only authorization can end it
//! early with success, when a third party involved in the activity is
//! blocked and the delivery is acknowledged but dropped.

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, header, request::Parts};
use emissary_common::{AppError, AppResult};
use serde_json::Value;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;

use crate::authenticate::Authenticator;
use crate::authorize::{Authorizer, Verdict};
use crate::collections::{CollectionDelegate, FederationOnlyDelegate, OrderedCollection};
use crate::content_type::{is_activity_streams_media_type, not_acceptable_message};
use crate::context::{RequestContext, enrich, request_iri};
use crate::delivery::Deliverer;
use crate::dispatch::Dispatcher;
use crate::forwarding::ForwardingDecider;
use crate::resolver::{read_body, resolve_bytes, resolve_document};
use crate::signature::digest_matches;

/// Body read limit when none is configured.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Peer-facing message for an activity lacking a property its kind needs.
pub const MALFORMED_ACTIVITY_MESSAGE: &str =
    "malformed incoming Activity: an Object and/or Target was required but not set";

/// Steps of inbox delivery, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// The request arrived.
    Received,
    /// The body is in an ActivityStreams media type.
    ContentTypeChecked,
    /// The signer is known and the body matches its digest.
    Authenticated,
    /// The body decoded to an activity.
    BodyResolved,
    /// Every IRI the activity touches is known.
    ContextEnriched,
    /// No party is blocked.
    Authorized,
    /// The handler ran.
    SideEffectsApplied,
    /// Forwarding was decided.
    ForwardingEvaluated,
    /// Answered with 202.
    Accepted,
}

impl Stage {
    /// Name used in logs and error context.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ContentTypeChecked => "content_type_checked",
            Self::Authenticated => "authenticated",
            Self::BodyResolved => "body_resolved",
            Self::ContextEnriched => "context_enriched",
            Self::Authorized => "authorized",
            Self::SideEffectsApplied => "side_effects_applied",
            Self::ForwardingEvaluated => "forwarding_evaluated",
            Self::Accepted => "accepted",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an accepted delivery ended. Both are answered with 202.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InboxOutcome {
    /// Side effects applied and forwarding evaluated.
    Processed,
    /// Acknowledged without processing because a third party is blocked.
    Dropped,
}

fn internal(stage: Stage, err: impl fmt::Display) -> AppError {
    AppError::Internal(format!("{stage}: {err}"))
}

/// Receives deliveries and serves the surrounding collection operations.
pub struct FederatingActor {
    authenticator: Arc<dyn Authenticator>,
    authorizer: Arc<dyn Authorizer>,
    dispatcher: Arc<dyn Dispatcher>,
    forwarding: ForwardingDecider,
    delegate: Arc<dyn CollectionDelegate>,
    deliverer: Option<Arc<dyn Deliverer>>,
    scheme: String,
    max_body_bytes: usize,
}

impl FederatingActor {
    /// An actor with the default delegate, `https` and a 1 MiB body limit.
    #[must_use]
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        authorizer: Arc<dyn Authorizer>,
        dispatcher: Arc<dyn Dispatcher>,
        forwarding: ForwardingDecider,
    ) -> Self {
        Self {
            authenticator,
            authorizer,
            dispatcher,
            forwarding,
            delegate: Arc::new(FederationOnlyDelegate),
            deliverer: None,
            scheme: "https".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Serve collection operations through `delegate`.
    #[must_use]
    pub fn with_delegate(mut self, delegate: Arc<dyn CollectionDelegate>) -> Self {
        self.delegate = delegate;
        self
    }

    /// Enable [`Self::send`].
    #[must_use]
    pub fn with_deliverer(mut self, deliverer: Arc<dyn Deliverer>) -> Self {
        self.deliverer = Some(deliverer);
        self
    }

    /// Scheme of the IRIs this server is reached under.
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Refuse to read bodies larger than `max_body_bytes`.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Handle a delivery POSTed to an inbox.
    pub async fn post_inbox(&self, request: Request<Body>) -> AppResult<InboxOutcome> {
        let (parts, body) = request.into_parts();
        let ctx = RequestContext::from_parts(&parts);

        let span = info_span!(
            "inbox",
            user_agent = ctx.user_agent.as_deref().unwrap_or_default(),
            path = %ctx.path,
        );

        self.deliver(parts, body, ctx).instrument(span).await
    }

    async fn deliver(
        &self,
        parts: Parts,
        body: Body,
        ctx: RequestContext,
    ) -> AppResult<InboxOutcome> {
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !is_activity_streams_media_type(content_type) {
            info!(stage = %Stage::ContentTypeChecked, content_type, "Refusing delivery");
            return Err(AppError::NotAcceptable(not_acceptable_message(content_type)));
        }

        let (ctx, authenticated) = self
            .authenticator
            .authenticate(&parts, ctx)
            .await
            .map_err(|e| internal(Stage::Authenticated, e))?;
        if !authenticated {
            info!(stage = %Stage::Authenticated, "Refusing unauthenticated delivery");
            return Err(AppError::Unauthorized("not authenticated".to_string()));
        }

        let bytes = read_body(body, self.max_body_bytes)
            .await
            .map_err(|e| internal(Stage::BodyResolved, e))?;

        if !digest_matches(&parts.headers, &bytes) {
            info!(
                stage = %Stage::Authenticated,
                "Refusing delivery whose body does not match its digest"
            );
            return Err(AppError::Unauthorized("not authenticated".to_string()));
        }

        let resolved = match resolve_bytes(&bytes) {
            Ok(resolved) => resolved,
            Err(e) if e.is_bad_request() => {
                info!(stage = %Stage::BodyResolved, error = %e, "Refusing unresolvable delivery");
                return Err(e.into());
            }
            Err(e) => return Err(internal(Stage::BodyResolved, e)),
        };
        let activity = &resolved.activity;

        let delivery = enrich(ctx, &parts, &self.scheme, activity)
            .map_err(|e| internal(Stage::ContextEnriched, e))?;

        match self
            .authorizer
            .authorize(&delivery)
            .await
            .map_err(|e| internal(Stage::Authorized, e))?
        {
            Verdict::Authorized => {}
            Verdict::BlockedDirect => {
                info!(
                    stage = %Stage::Authorized,
                    activity_id = %activity.id,
                    "Refusing blocked delivery"
                );
                return Err(AppError::Forbidden("blocked".to_string()));
            }
            Verdict::BlockedIndirect => {
                debug!(
                    stage = %Stage::Authorized,
                    activity_id = %activity.id,
                    "Dropping delivery involving a blocked party"
                );
                return Ok(InboxOutcome::Dropped);
            }
        }

        if let Err(e) = self.dispatcher.dispatch(activity, &delivery).await {
            if e.is_missing_property() {
                debug!(
                    stage = %Stage::SideEffectsApplied,
                    error = %e,
                    "malformed incoming Activity"
                );
                return Err(AppError::BadRequest(MALFORMED_ACTIVITY_MESSAGE.to_string()));
            }
            return Err(internal(Stage::SideEffectsApplied, e));
        }

        match self.forwarding.evaluate(activity, &resolved.raw, &delivery).await {
            Ok(decision) => {
                debug!(stage = %Stage::ForwardingEvaluated, ?decision, "Forwarding evaluated");
            }
            Err(e) if e.is_already_exists() => {
                debug!(
                    stage = %Stage::ForwardingEvaluated,
                    error = %e,
                    "Activity already recorded"
                );
            }
            Err(e) => {
                warn!(stage = %Stage::ForwardingEvaluated, error = %e, "Inbox forwarding failed");
            }
        }

        debug!(
            stage = %Stage::Accepted,
            activity_type = %activity.kind,
            activity_id = %activity.id,
            "Delivery accepted"
        );
        Ok(InboxOutcome::Processed)
    }

    /// Read an inbox.
    pub async fn get_inbox(&self, parts: &Parts) -> AppResult<OrderedCollection> {
        let iri = self.iri_of(parts)?;
        self.delegate.get_inbox(parts, &iri).await
    }

    /// Read an outbox.
    pub async fn get_outbox(&self, parts: &Parts) -> AppResult<OrderedCollection> {
        let iri = self.iri_of(parts)?;
        self.delegate.get_outbox(parts, &iri).await
    }

    /// Post to an outbox. Returns the IRI of the created activity.
    pub async fn post_outbox(&self, request: Request<Body>) -> AppResult<Url> {
        let (parts, body) = request.into_parts();
        let iri = self.iri_of(&parts)?;

        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| AppError::Internal(format!("error reading request body: {e}")))?;
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::BadRequest(format!("invalid json: {e}")))?;

        self.delegate.post_outbox(&parts, &iri, body).await
    }

    /// Send a local activity on behalf of the owner of `outbox`.
    ///
    /// Returns the number of remote inboxes that accepted it.
    pub async fn send(&self, outbox: &Url, activity: Value) -> AppResult<usize> {
        let Value::Object(raw) = activity else {
            return Err(AppError::BadRequest("activity must be a JSON object".to_string()));
        };
        let resolved = resolve_document(raw)?;

        info!(
            activity_type = %resolved.activity.kind,
            outbox = %outbox,
            "Sending activity via outbox"
        );

        let Some(deliverer) = &self.deliverer else {
            return Err(AppError::Config("no outbound delivery configured".to_string()));
        };

        deliverer
            .deliver(&resolved.activity, &resolved.raw)
            .await
            .map_err(|e| AppError::Internal(format!("delivery: {e}")))
    }

    fn iri_of(&self, parts: &Parts) -> AppResult<Url> {
        request_iri(parts, &self.scheme).map_err(|e| AppError::Internal(e.to_string()))
    }
}
