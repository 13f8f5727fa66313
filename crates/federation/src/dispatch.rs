//! Applying an authorized activity's side effects.

use async_trait::async_trait;
use emissary_common::{AppError, AppResult};
use tracing::info;

use crate::activities::{Activity, ActivityKind};
use crate::context::DeliveryContext;

/// Why side effects could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The kind needs an `object` and none was given.
    #[error("{0} activity requires an object but none was set")]
    ObjectRequired(ActivityKind),
    /// The kind needs a `target` and none was given.
    #[error("{0} activity requires a target but none was set")]
    TargetRequired(ActivityKind),
    /// The handler failed.
    #[error(transparent)]
    Handler(#[from] AppError),
}

impl DispatchError {
    /// Whether the activity itself lacks a property its kind needs.
    #[must_use]
    pub const fn is_missing_property(&self) -> bool {
        matches!(self, Self::ObjectRequired(_) | Self::TargetRequired(_))
    }
}

/// Applies the side effects of an activity.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Apply `activity` as delivered in `ctx`.
    async fn dispatch(&self, activity: &Activity, ctx: &DeliveryContext)
    -> Result<(), DispatchError>;
}

/// Business logic for one activity, run after structural checks pass.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    /// Apply the business logic for `activity`.
    async fn handle(&self, activity: &Activity, ctx: &DeliveryContext) -> AppResult<()>;
}

/// Checks required properties, then hands the activity to its handler.
pub struct ValidatingDispatcher<H> {
    handler: H,
}

impl<H: ActivityHandler> ValidatingDispatcher<H> {
    /// Dispatch to `handler`.
    #[must_use]
    pub const fn new(handler: H) -> Self {
        Self { handler }
    }
}

/// Check that `activity` carries what its kind requires.
pub fn check_requirements(activity: &Activity) -> Result<(), DispatchError> {
    let required = activity.kind.requirements();
    if required.object && !activity.has_object() {
        return Err(DispatchError::ObjectRequired(activity.kind));
    }
    if required.target && !activity.has_target() {
        return Err(DispatchError::TargetRequired(activity.kind));
    }
    Ok(())
}

#[async_trait]
impl<H: ActivityHandler> Dispatcher for ValidatingDispatcher<H> {
    async fn dispatch(
        &self,
        activity: &Activity,
        ctx: &DeliveryContext,
    ) -> Result<(), DispatchError> {
        check_requirements(activity)?;
        self.handler.handle(activity, ctx).await?;
        Ok(())
    }
}

/// Handler that only records what arrived.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingHandler;

#[async_trait]
impl ActivityHandler for LoggingHandler {
    async fn handle(&self, activity: &Activity, ctx: &DeliveryContext) -> AppResult<()> {
        info!(
            activity_type = %activity.kind,
            activity_id = %activity.id,
            inbox = %ctx.inbox,
            requester = ?ctx.request.requester.as_ref().map(url::Url::as_str),
            "Received activity"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::resolver::resolve_document;
    use serde_json::{Value, json};
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use url::Url;

    fn activity(doc: Value) -> Activity {
        let Value::Object(raw) = doc else {
            panic!("expected object")
        };
        resolve_document(raw).unwrap().activity
    }

    fn ctx(activity: &Activity) -> DeliveryContext {
        DeliveryContext {
            request: RequestContext::default(),
            inbox: Url::parse("https://local.example/inbox").unwrap(),
            receiver: None,
            activity_id: activity.id.clone(),
            actors: BTreeSet::new(),
            involved: BTreeSet::new(),
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<ActivityKind>>);

    #[async_trait]
    impl ActivityHandler for Recording {
        async fn handle(&self, activity: &Activity, _ctx: &DeliveryContext) -> AppResult<()> {
            self.0.lock().unwrap().push(activity.kind);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl ActivityHandler for Failing {
        async fn handle(&self, _activity: &Activity, _ctx: &DeliveryContext) -> AppResult<()> {
            Err(AppError::Internal("database unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_complete_activity_reaches_handler() {
        let dispatcher = ValidatingDispatcher::new(Recording::default());
        let like = activity(json!({
            "type": "Like",
            "id": "https://remote.example/likes/1",
            "object": "https://local.example/notes/1"
        }));

        dispatcher.dispatch(&like, &ctx(&like)).await.unwrap();
        assert_eq!(*dispatcher.handler.0.lock().unwrap(), vec![ActivityKind::Like]);
    }

    #[tokio::test]
    async fn test_missing_object_is_reported() {
        let dispatcher = ValidatingDispatcher::new(Recording::default());
        let create = activity(json!({
            "type": "Create",
            "id": "https://remote.example/activities/1"
        }));

        let err = dispatcher.dispatch(&create, &ctx(&create)).await.unwrap_err();
        assert!(matches!(err, DispatchError::ObjectRequired(ActivityKind::Create)));
        assert!(err.is_missing_property());
        assert!(dispatcher.handler.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_target_is_reported() {
        let dispatcher = ValidatingDispatcher::new(Recording::default());
        let add = activity(json!({
            "type": "Add",
            "id": "https://remote.example/activities/2",
            "object": "https://remote.example/notes/1"
        }));

        let err = dispatcher.dispatch(&add, &ctx(&add)).await.unwrap_err();
        assert!(matches!(err, DispatchError::TargetRequired(ActivityKind::Add)));
    }

    #[tokio::test]
    async fn test_intransitive_activity_needs_nothing() {
        let dispatcher = ValidatingDispatcher::new(Recording::default());
        let view = activity(json!({
            "type": "View",
            "id": "https://remote.example/activities/3"
        }));

        assert!(dispatcher.dispatch(&view, &ctx(&view)).await.is_ok());
    }

    #[tokio::test]
    async fn test_handler_failure_is_not_a_missing_property() {
        let dispatcher = ValidatingDispatcher::new(Failing);
        let follow = activity(json!({
            "type": "Follow",
            "id": "https://remote.example/follows/1",
            "object": "https://local.example/users/bob"
        }));

        let err = dispatcher.dispatch(&follow, &ctx(&follow)).await.unwrap_err();
        assert!(!err.is_missing_property());
        assert!(matches!(err, DispatchError::Handler(AppError::Internal(_))));
    }
}
