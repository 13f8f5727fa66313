//! Inbox handler for receiving `ActivityPub` activities.

use std::sync::Arc;

use axum::{extract::Request, extract::State, http::StatusCode};
use emissary_common::AppResult;

use crate::actor::{FederatingActor, InboxOutcome};

/// Handle a POST to the shared inbox or a user's inbox.
///
/// Accepted deliveries are answered with 202 and an empty body, whether they
/// were processed or dropped.
pub async fn inbox_handler(
    State(actor): State<Arc<FederatingActor>>,
    request: Request,
) -> AppResult<StatusCode> {
    match actor.post_inbox(request).await? {
        InboxOutcome::Processed | InboxOutcome::Dropped => Ok(StatusCode::ACCEPTED),
    }
}
