//! Inbox and outbox collection handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use emissary_common::AppResult;

use crate::actor::FederatingActor;
use crate::content_type::ACTIVITY_JSON;

/// GET a user's inbox.
pub async fn get_inbox_handler(
    State(actor): State<Arc<FederatingActor>>,
    request: Request,
) -> AppResult<impl IntoResponse> {
    let (parts, _) = request.into_parts();
    let collection = actor.get_inbox(&parts).await?;
    Ok(([(header::CONTENT_TYPE, ACTIVITY_JSON)], Json(collection)))
}

/// GET a user's outbox.
pub async fn get_outbox_handler(
    State(actor): State<Arc<FederatingActor>>,
    request: Request,
) -> AppResult<impl IntoResponse> {
    let (parts, _) = request.into_parts();
    let collection = actor.get_outbox(&parts).await?;
    Ok(([(header::CONTENT_TYPE, ACTIVITY_JSON)], Json(collection)))
}

/// POST to a user's outbox.
pub async fn post_outbox_handler(
    State(actor): State<Arc<FederatingActor>>,
    request: Request,
) -> AppResult<impl IntoResponse> {
    let location = actor.post_outbox(request).await?;
    Ok((StatusCode::CREATED, [(header::LOCATION, location.to_string())]))
}
