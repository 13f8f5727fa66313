//! `ActivityPub` request handlers.

mod collections;
mod inbox;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::actor::FederatingActor;

pub use collections::{get_inbox_handler, get_outbox_handler, post_outbox_handler};
pub use inbox::inbox_handler;

/// Routes for the shared inbox and per-user inboxes and outboxes.
pub fn router(actor: Arc<FederatingActor>) -> Router {
    Router::new()
        .route("/inbox", post(inbox_handler))
        .route(
            "/users/{username}/inbox",
            post(inbox_handler).get(get_inbox_handler),
        )
        .route(
            "/users/{username}/outbox",
            get(get_outbox_handler).post(post_outbox_handler),
        )
        .with_state(actor)
}
