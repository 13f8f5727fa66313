//! Turning an inbox request body into an [`Activity`].

use axum::body::{Body, Bytes};
use emissary_common::AppError;
use serde_json::{Map, Value};
use tracing::debug;

use crate::activities::{Activity, ActivityKind, ApObject, ObjectKind, normalize_incoming};

/// An activity together with the document it was decoded from.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedActivity {
    /// The typed, normalized activity.
    pub activity: Activity,
    /// The request body as received. Never modified.
    pub raw: Map<String, Value>,
}

/// Why a body could not be turned into an activity.
///
/// The first three variants are failures on our side of the connection and
/// surface as 500s; the rest describe a malformed delivery and surface as 400s.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The body could not be read, or was too large.
    #[error("error reading request body: {0}")]
    Read(String),
    /// The body is not a JSON object.
    #[error("error unmarshalling request body: {0}")]
    Json(#[source] serde_json::Error),
    /// A known type whose document could not be decoded.
    #[error("error matching json to type: {0}")]
    Match(#[source] serde_json::Error),
    /// No declared type is known.
    #[error("body json could not be resolved to an ActivityStreams value")]
    Unmatched,
    /// A known object type that is not an activity.
    #[error("ActivityStreams value with type {0} is not an Activity")]
    NotAnActivity(ObjectKind),
    /// The activity has no usable `id`.
    #[error("incoming Activity {0} did not have required id property set")]
    MissingId(ActivityKind),
}

impl ResolveError {
    /// Whether the peer sent something we can name as malformed.
    #[must_use]
    pub const fn is_bad_request(&self) -> bool {
        matches!(
            self,
            Self::Unmatched | Self::NotAnActivity(_) | Self::MissingId(_)
        )
    }
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        if err.is_bad_request() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

enum Matched {
    Activity(ActivityKind),
    Object(ObjectKind),
}

/// Read the whole body (at most `limit` bytes) and resolve it.
///
/// The body is consumed: whatever the outcome, it is released before this
/// returns.
pub async fn resolve_activity(body: Body, limit: usize) -> Result<ResolvedActivity, ResolveError> {
    let bytes = read_body(body, limit).await?;
    resolve_bytes(&bytes)
}

/// Buffer the whole body, at most `limit` bytes.
pub async fn read_body(body: Body, limit: usize) -> Result<Bytes, ResolveError> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| ResolveError::Read(e.to_string()))
}

/// Resolve an already buffered body.
pub fn resolve_bytes(bytes: &[u8]) -> Result<ResolvedActivity, ResolveError> {
    let raw: Map<String, Value> = serde_json::from_slice(bytes).map_err(ResolveError::Json)?;
    resolve_document(raw)
}

/// Resolve a parsed JSON document.
pub fn resolve_document(raw: Map<String, Value>) -> Result<ResolvedActivity, ResolveError> {
    let kind = match match_type(&raw) {
        Some(Matched::Activity(kind)) => kind,
        Some(Matched::Object(kind)) => {
            // Still decode, so a broken document reports as broken
            // rather than as the wrong type.
            decode(&raw)?;
            return Err(ResolveError::NotAnActivity(kind));
        }
        None => return Err(ResolveError::Unmatched),
    };

    let object = decode(&raw)?;
    let Some(id) = object.id.clone() else {
        return Err(ResolveError::MissingId(kind));
    };

    let mut activity = Activity::from_object(kind, id, object);
    normalize_incoming(&mut activity, &raw);

    debug!(activity_type = %activity.kind, id = %activity.id, "Resolved activity");

    Ok(ResolvedActivity { activity, raw })
}

fn decode(raw: &Map<String, Value>) -> Result<ApObject, ResolveError> {
    serde_json::from_value(Value::Object(raw.clone())).map_err(ResolveError::Match)
}

/// First declared type name that belongs to a known vocabulary.
fn match_type(raw: &Map<String, Value>) -> Option<Matched> {
    let names: Vec<&str> = match raw.get("type")? {
        Value::String(name) => vec![name.as_str()],
        Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
        _ => return None,
    };

    names.into_iter().find_map(|name| {
        ActivityKind::from_name(name)
            .map(Matched::Activity)
            .or_else(|| ObjectKind::from_name(name).map(Matched::Object))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    fn resolve(value: &Value) -> Result<ResolvedActivity, ResolveError> {
        resolve_bytes(value.to_string().as_bytes())
    }

    fn status(err: ResolveError) -> StatusCode {
        AppError::from(err).status_code()
    }

    #[test]
    fn test_resolves_create() {
        let resolved = resolve(&json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "type": "Create",
            "id": "https://remote.example/activities/1",
            "actor": "https://remote.example/users/alice",
            "object": {
                "type": "Note",
                "id": "https://remote.example/notes/1",
                "content": "<p>hi</p>"
            }
        }))
        .unwrap();

        assert_eq!(resolved.activity.kind, ActivityKind::Create);
        assert_eq!(resolved.activity.id.as_str(), "https://remote.example/activities/1");
        assert_eq!(resolved.activity.actor_iris().count(), 1);
        assert_eq!(resolved.raw["type"], "Create");
    }

    #[test]
    fn test_invalid_json_is_internal() {
        for body in [&b"{not json"[..], b"", b"[1,2,3]", b"\"Create\""] {
            let err = resolve_bytes(body).unwrap_err();
            assert!(matches!(err, ResolveError::Json(_)), "{err}");
            assert_eq!(status(err), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_unknown_shape_is_bad_request() {
        for doc in [
            json!({}),
            json!({ "type": "Frobnicate", "id": "https://remote.example/x" }),
            json!({ "type": 5 }),
            json!({ "type": ["http://example.com/ns#Thing"] }),
        ] {
            let err = resolve(&doc).unwrap_err();
            assert!(matches!(err, ResolveError::Unmatched), "{doc}");
            assert_eq!(
                err.to_string(),
                "body json could not be resolved to an ActivityStreams value"
            );
            assert_eq!(status(err), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_bare_object_is_bad_request() {
        let err = resolve(&json!({
            "type": "Note",
            "id": "https://remote.example/notes/1"
        }))
        .unwrap_err();

        assert_eq!(err.to_string(), "ActivityStreams value with type Note is not an Activity");
        assert_eq!(status(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_missing_id_is_bad_request() {
        let err = resolve(&json!({
            "type": "Follow",
            "actor": "https://remote.example/users/alice",
            "object": "https://local.example/users/bob"
        }))
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "incoming Activity Follow did not have required id property set"
        );
        assert_eq!(status(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unusable_id_is_bad_request() {
        for id in [json!(""), json!("/activities/1"), json!(12)] {
            let err = resolve(&json!({
                "type": "Follow",
                "id": id,
                "actor": "https://remote.example/users/alice",
                "object": "https://local.example/users/bob"
            }))
            .unwrap_err();

            assert!(matches!(err, ResolveError::MissingId(ActivityKind::Follow)), "{err}");
            assert_eq!(status(err), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_broken_known_type_is_internal() {
        let err = resolve(&json!({
            "type": ["Like", 12],
            "id": "https://remote.example/likes/1"
        }))
        .unwrap_err();
        assert!(matches!(err, ResolveError::Match(_)));
        assert_eq!(status(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_first_known_type_wins() {
        let resolved = resolve(&json!({
            "type": ["http://example.com/ns#Custom", "Announce"],
            "id": "https://remote.example/activities/2",
            "object": "https://local.example/notes/1"
        }))
        .unwrap();

        assert_eq!(resolved.activity.kind, ActivityKind::Announce);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let doc = json!({
            "type": "Create",
            "id": "https://remote.example/activities/3",
            "actor": ["https://remote.example/users/alice"],
            "object": { "type": "Note", "content": { "en": "hi" }, "summary": "cw" }
        });

        assert_eq!(resolve(&doc).unwrap(), resolve(&doc).unwrap());
    }

    #[tokio::test]
    async fn test_body_limit_is_internal() {
        let body = Body::from(vec![b' '; 64]);
        let err = resolve_activity(body, 16).await.unwrap_err();
        assert!(matches!(err, ResolveError::Read(_)));
        assert_eq!(status(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_resolve_from_body() {
        let body = Body::from(
            json!({
                "type": "Delete",
                "id": "https://remote.example/activities/4",
                "object": "https://remote.example/notes/1"
            })
            .to_string(),
        );

        let resolved = resolve_activity(body, 1024).await.unwrap();
        assert_eq!(resolved.activity.kind, ActivityKind::Delete);
    }
}
