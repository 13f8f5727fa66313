//! Normalization of embedded objects against the raw request document.
//!
//! The lenient decoder reinterprets natural language properties (language
//! maps, arrays, `@value` nodes). For post bodies and profile fields the
//! string the sender actually wrote is authoritative, so it is copied back
//! from the raw JSON.

use serde_json::{Map, Value};

use super::{Activity, ApObject, is_account_like, is_status_like};

/// Overwrite text properties of the activity's embedded objects with the raw
/// string values from `raw`, the document the activity was decoded from.
///
/// Applying this twice yields the same activity as applying it once.
pub fn normalize_incoming(activity: &mut Activity, raw: &Map<String, Value>) {
    let raw_objects = as_list(raw.get("object"));

    for (typed, raw_object) in activity.object.iter_mut().zip(raw_objects) {
        if let (Some(object), Some(raw_object)) = (typed.as_object_mut(), raw_object.as_object()) {
            normalize_object(object, raw_object);
        }
    }
}

fn normalize_object(object: &mut ApObject, raw: &Map<String, Value>) {
    let status_like = object.type_names().any(is_status_like);
    let account_like = object.type_names().any(is_account_like);

    if status_like {
        overlay_text(&mut object.content, raw, "content");
        overlay_text(&mut object.summary, raw, "summary");
        overlay_text(&mut object.name, raw, "name");

        let raw_attachments = as_list(raw.get("attachment"));
        for (typed, raw_attachment) in object.attachment.iter_mut().zip(raw_attachments) {
            if let (Some(attachment), Some(raw_attachment)) =
                (typed.as_object_mut(), raw_attachment.as_object())
            {
                overlay_text(&mut attachment.name, raw_attachment, "name");
            }
        }
    } else if account_like {
        overlay_text(&mut object.summary, raw, "summary");
        overlay_text(&mut object.name, raw, "name");
    }
}

fn overlay_text(field: &mut Option<String>, raw: &Map<String, Value>, key: &str) {
    if let Some(Value::String(text)) = raw.get(key) {
        *field = Some(text.clone());
    }
}

fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None => Vec::new(),
        Some(Value::Array(values)) => values.iter().collect(),
        Some(value) => vec![value],
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::activities::{ActivityKind, ObjectRef};
    use serde_json::json;
    use url::Url;

    fn decode(raw: &Value) -> Activity {
        let object: ApObject = serde_json::from_value(raw.clone()).unwrap();
        let id = object.id.clone().unwrap();
        Activity::from_object(ActivityKind::Create, id, object)
    }

    fn first_object(activity: &Activity) -> &ApObject {
        activity.object[0].as_object().unwrap()
    }

    #[test]
    fn test_status_content_taken_from_raw() {
        let raw = json!({
            "type": "Create",
            "id": "https://remote.example/activities/1",
            "object": {
                "type": "Note",
                "id": "https://remote.example/notes/1",
                "content": "<p>raw &amp; exact</p>",
                "summary": "cw",
                "attachment": [
                    { "type": "Document", "name": "alt text" },
                    "https://remote.example/files/2"
                ]
            }
        });
        let mut activity = decode(&raw);
        // Simulate a lossy decode.
        if let Some(note) = activity.object[0].as_object_mut() {
            note.content = Some("raw & exact".to_string());
            note.summary = None;
            note.attachment[0].as_object_mut().unwrap().name = None;
        }

        normalize_incoming(&mut activity, raw.as_object().unwrap());

        let note = first_object(&activity);
        assert_eq!(note.content.as_deref(), Some("<p>raw &amp; exact</p>"));
        assert_eq!(note.summary.as_deref(), Some("cw"));
        assert_eq!(
            note.attachment[0].as_object().unwrap().name.as_deref(),
            Some("alt text")
        );
        assert!(matches!(note.attachment[1], ObjectRef::Iri(_)));
    }

    #[test]
    fn test_language_map_left_alone() {
        let raw = json!({
            "type": "Create",
            "id": "https://remote.example/activities/2",
            "object": {
                "type": "Note",
                "content": { "en": "hello" }
            }
        });
        let mut activity = decode(&raw);

        normalize_incoming(&mut activity, raw.as_object().unwrap());

        assert_eq!(first_object(&activity).content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_account_fields() {
        let raw = json!({
            "type": "Update",
            "id": "https://remote.example/activities/3",
            "object": {
                "type": "Person",
                "name": "Alice :blobcat:",
                "summary": "<p>bio</p>",
                "content": "ignored for accounts"
            }
        });
        let mut activity = decode(&raw);
        if let Some(person) = activity.object[0].as_object_mut() {
            person.name = None;
            person.content = None;
        }

        normalize_incoming(&mut activity, raw.as_object().unwrap());

        let person = first_object(&activity);
        assert_eq!(person.name.as_deref(), Some("Alice :blobcat:"));
        assert_eq!(person.summary.as_deref(), Some("<p>bio</p>"));
        assert!(person.content.is_none());
    }

    #[test]
    fn test_array_objects_and_iris() {
        let raw = json!({
            "type": "Create",
            "id": "https://remote.example/activities/4",
            "object": [
                "https://remote.example/notes/9",
                { "type": "Article", "content": "<h1>title</h1>" }
            ]
        });
        let mut activity = decode(&raw);
        if let Some(article) = activity.object[1].as_object_mut() {
            article.content = None;
        }

        normalize_incoming(&mut activity, raw.as_object().unwrap());

        assert_eq!(
            activity.object[0].iri(),
            Some(&Url::parse("https://remote.example/notes/9").unwrap())
        );
        assert_eq!(
            activity.object[1].as_object().unwrap().content.as_deref(),
            Some("<h1>title</h1>")
        );
    }

    #[test]
    fn test_idempotent() {
        let raw = json!({
            "type": "Create",
            "id": "https://remote.example/activities/5",
            "object": { "type": "Note", "content": "<p>x</p>", "name": ["a", "b"] }
        });
        let mut once = decode(&raw);
        normalize_incoming(&mut once, raw.as_object().unwrap());
        let mut twice = once.clone();
        normalize_incoming(&mut twice, raw.as_object().unwrap());

        assert_eq!(once, twice);
    }
}
