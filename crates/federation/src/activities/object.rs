//! Generic ActivityStreams object shape.
//!
//! Remote servers disagree on almost every detail of JSON-LD compaction, so
//! [`ApObject`] reads leniently: single values and arrays are both accepted,
//! natural language properties may arrive as plain strings or language maps,
//! and references may be bare IRIs or embedded objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use url::Url;

/// Any ActivityStreams object or activity, decoded without vocabulary checks.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApObject {
    /// Declared type names, in document order.
    #[serde(rename = "type", default, deserialize_with = "one_or_many")]
    pub kind: Vec<String>,
    /// Absent when missing or not an absolute IRI.
    #[serde(default, deserialize_with = "lenient_iri")]
    pub id: Option<Url>,

    /// Performer, when this is an activity.
    #[serde(default, deserialize_with = "one_or_many")]
    pub actor: Vec<ObjectRef>,
    /// Author.
    #[serde(default, deserialize_with = "one_or_many")]
    pub attributed_to: Vec<ObjectRef>,
    /// Object acted on, when this is an activity.
    #[serde(default, deserialize_with = "one_or_many")]
    pub object: Vec<ObjectRef>,
    /// Target collection or object.
    #[serde(default, deserialize_with = "one_or_many")]
    pub target: Vec<ObjectRef>,
    /// Instrument, when this is an activity.
    #[serde(default, deserialize_with = "one_or_many")]
    pub instrument: Vec<ObjectRef>,
    /// Object this replies to.
    #[serde(default, deserialize_with = "one_or_many")]
    pub in_reply_to: Vec<ObjectRef>,
    /// Mentions, hashtags and emoji.
    #[serde(default, deserialize_with = "one_or_many")]
    pub tag: Vec<ObjectRef>,
    /// Media and profile fields.
    #[serde(default, deserialize_with = "one_or_many")]
    pub attachment: Vec<ObjectRef>,

    /// Primary audience.
    #[serde(default, deserialize_with = "one_or_many")]
    pub to: Vec<ObjectRef>,
    /// Secondary audience.
    #[serde(default, deserialize_with = "one_or_many")]
    pub cc: Vec<ObjectRef>,
    /// Private primary audience.
    #[serde(default, deserialize_with = "one_or_many")]
    pub bto: Vec<ObjectRef>,
    /// Private secondary audience.
    #[serde(default, deserialize_with = "one_or_many")]
    pub bcc: Vec<ObjectRef>,
    /// Audience the object is scoped to.
    #[serde(default, deserialize_with = "one_or_many")]
    pub audience: Vec<ObjectRef>,

    // Quote posts. Misskey sends all three.
    /// `quoteUrl`, as sent by Misskey and Akkoma.
    #[serde(default, deserialize_with = "lenient_iri")]
    pub quote_url: Option<Url>,
    /// `quoteUri`, as sent by Fedibird.
    #[serde(default, deserialize_with = "lenient_iri")]
    pub quote_uri: Option<Url>,
    /// `_misskey_quote`.
    #[serde(rename = "_misskey_quote", default, deserialize_with = "lenient_iri")]
    pub misskey_quote: Option<Url>,
    /// Link target for `Link`/`Mention` shaped tags.
    #[serde(default, deserialize_with = "lenient_iri")]
    pub href: Option<Url>,

    /// Body text.
    #[serde(default, deserialize_with = "natural_language")]
    pub content: Option<String>,
    /// Summary, or content warning on posts.
    #[serde(default, deserialize_with = "natural_language")]
    pub summary: Option<String>,
    /// Display name.
    #[serde(default, deserialize_with = "natural_language")]
    pub name: Option<String>,

    /// Publication time, when it parses.
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub published: Option<DateTime<Utc>>,
}

impl ApObject {
    /// Type names as given, in document order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.kind.iter().map(String::as_str)
    }

    /// The first declared type name, if any.
    #[must_use]
    pub fn primary_type(&self) -> Option<&str> {
        self.kind.first().map(String::as_str)
    }

    /// The quoted object, whichever property carried it.
    #[must_use]
    pub fn quote(&self) -> Option<&Url> {
        self.quote_url
            .as_ref()
            .or(self.quote_uri.as_ref())
            .or(self.misskey_quote.as_ref())
    }
}

/// A reference to another object: an IRI, an embedded object, or something
/// we could not make sense of.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ObjectRef {
    /// A bare IRI.
    Iri(Url),
    /// An embedded object.
    Object(Box<ApObject>),
    /// Anything else, kept as sent.
    Other(Value),
}

impl ObjectRef {
    /// The IRI this reference names: the IRI itself, or the embedded object's id.
    #[must_use]
    pub fn iri(&self) -> Option<&Url> {
        match self {
            Self::Iri(iri) => Some(iri),
            Self::Object(object) => object.id.as_ref(),
            Self::Other(_) => None,
        }
    }

    /// The embedded object, when the reference carries one.
    #[must_use]
    pub fn as_object(&self) -> Option<&ApObject> {
        match self {
            Self::Object(object) => Some(&**object),
            Self::Iri(_) | Self::Other(_) => None,
        }
    }

    /// Mutable access to the embedded object.
    pub fn as_object_mut(&mut self) -> Option<&mut ApObject> {
        match self {
            Self::Object(object) => Some(&mut **object),
            Self::Iri(_) | Self::Other(_) => None,
        }
    }
}

impl From<Url> for ObjectRef {
    fn from(iri: Url) -> Self {
        Self::Iri(iri)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Accept `null`, a single value, or an array.
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

/// Read a natural language property: a string, a `{"@value": ..}` node,
/// a language map, or an array of any of those (first usable entry wins).
fn natural_language<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(|v| text_of(&v)))
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(values) => values.iter().find_map(text_of),
        Value::Object(map) => map
            .get("@value")
            .and_then(text_of)
            .or_else(|| map.values().find_map(text_of)),
        _ => None,
    }
}

fn lenient_iri<'de, D>(deserializer: D) -> Result<Option<Url>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| Url::parse(s).ok()))
}

fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> ApObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_single_and_array_properties() {
        let object = parse(json!({
            "type": "Note",
            "id": "https://remote.example/notes/1",
            "to": "https://www.w3.org/ns/activitystreams#Public",
            "cc": ["https://remote.example/users/alice/followers"]
        }));

        assert_eq!(object.primary_type(), Some("Note"));
        assert_eq!(object.to.len(), 1);
        assert_eq!(object.cc.len(), 1);
        assert!(object.bcc.is_empty());
    }

    #[test]
    fn test_multiple_types() {
        let object = parse(json!({ "type": ["Note", "http://example.com/ns#Fancy"] }));
        assert_eq!(object.type_names().collect::<Vec<_>>().len(), 2);
        assert_eq!(object.primary_type(), Some("Note"));
    }

    #[test]
    fn test_references() {
        let object = parse(json!({
            "type": "Create",
            "actor": "https://remote.example/users/alice",
            "object": {
                "type": "Note",
                "id": "https://remote.example/notes/1",
                "inReplyTo": "https://local.example/notes/9"
            },
            "target": 42
        }));

        assert_eq!(
            object.actor[0].iri().map(Url::as_str),
            Some("https://remote.example/users/alice")
        );
        let note = object.object[0].as_object().unwrap();
        assert_eq!(
            note.in_reply_to[0].iri().map(Url::as_str),
            Some("https://local.example/notes/9")
        );
        assert_eq!(object.target, vec![ObjectRef::Other(json!(42))]);
        assert!(object.target[0].iri().is_none());
    }

    #[test]
    fn test_natural_language_forms() {
        let plain = parse(json!({ "content": "<p>hi</p>" }));
        assert_eq!(plain.content.as_deref(), Some("<p>hi</p>"));

        let value_node = parse(json!({ "content": { "@value": "hello", "@language": "en" } }));
        assert_eq!(value_node.content.as_deref(), Some("hello"));

        let array = parse(json!({ "summary": [null, "cw"] }));
        assert_eq!(array.summary.as_deref(), Some("cw"));

        let nothing = parse(json!({ "name": 3 }));
        assert!(nothing.name.is_none());
    }

    #[test]
    fn test_lenient_scalars() {
        let object = parse(json!({
            "published": "not a date",
            "href": "not a url",
            "quoteUri": "https://remote.example/notes/2",
            "_misskey_quote": "https://remote.example/notes/2"
        }));

        assert!(object.published.is_none());
        assert!(object.href.is_none());
        assert_eq!(
            object.quote().map(Url::as_str),
            Some("https://remote.example/notes/2")
        );
    }

    #[test]
    fn test_unusable_id_reads_as_absent() {
        for id in [json!(7), json!(""), json!("/activities/1"), json!(null)] {
            assert!(parse(json!({ "type": "Follow", "id": id })).id.is_none());
        }
    }
}
