//! Content negotiation for server-to-server deliveries.
//!
//! <https://www.w3.org/TR/activitypub/#server-to-server-interactions>

/// `application/activity+json`, accepted without parameters.
pub const ACTIVITY_JSON: &str = "application/activity+json";

/// `application/ld+json`, accepted only with the ActivityStreams profile.
pub const LD_JSON: &str = "application/ld+json";

/// The only parameter accepted after [`LD_JSON`], once spaces and quotes are dropped.
pub const ACTIVITY_STREAMS_PROFILE: &str = "profile=https://www.w3.org/ns/activitystreams";

/// Whether `ct` is one of the two ActivityStreams content types:
///
/// - `application/activity+json`
/// - `application/ld+json; profile="https://www.w3.org/ns/activitystreams"`
///
/// Whitespace around the parts and quotes around the profile IRI are ignored.
/// Anything else, including a known media type with an unknown parameter,
/// is refused.
#[must_use]
pub fn is_activity_streams_media_type(ct: &str) -> bool {
    let (media_type, param) = match ct.split_once(';') {
        Some((media_type, param)) => (media_type, param),
        None => (ct, ""),
    };

    match media_type.trim_end_matches(' ') {
        ACTIVITY_JSON => param.is_empty(),
        LD_JSON => param.trim_matches(' ').replace('"', "") == ACTIVITY_STREAMS_PROFILE,
        _ => false,
    }
}

/// Peer-facing explanation for a refused content type.
#[must_use]
pub fn not_acceptable_message(ct: &str) -> String {
    format!(
        "Content-Type {ct} not acceptable, this endpoint accepts: [\"{ACTIVITY_JSON}\" \"{LD_JSON};{ACTIVITY_STREAMS_PROFILE}\"]"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_canonical_forms() {
        for ct in [
            "application/activity+json",
            "application/activity+json ",
            "application/activity+json;",
            "application/ld+json;profile=https://www.w3.org/ns/activitystreams",
            "application/ld+json; profile=https://www.w3.org/ns/activitystreams",
            "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"",
            "application/ld+json ;profile=\"https://www.w3.org/ns/activitystreams\" ",
        ] {
            assert!(is_activity_streams_media_type(ct), "should accept {ct:?}");
        }
    }

    #[test]
    fn test_rejects_everything_else() {
        for ct in [
            "",
            "application/json",
            "text/html",
            "application/activity+json; charset=utf-8",
            "application/ld+json",
            "application/ld+json;profile=https://example.com/ns",
            "application/ld+json; profile=https://w3.org/ns/activitystreams",
            "application/ld+json; charset=utf-8",
            " application/activity+json",
            "APPLICATION/ACTIVITY+JSON",
        ] {
            assert!(!is_activity_streams_media_type(ct), "should reject {ct:?}");
        }
    }

    #[test]
    fn test_matches_federation_library_type() {
        assert_eq!(ACTIVITY_JSON, activitypub_federation::FEDERATION_CONTENT_TYPE);
    }

    #[test]
    fn test_not_acceptable_message_names_both_types() {
        let msg = not_acceptable_message("text/plain");
        assert!(msg.starts_with("Content-Type text/plain not acceptable"));
        assert!(msg.contains("application/activity+json"));
        assert!(msg.contains("application/ld+json;profile=https://www.w3.org/ns/activitystreams"));
    }
}
