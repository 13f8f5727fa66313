//! `ActivityPub` activity model.
//!
//! Incoming documents are decoded into the generic [`ApObject`] shape first and
//! then narrowed into an [`Activity`] whose [`ActivityKind`] is one of a closed
//! set of vocabulary types.

mod normalize;
mod object;
mod vocab;

use chrono::{DateTime, Utc};
use url::Url;

pub use normalize::normalize_incoming;
pub use object::{ApObject, ObjectRef};
pub use vocab::{ActivityKind, ObjectKind, Requirements, is_account_like, is_status_like};

/// An incoming activity that has passed vocabulary and id checks.
#[derive(Clone, Debug, PartialEq)]
pub struct Activity {
    /// The first declared type that is an activity.
    pub kind: ActivityKind,
    /// The activity's own IRI.
    pub id: Url,
    /// Who performed the activity.
    pub actor: Vec<ObjectRef>,
    /// What the activity acts on.
    pub object: Vec<ObjectRef>,
    /// Where the object is added to, removed from, moved to.
    pub target: Vec<ObjectRef>,
    /// What the activity was performed with.
    pub instrument: Vec<ObjectRef>,
    /// Set on activities that are themselves replies, such as `Question`.
    pub in_reply_to: Vec<ObjectRef>,
    /// Primary audience.
    pub to: Vec<ObjectRef>,
    /// Secondary audience.
    pub cc: Vec<ObjectRef>,
    /// Private primary audience.
    pub bto: Vec<ObjectRef>,
    /// Private secondary audience.
    pub bcc: Vec<ObjectRef>,
    /// Audience the activity is scoped to.
    pub audience: Vec<ObjectRef>,
    /// When the activity was published, if the sender said.
    pub published: Option<DateTime<Utc>>,
}

impl Activity {
    /// Narrow a decoded object into an activity of `kind` identified by `id`.
    #[must_use]
    pub fn from_object(kind: ActivityKind, id: Url, object: ApObject) -> Self {
        let ApObject {
            actor,
            object,
            target,
            instrument,
            in_reply_to,
            to,
            cc,
            bto,
            bcc,
            audience,
            published,
            ..
        } = object;

        Self {
            kind,
            id,
            actor,
            object,
            target,
            instrument,
            in_reply_to,
            to,
            cc,
            bto,
            bcc,
            audience,
            published,
        }
    }

    /// IRIs of the actors that performed this activity.
    pub fn actor_iris(&self) -> impl Iterator<Item = &Url> {
        self.actor.iter().filter_map(ObjectRef::iri)
    }

    /// Every addressing property (`to`, `cc`, `bto`, `bcc`, `audience`).
    pub fn addressing(&self) -> impl Iterator<Item = &ObjectRef> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bto)
            .chain(&self.bcc)
            .chain(&self.audience)
    }

    /// Embedded objects carried in `object`.
    pub fn embedded_objects(&self) -> impl Iterator<Item = &ApObject> {
        self.object.iter().filter_map(ObjectRef::as_object)
    }

    /// Whether `object` is set.
    #[must_use]
    pub fn has_object(&self) -> bool {
        !self.object.is_empty()
    }

    /// Whether `target` is set.
    #[must_use]
    pub fn has_target(&self) -> bool {
        !self.target.is_empty()
    }
}
