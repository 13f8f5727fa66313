//! ActivityStreams vocabulary names known to this server.

use std::fmt;

macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[doc = concat!("`", $text, "`")]
                $variant
            ),+
        }

        impl $name {
            /// Every known variant, in vocabulary order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The JSON-LD type name.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            /// Look up a JSON-LD type name. Accepts the `as:` compact form.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                let name = name.strip_prefix("as:").unwrap_or(name);
                match name {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary! {
    /// Activity types, including the `EmojiReact` extension.
    ActivityKind {
        Accept => "Accept",
        Add => "Add",
        Announce => "Announce",
        Arrive => "Arrive",
        Block => "Block",
        Create => "Create",
        Delete => "Delete",
        Dislike => "Dislike",
        EmojiReact => "EmojiReact",
        Flag => "Flag",
        Follow => "Follow",
        Ignore => "Ignore",
        Invite => "Invite",
        Join => "Join",
        Leave => "Leave",
        Like => "Like",
        Listen => "Listen",
        Move => "Move",
        Offer => "Offer",
        Question => "Question",
        Read => "Read",
        Reject => "Reject",
        Remove => "Remove",
        TentativeAccept => "TentativeAccept",
        TentativeReject => "TentativeReject",
        Travel => "Travel",
        Undo => "Undo",
        Update => "Update",
        View => "View",
    }
}

vocabulary! {
    /// Non-activity types: objects, actors, links and collections.
    ObjectKind {
        Application => "Application",
        Article => "Article",
        Audio => "Audio",
        Collection => "Collection",
        CollectionPage => "CollectionPage",
        Document => "Document",
        Emoji => "Emoji",
        Event => "Event",
        Group => "Group",
        Hashtag => "Hashtag",
        IdentityProof => "IdentityProof",
        Image => "Image",
        Link => "Link",
        Mention => "Mention",
        Note => "Note",
        Object => "Object",
        OrderedCollection => "OrderedCollection",
        OrderedCollectionPage => "OrderedCollectionPage",
        Organization => "Organization",
        Page => "Page",
        Person => "Person",
        Place => "Place",
        Profile => "Profile",
        PropertyValue => "PropertyValue",
        Relationship => "Relationship",
        Service => "Service",
        Tombstone => "Tombstone",
        Video => "Video",
    }
}

/// Properties an activity kind cannot be processed without.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Requirements {
    /// `object` must be set.
    pub object: bool,
    /// `target` must be set.
    pub target: bool,
}

impl ActivityKind {
    /// Which of `object`/`target` this kind requires.
    #[must_use]
    pub const fn requirements(self) -> Requirements {
        let (object, target) = match self {
            Self::Add | Self::Remove => (true, true),
            Self::Accept
            | Self::Announce
            | Self::Block
            | Self::Create
            | Self::Delete
            | Self::Dislike
            | Self::EmojiReact
            | Self::Flag
            | Self::Follow
            | Self::Ignore
            | Self::Like
            | Self::Move
            | Self::Reject
            | Self::TentativeAccept
            | Self::TentativeReject
            | Self::Undo
            | Self::Update => (true, false),
            Self::Arrive
            | Self::Invite
            | Self::Join
            | Self::Leave
            | Self::Listen
            | Self::Offer
            | Self::Question
            | Self::Read
            | Self::Travel
            | Self::View => (false, false),
        };
        Requirements { object, target }
    }
}

/// Whether `name` is a type whose `content` is a post body.
#[must_use]
pub fn is_status_like(name: &str) -> bool {
    if ActivityKind::from_name(name) == Some(ActivityKind::Question) {
        return true;
    }
    matches!(
        ObjectKind::from_name(name),
        Some(
            ObjectKind::Article
                | ObjectKind::Audio
                | ObjectKind::Document
                | ObjectKind::Event
                | ObjectKind::Image
                | ObjectKind::Note
                | ObjectKind::Page
                | ObjectKind::Place
                | ObjectKind::Profile
                | ObjectKind::Video
        )
    )
}

/// Whether `name` is an actor type.
#[must_use]
pub fn is_account_like(name: &str) -> bool {
    matches!(
        ObjectKind::from_name(name),
        Some(
            ObjectKind::Application
                | ObjectKind::Group
                | ObjectKind::Organization
                | ObjectKind::Person
                | ObjectKind::Service
        )
    )
}
