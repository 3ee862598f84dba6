use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype with the usual conversions.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// User identity. Addressing key for direct messages and live connections.
    UserId
);
uuid_id!(GroupId);
uuid_id!(EventId);
uuid_id!(StatusId);
uuid_id!(MessageId);
uuid_id!(ConversationId);

impl UserId {
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

/// Where a chat message is addressed.
///
/// Resolved once at the request boundary; everything past it branches on
/// the tag instead of a query flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum MessageTarget {
    Direct(UserId),
    Group(GroupId),
}

impl MessageTarget {
    /// Build a target from a path id plus the `isGroup` query flag.
    pub fn from_flag(id: Uuid, is_group: bool) -> Self {
        if is_group {
            Self::Group(GroupId(id))
        } else {
            Self::Direct(UserId(id))
        }
    }
}

impl std::fmt::Display for MessageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct(user) => write!(f, "user:{user}"),
            Self::Group(group) => write!(f, "group:{group}"),
        }
    }
}

/// Coarse classification returned by the media upload service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Image,
    Video,
}

impl MediaType {
    /// Classify by MIME type. Anything that is not `video/*` is an image.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.trim().to_ascii_lowercase().starts_with("video/") {
            Self::Video
        } else {
            Self::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "video" => Self::Video,
            _ => Self::Image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_from_flag() {
        let id = Uuid::new_v4();
        assert_eq!(MessageTarget::from_flag(id, true), MessageTarget::Group(GroupId(id)));
        assert_eq!(MessageTarget::from_flag(id, false), MessageTarget::Direct(UserId(id)));
    }

    #[test]
    fn media_type_classification() {
        assert_eq!(MediaType::from_content_type("video/mp4"), MediaType::Video);
        assert_eq!(MediaType::from_content_type("VIDEO/webm"), MediaType::Video);
        assert_eq!(MediaType::from_content_type("image/png"), MediaType::Image);
        assert_eq!(MediaType::from_content_type("application/octet-stream"), MediaType::Image);
    }

    #[test]
    fn ids_serialize_as_bare_uuid() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }
}
