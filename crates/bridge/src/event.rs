use serde::{Deserialize, Serialize};

use crate::ids::{EventId, MediaRef, RemoteMessageId, RemoteRoomId, RemoteUserId, UserId};

/// Structural kind of a message body.
///
/// Edits may only replace a body with one of the same kind: Telegram cannot
/// turn a text message into a photo in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Notice,
    Image,
    File,
    Unsupported,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Notice => "notice",
            Self::Image => "image",
            Self::File => "file",
            Self::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// Optional metadata carried alongside uploaded media.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Message payload, one variant per content kind.
///
/// For media, `body` is the caption when `file_name` is set and differs from
/// it; otherwise `body` is the file name itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msgtype", rename_all = "snake_case")]
pub enum ContentBody {
    Text {
        body: String,
    },
    Notice {
        body: String,
    },
    Image {
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        media: MediaRef,
        #[serde(default)]
        info: MediaInfo,
    },
    File {
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        media: MediaRef,
        #[serde(default)]
        info: MediaInfo,
    },
    /// Anything the bridge cannot represent on the other side
    /// (locations, verification requests, stickers, ...).
    Unsupported {
        kind: String,
        #[serde(default)]
        body: String,
    },
}

impl ContentBody {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    pub fn notice(body: impl Into<String>) -> Self {
        Self::Notice { body: body.into() }
    }

    #[must_use]
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Text { .. } => ContentKind::Text,
            Self::Notice { .. } => ContentKind::Notice,
            Self::Image { .. } => ContentKind::Image,
            Self::File { .. } => ContentKind::File,
            Self::Unsupported { .. } => ContentKind::Unsupported,
        }
    }

    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            Self::Text { body }
            | Self::Notice { body }
            | Self::Image { body, .. }
            | Self::File { body, .. }
            | Self::Unsupported { body, .. } => body,
        }
    }

    /// Same content with `prefix` prepended to the body.
    #[must_use]
    pub fn with_body_prefix(mut self, prefix: &str) -> Self {
        match &mut self {
            Self::Text { body }
            | Self::Notice { body }
            | Self::Image { body, .. }
            | Self::File { body, .. }
            | Self::Unsupported { body, .. } => body.insert_str(0, prefix),
        }
        self
    }
}

/// An edit: the event being replaced and the content replacing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub event_id: EventId,
    pub new_content: ContentBody,
}

/// Relations a message may carry. Both may be present in raw room events;
/// the outbound translator treats that combination as malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<Replacement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<EventId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(flatten)]
    pub body: ContentBody,
    #[serde(default)]
    pub relations: Relations,
}

impl MessageContent {
    #[must_use]
    pub fn new(body: ContentBody) -> Self {
        Self {
            body,
            relations: Relations::default(),
        }
    }

    #[must_use]
    pub fn replying_to(mut self, event_id: EventId) -> Self {
        self.relations.in_reply_to = Some(event_id);
        self
    }

    /// Turn `new_content` into an edit of `event_id`, with the conventional
    /// `"* "` fallback body.
    #[must_use]
    pub fn edit_of(event_id: EventId, new_content: ContentBody) -> Self {
        Self {
            body: new_content.clone().with_body_prefix("* "),
            relations: Relations {
                replace: Some(Replacement {
                    event_id,
                    new_content,
                }),
                in_reply_to: None,
            },
        }
    }
}

/// Canonical events produced from remote activity, consumed by the framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteEvent {
    /// A message (or an edit, expressed through `content.relations.replace`).
    /// `message_id` is the remote id the framework links the resulting room
    /// event to.
    Message {
        room_id: RemoteRoomId,
        sender: RemoteUserId,
        message_id: Option<RemoteMessageId>,
        content: MessageContent,
    },
    /// The remote message was deleted.
    Redaction {
        room_id: RemoteRoomId,
        target: RemoteMessageId,
    },
    /// A remote chat asked to be bridged.
    RoomCreate {
        room_id: RemoteRoomId,
        initial_members: Vec<RemoteUserId>,
    },
}

impl RemoteEvent {
    #[must_use]
    pub fn room_id(&self) -> &RemoteRoomId {
        match self {
            Self::Message { room_id, .. }
            | Self::Redaction { room_id, .. }
            | Self::RoomCreate { room_id, .. } => room_id,
        }
    }
}

/// A room event the framework wants delivered to the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub event_id: EventId,
    pub sender: UserId,
    pub kind: RoomEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEventKind {
    Message(MessageContent),
    Redaction { redacts: EventId },
    /// State and other non-message events; not replicated.
    Other { event_type: String },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_of_prefixes_fallback_body_only() {
        let content = MessageContent::edit_of(EventId::new("$orig"), ContentBody::text("fixed"));
        assert_eq!(content.body, ContentBody::text("* fixed"));
        let replace = content.relations.replace.unwrap();
        assert_eq!(replace.event_id, EventId::new("$orig"));
        assert_eq!(replace.new_content, ContentBody::text("fixed"));
        assert!(content.relations.in_reply_to.is_none());
    }

    #[test]
    fn kind_ignores_payload() {
        let image = ContentBody::Image {
            body: "cat.png".into(),
            file_name: None,
            media: MediaRef::new("mxc://a/b"),
            info: MediaInfo::default(),
        };
        assert_eq!(image.kind(), ContentKind::Image);
        assert_eq!(image.body(), "cat.png");
        assert_ne!(ContentBody::text("x").kind(), ContentBody::notice("x").kind());
    }

    #[test]
    fn message_content_json_is_flat() {
        let content = MessageContent::new(ContentBody::text("hi")).replying_to(EventId::new("$e"));
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["msgtype"], "text");
        assert_eq!(json["body"], "hi");
        assert_eq!(json["relations"]["in_reply_to"], "$e");
    }
}
