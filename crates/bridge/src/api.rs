use {async_trait::async_trait, bytes::Bytes, futures::stream::BoxStream};

use crate::{
    Result,
    ids::{EventId, MediaRef, RemoteMessageId, RemoteRoomId},
};

/// Streamed media body.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Media fetched from the room-message store.
pub struct MediaDownload {
    pub body: ByteStream,
    pub content_type: Option<String>,
    pub length: Option<u64>,
}

impl std::fmt::Debug for MediaDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaDownload")
            .field("content_type", &self.content_type)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Room-side media repository.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn download(&self, media: &MediaRef) -> Result<MediaDownload>;

    async fn upload(
        &self,
        body: ByteStream,
        content_type: Option<&str>,
        file_name: Option<&str>,
        length: Option<u64>,
    ) -> Result<MediaRef>;
}

/// Room and message-link queries the framework answers for the worker.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    async fn is_room_bridged(&self, room_id: &RemoteRoomId) -> Result<bool>;

    /// Room event previously linked to a remote message.
    async fn get_message_event_id(
        &self,
        room_id: &RemoteRoomId,
        message_id: RemoteMessageId,
    ) -> Result<Option<EventId>>;

    /// Remote message previously linked to a room event.
    async fn get_remote_message_id(
        &self,
        room_id: &RemoteRoomId,
        event_id: &EventId,
    ) -> Result<Option<RemoteMessageId>>;

    /// Record that `event_id` is represented remotely by `message_id`.
    ///
    /// Must not return before the link is visible to the lookups above.
    async fn link_message_id(
        &self,
        room_id: &RemoteRoomId,
        event_id: &EventId,
        message_id: RemoteMessageId,
    ) -> Result<()>;
}
