//! Vocabulary shared between the Telegram worker and the bridging framework.
//!
//! The framework owns appservice delivery, persistence and provisioning; this
//! crate only describes the seams: identifiers, the canonical event model and
//! the collaborator traits the worker calls back into.

pub mod actor;
pub mod api;
pub mod error;
pub mod event;
pub mod ids;
pub mod remote;

pub use {
    actor::{ActorRepository, ActorSessionData, MemoryActorRepository},
    api::{BridgeApi, ByteStream, MediaDownload, MediaStore},
    error::{Error, Result},
    event::{
        ContentBody, ContentKind, MediaInfo, MessageContent, Relations, RemoteEvent, Replacement,
        RoomEvent, RoomEventKind,
    },
    ids::{ActorId, EventId, MediaRef, RemoteMessageId, RemoteRoomId, RemoteUserId, UserId},
    remote::{RemoteRoom, RemoteUser},
};
