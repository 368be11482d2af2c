//! Delivery of room events to Telegram.

use std::sync::Arc;

use {
    relaygram_bridge::{
        ActorId, BridgeApi, ContentBody, EventId, MediaRef, MessageContent, RemoteMessageId,
        RemoteRoomId, RoomEvent, RoomEventKind, UserId,
    },
    teloxide::{
        Bot,
        payloads::setters::*,
        prelude::Requester,
        types::{ChatId, InputFile, MessageId, Recipient, ReplyParameters},
    },
    tracing::{debug, info},
};

use crate::{
    error::{Error, Result},
    media::{LocalMedia, MediaPipeline},
    normalize::{ApiOutcome, KnownApiError, normalize},
    session::{Session, SessionManager},
};

/// Outbound message sender for Telegram.
pub struct TelegramOutbound {
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) api: Arc<dyn BridgeApi>,
    pub(crate) media: Arc<MediaPipeline>,
}

/// How an outgoing attachment is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachmentKind {
    Picture,
    File,
}

impl AttachmentKind {
    fn noun(self) -> &'static str {
        match self {
            Self::Picture => "picture",
            Self::File => "file",
        }
    }
}

impl TelegramOutbound {
    /// Replicate `event` into `room_id`.
    ///
    /// Returns the id of the Telegram message created for the event, already
    /// linked through [`BridgeApi::link_message_id`]. In-place edits and
    /// deletions create no new message and return `None`.
    pub async fn handle_event(
        &self,
        actor_id: ActorId,
        room_id: &RemoteRoomId,
        event: &RoomEvent,
    ) -> Result<Option<RemoteMessageId>> {
        match &event.kind {
            RoomEventKind::Message(content) => {
                self.handle_message(actor_id, room_id, event, content).await
            },
            RoomEventKind::Redaction { redacts } => {
                self.handle_redaction(actor_id, room_id, redacts).await?;
                Ok(None)
            },
            RoomEventKind::Other { event_type } => {
                debug!(%actor_id, %room_id, event_type, "ignoring non-message room event");
                Ok(None)
            },
        }
    }

    async fn handle_message(
        &self,
        actor_id: ActorId,
        room_id: &RemoteRoomId,
        event: &RoomEvent,
        content: &MessageContent,
    ) -> Result<Option<RemoteMessageId>> {
        let relations = &content.relations;
        if relations.replace.is_some() && relations.in_reply_to.is_some() {
            return Err(Error::invalid_event(format!(
                "event {} carries both an edit and a reply relation",
                event.event_id
            )));
        }
        let body = relations
            .replace
            .as_ref()
            .map_or(&content.body, |replacement| &replacement.new_content);
        if let ContentBody::Unsupported { kind, .. } = body {
            return Err(Error::unsupported(format!("unhandled event: {kind} message")));
        }

        let session = self.sessions.get_session(actor_id).await?;

        if let Some(replacement) = &relations.replace {
            let Some(target) = self
                .api
                .get_remote_message_id(room_id, &replacement.event_id)
                .await?
            else {
                info!(
                    %actor_id,
                    %room_id,
                    replaces = %replacement.event_id,
                    "edit target not linked, sending as new message"
                );
                return self
                    .send_new(&session, room_id, event, &replacement.new_content, None, false)
                    .await;
            };

            if replacement.new_content.kind() != content.body.kind() {
                return Err(Error::unsupported(format!(
                    "cannot change a {} message into a {} message",
                    content.body.kind(),
                    replacement.new_content.kind()
                )));
            }
            return self
                .send_edit(&session, room_id, event, target, &replacement.new_content)
                .await;
        }

        let reply_to = match &relations.in_reply_to {
            Some(parent) => {
                let resolved = self.api.get_remote_message_id(room_id, parent).await?;
                if resolved.is_none() {
                    debug!(%actor_id, %room_id, in_reply_to = %parent, "reply target not linked");
                }
                resolved
            },
            None => None,
        };
        self.send_new(&session, room_id, event, &content.body, reply_to, false)
            .await
    }

    /// Send a new message and link it to `event`.
    async fn send_new(
        &self,
        session: &Session,
        room_id: &RemoteRoomId,
        event: &RoomEvent,
        body: &ContentBody,
        reply_to: Option<RemoteMessageId>,
        edit: bool,
    ) -> Result<Option<RemoteMessageId>> {
        let recipient = recipient(room_id);
        let sent = match body {
            ContentBody::Text { body } | ContentBody::Notice { body } => {
                send_text(session.bot(), recipient, compose_text(&event.sender, body), reply_to)
                    .await?
            },
            ContentBody::Image {
                body,
                file_name,
                media,
                ..
            } => {
                self.send_attachment(session.bot(), recipient, media, AttachmentSend {
                    kind: AttachmentKind::Picture,
                    file_name: file_name.as_deref().unwrap_or(body),
                    caption: media_caption(&event.sender, body, file_name.as_deref(), AttachmentKind::Picture, edit),
                    reply_to,
                })
                .await?
            },
            ContentBody::File {
                body,
                file_name,
                media,
                ..
            } => {
                self.send_attachment(session.bot(), recipient, media, AttachmentSend {
                    kind: AttachmentKind::File,
                    file_name: file_name.as_deref().unwrap_or(body),
                    caption: media_caption(&event.sender, body, file_name.as_deref(), AttachmentKind::File, edit),
                    reply_to,
                })
                .await?
            },
            ContentBody::Unsupported { kind, .. } => {
                return Err(Error::unsupported(format!("unhandled event: {kind} message")));
            },
        };

        self.api
            .link_message_id(room_id, &event.event_id, sent)
            .await?;
        info!(
            actor_id = %session.actor_id(),
            %room_id,
            event_id = %event.event_id,
            message_id = sent.0,
            "room event delivered to telegram"
        );
        Ok(Some(sent))
    }

    async fn send_edit(
        &self,
        session: &Session,
        room_id: &RemoteRoomId,
        event: &RoomEvent,
        target: RemoteMessageId,
        new_content: &ContentBody,
    ) -> Result<Option<RemoteMessageId>> {
        match new_content {
            ContentBody::Text { body } | ContentBody::Notice { body } => {
                let result = session
                    .bot()
                    .edit_message_text(
                        recipient(room_id),
                        MessageId(target.0),
                        compose_text(&event.sender, body),
                    )
                    .await;
                match normalize(result) {
                    ApiOutcome::ApplicationError {
                        known: KnownApiError::MessageNotModified,
                        ..
                    } => debug!(%room_id, message_id = target.0, "edit left message unchanged"),
                    outcome => {
                        outcome.into_result()?;
                    },
                }
                Ok(None)
            },
            // No in-place media edit: resend as a reply to the original.
            ContentBody::Image { .. } | ContentBody::File { .. } => {
                self.send_new(session, room_id, event, new_content, Some(target), true)
                    .await
            },
            ContentBody::Unsupported { kind, .. } => {
                Err(Error::unsupported(format!("unhandled event: {kind} message")))
            },
        }
    }

    async fn handle_redaction(
        &self,
        actor_id: ActorId,
        room_id: &RemoteRoomId,
        redacts: &EventId,
    ) -> Result<()> {
        let Some(target) = self.api.get_remote_message_id(room_id, redacts).await? else {
            debug!(%actor_id, %room_id, %redacts, "redaction target not linked");
            return Ok(());
        };

        let session = self.sessions.get_session(actor_id).await?;
        let result = session
            .bot()
            .delete_message(recipient(room_id), MessageId(target.0))
            .await;
        match normalize(result) {
            ApiOutcome::Success(_) => {
                info!(%actor_id, %room_id, message_id = target.0, "telegram message deleted");
                Ok(())
            },
            ApiOutcome::ApplicationError {
                known: KnownApiError::MessageToDeleteNotFound,
                ..
            } => {
                debug!(%actor_id, %room_id, message_id = target.0, "telegram message already gone");
                Ok(())
            },
            // Telegram reports "too old" and "not allowed" identically.
            ApiOutcome::ApplicationError {
                known: KnownApiError::MessageCantBeDeleted,
                description,
                ..
            } => Err(Error::unsupported(format!(
                "telegram message {} cannot be deleted: {description}",
                target.0
            ))),
            outcome => outcome.into_result().map(|_| ()),
        }
    }

    async fn send_attachment(
        &self,
        bot: &Bot,
        recipient: Recipient,
        media: &MediaRef,
        send: AttachmentSend<'_>,
    ) -> Result<RemoteMessageId> {
        let bot = bot.clone();
        let AttachmentSend {
            kind,
            file_name,
            caption,
            reply_to,
        } = send;

        self.media
            .materialize(media, Some(file_name), |local| async move {
                if kind == AttachmentKind::File {
                    return send_document(&bot, recipient, &local, caption, reply_to).await;
                }
                match send_photo(&bot, recipient.clone(), &local, caption.clone(), reply_to).await {
                    Err(e) if is_photo_rejected(&e) => {
                        debug!(error = %e, "photo rejected, retrying as document");
                        send_document(&bot, recipient, &local, caption, reply_to).await
                    },
                    other => other,
                }
            })
            .await
    }
}

struct AttachmentSend<'a> {
    kind: AttachmentKind,
    file_name: &'a str,
    caption: String,
    reply_to: Option<RemoteMessageId>,
}

pub(crate) fn recipient(room_id: &RemoteRoomId) -> Recipient {
    match room_id {
        RemoteRoomId::Id(id) => Recipient::Id(ChatId(*id)),
        RemoteRoomId::ChannelUsername(name) => Recipient::ChannelUsername(name.clone()),
    }
}

fn reply_params(reply_to: RemoteMessageId) -> ReplyParameters {
    ReplyParameters::new(MessageId(reply_to.0)).allow_sending_without_reply()
}

/// `<@alice:example.org>: hello`
fn compose_text(sender: &UserId, body: &str) -> String {
    format!("<{sender}>: {body}")
}

/// Caption for an outgoing attachment. A body that merely repeats the file
/// name carries no text of its own, so it gets a generic caption.
fn media_caption(
    sender: &UserId,
    body: &str,
    file_name: Option<&str>,
    kind: AttachmentKind,
    edit: bool,
) -> String {
    let has_text = !body.is_empty() && file_name.is_some_and(|name| name != body);
    match (has_text, edit) {
        (false, false) => format!("{sender} sent a {}", kind.noun()),
        (false, true) => format!("{sender} replaced a {}", kind.noun()),
        (true, false) => format!("{sender}: {body}"),
        (true, true) => format!("{sender} (edit): {body}"),
    }
}

fn is_photo_rejected(error: &Error) -> bool {
    match error {
        Error::Application { description, .. } => {
            description.contains("PHOTO_INVALID_DIMENSIONS")
                || description.contains("PHOTO_SAVE_FILE_INVALID")
        },
        _ => false,
    }
}

async fn send_text(
    bot: &Bot,
    recipient: Recipient,
    text: String,
    reply_to: Option<RemoteMessageId>,
) -> Result<RemoteMessageId> {
    let mut req = bot.send_message(recipient, text);
    if let Some(reply_to) = reply_to {
        req = req.reply_parameters(reply_params(reply_to));
    }
    let message = normalize(req.await).into_result()?;
    Ok(RemoteMessageId(message.id.0))
}

async fn send_photo(
    bot: &Bot,
    recipient: Recipient,
    local: &LocalMedia,
    caption: String,
    reply_to: Option<RemoteMessageId>,
) -> Result<RemoteMessageId> {
    let input = InputFile::file(local.path.clone()).file_name(local.file_name.clone());
    let mut req = bot.send_photo(recipient, input).caption(caption);
    if let Some(reply_to) = reply_to {
        req = req.reply_parameters(reply_params(reply_to));
    }
    let message = normalize(req.await).into_result()?;
    Ok(RemoteMessageId(message.id.0))
}

async fn send_document(
    bot: &Bot,
    recipient: Recipient,
    local: &LocalMedia,
    caption: String,
    reply_to: Option<RemoteMessageId>,
) -> Result<RemoteMessageId> {
    let input = InputFile::file(local.path.clone()).file_name(local.file_name.clone());
    let mut req = bot.send_document(recipient, input).caption(caption);
    if let Some(reply_to) = reply_to {
        req = req.reply_parameters(reply_params(reply_to));
    }
    let message = normalize(req.await).into_result()?;
    Ok(RemoteMessageId(message.id.0))
}
