//! Translation of Bot API updates into canonical remote events.

use std::sync::Arc;

use {
    relaygram_bridge::{
        BridgeApi, ContentBody, MediaInfo, MessageContent, RemoteEvent, RemoteMessageId,
        RemoteRoomId, RemoteUserId, UserId,
    },
    teloxide::{
        payloads::setters::*,
        prelude::Requester,
        types::{
            MediaKind, Message, MessageKind, Recipient, ReplyParameters, Update, UpdateKind, User,
        },
    },
    tracing::{debug, info, warn},
};

use crate::{
    error::Result,
    media::{MediaPipeline, RemoteFile},
    normalize::normalize,
    session::Session,
};

const PHOTO_MIME: &str = "image/jpeg";

const HELP_TEXT: &str = "This bot bridges Telegram chats to Matrix.\n\
    The bridge administrator can connect this chat with /bridge <matrix user id>.";

/// Everything the translation of one update needs.
pub(crate) struct InboundContext {
    pub session: Arc<Session>,
    pub api: Arc<dyn BridgeApi>,
    pub media: Arc<MediaPipeline>,
}

/// Commands accepted in chats that are not bridged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AdminCommand {
    Start,
    Bridge { admin: Option<String> },
}

/// Parse `/start` and `/bridge <mxid>`, tolerating the `@botname` suffix
/// clients append in groups.
fn parse_command(text: &str) -> Option<AdminCommand> {
    let mut words = text.split_whitespace();
    let head = words.next()?.strip_prefix('/')?;
    let name = head.split('@').next()?;
    match name {
        "start" | "help" => Some(AdminCommand::Start),
        "bridge" => Some(AdminCommand::Bridge {
            admin: words.next().map(str::to_string),
        }),
        _ => None,
    }
}

/// `None` for ids outside the signed range chat ids use.
pub(crate) fn remote_user_id(user: &User) -> Option<RemoteUserId> {
    i64::try_from(user.id.0).ok().map(RemoteUserId)
}

fn sender_of(msg: &Message) -> Option<RemoteUserId> {
    msg.from
        .as_ref()
        .and_then(remote_user_id)
        .or_else(|| msg.sender_chat.as_ref().map(|chat| RemoteUserId(chat.id.0)))
}

/// Translate one update. `None` means the update produces no event.
pub(crate) async fn translate_update(
    ctx: &InboundContext,
    update: Update,
) -> Result<Option<RemoteEvent>> {
    match update.kind {
        UpdateKind::Message(msg) => translate_message(ctx, &msg).await,
        UpdateKind::EditedMessage(msg) => translate_edit(ctx, &msg).await,
        other => {
            debug!(actor_id = %ctx.session.actor_id(), "ignoring non-message update: {other:?}");
            Ok(None)
        },
    }
}

async fn translate_message(ctx: &InboundContext, msg: &Message) -> Result<Option<RemoteEvent>> {
    let room_id = RemoteRoomId::Id(msg.chat.id.0);
    let Some(sender) = sender_of(msg) else {
        debug!(chat_id = msg.chat.id.0, "message without sender ignored");
        return Ok(None);
    };

    if !ctx.api.is_room_bridged(&room_id).await? {
        return handle_unbridged(ctx, msg, room_id, sender).await;
    }

    let Some(body) = map_content(ctx, msg).await else {
        debug!(chat_id = msg.chat.id.0, message_id = msg.id.0, "service message ignored");
        return Ok(None);
    };
    let mut content = MessageContent::new(body);
    if let Some(parent) = msg.reply_to_message() {
        match ctx
            .api
            .get_message_event_id(&room_id, RemoteMessageId(parent.id.0))
            .await?
        {
            Some(event_id) => content = content.replying_to(event_id),
            None => debug!(
                chat_id = msg.chat.id.0,
                reply_to = parent.id.0,
                "reply target not linked, dropping thread"
            ),
        }
    }

    Ok(Some(RemoteEvent::Message {
        room_id,
        sender,
        message_id: Some(RemoteMessageId(msg.id.0)),
        content,
    }))
}

async fn translate_edit(ctx: &InboundContext, msg: &Message) -> Result<Option<RemoteEvent>> {
    let room_id = RemoteRoomId::Id(msg.chat.id.0);
    let Some(sender) = sender_of(msg) else {
        return Ok(None);
    };
    if !ctx.api.is_room_bridged(&room_id).await? {
        return Ok(None);
    }

    let Some(target) = ctx
        .api
        .get_message_event_id(&room_id, RemoteMessageId(msg.id.0))
        .await?
    else {
        debug!(chat_id = msg.chat.id.0, message_id = msg.id.0, "edit of unlinked message dropped");
        return Ok(None);
    };
    let Some(body) = map_content(ctx, msg).await else {
        return Ok(None);
    };

    Ok(Some(RemoteEvent::Message {
        room_id,
        sender,
        message_id: None,
        content: MessageContent::edit_of(target, body),
    }))
}

/// Commands in chats that are not bridged yet.
///
/// `/bridge` only checks that the named Matrix user is the actor's admin; the
/// Telegram sender is not authenticated. The resulting room is created for
/// that admin on the Matrix side, so the check is advisory and the admin
/// still decides whether to join.
async fn handle_unbridged(
    ctx: &InboundContext,
    msg: &Message,
    room_id: RemoteRoomId,
    sender: RemoteUserId,
) -> Result<Option<RemoteEvent>> {
    let Some(command) = msg.text().and_then(parse_command) else {
        debug!(chat_id = msg.chat.id.0, "input in unbridged chat ignored");
        return Ok(None);
    };

    let answer = match command {
        AdminCommand::Start => {
            reply(ctx, msg, HELP_TEXT).await;
            return Ok(None);
        },
        AdminCommand::Bridge { admin: None } => "Usage: /bridge <matrix user id>".to_string(),
        AdminCommand::Bridge { admin: Some(raw) } => match UserId::parse(raw.as_str()) {
            Err(_) => format!("{raw} is not a valid Matrix user id."),
            Ok(requested) if &requested != ctx.session.admin() => {
                warn!(
                    actor_id = %ctx.session.actor_id(),
                    chat_id = msg.chat.id.0,
                    requested = %requested,
                    "requested user is not the bridge admin"
                );
                "Only the bridge administrator can bridge this chat.".to_string()
            },
            Ok(_) if msg.chat.is_channel() => "Channels cannot be bridged.".to_string(),
            Ok(admin) => {
                let initial_members = initial_members(ctx, msg, sender).await;
                info!(
                    actor_id = %ctx.session.actor_id(),
                    chat_id = msg.chat.id.0,
                    members = initial_members.len(),
                    "bridging chat"
                );
                reply(ctx, msg, &format!("Bridging this chat for {admin}.")).await;
                return Ok(Some(RemoteEvent::RoomCreate {
                    room_id,
                    initial_members,
                }));
            },
        },
    };
    reply(ctx, msg, &answer).await;
    Ok(None)
}

/// Members a freshly bridged room starts with: the chat administrators in
/// groups, the requesting user in private chats or when the lookup fails.
async fn initial_members(
    ctx: &InboundContext,
    msg: &Message,
    sender: RemoteUserId,
) -> Vec<RemoteUserId> {
    if msg.chat.is_private() {
        return vec![sender];
    }
    match normalize(ctx.session.bot().get_chat_administrators(msg.chat.id).await).into_result() {
        Ok(admins) => {
            let mut members: Vec<RemoteUserId> = admins
                .iter()
                .filter(|member| !member.user.is_bot)
                .filter_map(|member| remote_user_id(&member.user))
                .collect();
            if !members.contains(&sender) {
                members.push(sender);
            }
            members
        },
        Err(e) => {
            warn!(chat_id = msg.chat.id.0, error = %e, "failed to list chat administrators");
            vec![sender]
        },
    }
}

/// Best-effort reply to an administrative command.
async fn reply(ctx: &InboundContext, msg: &Message, text: &str) {
    let result = ctx
        .session
        .bot()
        .send_message(Recipient::Id(msg.chat.id), text)
        .reply_parameters(ReplyParameters::new(msg.id).allow_sending_without_reply())
        .await;
    if let Err(e) = normalize(result).into_result() {
        warn!(chat_id = msg.chat.id.0, error = %e, "failed to answer command");
    }
}

/// Canonical body for a message payload. `None` for service messages.
async fn map_content(ctx: &InboundContext, msg: &Message) -> Option<ContentBody> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };
    let body = match &common.media_kind {
        MediaKind::Text(t) => ContentBody::text(t.text.clone()),
        MediaKind::Photo(p) => {
            let caption = p.caption.clone();
            // Largest rendition by reported file size.
            let Some(photo) = p.photo.iter().max_by_key(|ps| ps.file.size) else {
                return Some(ContentBody::notice(failure_notice("photo", "no sizes offered", caption)));
            };
            let file = RemoteFile {
                file_id: &photo.file.id,
                file_name: None,
                content_type: Some(PHOTO_MIME),
                size: Some(u64::from(photo.file.size)),
            };
            match ctx.media.import(ctx.session.bot(), file).await {
                Ok(imported) => ContentBody::Image {
                    body: caption.unwrap_or_else(|| imported.file_name.clone()),
                    file_name: Some(imported.file_name),
                    media: imported.media,
                    info: MediaInfo {
                        mimetype: imported.content_type,
                        size: imported.size,
                        width: Some(photo.width),
                        height: Some(photo.height),
                    },
                },
                Err(e) => {
                    warn!(chat_id = msg.chat.id.0, error = %e, "failed to import telegram photo");
                    ContentBody::notice(failure_notice("photo", &e.to_string(), caption))
                },
            }
        },
        MediaKind::Document(d) => {
            let caption = d.caption.clone();
            let mime = d.document.mime_type.as_ref().map(ToString::to_string);
            let file = RemoteFile {
                file_id: &d.document.file.id,
                file_name: d.document.file_name.as_deref(),
                content_type: mime.as_deref(),
                size: Some(u64::from(d.document.file.size)),
            };
            match ctx.media.import(ctx.session.bot(), file).await {
                Ok(imported) => ContentBody::File {
                    body: caption.unwrap_or_else(|| imported.file_name.clone()),
                    file_name: Some(imported.file_name),
                    media: imported.media,
                    info: MediaInfo {
                        mimetype: imported.content_type,
                        size: imported.size,
                        width: None,
                        height: None,
                    },
                },
                Err(e) => {
                    warn!(chat_id = msg.chat.id.0, error = %e, "failed to import telegram document");
                    ContentBody::notice(failure_notice("file", &e.to_string(), caption))
                },
            }
        },
        other => ContentBody::Unsupported {
            kind: describe_media_kind(other).to_string(),
            body: msg.caption().unwrap_or_default().to_string(),
        },
    };
    Some(body)
}

fn failure_notice(what: &str, reason: &str, caption: Option<String>) -> String {
    match caption {
        Some(caption) if !caption.is_empty() => {
            format!("Failed to bridge {what}: {reason}\n{caption}")
        },
        _ => format!("Failed to bridge {what}: {reason}"),
    }
}

fn describe_media_kind(kind: &MediaKind) -> &'static str {
    match kind {
        MediaKind::Text(_) => "text",
        MediaKind::Animation(_) => "animation",
        MediaKind::Audio(_) => "audio",
        MediaKind::Contact(_) => "contact",
        MediaKind::Document(_) => "document",
        MediaKind::Game(_) => "game",
        MediaKind::Location(_) => "location",
        MediaKind::Photo(_) => "photo",
        MediaKind::Poll(_) => "poll",
        MediaKind::Sticker(_) => "sticker",
        MediaKind::Venue(_) => "venue",
        MediaKind::Video(_) => "video",
        MediaKind::VideoNote(_) => "video note",
        MediaKind::Voice(_) => "voice",
        _ => "unknown",
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    #[rstest]
    #[case("/start", Some(AdminCommand::Start))]
    #[case("/start@relay_bot", Some(AdminCommand::Start))]
    #[case("/help", Some(AdminCommand::Start))]
    #[case("/bridge", Some(AdminCommand::Bridge { admin: None }))]
    #[case(
        "/bridge @alice:example.org",
        Some(AdminCommand::Bridge { admin: Some("@alice:example.org".into()) })
    )]
    #[case(
        "/bridge@relay_bot   @alice:example.org extra",
        Some(AdminCommand::Bridge { admin: Some("@alice:example.org".into()) })
    )]
    #[case("bridge @alice:example.org", None)]
    #[case("/unknown", None)]
    #[case("", None)]
    fn commands(#[case] text: &str, #[case] expected: Option<AdminCommand>) {
        assert_eq!(parse_command(text), expected);
    }

    #[test]
    fn failure_notice_keeps_caption() {
        assert_eq!(
            failure_notice("photo", "timeout", Some("holiday".into())),
            "Failed to bridge photo: timeout\nholiday"
        );
        assert_eq!(failure_notice("file", "gone", None), "Failed to bridge file: gone");
        assert_eq!(failure_notice("file", "gone", Some(String::new())), "Failed to bridge file: gone");
    }

    #[test]
    fn sender_falls_back_to_sender_chat() {
        let msg: Message = serde_json::from_value(json!({
            "message_id": 3,
            "date": 1,
            "chat": { "id": -100200, "type": "supergroup", "title": "Group" },
            "sender_chat": { "id": -100200, "type": "supergroup", "title": "Group" },
            "text": "anonymous admin"
        }))
        .expect("deserialize anonymous message");
        assert_eq!(sender_of(&msg), Some(RemoteUserId(-100200)));

        let msg: Message = serde_json::from_value(json!({
            "message_id": 4,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": { "id": 7, "is_bot": false, "first_name": "Alice" },
            "text": "hi"
        }))
        .expect("deserialize private message");
        assert_eq!(sender_of(&msg), Some(RemoteUserId(7)));
    }

    #[test]
    fn out_of_range_user_id_has_no_remote_id() {
        let user: User = serde_json::from_value(json!({
            "id": u64::MAX,
            "is_bot": false,
            "first_name": "Overflow"
        }))
        .unwrap();
        assert_eq!(remote_user_id(&user), None);

        let user: User = serde_json::from_value(json!({
            "id": 7_000_000_000u64,
            "is_bot": false,
            "first_name": "Large"
        }))
        .unwrap();
        assert_eq!(remote_user_id(&user), Some(RemoteUserId(7_000_000_000)));
    }

    #[test]
    fn describes_unsupported_media() {
        let msg: Message = serde_json::from_value(json!({
            "message_id": 5,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": { "id": 7, "is_bot": false, "first_name": "Alice" },
            "location": { "latitude": 48.85, "longitude": 2.35 }
        }))
        .expect("deserialize location message");
        let MessageKind::Common(common) = &msg.kind else {
            panic!("expected common message");
        };
        assert_eq!(describe_media_kind(&common.media_kind), "location");
    }
}
