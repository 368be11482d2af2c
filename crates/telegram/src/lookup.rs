//! Read-only queries against the Bot API.

use {
    relaygram_bridge::{ActorId, RemoteRoom, RemoteRoomId, RemoteUser, RemoteUserId},
    serde::{Deserialize, Serialize},
    teloxide::{prelude::Requester, types::ChatId},
};

use crate::{
    error::{Error, Result},
    inbound::remote_user_id,
    normalize::normalize,
    outbound::recipient,
    session::Session,
};

const UNKNOWN_DISPLAY_NAME: &str = "Unknown";

/// Result of a connectivity check for one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub actor_id: ActorId,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn display_name(first_name: Option<&str>, username: Option<&str>) -> String {
    first_name
        .filter(|name| !name.is_empty())
        .or(username)
        .unwrap_or(UNKNOWN_DISPLAY_NAME)
        .to_string()
}

/// Profile of a user, read from their private chat.
pub(crate) async fn get_user(session: &Session, user_id: RemoteUserId) -> Result<RemoteUser> {
    let chat = normalize(session.bot().get_chat(ChatId(user_id.0)).await).into_result()?;
    Ok(RemoteUser {
        id: user_id,
        display_name: display_name(chat.first_name(), chat.username()),
    })
}

/// Description of a group or private chat. Channels cannot be bridged.
pub(crate) async fn get_room(session: &Session, room_id: &RemoteRoomId) -> Result<RemoteRoom> {
    let chat = normalize(session.bot().get_chat(recipient(room_id)).await).into_result()?;
    if chat.is_channel() {
        return Err(Error::unsupported(format!("cannot create a room for channel {room_id}")));
    }
    let display_name = chat
        .title()
        .or_else(|| chat.first_name())
        .map(str::to_string);
    Ok(RemoteRoom {
        id: room_id.clone(),
        is_direct: chat.is_private(),
        display_name,
    })
}

/// Known members of a chat. The Bot API only lists administrators.
pub(crate) async fn get_room_members(
    session: &Session,
    room_id: &RemoteRoomId,
) -> Result<Vec<RemoteUser>> {
    let admins =
        normalize(session.bot().get_chat_administrators(recipient(room_id)).await).into_result()?;
    Ok(admins
        .iter()
        .filter_map(|member| {
            Some(RemoteUser {
                id: remote_user_id(&member.user)?,
                display_name: display_name(
                    Some(member.user.first_name.as_str()),
                    member.user.username.as_deref(),
                ),
            })
        })
        .collect())
}

pub(crate) async fn probe(session: &Session) -> HealthSnapshot {
    let actor_id = session.actor_id();
    match normalize(session.bot().get_me().await).into_result() {
        Ok(me) => HealthSnapshot {
            actor_id,
            connected: true,
            details: Some(format!(
                "Bot: @{}",
                me.username.as_deref().unwrap_or("unknown")
            )),
        },
        Err(e) => HealthSnapshot {
            actor_id,
            connected: false,
            details: Some(format!("API error: {e}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(Some("Alice"), Some("alice"), "Alice")]
    #[case(None, Some("alice"), "alice")]
    #[case(Some(""), Some("alice"), "alice")]
    #[case(None, None, "Unknown")]
    fn display_names(
        #[case] first_name: Option<&str>,
        #[case] username: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(display_name(first_name, username), expected);
    }
}
