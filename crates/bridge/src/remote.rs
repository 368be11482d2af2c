use serde::{Deserialize, Serialize};

use crate::ids::{RemoteRoomId, RemoteUserId};

/// Profile of a remote user, as far as the remote API reveals it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: RemoteUserId,
    pub display_name: String,
}

/// Description of a remote chat used when the framework creates its room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRoom {
    pub id: RemoteRoomId,
    pub is_direct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}
