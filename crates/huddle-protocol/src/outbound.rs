//! Outbound message types.
//!
//! Lines the relay sends back over the wire:
//!
//! ```text
//! UFULL                     user id pool exhausted (requester only)
//! GFULL                     group id pool exhausted (requester only)
//! PUSH <groupId> <label>    "you are now in this group, show this label"
//! TEXT <groupId> <body>     relayed chat content (broadcast)
//! LIST <json>               presence snapshot (broadcast, per-recipient yourID)
//! ```
//!
//! The `LIST` payload shape is pinned by the browser client; the serde
//! renames below are the wire contract, not a style choice.

use crate::{GroupId, UserId};
use serde::Serialize;
use std::sync::Arc;

/// One named room in the presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomEntry {
    #[serde(rename = "groupname")]
    pub name: String,
    #[serde(rename = "numberofpeople")]
    pub members: usize,
    #[serde(rename = "groupID")]
    pub id: GroupId,
}

/// One identified user in the presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserEntry {
    #[serde(rename = "userID")]
    pub id: UserId,
    pub nickname: String,
}

/// The `LIST` JSON payload. `yourID` is per-recipient; the two lists are
/// identical across recipients at a given snapshot instant.
#[derive(Debug, Serialize)]
pub struct RosterPayload<'a> {
    #[serde(rename = "yourID")]
    pub your_id: i64,
    #[serde(rename = "grouplist")]
    pub groups: &'a [RoomEntry],
    #[serde(rename = "userlist")]
    pub users: &'a [UserEntry],
}

/// An outbound line, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `UFULL` - no free user id.
    UserPoolFull,
    /// `GFULL` - no free group id.
    GroupPoolFull,
    /// `PUSH <groupId> <label>`.
    Push { group: GroupId, label: String },
    /// `TEXT <groupId> <body>`.
    Text { group: GroupId, body: String },
    /// `LIST <json>`. The room and user lists are shared across the
    /// recipients of one snapshot; only `your_id` varies.
    List {
        your_id: i64,
        rooms: Arc<Vec<RoomEntry>>,
        users: Arc<Vec<UserEntry>>,
    },
}

impl ServerMessage {
    /// Render this message as one wire line (no trailing newline).
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            ServerMessage::UserPoolFull => "UFULL".to_owned(),
            ServerMessage::GroupPoolFull => "GFULL".to_owned(),
            ServerMessage::Push { group, label } => format!("PUSH {group} {label}"),
            ServerMessage::Text { group, body } => format!("TEXT {group} {body}"),
            ServerMessage::List {
                your_id,
                rooms,
                users,
            } => {
                let payload = RosterPayload {
                    your_id: *your_id,
                    groups: rooms,
                    users,
                };
                // Plain structs and slices; serialization cannot fail.
                let json = serde_json::to_string(&payload).unwrap_or_default();
                format!("LIST {json}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_lines() {
        assert_eq!(ServerMessage::UserPoolFull.to_line(), "UFULL");
        assert_eq!(ServerMessage::GroupPoolFull.to_line(), "GFULL");
        assert_eq!(
            ServerMessage::Push {
                group: 0,
                label: "lobby".into()
            }
            .to_line(),
            "PUSH 0 lobby"
        );
        assert_eq!(
            ServerMessage::Text {
                group: 5,
                body: "hi".into()
            }
            .to_line(),
            "TEXT 5 hi"
        );
    }

    #[test]
    fn test_roster_json_shape() {
        let msg = ServerMessage::List {
            your_id: 0,
            rooms: Arc::new(vec![RoomEntry {
                name: "lobby".into(),
                members: 2,
                id: 0,
            }]),
            users: Arc::new(vec![
                UserEntry {
                    id: 0,
                    nickname: "alice".into(),
                },
                UserEntry {
                    id: 1,
                    nickname: "bob".into(),
                },
            ]),
        };

        assert_eq!(
            msg.to_line(),
            "LIST {\"yourID\":0,\
             \"grouplist\":[{\"groupname\":\"lobby\",\"numberofpeople\":2,\"groupID\":0}],\
             \"userlist\":[{\"userID\":0,\"nickname\":\"alice\"},{\"userID\":1,\"nickname\":\"bob\"}]}"
        );
    }

    #[test]
    fn test_roster_unidentified_recipient() {
        let msg = ServerMessage::List {
            your_id: -1,
            rooms: Arc::new(Vec::new()),
            users: Arc::new(Vec::new()),
        };
        assert_eq!(
            msg.to_line(),
            "LIST {\"yourID\":-1,\"grouplist\":[],\"userlist\":[]}"
        );
    }
}
