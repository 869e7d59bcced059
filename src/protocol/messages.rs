use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error_codes::ErrorCode;

fn default_true() -> bool {
    true
}

fn default_room_name() -> String {
    "Room".to_string()
}

/// One client request, tagged by its `action` field.
///
/// Internally tagged serde keeps the wire shape flat:
/// `{"action":"join_room","room_id":"..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    Register {
        username: String,
        password: String,
        role: String,
    },
    Login {
        username: String,
        password: String,
        role: String,
    },
    ListGames,
    GetGameInfo {
        game_id: String,
    },
    MyGames,
    UploadGameInit {
        name: String,
        version: String,
        #[serde(default)]
        description: String,
        client_entry: String,
        #[serde(default)]
        server_entry: Option<String>,
        max_players: u8,
        #[serde(default)]
        game_id: Option<String>,
    },
    UploadGameChunk {
        upload_id: String,
        data: String,
        #[serde(default)]
        eof: bool,
    },
    DeleteGame {
        game_id: String,
    },
    DownloadGame {
        game_id: String,
    },
    SubmitReview {
        game_id: String,
        rating: i64,
        #[serde(default)]
        comment: String,
    },
    ListRooms,
    GetRoomInfo {
        room_id: String,
    },
    CreateRoom {
        game_id: String,
        #[serde(default = "default_room_name")]
        room_name: String,
        max_players: u8,
    },
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    SetReady {
        room_id: String,
        #[serde(default = "default_true")]
        ready: bool,
    },
    CloseRoom {
        room_id: String,
    },
    StartGame {
        room_id: String,
    },
    EndGame {
        room_id: String,
    },
}

impl Request {
    /// Wire name of the action, for logging.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Login { .. } => "login",
            Self::ListGames => "list_games",
            Self::GetGameInfo { .. } => "get_game_info",
            Self::MyGames => "my_games",
            Self::UploadGameInit { .. } => "upload_game_init",
            Self::UploadGameChunk { .. } => "upload_game_chunk",
            Self::DeleteGame { .. } => "delete_game",
            Self::DownloadGame { .. } => "download_game",
            Self::SubmitReview { .. } => "submit_review",
            Self::ListRooms => "list_rooms",
            Self::GetRoomInfo { .. } => "get_room_info",
            Self::CreateRoom { .. } => "create_room",
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom { .. } => "leave_room",
            Self::SetReady { .. } => "set_ready",
            Self::CloseRoom { .. } => "close_room",
            Self::StartGame { .. } => "start_game",
            Self::EndGame { .. } => "end_game",
        }
    }
}

/// `{"status":"ok"}` with no payload.
pub fn ok_reply() -> Value {
    json!({ "status": "ok" })
}

/// `{"status":"ok", ...fields}`.
pub fn ok_fields<I>(fields: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    let mut map = serde_json::Map::new();
    map.insert("status".to_string(), json!("ok"));
    for (key, value) in fields {
        map.insert(key.to_string(), value);
    }
    Value::Object(map)
}

/// `{"status":"error", "message": ..., "error_code": ...}`.
pub fn error_reply(code: ErrorCode, message: impl Into<String>) -> Value {
    json!({
        "status": "error",
        "message": message.into(),
        "error_code": code,
    })
}
