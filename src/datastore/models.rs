use chrono::{DateTime, Utc};
use rand::RngExt;
use serde::{Deserialize, Serialize};

/// Client kind. Gates which actions a session may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Player,
    Developer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Developer => "developer",
        }
    }

    /// Parse the wire form; anything else is rejected at the handler.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "player" => Some(Self::Player),
            "developer" => Some(Self::Developer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered account. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// SHA-256 of the password, hex. Unsalted by design scope.
    pub password_hash: String,
    pub role: Role,
    /// Game ids this player has downloaded. Grows, never shrinks.
    #[serde(default)]
    pub owned_games: Vec<String>,
    /// Game ids this developer has published.
    #[serde(default)]
    pub uploaded_games: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One player review on a game. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub username: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// A published bundle in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub game_id: String,
    pub name: String,
    pub developer: String,
    pub version: String,
    pub description: String,
    /// Server-local path of the uploaded archive.
    pub bundle_path: String,
    /// Relative path of the client entry inside the archive.
    pub client_entry: String,
    /// Relative path of the server entry inside the archive. When absent the
    /// runtime falls back to a filename heuristic.
    #[serde(default)]
    pub server_entry: Option<String>,
    pub max_players: u8,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

/// Room lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
}

/// A matchmaking room for one game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub room_name: String,
    pub host: String,
    pub game_id: String,
    pub max_players: u8,
    /// Unique usernames; the host is always present while the room exists.
    pub players: Vec<String>,
    /// Subset of `players`.
    #[serde(default)]
    pub ready_players: Vec<String>,
    pub status: RoomStatus,
    /// Pre-allocated TCP port for the room's game-server child.
    pub game_port: u16,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn is_member(&self, username: &str) -> bool {
        self.players.iter().any(|p| p == username)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= usize::from(self.max_players)
    }

    /// True iff there are at least two players and every one of them is
    /// ready. The host is not exempt.
    pub fn all_ready(&self) -> bool {
        self.players.len() >= 2
            && self
                .players
                .iter()
                .all(|p| self.ready_players.iter().any(|r| r == p))
    }

    /// Players that have not signalled ready yet, in join order.
    pub fn not_ready(&self) -> Vec<String> {
        self.players
            .iter()
            .filter(|p| !self.ready_players.iter().any(|r| r == *p))
            .cloned()
            .collect()
    }
}

/// Alphabet without easily confused characters, same as the room codes
/// players read to each other.
const ROOM_ID_CHARS: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const ROOM_ID_LEN: usize = 8;

/// Generate a short opaque room id.
pub fn generate_room_id() -> String {
    let mut rng = rand::rng();
    (0..ROOM_ID_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ROOM_ID_CHARS.len());
            // SAFETY: `idx` is produced by `random_range(0..len)`, so it is
            // always within [0, len).
            #[allow(clippy::indexing_slicing)]
            let ch = ROOM_ID_CHARS[idx] as char;
            ch
        })
        .collect()
}
