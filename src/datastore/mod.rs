//! Concurrency-safe catalog of users, games, and rooms.
//!
//! Three logical tables with coarse per-table mutual exclusion. Every
//! mutating operation persists the table before releasing its guard, so a
//! success reply implies the change is durable. Persistence is
//! write-temp-then-rename; a reader (or a restart) never observes a partial
//! document.
//!
//! The two-table mutations (`upsert_game`, `increment_download`,
//! `delete_game`) acquire the Games guard, then the Users guard; the
//! start-game transaction acquires the Games guard, then the Rooms guard.
//! The Games guard always comes first wherever two tables meet.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};

pub mod models;


pub use models::{Game, Review, Role, Room, RoomStatus, User};

/// SHA-256 hex digest of a password.
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Metadata for inserting or updating a game record.
#[derive(Debug, Clone)]
pub struct GameUpsert {
    pub developer: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub bundle_path: String,
    pub client_entry: String,
    pub server_entry: Option<String>,
    pub max_players: u8,
    /// `Some` updates an existing record in place; `None` creates one.
    pub game_id: Option<String>,
}

/// Result of an atomic `join_room`.
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    Joined(Room),
    /// The caller was already a member; treated as success.
    AlreadyIn(Room),
    Full,
    AlreadyStarted,
    NotFound,
}

/// Result of `leave_room`.
#[derive(Debug, Clone)]
pub enum LeaveOutcome {
    /// A non-host member left; `destroyed` when the room emptied out.
    Left { destroyed: bool },
    /// The host left. The room was deleted; the snapshot lets the caller
    /// stop any running child.
    HostLeft(Room),
    NotMember,
    NotFound,
}

/// Result of `set_ready`.
#[derive(Debug, Clone)]
pub enum ReadyOutcome {
    Updated(Room),
    NotInRoom,
    NotFound,
}

/// Result of the atomic start-game transaction.
#[derive(Debug, Clone)]
pub enum StartCheck {
    /// Every precondition held; the room is now `playing`. Carries the game
    /// record verified inside the transaction so the caller spawns exactly
    /// what was checked.
    Started { room: Room, game: Game },
    NotFound,
    NotHost,
    AlreadyStarted,
    NotEnoughPlayers,
    NotAllReady(Vec<String>),
    /// The room's game record is gone from the catalog.
    GameMissing,
}

/// Storage contract for the platform catalog.
///
/// Any durable KV backend can satisfy this; the shipped implementation is
/// three JSON documents on disk.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // ----- users -----

    /// Returns false when the username is taken.
    async fn register_user(&self, username: &str, password: &str, role: Role) -> Result<bool>;

    /// Username, password hash, and role must all match.
    async fn validate_login(&self, username: &str, password: &str, role: Role) -> Result<bool>;

    async fn get_user(&self, username: &str) -> Result<Option<User>>;

    // ----- games -----

    async fn list_games(&self) -> Result<Vec<Game>>;

    async fn get_game(&self, game_id: &str) -> Result<Option<Game>>;

    /// Insert or update a game record and keep the developer's
    /// `uploaded_games` in sync. Returns the game id.
    async fn upsert_game(&self, upsert: GameUpsert) -> Result<String>;

    /// Remove a game and unlink it from its developer. Authorization is the
    /// dispatcher's job. Returns false when absent.
    async fn delete_game(&self, game_id: &str) -> Result<bool>;

    /// Bump the download counter and add the game to the user's ownership
    /// set (idempotent on the set). Returns false when the game is absent.
    async fn increment_download(&self, username: &str, game_id: &str) -> Result<bool>;

    /// Append a review. Returns false when the game is absent.
    async fn add_review(&self, game_id: &str, review: Review) -> Result<bool>;

    // ----- rooms -----

    async fn list_rooms(&self) -> Result<Vec<Room>>;

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>>;

    async fn get_room_by_host(&self, host: &str) -> Result<Option<Room>>;

    async fn create_room(
        &self,
        room_name: &str,
        host: &str,
        game_id: &str,
        max_players: u8,
        game_port: u16,
    ) -> Result<Room>;

    async fn join_room(&self, room_id: &str, username: &str) -> Result<JoinOutcome>;

    async fn leave_room(&self, room_id: &str, username: &str) -> Result<LeaveOutcome>;

    async fn set_ready(&self, room_id: &str, username: &str, ready: bool) -> Result<ReadyOutcome>;

    async fn all_ready(&self, room_id: &str) -> Result<bool>;

    async fn delete_room(&self, room_id: &str) -> Result<bool>;

    async fn update_room_status(&self, room_id: &str, status: RoomStatus) -> Result<bool>;

    /// End-of-match reset in one transaction: flip to `waiting` and clear
    /// the ready set, allowing a second match in the same room. Returns the
    /// updated room, or `None` when absent.
    async fn finish_game(&self, room_id: &str) -> Result<Option<Room>>;

    /// Atomically verify every start-game precondition, including that the
    /// room's game record still exists, and flip the room to `playing`. A
    /// later spawn failure rolls back with
    /// [`CatalogStore::update_room_status`].
    async fn try_mark_playing(&self, room_id: &str, caller: &str) -> Result<StartCheck>;

    /// Startup recovery: rooms persisted as `playing` revert to `waiting`
    /// with their ready sets cleared, since no child survives a restart.
    /// Returns how many rooms were reset.
    async fn reset_stale_rooms(&self) -> Result<usize>;
}

/// Catalog backend selection.
#[derive(Debug, Clone)]
pub enum CatalogConfig {
    JsonFile { db_dir: PathBuf },
}

/// Create a catalog instance based on configuration.
pub async fn create_catalog(config: CatalogConfig) -> Result<Box<dyn CatalogStore>> {
    match config {
        CatalogConfig::JsonFile { db_dir } => {
            let catalog = JsonCatalog::open(&db_dir).await?;
            Ok(Box::new(catalog))
        }
    }
}

/// One JSON-document table with an in-memory cache behind a mutex.
struct Table<T> {
    path: PathBuf,
    root_key: &'static str,
    records: Mutex<Vec<T>>,
}

impl<T> Table<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    async fn open(path: PathBuf, root_key: &'static str) -> Result<Self> {
        let records = match tokio::fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice::<serde_json::Value>(&raw) {
                Ok(doc) => match doc.get(root_key) {
                    Some(list) => serde_json::from_value(list.clone()).with_context(|| {
                        format!("invalid {root_key} records in {}", path.display())
                    })?,
                    None => {
                        tracing::warn!(path = %path.display(), "document missing root key, resetting");
                        Vec::new()
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "corrupted table, resetting");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        let table = Self {
            path,
            root_key,
            records: Mutex::new(records),
        };
        // Make sure the document exists on disk even before the first write.
        {
            let guard = table.records.lock().await;
            table.persist(&guard).await?;
        }
        Ok(table)
    }

    /// Write the document under the guard: temp file, then rename.
    async fn persist(&self, records: &MutexGuard<'_, Vec<T>>) -> Result<()> {
        let mut doc = serde_json::Map::new();
        doc.insert(
            self.root_key.to_string(),
            serde_json::to_value(&**records)?,
        );
        let body = serde_json::to_vec_pretty(&doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming over {}", self.path.display()))?;
        Ok(())
    }
}

/// File-backed catalog: `users.json`, `games.json`, `rooms.json` under one
/// directory.
pub struct JsonCatalog {
    users: Table<User>,
    games: Table<Game>,
    rooms: Table<Room>,
}

impl JsonCatalog {
    pub async fn open(db_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(db_dir)
            .await
            .with_context(|| format!("creating {}", db_dir.display()))?;
        Ok(Self {
            users: Table::open(db_dir.join("users.json"), "users").await?,
            games: Table::open(db_dir.join("games.json"), "games").await?,
            rooms: Table::open(db_dir.join("rooms.json"), "rooms").await?,
        })
    }
}

#[async_trait]
impl CatalogStore for JsonCatalog {
    async fn register_user(&self, username: &str, password: &str, role: Role) -> Result<bool> {
        let mut users = self.users.records.lock().await;
        if users.iter().any(|u| u.username == username) {
            return Ok(false);
        }
        users.push(User {
            username: username.to_string(),
            password_hash: hash_password(password),
            role,
            owned_games: Vec::new(),
            uploaded_games: Vec::new(),
            created_at: Utc::now(),
        });
        self.users.persist(&users).await?;
        tracing::info!(%username, %role, "new user registered");
        Ok(true)
    }

    async fn validate_login(&self, username: &str, password: &str, role: Role) -> Result<bool> {
        let users = self.users.records.lock().await;
        Ok(users.iter().any(|u| {
            u.username == username && u.role == role && u.password_hash == hash_password(password)
        }))
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.records.lock().await;
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_games(&self) -> Result<Vec<Game>> {
        let games = self.games.records.lock().await;
        Ok(games.clone())
    }

    async fn get_game(&self, game_id: &str) -> Result<Option<Game>> {
        let games = self.games.records.lock().await;
        Ok(games.iter().find(|g| g.game_id == game_id).cloned())
    }

    async fn upsert_game(&self, upsert: GameUpsert) -> Result<String> {
        // Lock order: Games, then Users.
        let mut games = self.games.records.lock().await;
        let mut users = self.users.records.lock().await;

        let existing = upsert
            .game_id
            .as_ref()
            .and_then(|id| games.iter().position(|g| &g.game_id == id));

        let game_id = if let Some(idx) = existing {
            let game = &mut games[idx];
            game.name = upsert.name;
            game.version = upsert.version;
            game.description = upsert.description;
            game.bundle_path = upsert.bundle_path;
            game.client_entry = upsert.client_entry;
            game.server_entry = upsert.server_entry;
            game.max_players = upsert.max_players;
            game.game_id.clone()
        } else {
            let game_id = uuid::Uuid::new_v4().simple().to_string();
            games.push(Game {
                game_id: game_id.clone(),
                name: upsert.name,
                developer: upsert.developer.clone(),
                version: upsert.version,
                description: upsert.description,
                bundle_path: upsert.bundle_path,
                client_entry: upsert.client_entry,
                server_entry: upsert.server_entry,
                max_players: upsert.max_players,
                downloads: 0,
                reviews: Vec::new(),
            });
            if let Some(dev) = users.iter_mut().find(|u| u.username == upsert.developer) {
                dev.uploaded_games.push(game_id.clone());
            }
            game_id
        };

        self.games.persist(&games).await?;
        self.users.persist(&users).await?;
        Ok(game_id)
    }

    async fn delete_game(&self, game_id: &str) -> Result<bool> {
        // Lock order: Games, then Users.
        let mut games = self.games.records.lock().await;
        let mut users = self.users.records.lock().await;

        let Some(idx) = games.iter().position(|g| g.game_id == game_id) else {
            return Ok(false);
        };
        let game = games.remove(idx);
        if let Some(dev) = users.iter_mut().find(|u| u.username == game.developer) {
            dev.uploaded_games.retain(|id| id != game_id);
        }

        self.games.persist(&games).await?;
        self.users.persist(&users).await?;
        Ok(true)
    }

    async fn increment_download(&self, username: &str, game_id: &str) -> Result<bool> {
        // Lock order: Games, then Users.
        let mut games = self.games.records.lock().await;
        let mut users = self.users.records.lock().await;

        let Some(game) = games.iter_mut().find(|g| g.game_id == game_id) else {
            return Ok(false);
        };
        game.downloads += 1;
        if let Some(user) = users.iter_mut().find(|u| u.username == username) {
            if !user.owned_games.iter().any(|id| id == game_id) {
                user.owned_games.push(game_id.to_string());
            }
        }

        self.games.persist(&games).await?;
        self.users.persist(&users).await?;
        Ok(true)
    }

    async fn add_review(&self, game_id: &str, review: Review) -> Result<bool> {
        let mut games = self.games.records.lock().await;
        let Some(game) = games.iter_mut().find(|g| g.game_id == game_id) else {
            return Ok(false);
        };
        game.reviews.push(review);
        self.games.persist(&games).await?;
        Ok(true)
    }

    async fn list_rooms(&self) -> Result<Vec<Room>> {
        let rooms = self.rooms.records.lock().await;
        Ok(rooms.clone())
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>> {
        let rooms = self.rooms.records.lock().await;
        Ok(rooms.iter().find(|r| r.room_id == room_id).cloned())
    }

    async fn get_room_by_host(&self, host: &str) -> Result<Option<Room>> {
        let rooms = self.rooms.records.lock().await;
        Ok(rooms.iter().find(|r| r.host == host).cloned())
    }

    async fn create_room(
        &self,
        room_name: &str,
        host: &str,
        game_id: &str,
        max_players: u8,
        game_port: u16,
    ) -> Result<Room> {
        let mut rooms = self.rooms.records.lock().await;
        let mut room_id = models::generate_room_id();
        while rooms.iter().any(|r| r.room_id == room_id) {
            room_id = models::generate_room_id();
        }
        let room = Room {
            room_id,
            room_name: room_name.to_string(),
            host: host.to_string(),
            game_id: game_id.to_string(),
            max_players,
            players: vec![host.to_string()],
            ready_players: Vec::new(),
            status: RoomStatus::Waiting,
            game_port,
            created_at: Utc::now(),
        };
        rooms.push(room.clone());
        self.rooms.persist(&rooms).await?;
        tracing::info!(
            room_id = %room.room_id,
            %host,
            %game_id,
            port = game_port,
            "room created"
        );
        Ok(room)
    }

    async fn join_room(&self, room_id: &str, username: &str) -> Result<JoinOutcome> {
        let mut rooms = self.rooms.records.lock().await;
        let Some(room) = rooms.iter_mut().find(|r| r.room_id == room_id) else {
            return Ok(JoinOutcome::NotFound);
        };
        if room.is_member(username) {
            return Ok(JoinOutcome::AlreadyIn(room.clone()));
        }
        if room.status != RoomStatus::Waiting {
            return Ok(JoinOutcome::AlreadyStarted);
        }
        if room.is_full() {
            return Ok(JoinOutcome::Full);
        }
        room.players.push(username.to_string());
        let snapshot = room.clone();
        self.rooms.persist(&rooms).await?;
        Ok(JoinOutcome::Joined(snapshot))
    }

    async fn leave_room(&self, room_id: &str, username: &str) -> Result<LeaveOutcome> {
        let mut rooms = self.rooms.records.lock().await;
        let Some(idx) = rooms.iter().position(|r| r.room_id == room_id) else {
            return Ok(LeaveOutcome::NotFound);
        };
        if !rooms[idx].is_member(username) {
            return Ok(LeaveOutcome::NotMember);
        }

        if rooms[idx].host == username {
            let snapshot = rooms.remove(idx);
            self.rooms.persist(&rooms).await?;
            return Ok(LeaveOutcome::HostLeft(snapshot));
        }

        {
            let room = &mut rooms[idx];
            room.players.retain(|p| p != username);
            room.ready_players.retain(|p| p != username);
        }
        let destroyed = rooms[idx].players.is_empty();
        if destroyed {
            rooms.remove(idx);
        }
        self.rooms.persist(&rooms).await?;
        Ok(LeaveOutcome::Left { destroyed })
    }

    async fn set_ready(&self, room_id: &str, username: &str, ready: bool) -> Result<ReadyOutcome> {
        let mut rooms = self.rooms.records.lock().await;
        let Some(room) = rooms.iter_mut().find(|r| r.room_id == room_id) else {
            return Ok(ReadyOutcome::NotFound);
        };
        if !room.is_member(username) {
            return Ok(ReadyOutcome::NotInRoom);
        }
        if ready {
            if !room.ready_players.iter().any(|p| p == username) {
                room.ready_players.push(username.to_string());
            }
        } else {
            room.ready_players.retain(|p| p != username);
        }
        let snapshot = room.clone();
        self.rooms.persist(&rooms).await?;
        Ok(ReadyOutcome::Updated(snapshot))
    }

    async fn all_ready(&self, room_id: &str) -> Result<bool> {
        let rooms = self.rooms.records.lock().await;
        Ok(rooms
            .iter()
            .find(|r| r.room_id == room_id)
            .is_some_and(Room::all_ready))
    }

    async fn delete_room(&self, room_id: &str) -> Result<bool> {
        let mut rooms = self.rooms.records.lock().await;
        let before = rooms.len();
        rooms.retain(|r| r.room_id != room_id);
        if rooms.len() == before {
            return Ok(false);
        }
        self.rooms.persist(&rooms).await?;
        Ok(true)
    }

    async fn update_room_status(&self, room_id: &str, status: RoomStatus) -> Result<bool> {
        let mut rooms = self.rooms.records.lock().await;
        let Some(room) = rooms.iter_mut().find(|r| r.room_id == room_id) else {
            return Ok(false);
        };
        room.status = status;
        self.rooms.persist(&rooms).await?;
        Ok(true)
    }

    async fn finish_game(&self, room_id: &str) -> Result<Option<Room>> {
        let mut rooms = self.rooms.records.lock().await;
        let Some(room) = rooms.iter_mut().find(|r| r.room_id == room_id) else {
            return Ok(None);
        };
        room.status = RoomStatus::Waiting;
        room.ready_players.clear();
        let snapshot = room.clone();
        self.rooms.persist(&rooms).await?;
        Ok(Some(snapshot))
    }

    async fn try_mark_playing(&self, room_id: &str, caller: &str) -> Result<StartCheck> {
        // Lock order: Games, then Rooms. Holding both makes the game
        // existence check and the status flip one transaction; a concurrent
        // delete_game waits on the Games guard.
        let games = self.games.records.lock().await;
        let mut rooms = self.rooms.records.lock().await;
        let Some(room) = rooms.iter_mut().find(|r| r.room_id == room_id) else {
            return Ok(StartCheck::NotFound);
        };
        if room.host != caller {
            return Ok(StartCheck::NotHost);
        }
        if room.status != RoomStatus::Waiting {
            return Ok(StartCheck::AlreadyStarted);
        }
        if room.players.len() < 2 {
            return Ok(StartCheck::NotEnoughPlayers);
        }
        if !room.all_ready() {
            return Ok(StartCheck::NotAllReady(room.not_ready()));
        }
        let Some(game) = games.iter().find(|g| g.game_id == room.game_id).cloned() else {
            return Ok(StartCheck::GameMissing);
        };
        room.status = RoomStatus::Playing;
        let snapshot = room.clone();
        self.rooms.persist(&rooms).await?;
        Ok(StartCheck::Started {
            room: snapshot,
            game,
        })
    }

    async fn reset_stale_rooms(&self) -> Result<usize> {
        let mut rooms = self.rooms.records.lock().await;
        let mut reset = 0;
        for room in rooms.iter_mut() {
            if room.status == RoomStatus::Playing {
                room.status = RoomStatus::Waiting;
                room.ready_players.clear();
                reset += 1;
            }
        }
        if reset > 0 {
            self.rooms.persist(&rooms).await?;
        }
        Ok(reset)
    }
}
