//! Room lifecycle, ready tracking, and start-game orchestration.

use std::sync::Arc;

use crate::datastore::{
    CatalogStore, JoinOutcome, LeaveOutcome, ReadyOutcome, Room, RoomStatus, StartCheck,
};
use crate::error::ServerError;
use crate::runtime::GameRuntime;

/// Matchmaking view over the catalog plus the subprocess runtime.
pub struct LobbyManager {
    catalog: Arc<dyn CatalogStore>,
    runtime: Arc<GameRuntime>,
}

impl LobbyManager {
    pub fn new(catalog: Arc<dyn CatalogStore>, runtime: Arc<GameRuntime>) -> Self {
        Self { catalog, runtime }
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>, ServerError> {
        Ok(self.catalog.list_rooms().await?)
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Room, ServerError> {
        self.catalog
            .get_room(room_id)
            .await?
            .ok_or(ServerError::RoomNotFound)
    }

    /// Create a room for `game_id` hosted by `host`.
    ///
    /// One host-owned room at a time; the requested size is clamped to the
    /// game's own player limit.
    pub async fn create_room(
        &self,
        host: &str,
        game_id: &str,
        room_name: &str,
        max_players: u8,
        game_port: u16,
    ) -> Result<Room, ServerError> {
        let game = self
            .catalog
            .get_game(game_id)
            .await?
            .ok_or(ServerError::GameNotFound)?;

        if let Some(existing) = self.catalog.get_room_by_host(host).await? {
            return Err(ServerError::AlreadyHosting(existing.room_id));
        }

        let max_players = max_players.clamp(2, game.max_players);
        let room = self
            .catalog
            .create_room(room_name, host, game_id, max_players, game_port)
            .await?;
        Ok(room)
    }

    /// Join an open room. Idempotent for existing members.
    pub async fn join_room(&self, room_id: &str, username: &str) -> Result<Room, ServerError> {
        match self.catalog.join_room(room_id, username).await? {
            JoinOutcome::Joined(room) | JoinOutcome::AlreadyIn(room) => Ok(room),
            JoinOutcome::Full => Err(ServerError::RoomFull),
            JoinOutcome::AlreadyStarted => Err(ServerError::RoomAlreadyStarted),
            JoinOutcome::NotFound => Err(ServerError::RoomNotFound),
        }
    }

    /// Leave a room. A departing host closes the room outright, stopping any
    /// running child; a departing member during `playing` leaves the child
    /// alone. Lenient: leaving a room you are not in is a no-op.
    pub async fn leave_room(&self, room_id: &str, username: &str) -> Result<(), ServerError> {
        match self.catalog.leave_room(room_id, username).await? {
            LeaveOutcome::HostLeft(room) => {
                self.runtime.stop(&room.room_id).await;
                tracing::info!(room_id = %room.room_id, host = %username, "host left, room closed");
                Ok(())
            }
            LeaveOutcome::Left { destroyed } => {
                if destroyed {
                    self.runtime.stop(room_id).await;
                }
                Ok(())
            }
            LeaveOutcome::NotMember | LeaveOutcome::NotFound => Ok(()),
        }
    }

    /// Flag (or unflag) readiness. Idempotent.
    pub async fn set_ready(
        &self,
        room_id: &str,
        username: &str,
        ready: bool,
    ) -> Result<Room, ServerError> {
        match self.catalog.set_ready(room_id, username, ready).await? {
            ReadyOutcome::Updated(room) => Ok(room),
            ReadyOutcome::NotInRoom => Err(ServerError::NotInRoom),
            ReadyOutcome::NotFound => Err(ServerError::RoomNotFound),
        }
    }

    /// Host-only: verify the start preconditions (game existence included,
    /// all in one catalog transaction), flip the room to `playing`, and
    /// launch the game server on the room's pre-allocated port. A launch
    /// failure rolls the room back to `waiting`.
    pub async fn start_game(
        &self,
        room_id: &str,
        username: &str,
    ) -> Result<(Room, u16), ServerError> {
        let (room, game) = match self.catalog.try_mark_playing(room_id, username).await? {
            StartCheck::Started { room, game } => (room, game),
            StartCheck::NotFound => return Err(ServerError::RoomNotFound),
            StartCheck::NotHost => return Err(ServerError::NotHost),
            StartCheck::AlreadyStarted => return Err(ServerError::RoomAlreadyStarted),
            StartCheck::NotEnoughPlayers => return Err(ServerError::NotEnoughPlayers),
            StartCheck::NotAllReady(missing) => {
                return Err(ServerError::NotAllReady(missing.join(", ")))
            }
            StartCheck::GameMissing => return Err(ServerError::GameNotFound),
        };

        let port = room.game_port;
        if let Err(e) = self
            .runtime
            .start(room_id, &game, port, room.players.len())
            .await
        {
            self.catalog
                .update_room_status(room_id, RoomStatus::Waiting)
                .await?;
            return Err(e);
        }

        tracing::info!(%room_id, port, players = room.players.len(), "match started");
        Ok((room, port))
    }

    /// Any member may end the match: the child is stopped, readiness is
    /// cleared, and the room returns to `waiting` for a rematch.
    pub async fn end_game(&self, room_id: &str, username: &str) -> Result<Room, ServerError> {
        let room = self.get_room(room_id).await?;
        if !room.is_member(username) {
            return Err(ServerError::NotInRoom);
        }

        self.runtime.stop(room_id).await;
        let room = self
            .catalog
            .finish_game(room_id)
            .await?
            .ok_or(ServerError::RoomNotFound)?;
        tracing::info!(%room_id, by = %username, "match ended");
        Ok(room)
    }

    /// Host-only: stop any running child and destroy the room.
    pub async fn close_room(&self, room_id: &str, username: &str) -> Result<(), ServerError> {
        let room = self.get_room(room_id).await?;
        if room.host != username {
            return Err(ServerError::NotHost);
        }

        self.runtime.stop(room_id).await;
        self.catalog.delete_room(room_id).await?;
        tracing::info!(%room_id, host = %username, "room closed");
        Ok(())
    }
}
