//! Handlers for the room lifecycle actions.

use serde_json::{json, Value};

use crate::auth::ConnectionId;
use crate::datastore::Role;
use crate::error::ServerError;
use crate::protocol::{ok_fields, ok_reply};

use super::PlatformServer;

impl PlatformServer {
    pub(super) async fn handle_list_rooms(
        &self,
        connection: ConnectionId,
    ) -> Result<Value, ServerError> {
        self.require_login(connection)?;
        let rooms = self.lobby.list_rooms().await?;
        Ok(ok_fields([("rooms", json!(rooms))]))
    }

    pub(super) async fn handle_get_room_info(
        &self,
        connection: ConnectionId,
        room_id: &str,
    ) -> Result<Value, ServerError> {
        self.require_login(connection)?;
        let room = self.lobby.get_room(room_id).await?;
        Ok(ok_fields([("room", json!(room))]))
    }

    pub(super) async fn handle_create_room(
        &self,
        connection: ConnectionId,
        game_id: &str,
        room_name: &str,
        max_players: u8,
    ) -> Result<Value, ServerError> {
        let session = self.require_role(connection, Role::Player)?;
        let game_port = self.games.allocate_port();
        let room = self
            .lobby
            .create_room(&session.username, game_id, room_name, max_players, game_port)
            .await?;
        Ok(ok_fields([
            ("room_id", json!(room.room_id)),
            ("game_port", json!(room.game_port)),
            ("room_info", json!(room)),
        ]))
    }

    pub(super) async fn handle_join_room(
        &self,
        connection: ConnectionId,
        room_id: &str,
    ) -> Result<Value, ServerError> {
        let session = self.require_role(connection, Role::Player)?;
        let room = self.lobby.join_room(room_id, &session.username).await?;
        Ok(ok_fields([("room_info", json!(room))]))
    }

    pub(super) async fn handle_leave_room(
        &self,
        connection: ConnectionId,
        room_id: &str,
    ) -> Result<Value, ServerError> {
        let session = self.require_role(connection, Role::Player)?;
        self.lobby.leave_room(room_id, &session.username).await?;
        Ok(ok_reply())
    }

    pub(super) async fn handle_set_ready(
        &self,
        connection: ConnectionId,
        room_id: &str,
        ready: bool,
    ) -> Result<Value, ServerError> {
        let session = self.require_role(connection, Role::Player)?;
        self.lobby.set_ready(room_id, &session.username, ready).await?;
        Ok(ok_fields([("ready", json!(ready))]))
    }

    pub(super) async fn handle_close_room(
        &self,
        connection: ConnectionId,
        room_id: &str,
    ) -> Result<Value, ServerError> {
        let session = self.require_role(connection, Role::Player)?;
        self.lobby.close_room(room_id, &session.username).await?;
        Ok(ok_reply())
    }

    pub(super) async fn handle_start_game(
        &self,
        connection: ConnectionId,
        room_id: &str,
    ) -> Result<Value, ServerError> {
        let session = self.require_role(connection, Role::Player)?;
        let (room, game_port) = self.lobby.start_game(room_id, &session.username).await?;
        Ok(ok_fields([
            ("room_info", json!(room)),
            ("game_port", json!(game_port)),
        ]))
    }

    pub(super) async fn handle_end_game(
        &self,
        connection: ConnectionId,
        room_id: &str,
    ) -> Result<Value, ServerError> {
        let session = self.require_role(connection, Role::Player)?;
        let room = self.lobby.end_game(room_id, &session.username).await?;
        Ok(ok_fields([("room_info", json!(room))]))
    }
}
