//! Handlers for the catalog and store actions: accounts, uploads, reviews,
//! deletion.

use serde_json::{json, Value};

use crate::auth::ConnectionId;
use crate::datastore::{CatalogStore, Review, Role};
use crate::error::ServerError;
use crate::games::UploadMeta;
use crate::protocol::{ok_fields, ok_reply};

use super::PlatformServer;

impl PlatformServer {
    pub(super) async fn handle_register(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<Value, ServerError> {
        self.auth.register(username, password, role).await?;
        Ok(ok_fields([("message", json!("Registration successful"))]))
    }

    pub(super) async fn handle_login(
        &self,
        connection: ConnectionId,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<Value, ServerError> {
        let session = self.auth.login(connection, username, password, role).await?;
        Ok(ok_fields([
            ("username", json!(session.username)),
            ("role", json!(session.role)),
        ]))
    }

    pub(super) async fn handle_list_games(
        &self,
        connection: ConnectionId,
    ) -> Result<Value, ServerError> {
        self.require_login(connection)?;
        let games = self.catalog.list_games().await?;
        Ok(ok_fields([("games", json!(games))]))
    }

    pub(super) async fn handle_get_game_info(
        &self,
        connection: ConnectionId,
        game_id: &str,
    ) -> Result<Value, ServerError> {
        self.require_login(connection)?;
        let game = self
            .catalog
            .get_game(game_id)
            .await?
            .ok_or(ServerError::GameNotFound)?;
        Ok(ok_fields([("game", json!(game))]))
    }

    pub(super) async fn handle_my_games(
        &self,
        connection: ConnectionId,
    ) -> Result<Value, ServerError> {
        let session = self.require_role(connection, Role::Developer)?;
        let games: Vec<_> = self
            .catalog
            .list_games()
            .await?
            .into_iter()
            .filter(|g| g.developer == session.username)
            .collect();
        Ok(ok_fields([("games", json!(games))]))
    }

    pub(super) async fn handle_upload_init(
        &self,
        connection: ConnectionId,
        name: String,
        version: String,
        description: String,
        client_entry: String,
        server_entry: Option<String>,
        max_players: u8,
        game_id: Option<String>,
    ) -> Result<Value, ServerError> {
        let session = self.require_role(connection, Role::Developer)?;
        let (upload_id, chunk_size) = self
            .games
            .start_upload(
                &session.username,
                connection,
                UploadMeta {
                    name,
                    version,
                    description,
                    client_entry,
                    server_entry,
                    max_players,
                    game_id,
                },
            )
            .await?;
        Ok(ok_fields([
            ("upload_id", json!(upload_id)),
            ("chunk_size", json!(chunk_size)),
        ]))
    }

    pub(super) async fn handle_upload_chunk(
        &self,
        connection: ConnectionId,
        upload_id: &str,
        data: &str,
        eof: bool,
    ) -> Result<Value, ServerError> {
        self.require_role(connection, Role::Developer)?;
        let finished = self.games.write_chunk(upload_id, data, eof).await?;
        Ok(ok_fields([("finished", json!(finished))]))
    }

    pub(super) async fn handle_delete_game(
        &self,
        connection: ConnectionId,
        game_id: &str,
    ) -> Result<Value, ServerError> {
        let session = self.require_role(connection, Role::Developer)?;
        let game = self
            .catalog
            .get_game(game_id)
            .await?
            .ok_or(ServerError::GameNotFound)?;
        if game.developer != session.username {
            return Err(ServerError::NotOwner("delete"));
        }
        if !self.catalog.delete_game(game_id).await? {
            return Err(ServerError::GameNotFound);
        }
        tracing::info!(%game_id, developer = %session.username, "game deleted");
        Ok(ok_fields([("message", json!("Game deleted successfully"))]))
    }

    pub(super) async fn handle_submit_review(
        &self,
        connection: ConnectionId,
        game_id: &str,
        rating: i64,
        comment: String,
    ) -> Result<Value, ServerError> {
        let session = self.require_role(connection, Role::Player)?;
        if !(1..=5).contains(&rating) {
            return Err(ServerError::RatingOutOfRange);
        }
        let review = Review {
            username: session.username,
            // In range per the check above.
            rating: rating as u8,
            comment: comment.trim().to_string(),
            created_at: chrono::Utc::now(),
        };
        if !self.catalog.add_review(game_id, review).await? {
            return Err(ServerError::GameNotFound);
        }
        Ok(ok_reply())
    }
}
