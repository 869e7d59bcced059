//! Upload sessions, game finalization, and the game-port allocator.

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::ConnectionId;
use crate::datastore::{CatalogStore, GameUpsert};
use crate::error::{validation, ServerError};
use crate::protocol::decode_chunk;

pub mod upload;

pub use upload::{UploadMeta, UploadSession};

/// Handles game metadata, chunked upload sessions, and room ports.
pub struct GameManager {
    catalog: Arc<dyn CatalogStore>,
    storage_dir: PathBuf,
    chunk_size: usize,
    max_room_players: u8,
    /// Active sessions keyed by `upload_id`. Each session sits behind its
    /// own async mutex so one developer's file I/O never holds up the table.
    uploads: DashMap<String, Arc<Mutex<UploadSession>>>,
    next_port: AtomicU16,
}

impl GameManager {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        storage_dir: PathBuf,
        chunk_size: usize,
        max_room_players: u8,
        base_game_port: u16,
    ) -> Self {
        Self {
            catalog,
            storage_dir,
            chunk_size,
            max_room_players,
            uploads: DashMap::new(),
            next_port: AtomicU16::new(base_game_port),
        }
    }

    /// Advisory chunk size clients should respect when streaming.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Allocate a unique TCP port for a room's game server. Monotonic and
    /// never reused for the lifetime of this server process; a conflict with
    /// an already-bound port surfaces later as a start failure.
    pub fn allocate_port(&self) -> u16 {
        self.next_port.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a new upload session and its staging file.
    pub async fn start_upload(
        &self,
        developer: &str,
        connection: ConnectionId,
        meta: UploadMeta,
    ) -> Result<(String, usize), ServerError> {
        if meta.name.trim().is_empty() || meta.version.trim().is_empty() {
            return Err(validation("name and version are required"));
        }
        if meta.client_entry.trim().is_empty() {
            return Err(validation("client_entry is required"));
        }
        if !(2..=self.max_room_players).contains(&meta.max_players) {
            return Err(validation(format!(
                "max_players must be in 2..={}",
                self.max_room_players
            )));
        }
        if let Some(game_id) = &meta.game_id {
            let game = self
                .catalog
                .get_game(game_id)
                .await?
                .ok_or(ServerError::GameNotFound)?;
            if game.developer != developer {
                return Err(ServerError::NotOwner("update"));
            }
        }

        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(|e| ServerError::Internal(e.into()))?;

        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        let staging_path = self.storage_dir.join(format!("{upload_id}.zip"));
        let session = UploadSession::create(
            upload_id.clone(),
            developer.to_string(),
            connection,
            meta,
            staging_path.clone(),
        )
        .await
        .map_err(|e| ServerError::Internal(e.into()))?;

        self.uploads
            .insert(upload_id.clone(), Arc::new(Mutex::new(session)));
        tracing::info!(%upload_id, %developer, path = %staging_path.display(), "upload session created");
        Ok((upload_id, self.chunk_size))
    }

    /// Append one base64 chunk; on EOF finalize the session into a game
    /// record. Returns whether the upload is finished.
    pub async fn write_chunk(
        &self,
        upload_id: &str,
        data: &str,
        eof: bool,
    ) -> Result<bool, ServerError> {
        let raw = decode_chunk(data)?;

        let session = self
            .uploads
            .get(upload_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ServerError::UploadNotFound)?;

        let mut session = session.lock().await;
        if session.is_finished() {
            return Err(ServerError::UploadNotFound);
        }
        session
            .write_chunk(&raw, eof)
            .await
            .map_err(|e| ServerError::Internal(e.into()))?;

        if !eof {
            return Ok(false);
        }

        // Finalize: register or update the game, then retire the session.
        let game_id = self
            .catalog
            .upsert_game(GameUpsert {
                developer: session.developer.clone(),
                name: session.meta.name.clone(),
                version: session.meta.version.clone(),
                description: session.meta.description.clone(),
                bundle_path: session.staging_path.display().to_string(),
                client_entry: session.meta.client_entry.clone(),
                server_entry: session.meta.server_entry.clone(),
                max_players: session.meta.max_players,
                game_id: session.meta.game_id.clone(),
            })
            .await?;
        drop(session);
        self.uploads.remove(upload_id);
        tracing::info!(%upload_id, %game_id, "upload finished, game registered");
        Ok(true)
    }

    /// Drop every in-flight session owned by a closing connection and delete
    /// its staging file.
    pub async fn abort_connection_uploads(&self, connection: ConnectionId) {
        let orphaned: Vec<String> = self
            .uploads
            .iter()
            .filter(|entry| owned_by(entry.value(), connection))
            .map(|entry| entry.key().clone())
            .collect();

        for upload_id in orphaned {
            if let Some((_, session)) = self.uploads.remove(&upload_id) {
                match Arc::try_unwrap(session) {
                    Ok(mutex) => mutex.into_inner().abort().await,
                    // A chunk write still holds the session; the staging
                    // file stays behind and a restart tolerates it.
                    Err(shared) => drop(shared),
                }
                tracing::info!(%upload_id, connection, "orphaned upload session dropped");
            }
        }
    }
}

/// Peek at a session's owner without waiting on its mutex.
fn owned_by(session: &Arc<Mutex<UploadSession>>, connection: ConnectionId) -> bool {
    session
        .try_lock()
        .map(|s| s.connection == connection)
        .unwrap_or(false)
}
