use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::auth::ConnectionId;

/// Target metadata captured at `upload_game_init`, applied at finalization.
#[derive(Debug, Clone)]
pub struct UploadMeta {
    pub name: String,
    pub version: String,
    pub description: String,
    pub client_entry: String,
    pub server_entry: Option<String>,
    pub max_players: u8,
    /// Present on the update-upload path.
    pub game_id: Option<String>,
}

/// State for one in-flight chunked upload.
///
/// Single writer: the owning connection streams chunks strictly in order, so
/// the session needs no locking beyond the table that holds it.
pub struct UploadSession {
    pub upload_id: String,
    pub developer: String,
    /// Connection that opened the session; used for teardown cleanup.
    pub connection: ConnectionId,
    pub meta: UploadMeta,
    pub staging_path: PathBuf,
    file: Option<File>,
    finished: bool,
}

impl UploadSession {
    pub async fn create(
        upload_id: String,
        developer: String,
        connection: ConnectionId,
        meta: UploadMeta,
        staging_path: PathBuf,
    ) -> std::io::Result<Self> {
        let file = File::create(&staging_path).await?;
        Ok(Self {
            upload_id,
            developer,
            connection,
            meta,
            staging_path,
            file: Some(file),
            finished: false,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Append one decoded chunk; on EOF the staging file is flushed, synced,
    /// and closed. Writes after EOF are ignored.
    pub async fn write_chunk(&mut self, chunk: &[u8], eof: bool) -> std::io::Result<()> {
        if self.finished {
            return Ok(());
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk).await?;
            if eof {
                file.flush().await?;
                file.sync_all().await?;
            }
        }
        if eof {
            self.file = None;
            self.finished = true;
        }
        Ok(())
    }

    /// Drop the staging file, best effort. Used when the owning connection
    /// disappears before EOF.
    pub async fn abort(mut self) {
        self.file = None;
        if let Err(e) = tokio::fs::remove_file(&self.staging_path).await {
            tracing::debug!(
                path = %self.staging_path.display(),
                error = %e,
                "could not remove staging file"
            );
        }
    }
}
