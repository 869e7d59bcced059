//! Server-initiated chunk stream answering `download_game`.

use serde_json::json;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use crate::auth::ConnectionId;
use crate::datastore::{CatalogStore, Role};
use crate::error::ServerError;
use crate::protocol::{encode_chunk, write_frame, FrameError};

use super::connection::FrameWriter;
use super::PlatformServer;

/// How a download attempt failed.
pub(super) enum DownloadError {
    /// Nothing streamed yet; the worker sends a normal error reply.
    Request(ServerError),
    /// The stream broke mid-flight; the worker tears the connection down.
    Transport(FrameError),
}

impl From<ServerError> for DownloadError {
    fn from(err: ServerError) -> Self {
        Self::Request(err)
    }
}

/// Stream a bundle to the player as `download_chunk` frames.
///
/// Ownership is granted before the first chunk goes out, so a mid-stream
/// disconnect still credits the game to the player. No other reply may
/// interleave: the worker owns the socket for the whole stream.
pub(super) async fn stream(
    server: &Arc<PlatformServer>,
    connection: ConnectionId,
    game_id: &str,
    writer: &mut FrameWriter,
) -> Result<(), DownloadError> {
    let session = server.require_role(connection, Role::Player)?;
    let game = server
        .catalog
        .get_game(game_id)
        .await
        .map_err(ServerError::from)?
        .ok_or(ServerError::GameNotFound)?;

    let mut file = match tokio::fs::File::open(&game.bundle_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ServerError::BundleMissing.into());
        }
        Err(e) => return Err(ServerError::Internal(e.into()).into()),
    };

    server
        .catalog
        .increment_download(&session.username, game_id)
        .await
        .map_err(ServerError::from)?;
    tracing::info!(
        %game_id,
        player = %session.username,
        "download started, ownership recorded"
    );

    let mut buf = vec![0u8; server.games.chunk_size()];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .map_err(|e| DownloadError::Transport(FrameError::Io(e)))?;
        if read == 0 {
            break;
        }
        let frame = json!({
            "action": "download_chunk",
            "data": encode_chunk(&buf[..read]),
            "eof": false,
        });
        write_frame(writer, &frame)
            .await
            .map_err(DownloadError::Transport)?;
    }

    let eof = json!({ "action": "download_chunk", "eof": true });
    write_frame(writer, &eof)
        .await
        .map_err(DownloadError::Transport)?;

    tracing::info!(%game_id, player = %session.username, "download finished");
    Ok(())
}
