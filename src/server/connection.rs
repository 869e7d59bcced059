//! Per-connection worker: framed read loop, routing, and teardown.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::auth::ConnectionId;
use crate::error::ServerError;
use crate::protocol::{
    error_reply, read_frame, write_frame, ErrorCode, FrameError, Request,
};

use super::{download, PlatformServer};

/// Read-dispatch-reply loop for one client.
///
/// Requests are processed strictly in order. Handler errors become error
/// replies; only frame-level protocol errors or the socket dying end the
/// loop. Teardown always clears the session and any in-flight uploads.
pub(super) async fn serve(
    server: Arc<PlatformServer>,
    stream: TcpStream,
    addr: SocketAddr,
    connection: ConnectionId,
    shutdown: CancellationToken,
) {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            frame = read_frame(&mut reader) => frame,
        };

        let value = match frame {
            Ok(value) => value,
            Err(e) if e.is_recoverable() => {
                tracing::debug!(connection, error = %e, "malformed frame");
                let reply = error_reply(ErrorCode::MalformedFrame, e.to_string());
                if write_frame(&mut writer, &reply).await.is_err() {
                    break;
                }
                continue;
            }
            Err(e @ FrameError::TooLarge { .. }) => {
                // The stream cannot be resynchronized after an oversized
                // header; reject and drop the connection.
                tracing::warn!(connection, %addr, error = %e, "oversized frame");
                let reply = error_reply(ErrorCode::FrameTooLarge, e.to_string());
                let _ = write_frame(&mut writer, &reply).await;
                break;
            }
            Err(FrameError::ConnectionClosed) => {
                tracing::info!(connection, %addr, "connection closed");
                break;
            }
            Err(e) => {
                tracing::info!(connection, %addr, error = %e, "connection lost");
                break;
            }
        };

        let request = match parse_request(value) {
            Ok(request) => request,
            Err(reply) => {
                if write_frame(&mut writer, &reply).await.is_err() {
                    break;
                }
                continue;
            }
        };

        tracing::debug!(connection, action = request.action(), "request");

        // Download owns the socket while it streams; everything else is one
        // reply per request.
        let reply = if let Request::DownloadGame { game_id } = &request {
            match download::stream(&server, connection, game_id, &mut writer).await {
                Ok(()) => continue,
                Err(download::DownloadError::Request(err)) => {
                    error_reply(err.code(), err.client_message())
                }
                Err(download::DownloadError::Transport(e)) => {
                    tracing::info!(connection, error = %e, "download stream aborted");
                    break;
                }
            }
        } else {
            match dispatch(&server, connection, request).await {
                Ok(reply) => reply,
                Err(err) => error_reply(err.code(), err.client_message()),
            }
        };

        if write_frame(&mut writer, &reply).await.is_err() {
            break;
        }
    }

    teardown(&server, connection).await;
}

/// Decode the frame into a typed request, or build the error reply.
fn parse_request(value: serde_json::Value) -> Result<Request, serde_json::Value> {
    let action = value.get("action").and_then(|a| a.as_str()).map(String::from);
    match serde_json::from_value::<Request>(value) {
        Ok(request) => Ok(request),
        Err(e) => match action {
            Some(action) => Err(error_reply(
                ErrorCode::UnknownAction,
                format!("Unknown or invalid action '{action}': {e}"),
            )),
            None => Err(error_reply(
                ErrorCode::InvalidInput,
                "Request is missing an 'action' field",
            )),
        },
    }
}

/// Route one request to its handler. Role gating happens inside the
/// individual handlers via `require_login`/`require_role`.
async fn dispatch(
    server: &Arc<PlatformServer>,
    connection: ConnectionId,
    request: Request,
) -> Result<serde_json::Value, ServerError> {
    match request {
        Request::Register {
            username,
            password,
            role,
        } => server.handle_register(&username, &password, &role).await,
        Request::Login {
            username,
            password,
            role,
        } => {
            server
                .handle_login(connection, &username, &password, &role)
                .await
        }
        Request::ListGames => server.handle_list_games(connection).await,
        Request::GetGameInfo { game_id } => {
            server.handle_get_game_info(connection, &game_id).await
        }
        Request::MyGames => server.handle_my_games(connection).await,
        Request::UploadGameInit {
            name,
            version,
            description,
            client_entry,
            server_entry,
            max_players,
            game_id,
        } => {
            server
                .handle_upload_init(
                    connection,
                    name,
                    version,
                    description,
                    client_entry,
                    server_entry,
                    max_players,
                    game_id,
                )
                .await
        }
        Request::UploadGameChunk {
            upload_id,
            data,
            eof,
        } => {
            server
                .handle_upload_chunk(connection, &upload_id, &data, eof)
                .await
        }
        Request::DeleteGame { game_id } => {
            server.handle_delete_game(connection, &game_id).await
        }
        Request::SubmitReview {
            game_id,
            rating,
            comment,
        } => {
            server
                .handle_submit_review(connection, &game_id, rating, comment)
                .await
        }
        Request::ListRooms => server.handle_list_rooms(connection).await,
        Request::GetRoomInfo { room_id } => {
            server.handle_get_room_info(connection, &room_id).await
        }
        Request::CreateRoom {
            game_id,
            room_name,
            max_players,
        } => {
            server
                .handle_create_room(connection, &game_id, &room_name, max_players)
                .await
        }
        Request::JoinRoom { room_id } => server.handle_join_room(connection, &room_id).await,
        Request::LeaveRoom { room_id } => server.handle_leave_room(connection, &room_id).await,
        Request::SetReady { room_id, ready } => {
            server.handle_set_ready(connection, &room_id, ready).await
        }
        Request::CloseRoom { room_id } => server.handle_close_room(connection, &room_id).await,
        Request::StartGame { room_id } => server.handle_start_game(connection, &room_id).await,
        Request::EndGame { room_id } => server.handle_end_game(connection, &room_id).await,
        Request::DownloadGame { .. } => {
            // Handled by the streaming path in `serve`.
            Err(ServerError::Internal(anyhow::anyhow!(
                "download_game reached the unary dispatcher"
            )))
        }
    }
}

async fn teardown(server: &Arc<PlatformServer>, connection: ConnectionId) {
    server.auth.logout(connection);
    server.games.abort_connection_uploads(connection).await;
}

// Keep the writer type nameable for the download module.
pub(super) type FrameWriter = OwnedWriteHalf;
