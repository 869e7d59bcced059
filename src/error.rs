use thiserror::Error;

use crate::protocol::ErrorCode;

/// Everything a request handler can report back to a client.
///
/// Handlers either succeed fully or return one of these; the worker
/// serializes it as `{status:"error", message, error_code}` and goes back to
/// reading the next frame. Nothing here tears a connection down.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Username already exists")]
    UsernameExists,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("This action requires the {0} role")]
    UnauthorizedRole(&'static str),

    #[error("You can only {0} your own games")]
    NotOwner(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("Rating must be between 1 and 5")]
    RatingOutOfRange,

    #[error("Game not found")]
    GameNotFound,

    #[error("Room not found")]
    RoomNotFound,

    #[error("Invalid upload_id")]
    UploadNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("Room already started")]
    RoomAlreadyStarted,

    #[error("You already have a room (ID: {0}). Please close it first")]
    AlreadyHosting(String),

    #[error("You are not in this room")]
    NotInRoom,

    #[error("Only the host can do that")]
    NotHost,

    #[error("Not all players are ready. Waiting for: {0}")]
    NotAllReady(String),

    #[error("Need at least 2 players to start")]
    NotEnoughPlayers,

    #[error("Invalid base64 data: {0}")]
    InvalidChunk(#[from] base64::DecodeError),

    #[error("Game file missing on server")]
    BundleMissing,

    #[error("Failed to extract bundle: {0}")]
    Extraction(String),

    #[error("Failed to launch game server: {0}")]
    Spawn(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ServerError {
    /// Structured code included next to the human-readable message.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidCredentials => ErrorCode::InvalidCredentials,
            Self::UsernameExists => ErrorCode::UsernameExists,
            Self::NotLoggedIn => ErrorCode::NotLoggedIn,
            Self::UnauthorizedRole(_) => ErrorCode::UnauthorizedRole,
            Self::NotOwner(_) => ErrorCode::UnauthorizedRole,
            Self::Validation(_) => ErrorCode::InvalidInput,
            Self::RatingOutOfRange => ErrorCode::RatingOutOfRange,
            Self::GameNotFound => ErrorCode::GameNotFound,
            Self::RoomNotFound => ErrorCode::RoomNotFound,
            Self::UploadNotFound => ErrorCode::UploadNotFound,
            Self::RoomFull => ErrorCode::RoomFull,
            Self::RoomAlreadyStarted => ErrorCode::RoomAlreadyStarted,
            Self::AlreadyHosting(_) => ErrorCode::AlreadyHosting,
            Self::NotInRoom => ErrorCode::NotInRoom,
            Self::NotHost => ErrorCode::NotHost,
            Self::NotAllReady(_) => ErrorCode::NotAllReady,
            Self::NotEnoughPlayers => ErrorCode::NotEnoughPlayers,
            Self::InvalidChunk(_) => ErrorCode::InvalidChunkData,
            Self::BundleMissing => ErrorCode::BundleMissing,
            Self::Extraction(_) => ErrorCode::ExtractionFailed,
            Self::Spawn(_) => ErrorCode::SpawnFailed,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Message surfaced to the client. Internal errors are logged server-side
    /// and collapse to a generic string on the wire.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(e) => {
                tracing::error!(error = %e, "internal error surfaced to client");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Convenience for `ServerError::Validation` call sites.
pub fn validation(message: impl Into<String>) -> ServerError {
    ServerError::Validation(message.into())
}
