use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for structured error handling.
///
/// Serialized in SCREAMING_SNAKE_CASE so client SDKs can match on them
/// without parsing the human-readable message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication
    InvalidCredentials,
    UsernameExists,
    NotLoggedIn,
    UnauthorizedRole,

    // Validation
    InvalidInput,
    UnknownAction,
    RatingOutOfRange,

    // Lookup
    GameNotFound,
    RoomNotFound,
    UploadNotFound,

    // Conflicts
    RoomFull,
    RoomAlreadyStarted,
    AlreadyHosting,
    NotInRoom,
    NotHost,

    // Start-game preconditions
    NotAllReady,
    NotEnoughPlayers,

    // Transport
    MalformedFrame,
    FrameTooLarge,
    InvalidChunkData,

    // Runtime
    BundleMissing,
    ExtractionFailed,
    SpawnFailed,

    // Catch-all
    InternalError,
}

impl ErrorCode {
    /// Stable string form, identical to the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::UsernameExists => "USERNAME_EXISTS",
            Self::NotLoggedIn => "NOT_LOGGED_IN",
            Self::UnauthorizedRole => "UNAUTHORIZED_ROLE",
            Self::InvalidInput => "INVALID_INPUT",
            Self::UnknownAction => "UNKNOWN_ACTION",
            Self::RatingOutOfRange => "RATING_OUT_OF_RANGE",
            Self::GameNotFound => "GAME_NOT_FOUND",
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::UploadNotFound => "UPLOAD_NOT_FOUND",
            Self::RoomFull => "ROOM_FULL",
            Self::RoomAlreadyStarted => "ROOM_ALREADY_STARTED",
            Self::AlreadyHosting => "ALREADY_HOSTING",
            Self::NotInRoom => "NOT_IN_ROOM",
            Self::NotHost => "NOT_HOST",
            Self::NotAllReady => "NOT_ALL_READY",
            Self::NotEnoughPlayers => "NOT_ENOUGH_PLAYERS",
            Self::MalformedFrame => "MALFORMED_FRAME",
            Self::FrameTooLarge => "FRAME_TOO_LARGE",
            Self::InvalidChunkData => "INVALID_CHUNK_DATA",
            Self::BundleMissing => "BUNDLE_MISSING",
            Self::ExtractionFailed => "EXTRACTION_FAILED",
            Self::SpawnFailed => "SPAWN_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
