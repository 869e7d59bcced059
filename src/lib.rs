#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::too_many_arguments,
    clippy::too_many_lines
)]

//! # GameDock Server
//!
//! A multi-tenant game distribution and matchmaking platform server.
//!
//! Developers publish versioned game bundles over a framed TCP protocol.
//! Players browse, download, gather in rooms, and signal readiness; when the
//! host starts the match a dedicated game-server subprocess is spawned for
//! the room and its port is reported back to every player.

/// Session management: registration, login, per-connection identity
pub mod auth;

/// Server configuration and environment overrides
pub mod config;

/// Concurrency-safe catalog of users, games, and rooms
pub mod datastore;

/// Error taxonomy surfaced to clients
pub mod error;

/// Upload sessions, game finalization, and the game-port allocator
pub mod games;

/// Room lifecycle, ready tracking, and start-game orchestration
pub mod lobby;

#[cfg(test)]
mod lobby_tests;

/// Structured logging configuration
pub mod logging;

/// Wire protocol: framing, chunk helpers, message definitions
pub mod protocol;

/// Game-server subprocess lifecycle
pub mod runtime;

/// TCP acceptor and per-connection workers
pub mod server;
