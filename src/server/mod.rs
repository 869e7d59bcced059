//! TCP acceptor and server state.
//!
//! One worker task per accepted connection; all shared state lives behind
//! the catalog's table locks and the managers' own maps. The acceptor never
//! blocks on a slow client.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthManager, ConnectionId, Session};
use crate::config::Config;
use crate::datastore::{create_catalog, CatalogConfig, CatalogStore, Role};
use crate::error::ServerError;
use crate::games::GameManager;
use crate::lobby::LobbyManager;
use crate::runtime::GameRuntime;

mod connection;
mod download;
mod lobby_handlers;
mod store_handlers;

/// The platform server: catalog, managers, and connection bookkeeping.
pub struct PlatformServer {
    pub config: Config,
    pub catalog: Arc<dyn CatalogStore>,
    pub auth: AuthManager,
    pub games: GameManager,
    pub lobby: LobbyManager,
    pub runtime: Arc<GameRuntime>,
    next_connection_id: AtomicU64,
}

impl PlatformServer {
    /// Open the catalog, recover stale state, and wire up the managers.
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let catalog: Arc<dyn CatalogStore> = Arc::from(
            create_catalog(CatalogConfig::JsonFile {
                db_dir: PathBuf::from(&config.server.db_dir),
            })
            .await?,
        );

        let stale = catalog.reset_stale_rooms().await?;
        if stale > 0 {
            tracing::info!(rooms = stale, "reset rooms left playing by a previous run");
        }

        let runtime = Arc::new(GameRuntime::new(config.runtime.clone()));
        let auth = AuthManager::new(Arc::clone(&catalog));
        let games = GameManager::new(
            Arc::clone(&catalog),
            PathBuf::from(&config.server.storage_dir),
            config.server.chunk_size,
            config.server.max_room_players,
            config.server.base_game_port,
        );
        let lobby = LobbyManager::new(Arc::clone(&catalog), Arc::clone(&runtime));

        Ok(Arc::new(Self {
            config,
            catalog,
            auth,
            games,
            lobby,
            runtime,
            next_connection_id: AtomicU64::new(1),
        }))
    }

    /// Accept connections until `shutdown` fires, then terminate every
    /// tracked game-server child.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "server listening");
        }

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let connection = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(%addr, connection, "new connection");
                        let server = Arc::clone(&self);
                        let token = shutdown.child_token();
                        tokio::spawn(async move {
                            connection::serve(server, stream, addr, connection, token).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutting down, terminating game servers");
        self.runtime.shutdown_all().await;
        Ok(())
    }

    pub(crate) fn require_login(&self, connection: ConnectionId) -> Result<Session, ServerError> {
        self.auth.require_login(connection)
    }

    pub(crate) fn require_role(
        &self,
        connection: ConnectionId,
        role: Role,
    ) -> Result<Session, ServerError> {
        let session = self.auth.require_login(connection)?;
        if session.role != role {
            return Err(ServerError::UnauthorizedRole(role.as_str()));
        }
        Ok(session)
    }
}
