//! Registration, credential checks, and the per-connection session table.

use dashmap::DashMap;
use std::sync::Arc;

use crate::datastore::{CatalogStore, Role};
use crate::error::{validation, ServerError};

/// Server-assigned identity of one accepted TCP connection.
pub type ConnectionId = u64;

/// The authenticated identity bound to a connection after `login`.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub role: Role,
}

/// Handles registration, login, and session bookkeeping.
///
/// A user logging in on a second connection gets a second, independent
/// session; there is no single-session rule.
pub struct AuthManager {
    catalog: Arc<dyn CatalogStore>,
    sessions: DashMap<ConnectionId, Session>,
}

impl AuthManager {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            catalog,
            sessions: DashMap::new(),
        }
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<(), ServerError> {
        let role = Role::parse(role).ok_or_else(|| validation("Invalid role"))?;
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(validation("Username and password required"));
        }
        if self.catalog.register_user(username, password, role).await? {
            Ok(())
        } else {
            Err(ServerError::UsernameExists)
        }
    }

    /// Validate credentials and bind the connection. An existing binding for
    /// the same connection is replaced.
    pub async fn login(
        &self,
        connection: ConnectionId,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<Session, ServerError> {
        let role = Role::parse(role).ok_or_else(|| validation("Invalid role"))?;
        let username = username.trim();
        if !self.catalog.validate_login(username, password, role).await? {
            return Err(ServerError::InvalidCredentials);
        }
        let session = Session {
            username: username.to_string(),
            role,
        };
        self.sessions.insert(connection, session.clone());
        tracing::info!(%username, %role, connection, "user logged in");
        Ok(session)
    }

    /// Remove the binding. Idempotent; also called at connection teardown.
    pub fn logout(&self, connection: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&connection).map(|(_, s)| s);
        if let Some(s) = &session {
            tracing::info!(username = %s.username, role = %s.role, connection, "user logged out");
        }
        session
    }

    pub fn session(&self, connection: ConnectionId) -> Option<Session> {
        self.sessions.get(&connection).map(|s| s.value().clone())
    }

    pub fn require_login(&self, connection: ConnectionId) -> Result<Session, ServerError> {
        self.session(connection).ok_or(ServerError::NotLoggedIn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::JsonCatalog;
    use tempfile::TempDir;

    async fn manager(dir: &TempDir) -> AuthManager {
        let catalog = JsonCatalog::open(dir.path()).await.unwrap();
        AuthManager::new(Arc::new(catalog))
    }

    #[tokio::test]
    async fn register_validates_inputs() {
        let dir = TempDir::new().unwrap();
        let auth = manager(&dir).await;

        assert!(matches!(
            auth.register("alice", "pw", "admin").await,
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            auth.register("  ", "pw", "player").await,
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            auth.register("alice", "", "player").await,
            Err(ServerError::Validation(_))
        ));

        auth.register("alice", "pw", "player").await.unwrap();
        assert!(matches!(
            auth.register("alice", "pw", "developer").await,
            Err(ServerError::UsernameExists)
        ));
    }

    #[tokio::test]
    async fn login_binds_and_logout_clears() {
        let dir = TempDir::new().unwrap();
        let auth = manager(&dir).await;
        auth.register("alice", "pw", "developer").await.unwrap();

        assert!(matches!(
            auth.login(1, "alice", "nope", "developer").await,
            Err(ServerError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login(1, "alice", "pw", "player").await,
            Err(ServerError::InvalidCredentials)
        ));

        let session = auth.login(1, "alice", "pw", "developer").await.unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(session.role, Role::Developer);
        assert!(auth.require_login(1).is_ok());

        // A different connection has no session.
        assert!(matches!(
            auth.require_login(2),
            Err(ServerError::NotLoggedIn)
        ));

        auth.logout(1);
        assert!(matches!(
            auth.require_login(1),
            Err(ServerError::NotLoggedIn)
        ));
        // Idempotent.
        assert!(auth.logout(1).is_none());
    }

    #[tokio::test]
    async fn second_connection_gets_independent_session() {
        let dir = TempDir::new().unwrap();
        let auth = manager(&dir).await;
        auth.register("alice", "pw", "player").await.unwrap();

        auth.login(1, "alice", "pw", "player").await.unwrap();
        auth.login(2, "alice", "pw", "player").await.unwrap();

        auth.logout(1);
        assert!(auth.require_login(2).is_ok());
    }
}
