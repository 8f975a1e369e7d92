use std::sync::Arc;

use tracing::{info, warn};

use super::password::{hash_password, verify_password};
use super::session::SessionKeys;
use crate::error::{AppError, AppResult, AuthError};
use crate::ledger::models::User;
use crate::ledger::store::LedgerStore;

/// A freshly authenticated user and its session token
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: String,
}

pub struct AuthService {
    store: Arc<dyn LedgerStore>,
    keys: Arc<SessionKeys>,
}

impl AuthService {
    pub fn new(store: Arc<dyn LedgerStore>, keys: Arc<SessionKeys>) -> Self {
        Self { store, keys }
    }

    /// Create the user with its wallet and open a session.
    pub async fn register(&self, login: &str, password: &str) -> AppResult<Session> {
        let password = password.to_string();
        let credential_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let user = self.store.create_user(login, &credential_hash).await?;
        let token = self.keys.issue(user.id, &user.login)?;

        info!("User {} registered", user.login);
        Ok(Session { user, token })
    }

    pub async fn login(&self, login: &str, password: &str) -> AppResult<Session> {
        let Some(user) = self.store.find_user_by_login(login).await? else {
            warn!("Login attempt for unknown user {}", login);
            return Err(AuthError::InvalidCredentials.into());
        };

        let password = password.to_string();
        let stored = user.credential_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .map_err(|e| AppError::Internal(format!("Password check failed: {}", e)))?;

        if !matches {
            warn!("Wrong password for user {}", login);
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = self.keys.issue(user.id, &user.login)?;
        Ok(Session { user, token })
    }
}
