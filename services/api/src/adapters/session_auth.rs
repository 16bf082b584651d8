//! services/api/src/adapters/session_auth.rs
//!
//! An `AuthProvider` that resolves the current user from an access token via the
//! `auth_sessions` table, and broadcasts sign-in and sign-out transitions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use smartcart_core::domain::{AuthEvent, User};
use smartcart_core::ports::{AuthProvider, DatabaseService, PortError, PortResult};
use tokio::sync::broadcast;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 16;

pub struct SessionAuth {
    db: Arc<dyn DatabaseService>,
    token: Mutex<Option<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SessionAuth {
    pub fn new(db: Arc<dyn DatabaseService>, token: Option<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            db,
            token: Mutex::new(token.filter(|t| !t.trim().is_empty())),
            events,
        }
    }

    fn token(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to session transitions from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Adopts a new access token after validating it.
    pub async fn sign_in(&self, token: &str) -> PortResult<User> {
        let user = self.db.validate_auth_session(token).await?;
        *self.token() = Some(token.to_string());
        info!(user_id = %user.user_id, "Signed in");
        // No receivers is fine.
        let _ = self.events.send(AuthEvent::SignedIn(user.clone()));
        Ok(user)
    }

    pub fn sign_out(&self) {
        *self.token() = None;
        info!("Signed out");
        let _ = self.events.send(AuthEvent::SignedOut);
    }
}

#[async_trait]
impl AuthProvider for SessionAuth {
    async fn current_user(&self) -> PortResult<Option<User>> {
        let Some(token) = self.token().clone() else {
            return Ok(None);
        };
        match self.db.validate_auth_session(&token).await {
            Ok(user) => Ok(Some(user)),
            Err(PortError::Unauthorized) => {
                debug!("Access token is no longer valid");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
