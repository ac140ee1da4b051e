//! Authentication state as seen by the sync engine.
//!
//! The engine only reads the bearer token and user. [`AuthSession`] is the
//! durable implementation used by the CLI; apps with their own auth layer
//! implement [`AuthProvider`] instead.
//!
//! Every login or logout bumps a generation counter. Long-running requests
//! capture the generation when they start and drop their result if it has
//! moved by the time they finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use trailsync_types::AuthUser;

use crate::api::PreferencesApi;
use crate::error::ClientError;
use crate::storage::{KeyValueStore, StorageError, StorageKey, TypedStore};

/// Read-only view of the current login.
pub trait AuthProvider: Send + Sync {
    /// Bearer token, if logged in.
    fn token(&self) -> Option<String>;

    /// Cached user, if logged in.
    fn user(&self) -> Option<AuthUser>;

    /// Counter bumped on every login and logout.
    fn generation(&self) -> u64;

    /// Whether a token is present.
    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

/// Storage-backed login state.
pub struct AuthSession {
    store: Arc<dyn KeyValueStore>,
    generation: AtomicU64,
}

impl AuthSession {
    /// Create a session over `store`. An existing token is picked up.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            generation: AtomicU64::new(0),
        }
    }

    /// Record a successful login.
    pub fn login(&self, token: &str, user: Option<&AuthUser>) -> Result<(), StorageError> {
        self.store.set(StorageKey::Token, &token)?;
        match user {
            Some(user) => self.store.set(StorageKey::User, user)?,
            None => self.store.delete(StorageKey::User)?,
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!(user = user.map(|u| u.id.as_str()), "logged in");
        Ok(())
    }

    /// Forget token and user.
    pub fn logout(&self) -> Result<(), StorageError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.store.delete(StorageKey::Token)?;
        self.store.delete(StorageKey::User)?;
        info!("logged out");
        Ok(())
    }

    /// Check the session with `GET /auth/me`.
    ///
    /// Only a 401 signs the user out. A 403, rate limit, server error or
    /// network failure is returned to the caller with local state intact.
    pub async fn validate(&self, api: &dyn PreferencesApi) -> Result<AuthUser, ClientError> {
        if self.token().is_none() {
            return Err(ClientError::NotAuthenticated);
        }
        let generation = self.generation();
        match api.current_user().await {
            Ok(user) => {
                if self.generation() != generation {
                    return Err(ClientError::AuthChanged);
                }
                self.store.set(StorageKey::User, &user)?;
                Ok(user)
            }
            Err(ClientError::Unauthorized) => {
                warn!("session rejected by server, signing out");
                if let Err(e) = self.logout() {
                    warn!(error = %e, "failed to clear credentials");
                }
                Err(ClientError::Unauthorized)
            }
            Err(e) => Err(e),
        }
    }
}

impl AuthProvider for AuthSession {
    fn token(&self) -> Option<String> {
        self.store
            .get::<String>(StorageKey::Token)
            .filter(|t| !t.is_empty())
    }

    fn user(&self) -> Option<AuthUser> {
        self.store.get(StorageKey::User)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
