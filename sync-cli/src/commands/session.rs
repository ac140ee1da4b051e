//! Login, logout and anonymous session markers.

use anyhow::{Context, Result};
use tracing::warn;
use trailsync_client::{ClientError, MigrationOutcome};
use trailsync_types::AnonymousId;

use crate::engine::Engine;

/// Store `token`, validate it, migrate any anonymous session, pull preferences.
pub async fn login(engine: &Engine, token: &str) -> Result<()> {
    engine
        .auth
        .login(token, None)
        .context("Failed to store credentials")?;

    match engine.auth.validate(engine.api.as_ref()).await {
        Ok(user) => {
            let who = user
                .email
                .as_deref()
                .or(user.name.as_deref())
                .unwrap_or(&user.id);
            println!("Logged in as {}", who);
        }
        Err(ClientError::Unauthorized) => {
            anyhow::bail!("Server rejected the token");
        }
        Err(e) => {
            warn!(error = %e, "session not verified, keeping it");
            println!("Logged in (session not verified: {})", e);
        }
    }

    match engine.migration_bridge().on_login(token).await {
        MigrationOutcome::Migrated { trip_id, chat_id } => {
            println!("Anonymous session migrated");
            if let Some(trip_id) = trip_id {
                println!("  Trip: {}", trip_id);
            }
            if let Some(chat_id) = chat_id {
                println!("  Continue chat: {}", chat_id);
            }
        }
        MigrationOutcome::Expired => println!("Anonymous session expired, not migrated"),
        MigrationOutcome::Failed { reason } => {
            println!("Anonymous session could not be migrated: {}", reason)
        }
        MigrationOutcome::NothingPending => {}
    }

    match engine.load_preferences().await {
        Ok(preferences) => println!("Preferences loaded (theme: {})", preferences.theme),
        Err(e) => println!("Preferences not loaded yet: {}", e),
    }

    Ok(())
}

/// Forget credentials and the cached preference document.
pub fn logout(engine: &Engine) -> Result<()> {
    engine
        .auth
        .logout()
        .context("Failed to clear credentials")?;
    engine.store.clear();
    println!("Logged out");
    Ok(())
}

/// Remember an anonymous session for migration at the next login.
pub fn remember_anonymous(engine: &Engine, anonymous_id: &str, chat_id: Option<&str>) -> Result<()> {
    let bridge = engine.migration_bridge();
    let id = AnonymousId::new(anonymous_id);
    let stored = match chat_id {
        Some(chat_id) => bridge.record_chat_return(id, Some(chat_id)),
        None => bridge.record_anonymous_session(id),
    }
    .context("Failed to store anonymous session")?;

    if stored {
        println!("Anonymous session {} will be migrated at next login", anonymous_id);
    } else {
        println!("A pending chat return takes precedence; {} not recorded", anonymous_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::mock_engine;
    use trailsync_client::{AuthProvider, MockFailure};

    #[tokio::test]
    async fn login_migrates_pending_session_once() {
        let (engine, _dir) = mock_engine();
        remember_anonymous(&engine, "abc123", None).unwrap();

        login(&engine, "tok-login").await.unwrap();
        login(&engine, "tok-login").await.unwrap();

        let server = engine.mock.as_ref().unwrap();
        let calls = server.migrations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].anonymous_id.as_str(), "abc123");
        assert_eq!(calls[0].token, "tok-login");
        assert!(engine.store.is_loaded());
    }

    #[tokio::test]
    async fn rejected_token_signs_out() {
        let (engine, _dir) = mock_engine();
        engine
            .mock
            .as_ref()
            .unwrap()
            .fail_next("GET /auth/me", MockFailure::Status(401));

        assert!(login(&engine, "bad").await.is_err());
        assert!(!engine.auth.is_authenticated());
    }

    #[tokio::test]
    async fn forbidden_validation_keeps_session() {
        let (engine, _dir) = mock_engine();
        engine
            .mock
            .as_ref()
            .unwrap()
            .fail_next("GET /auth/me", MockFailure::Status(403));

        login(&engine, "tok").await.unwrap();
        assert!(engine.auth.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn login_retries_preference_load() {
        let (engine, _dir) = mock_engine();
        let server = engine.mock.as_ref().unwrap();
        server.fail_next("GET /preferences", MockFailure::Status(500));

        login(&engine, "tok").await.unwrap();

        assert_eq!(server.request_count("GET /preferences"), 2);
        assert!(engine.store.is_loaded());
    }

    #[tokio::test]
    async fn logout_clears_replica() {
        let (engine, _dir) = mock_engine();
        login(&engine, "tok").await.unwrap();

        logout(&engine).unwrap();

        assert!(!engine.auth.is_authenticated());
        assert!(!engine.store.is_loaded());
    }
}
