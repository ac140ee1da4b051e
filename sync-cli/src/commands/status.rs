//! Show local sync state.

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};
use trailsync_client::{AuthProvider, MigrationKind};

use crate::engine::Engine;

/// Print what this installation knows without touching the network.
pub fn run(engine: &Engine) -> Result<()> {
    println!("=== trailsync status ===");
    println!();

    println!("Device:");
    println!("  ID: {}", engine.identity.device_id());
    println!();

    println!("Session:");
    if engine.auth.is_authenticated() {
        match engine.auth.user() {
            Some(user) => println!(
                "  Logged in as {}",
                user.email.as_deref().unwrap_or(&user.id)
            ),
            None => println!("  Logged in (user not fetched)"),
        }
    } else {
        println!("  NOT LOGGED IN");
    }
    println!();

    println!("Preferences:");
    match engine.store.theme() {
        Some(theme) => println!("  Theme:     {}", theme),
        None => println!("  Theme:     (default)"),
    }
    let cursor = engine.store.last_sync_at();
    if cursor.as_millis() == 0 {
        println!("  Last sync: never");
    } else {
        println!("  Last sync: {}", format_timestamp(cursor.as_millis()));
    }
    match engine.store.cached_map_view() {
        Some(map) => println!(
            "  Map view:  {:.4}, {:.4} zoom {}",
            map.center.lat, map.center.lng, map.zoom
        ),
        None => println!("  Map view:  (none cached)"),
    }
    println!();

    match engine.migration_bridge().pending() {
        Some(pending) => {
            let kind = match pending.kind {
                MigrationKind::ChatReturn => "chat return",
                MigrationKind::AnonymousSession => "anonymous session",
            };
            println!("Pending migration:");
            println!("  {} {} ({})", kind, pending.anonymous_id, expiry(pending.expires_at));
        }
        None => println!("Pending migration: none"),
    }

    println!();
    println!("Endpoint: {}", engine.config.api.base_url);
    if engine.mock.is_some() {
        println!("  (mock server, state is not shared between runs)");
    }

    Ok(())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Format a ms timestamp relative to now.
fn format_timestamp(ts_ms: u64) -> String {
    let diff = now_ms().saturating_sub(ts_ms) / 1000;
    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} min ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

fn expiry(expires_at_ms: u64) -> String {
    let now = now_ms();
    if expires_at_ms <= now {
        return "expired".to_string();
    }
    let mins = (expires_at_ms - now) / 60_000;
    if mins < 60 {
        format!("expires in {} min", mins)
    } else {
        format!("expires in {} hours", mins / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{logged_in_engine, mock_engine};
    use trailsync_client::AnonymousId;

    #[test]
    fn timestamps_are_relative() {
        let now = now_ms();
        assert_eq!(format_timestamp(now), "just now");
        assert_eq!(format_timestamp(now - 5 * 60_000), "5 min ago");
        assert_eq!(format_timestamp(now - 3 * 3_600_000), "3 hours ago");
        assert_eq!(format_timestamp(now - 2 * 86_400_000), "2 days ago");
    }

    #[test]
    fn expiry_in_the_past_reads_expired() {
        assert_eq!(expiry(1), "expired");
        assert!(expiry(now_ms() + 2 * 3_600_000 + 60_000).starts_with("expires in 2 hours"));
    }

    #[test]
    fn status_works_signed_out() {
        let (engine, _dir) = mock_engine();
        run(&engine).unwrap();
        assert!(engine.mock.as_ref().unwrap().requests().is_empty());
    }

    #[tokio::test]
    async fn status_reads_only_local_state() {
        let (engine, _dir) = logged_in_engine();
        engine.store.load().await.unwrap();
        engine
            .migration_bridge()
            .record_anonymous_session(AnonymousId::new("anon-1"))
            .unwrap();
        let before = engine.mock.as_ref().unwrap().requests().len();

        run(&engine).unwrap();

        assert_eq!(engine.mock.as_ref().unwrap().requests().len(), before);
    }
}
