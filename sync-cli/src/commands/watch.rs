//! Follow realtime preference updates.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use trailsync_client::{
    ChannelEvent, ChannelNotice, FixedAppearance, MockApi, NoticeKind, PreferenceDelta,
    PreferencesApi, RealtimeChannel, SyncCoordinator, ThemeController,
};
use trailsync_types::{PreferencePatch, Theme};

use crate::engine::Engine;

/// Connect, print every update, stop after `seconds` or on Ctrl-C.
pub async fn run(engine: &Engine, seconds: Option<u64>) -> Result<()> {
    engine.require_login()?;

    let theme = Arc::new(ThemeController::new(
        engine.store.theme().unwrap_or_default(),
        Arc::new(FixedAppearance::default()),
    ));
    let channel = engine.channel();
    let coordinator = SyncCoordinator::new(
        Arc::clone(&engine.store),
        Arc::clone(&channel),
        theme.clone(),
        engine.auth.clone(),
    )
    .with_load_retries(engine.config.api.load_retries);

    for kind in [
        NoticeKind::Connected,
        NoticeKind::ConnectionFailed,
        NoticeKind::Disconnected,
        NoticeKind::ReconnectFailed,
        NoticeKind::PreferencesUpdated,
        NoticeKind::ServerError,
    ] {
        channel.on(kind, |notice| println!("{}", describe(notice)));
    }

    coordinator
        .init()
        .await
        .context("Failed to start preference sync")?;
    println!("Watching preferences (theme: {})", theme.theme());

    if let Some(server) = &engine.mock {
        tokio::spawn(simulate_other_device(server.clone(), Arc::clone(&channel)));
    }

    let mut theme_rx = theme.subscribe();
    let deadline = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            changed = theme_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = *theme_rx.borrow_and_update();
                let look = if snapshot.is_dark() { "dark" } else { "light" };
                println!("Theme is now {} (renders {})", snapshot.theme, look);
            }
        }
    }

    // Keep the cached document; only logout drops it
    channel.teardown().await;
    println!("Stopped watching");
    Ok(())
}

/// With `--mock` nobody else is connected, so play another device once.
async fn simulate_other_device(server: MockApi, channel: Arc<RealtimeChannel>) {
    for _ in 0..100 {
        if channel.status().is_connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let current = server.server_preferences().theme;
    let next = if current == Theme::Dark {
        Theme::Light
    } else {
        Theme::Dark
    };
    println!("(mock) another device sets theme to {}", next);
    if let Err(e) = server.update_preferences(&PreferencePatch::theme(next)).await {
        println!("(mock) simulated write failed: {}", e);
    }
}

fn describe(notice: &ChannelNotice) -> String {
    match notice {
        ChannelNotice::Lifecycle(ChannelEvent::Connected { socket_id }) => {
            format!("Connected (socket {})", socket_id)
        }
        ChannelNotice::Lifecycle(ChannelEvent::ConnectionFailed { error }) => {
            format!("Connection failed: {}", error)
        }
        ChannelNotice::Lifecycle(ChannelEvent::Disconnected { reason }) => {
            format!("Disconnected: {}", reason)
        }
        ChannelNotice::Lifecycle(ChannelEvent::ReconnectFailed { attempt, error }) => {
            format!("Reconnect attempt {} failed: {}", attempt, error)
        }
        ChannelNotice::PreferencesUpdated(delta) => format!("Update: {}", describe_delta(delta)),
        ChannelNotice::ServerError(message) => format!("Server error: {}", message),
    }
}

fn describe_delta(delta: &PreferenceDelta) -> String {
    let mut parts = Vec::new();
    if let Some(theme) = delta.theme {
        parts.push(format!("theme={}", theme));
    }
    if let Some(language) = &delta.language {
        parts.push(format!("language={}", language));
    }
    if let Some(unit) = delta.distance_unit {
        parts.push(format!("distanceUnit={}", unit));
    }
    if delta.map_state.is_some() {
        parts.push("mapState".to_string());
    }
    if delta.navigation.is_some() {
        parts.push("navigation".to_string());
    }
    if parts.is_empty() {
        "no fields".to_string()
    } else {
        parts.join(" ")
    }
}
