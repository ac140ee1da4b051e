//! Pull, sync and write preferences.

use anyhow::{Context, Result};
use trailsync_client::{PreferenceField, SyncOutcome};
use trailsync_types::{
    DistanceUnit, LatLng, MapState, NavigationState, PreferencePatch, PreferenceSet, Theme,
};

use crate::engine::Engine;

/// Fetch the full document (`GET /preferences`) and register this device.
pub async fn pull(engine: &Engine, json: bool) -> Result<()> {
    engine.require_login()?;
    let preferences = engine
        .load_preferences()
        .await
        .context("Failed to load preferences")?;
    print_preferences(&preferences, json)
}

/// Pull only if the server has something newer.
pub async fn sync(engine: &Engine) -> Result<()> {
    engine.require_login()?;
    let before = engine.store.last_sync_at();
    match engine.store.sync().await.context("Sync failed")? {
        SyncOutcome::UpToDate => println!("Already up to date (cursor {})", before),
        SyncOutcome::Stale => println!("Server copy is older than the local one; kept local"),
        SyncOutcome::Updated(changed) => {
            let fields: Vec<&str> = changed.iter().map(|f| field_name(*f)).collect();
            if fields.is_empty() {
                println!("Synced, nothing changed");
            } else {
                println!("Synced: {}", fields.join(", "));
            }
            println!("  Cursor: {} -> {}", before, engine.store.last_sync_at());
        }
    }
    Ok(())
}

/// Write the theme.
pub async fn set_theme(engine: &Engine, theme: Theme) -> Result<()> {
    let preferences = write_general(engine, &PreferencePatch::theme(theme)).await?;
    println!("Theme: {}", preferences.theme);
    Ok(())
}

/// Write language and/or distance unit.
pub async fn set_general(
    engine: &Engine,
    language: Option<String>,
    distance_unit: Option<DistanceUnit>,
) -> Result<()> {
    let patch = PreferencePatch {
        theme: None,
        language,
        distance_unit,
    };
    if patch.is_empty() {
        anyhow::bail!("Nothing to change. Pass --language and/or --unit.");
    }
    let preferences = write_general(engine, &patch).await?;
    println!(
        "Language: {}",
        preferences.language.as_deref().unwrap_or("(unset)")
    );
    println!("Units:    {}", preferences.distance_unit);
    Ok(())
}

/// Write the map view.
pub async fn set_map(engine: &Engine, lat: f64, lng: f64, zoom: f64, style: String) -> Result<()> {
    engine.require_login()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        anyhow::bail!("Coordinates out of range: {}, {}", lat, lng);
    }
    let map_state = MapState {
        center: LatLng { lat, lng },
        zoom,
        style,
    };
    ensure_loaded(engine).await?;
    engine
        .store
        .update_map_state(&map_state)
        .await
        .context("Failed to save map view")?;
    println!("Map: {:.4}, {:.4} zoom {} ({})", lat, lng, zoom, map_state.style);
    Ok(())
}

/// Write navigation state.
pub async fn set_navigation(
    engine: &Engine,
    last_path: Option<String>,
    active_tab: Option<String>,
    recent_searches: Vec<String>,
) -> Result<()> {
    engine.require_login()?;
    let navigation = NavigationState {
        last_path,
        active_tab,
        recent_searches,
    };
    ensure_loaded(engine).await?;
    engine
        .store
        .update_navigation(&navigation)
        .await
        .context("Failed to save navigation state")?;
    println!("Navigation saved");
    Ok(())
}

async fn write_general(engine: &Engine, patch: &PreferencePatch) -> Result<PreferenceSet> {
    engine.require_login()?;
    ensure_loaded(engine).await?;
    engine
        .store
        .update_general(patch)
        .await
        .context("Failed to save preferences")
}

/// Domain writes adopt one domain of the response; load the rest first.
async fn ensure_loaded(engine: &Engine) -> Result<()> {
    if !engine.store.is_loaded() {
        engine
            .load_preferences()
            .await
            .context("Failed to load preferences")?;
    }
    Ok(())
}

fn print_preferences(preferences: &PreferenceSet, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(preferences)?);
        return Ok(());
    }
    println!("Preferences:");
    println!("  Theme:     {}", preferences.theme);
    println!(
        "  Language:  {}",
        preferences.language.as_deref().unwrap_or("(unset)")
    );
    println!("  Units:     {}", preferences.distance_unit);
    match &preferences.map_state {
        Some(map) => println!(
            "  Map:       {:.4}, {:.4} zoom {} ({})",
            map.center.lat, map.center.lng, map.zoom, map.style
        ),
        None => println!("  Map:       (unset)"),
    }
    match &preferences.navigation {
        Some(nav) => println!(
            "  Last page: {}",
            nav.last_path.as_deref().unwrap_or("(unset)")
        ),
        None => println!("  Last page: (unset)"),
    }
    println!("  Synced at: {}", preferences.last_sync_at);
    Ok(())
}

pub(crate) fn field_name(field: PreferenceField) -> &'static str {
    match field {
        PreferenceField::Theme => "theme",
        PreferenceField::Language => "language",
        PreferenceField::DistanceUnit => "distanceUnit",
        PreferenceField::MapState => "mapState",
        PreferenceField::Navigation => "navigation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{logged_in_engine, mock_engine};

    #[tokio::test]
    async fn writes_require_login() {
        let (engine, _dir) = mock_engine();
        assert!(set_theme(&engine, Theme::Dark).await.is_err());
        assert!(pull(&engine, false).await.is_err());
        assert!(engine.mock.as_ref().unwrap().requests().is_empty());
    }

    #[tokio::test]
    async fn set_theme_loads_then_writes() {
        let (engine, _dir) = logged_in_engine();

        set_theme(&engine, Theme::Dark).await.unwrap();

        let server = engine.mock.as_ref().unwrap();
        assert_eq!(server.server_preferences().theme, Theme::Dark);
        assert_eq!(server.request_count("GET /preferences"), 1);
        assert_eq!(engine.store.cached_theme(), Some(Theme::Dark));
    }

    #[tokio::test]
    async fn empty_general_patch_is_rejected() {
        let (engine, _dir) = logged_in_engine();
        assert!(set_general(&engine, None, None).await.is_err());
    }

    #[tokio::test]
    async fn out_of_range_map_is_rejected() {
        let (engine, _dir) = logged_in_engine();
        let result = set_map(&engine, 95.0, 0.0, 3.0, "terrain".into()).await;
        assert!(result.is_err());
        assert!(engine.mock.as_ref().unwrap().requests().is_empty());
    }

    #[tokio::test]
    async fn map_and_navigation_round_trip_through_server() {
        let (engine, _dir) = logged_in_engine();

        set_map(&engine, 37.7, -119.5, 10.0, "terrain".into())
            .await
            .unwrap();
        set_navigation(&engine, Some("/parks/yosemite".into()), None, vec![])
            .await
            .unwrap();

        let local = engine.store.preferences().unwrap();
        let server = engine.mock.as_ref().unwrap().server_preferences();
        assert_eq!(local.map_state, server.map_state);
        assert_eq!(local.navigation, server.navigation);
        assert!(engine.store.cached_map_view().is_some());
    }

    #[tokio::test]
    async fn sync_twice_is_up_to_date() {
        let (engine, _dir) = logged_in_engine();
        sync(&engine).await.unwrap();
        assert_eq!(engine.store.sync().await.unwrap(), SyncOutcome::UpToDate);
    }
}
