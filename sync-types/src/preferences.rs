//! The replicated preference document.
//!
//! The server holds exactly one authoritative [`PreferenceSet`] per user.
//! Every client holds an eventually-consistent replica. The document is split
//! into three independently writable domains (see [`PreferenceDomain`]):
//! general fields, map state, and navigation state.

use serde::{Deserialize, Serialize};

use crate::SyncCursor;

/// Colour scheme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Always light
    Light,
    /// Always dark
    Dark,
    /// Follow the operating system
    #[default]
    System,
}

impl Theme {
    /// Parse a theme name as stored by clients ("light", "dark", "system").
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            "system" => Some(Theme::System),
            _ => None,
        }
    }

    /// Lowercase name, as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit used when displaying trail and drive distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    /// Kilometres
    #[default]
    Km,
    /// Miles
    Mi,
}

impl DistanceUnit {
    /// Parse "km" or "mi".
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "km" => Some(DistanceUnit::Km),
            "mi" => Some(DistanceUnit::Mi),
            _ => None,
        }
    }

    /// Lowercase name, as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceUnit::Km => "km",
            DistanceUnit::Mi => "mi",
        }
    }
}

impl std::fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
}

/// The map viewport a user last looked at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapState {
    /// Centre of the viewport
    pub center: LatLng,
    /// Zoom level
    pub zoom: f64,
    /// Map style identifier, e.g. "outdoors"
    pub style: String,
}

/// Where the user was in the app.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    /// Last visited route path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_path: Option<String>,
    /// Selected tab on the explore screen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_tab: Option<String>,
    /// Most recent searches, newest first
    #[serde(default)]
    pub recent_searches: Vec<String>,
}

/// One of the independently syncable field groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceDomain {
    /// theme, language, distance unit
    General,
    /// map viewport
    MapState,
    /// navigation state
    Navigation,
}

/// A user's full preference document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceSet {
    /// Colour scheme
    #[serde(default)]
    pub theme: Theme,
    /// Preferred UI language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Distance display unit
    #[serde(default)]
    pub distance_unit: DistanceUnit,
    /// Map viewport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_state: Option<MapState>,
    /// Navigation state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<NavigationState>,
    /// Server timestamp of the last write
    #[serde(default)]
    pub last_sync_at: SyncCursor,
}

/// Partial write to the general domain (`PUT /preferences`).
///
/// Has no map or navigation fields, so a general write cannot clobber
/// another domain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencePatch {
    /// New theme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    /// New language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// New distance unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_unit: Option<DistanceUnit>,
}

impl PreferencePatch {
    /// Patch that only sets the theme.
    pub fn theme(theme: Theme) -> Self {
        Self {
            theme: Some(theme),
            ..Self::default()
        }
    }

    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.theme.is_none() && self.language.is_none() && self.distance_unit.is_none()
    }
}

/// Partial document pushed over the realtime channel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceDelta {
    /// Changed theme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    /// Changed language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Changed distance unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_unit: Option<DistanceUnit>,
    /// Changed map viewport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_state: Option<MapState>,
    /// Changed navigation state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<NavigationState>,
    /// Server timestamp of the write that produced this delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<SyncCursor>,
}

impl PreferenceDelta {
    /// True when the delta carries no preference field.
    pub fn is_empty(&self) -> bool {
        self.theme.is_none()
            && self.language.is_none()
            && self.distance_unit.is_none()
            && self.map_state.is_none()
            && self.navigation.is_none()
    }

    /// True when the delta carries any general-domain field.
    pub fn carries_general(&self) -> bool {
        self.theme.is_some() || self.language.is_some() || self.distance_unit.is_some()
    }
}

impl From<&PreferenceSet> for PreferenceDelta {
    fn from(set: &PreferenceSet) -> Self {
        Self {
            theme: Some(set.theme),
            language: set.language.clone(),
            distance_unit: Some(set.distance_unit),
            map_state: set.map_state.clone(),
            navigation: set.navigation.clone(),
            last_sync_at: Some(set.last_sync_at),
        }
    }
}
