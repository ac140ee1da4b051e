//! # sync-types
//!
//! Data and wire types for the trailsync preference sync engine.
//!
//! This crate provides the foundational types used across all trailsync crates:
//! - [`DeviceId`], [`AnonymousId`], [`SyncCursor`] - Identity and ordering types
//! - [`DeviceRecord`] - Per-device metadata snapshot
//! - [`PreferenceSet`], [`PreferencePatch`], [`PreferenceDelta`] - The replicated document
//! - [`RealtimeFrame`] - WebSocket frames for the push channel
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod device;
mod error;
mod ids;
mod messages;
mod preferences;

pub use device::{DeviceRecord, DeviceType};
pub use error::SyncError;
pub use ids::{AnonymousId, DeviceId, SyncCursor};
pub use messages::{
    AuthUser, MigrateChatRequest, MigrateChatResponse, RealtimeFrame, SyncRequest, SyncResponse,
    PREFERENCES_TOPIC,
};
pub use preferences::{
    DistanceUnit, LatLng, MapState, NavigationState, PreferenceDelta, PreferenceDomain,
    PreferencePatch, PreferenceSet, Theme,
};
