//! # sync-core
//!
//! Pure logic for trailsync (no I/O, instant tests).
//!
//! This crate implements the state machines and merge rules for preference
//! sync without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input (including the
//! current time) and produce output without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (network, storage, timers) is performed by `sync-client`,
//! which interprets the results of these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod activity;
pub mod cursor;
pub mod migration;
pub mod replica;
pub mod state;

pub use activity::{ActivityKind, ActivityTracker, Transition, IDLE_THRESHOLD, POLL_INTERVAL};
pub use cursor::CursorTracker;
pub use migration::{
    decide, should_replace, MigrationDecision, MigrationKind, PendingMigration,
    ANONYMOUS_SESSION_TTL,
};
pub use replica::{ChangedFields, PreferenceField, PreferenceReplica};
pub use state::{calculate_backoff, Action, ChannelEvent, ConnectionState, ConnectionStatus, Event};
