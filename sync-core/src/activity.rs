//! Idle detection state machine: ACTIVE ⇄ IDLE.
//!
//! Time is passed in by the caller, so the machine is deterministic.
//!
//! - ACTIVE → IDLE happens on a poll tick, once no qualifying input has been
//!   seen for at least the threshold. With a 60s threshold and a 30s tick
//!   the transition fires between 60s and ~90s of inactivity.
//! - IDLE → ACTIVE happens on the next qualifying input. Only this edge is
//!   reported; further input while ACTIVE reports nothing.

use std::time::{Duration, Instant};

/// Inactivity after which the client counts as idle.
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(60);

/// How often the idle check runs.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Input that counts as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    /// `mousedown`
    MouseDown,
    /// `mousemove`
    MouseMove,
    /// `keypress`
    KeyPress,
    /// `scroll`
    Scroll,
    /// `touchstart`
    TouchStart,
    /// `click`
    Click,
    /// The tab or window became visible again
    VisibilityRegained,
}

impl ActivityKind {
    /// Map a DOM event name to an activity kind.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "mousedown" => Some(ActivityKind::MouseDown),
            "mousemove" => Some(ActivityKind::MouseMove),
            "keypress" => Some(ActivityKind::KeyPress),
            "scroll" => Some(ActivityKind::Scroll),
            "touchstart" => Some(ActivityKind::TouchStart),
            "click" => Some(ActivityKind::Click),
            "visibilitychange" => Some(ActivityKind::VisibilityRegained),
            _ => None,
        }
    }
}

/// Edge reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// ACTIVE → IDLE
    BecameIdle,
    /// IDLE → ACTIVE
    BecameActive {
        /// Time since the previous qualifying input.
        idle_for: Duration,
    },
}

/// Tracks the last activity time and the idle flag.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    last_activity_at: Instant,
    idle: bool,
    threshold: Duration,
}

impl ActivityTracker {
    /// Start ACTIVE at `now` with the default threshold.
    pub fn new(now: Instant) -> Self {
        Self::with_threshold(now, IDLE_THRESHOLD)
    }

    /// Start ACTIVE at `now` with a custom threshold.
    pub fn with_threshold(now: Instant, threshold: Duration) -> Self {
        Self {
            last_activity_at: now,
            idle: false,
            threshold,
        }
    }

    /// Record qualifying input.
    pub fn on_activity(&mut self, _kind: ActivityKind, now: Instant) -> Option<Transition> {
        let idle_for = now.saturating_duration_since(self.last_activity_at);
        self.last_activity_at = now;
        if self.idle {
            self.idle = false;
            Some(Transition::BecameActive { idle_for })
        } else {
            None
        }
    }

    /// Periodic check.
    pub fn on_tick(&mut self, now: Instant) -> Option<Transition> {
        if self.idle {
            return None;
        }
        if now.saturating_duration_since(self.last_activity_at) >= self.threshold {
            self.idle = true;
            Some(Transition::BecameIdle)
        } else {
            None
        }
    }

    /// Whether the tracker is currently IDLE.
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Time of the last qualifying input.
    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// The configured threshold.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}
