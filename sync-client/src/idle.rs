//! Refresh user-specific queries when the user comes back.
//!
//! [`IdleActivityMonitor`] feeds input and poll ticks into the pure
//! [`ActivityTracker`]. On the IDLE → ACTIVE edge it invalidates the
//! queries that may have gone stale while the user was away, once each.
//! Input while already ACTIVE does nothing.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use trailsync_core::{ActivityKind, ActivityTracker, Transition};

use crate::config::IdleConfig;

/// A cached query family the host app can refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// Parks the user has visited
    VisitedParks,
    /// Reviews the user wrote
    UserReviews,
    /// The user's profile
    UserProfile,
    /// The user's favourites
    Favorites,
}

impl QueryKey {
    /// Queries refreshed after an idle period.
    pub const IDLE_REFRESH: [QueryKey; 4] = [
        QueryKey::VisitedParks,
        QueryKey::UserReviews,
        QueryKey::UserProfile,
        QueryKey::Favorites,
    ];

    /// Key name used by the host's query cache.
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKey::VisitedParks => "visitedParks",
            QueryKey::UserReviews => "userReviews",
            QueryKey::UserProfile => "userProfile",
            QueryKey::Favorites => "favorites",
        }
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The host's query cache.
pub trait QueryCache: Send + Sync {
    /// Mark every cached query under `key` as stale.
    fn invalidate_queries(&self, key: QueryKey);
}

/// Idle tracker wired to a query cache.
pub struct IdleActivityMonitor {
    tracker: Mutex<ActivityTracker>,
    cache: Arc<dyn QueryCache>,
    poll_interval: Duration,
}

impl IdleActivityMonitor {
    /// Start ACTIVE now.
    pub fn new(cache: Arc<dyn QueryCache>, config: &IdleConfig) -> Self {
        Self {
            tracker: Mutex::new(ActivityTracker::with_threshold(now(), config.threshold())),
            cache,
            poll_interval: config.poll_interval(),
        }
    }

    /// Record qualifying input.
    pub fn record_activity(&self, kind: ActivityKind) -> Option<Transition> {
        self.record_activity_at(kind, now())
    }

    /// Record input observed at `at`.
    pub fn record_activity_at(&self, kind: ActivityKind, at: Instant) -> Option<Transition> {
        let transition = self.lock().on_activity(kind, at);
        if let Some(Transition::BecameActive { idle_for }) = transition {
            info!(?kind, idle_secs = idle_for.as_secs(), "user active again, refreshing queries");
            for key in QueryKey::IDLE_REFRESH {
                self.cache.invalidate_queries(key);
            }
        }
        transition
    }

    /// Run the idle check.
    pub fn tick(&self) -> Option<Transition> {
        self.tick_at(now())
    }

    /// Run the idle check as of `at`.
    pub fn tick_at(&self, at: Instant) -> Option<Transition> {
        let transition = self.lock().on_tick(at);
        if transition == Some(Transition::BecameIdle) {
            debug!("user idle");
        }
        transition
    }

    /// Whether the user is currently idle.
    pub fn is_idle(&self) -> bool {
        self.lock().is_idle()
    }

    /// Tick on an interval until the monitor is dropped or the task aborted.
    pub fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor: Weak<Self> = Arc::downgrade(self);
        let period = self.poll_interval;
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            // The first tick completes immediately
            timer.tick().await;
            loop {
                timer.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    debug!("idle monitor dropped, poller exiting");
                    return;
                };
                monitor.tick();
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, ActivityTracker> {
        self.tracker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Current time on the tokio clock, so paused-time tests can drive it.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
