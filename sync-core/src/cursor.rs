//! Sync cursor tracking for trailsync.
//!
//! The cursor is the server's `lastSyncAt` as last seen by this client. It
//! decides whether a pull is needed and must never move backwards: realtime
//! deliveries and REST responses can arrive out of order, and an older
//! timestamp arriving late must not make the client re-adopt stale state.

use trailsync_types::SyncCursor;

/// Tracks the highest server cursor this client has adopted.
#[derive(Debug, Clone, Default)]
pub struct CursorTracker {
    last: SyncCursor,
}

impl CursorTracker {
    /// Create a new tracker at the "never synced" cursor.
    pub fn new() -> Self {
        Self {
            last: SyncCursor::zero(),
        }
    }

    /// Create a tracker resuming from a persisted cursor.
    pub fn with_cursor(cursor: SyncCursor) -> Self {
        Self { last: cursor }
    }

    /// Record a cursor observed from the server.
    ///
    /// Returns `true` if the cursor moved forward. Older or equal values are
    /// ignored.
    pub fn advance(&mut self, cursor: SyncCursor) -> bool {
        if cursor > self.last {
            self.last = cursor;
            true
        } else {
            false
        }
    }

    /// The highest cursor adopted so far.
    pub fn last_cursor(&self) -> SyncCursor {
        self.last
    }

    /// Whether a document stamped `server` is newer than what we hold.
    pub fn is_behind(&self, server: SyncCursor) -> bool {
        server > self.last
    }

    /// Whether this client has never synced.
    pub fn is_fresh(&self) -> bool {
        self.last.is_zero()
    }

    /// Forget the cursor (on logout).
    pub fn reset(&mut self) {
        self.last = SyncCursor::zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(v: u64) -> SyncCursor {
        SyncCursor::from_millis(v)
    }

    #[test]
    fn new_tracker_is_fresh() {
        let tracker = CursorTracker::new();
        assert!(tracker.is_fresh());
        assert_eq!(tracker.last_cursor(), SyncCursor::zero());
    }

    #[test]
    fn advance_moves_forward() {
        let mut tracker = CursorTracker::new();
        assert!(tracker.advance(c(10)));
        assert!(tracker.advance(c(20)));
        assert_eq!(tracker.last_cursor(), c(20));
    }

    #[test]
    fn advance_never_moves_backwards() {
        let mut tracker = CursorTracker::with_cursor(c(50));
        assert!(!tracker.advance(c(40)));
        assert!(!tracker.advance(c(50)));
        assert_eq!(tracker.last_cursor(), c(50));
    }

    #[test]
    fn is_behind_compares_strictly() {
        let tracker = CursorTracker::with_cursor(c(50));
        assert!(tracker.is_behind(c(51)));
        assert!(!tracker.is_behind(c(50)));
        assert!(!tracker.is_behind(c(49)));
    }

    #[test]
    fn reset_returns_to_fresh() {
        let mut tracker = CursorTracker::with_cursor(c(50));
        tracker.reset();
        assert!(tracker.is_fresh());
    }

    #[test]
    fn cursor_is_monotonic_over_any_sequence() {
        let mut tracker = CursorTracker::new();
        let mut previous = tracker.last_cursor();
        for v in [5, 3, 9, 9, 1, 12, 11, 40, 0] {
            tracker.advance(c(v));
            assert!(tracker.last_cursor() >= previous);
            previous = tracker.last_cursor();
        }
        assert_eq!(previous, c(40));
    }
}
