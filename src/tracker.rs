//! Registry of ephemeral local byte references.
//!
//! Every byte range one stage hands to the next (a transform result, a
//! cropped replacement) is registered here and identified by a [`Handle`].
//! Hosts may [`resolve`](ResourceTracker::resolve) a handle to show a preview
//! while the run is live. Once released, a handle never resolves again.
//!
//! Releasing is idempotent: an unknown or already-released handle is a no-op.
//! Two cleanup paths can fire for the same run (an explicit cancel followed
//! by host teardown) and neither may fail.
//!
//! The lifetime counters in [`TrackerStats`] let tests assert the resource
//! balance property: once a run is terminal, `tracked == released`.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Opaque identifier of a tracked reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Handle(u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref:{}", self.0)
    }
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub tracked: u64,
    pub released: u64,
}

impl TrackerStats {
    pub fn outstanding(&self) -> u64 {
        self.tracked - self.released
    }
}

#[derive(Debug, Default)]
pub struct ResourceTracker {
    next_id: u64,
    live: HashMap<Handle, Arc<[u8]>>,
    stats: TrackerStats,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a byte range and return its handle.
    pub fn track(&mut self, bytes: Arc<[u8]>) -> Handle {
        self.next_id += 1;
        let handle = Handle(self.next_id);
        self.live.insert(handle, bytes);
        self.stats.tracked += 1;
        tracing::trace!(%handle, "tracked reference");
        handle
    }

    /// Release a handle. Returns `false` if it was unknown or already released.
    pub fn release(&mut self, handle: Handle) -> bool {
        if self.live.remove(&handle).is_some() {
            self.stats.released += 1;
            tracing::trace!(%handle, "released reference");
            true
        } else {
            false
        }
    }

    /// Release every outstanding handle, whichever stage created it.
    ///
    /// Returns the number of handles released.
    pub fn release_all(&mut self) -> usize {
        let count = self.live.len();
        self.live.clear();
        self.stats.released += count as u64;
        count
    }

    /// Look up the bytes behind a live handle.
    pub fn resolve(&self, handle: Handle) -> Option<Arc<[u8]>> {
        self.live.get(&handle).cloned()
    }

    pub fn outstanding(&self) -> usize {
        self.live.len()
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        if !self.live.is_empty() {
            tracing::warn!(
                outstanding = self.live.len(),
                "resource tracker dropped with live references"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(n: usize) -> Arc<[u8]> {
        vec![0u8; n].into()
    }

    #[test]
    fn track_issues_distinct_handles() {
        let mut tracker = ResourceTracker::new();
        let a = tracker.track(bytes(1));
        let b = tracker.track(bytes(2));
        assert_ne!(a, b);
        assert_eq!(tracker.outstanding(), 2);
    }

    #[test]
    fn release_is_idempotent() {
        let mut tracker = ResourceTracker::new();
        let a = tracker.track(bytes(1));

        assert!(tracker.release(a));
        assert!(!tracker.release(a));
        assert_eq!(tracker.stats().released, 1);
    }

    #[test]
    fn release_unknown_handle_is_noop() {
        let mut tracker = ResourceTracker::new();
        assert!(!tracker.release(Handle(42)));
        assert_eq!(tracker.stats(), TrackerStats::default());
    }

    #[test]
    fn release_all_clears_everything() {
        let mut tracker = ResourceTracker::new();
        let a = tracker.track(bytes(1));
        tracker.track(bytes(2));
        tracker.track(bytes(3));
        tracker.release(a);

        assert_eq!(tracker.release_all(), 2);
        assert_eq!(tracker.outstanding(), 0);

        let stats = tracker.stats();
        assert_eq!(stats.tracked, 3);
        assert_eq!(stats.released, 3);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn release_after_release_all_is_noop() {
        let mut tracker = ResourceTracker::new();
        let a = tracker.track(bytes(1));
        tracker.release_all();
        assert!(!tracker.release(a));
        assert_eq!(tracker.stats().released, 1);
    }

    #[test]
    fn resolve_only_live_handles() {
        let mut tracker = ResourceTracker::new();
        let a = tracker.track(vec![7u8, 8].into());
        assert_eq!(tracker.resolve(a).as_deref(), Some(&[7u8, 8][..]));

        tracker.release(a);
        assert!(tracker.resolve(a).is_none());
    }

    #[test]
    fn handles_are_not_reused_after_release() {
        let mut tracker = ResourceTracker::new();
        let a = tracker.track(bytes(1));
        tracker.release(a);
        let b = tracker.track(bytes(1));
        assert_ne!(a, b);
    }
}
