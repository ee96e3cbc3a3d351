//! Ping cache: which suspended priorities are waiting on which dependency.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::expiration::ExpirationTime;
use crate::root_time::RootTimeState;

/// Identifier of an external dependency a pass suspended on.
pub type WakeableId = u64;

/// Per-root map from a blocking dependency to the times suspended on it.
#[derive(Clone, Debug, Default)]
pub struct PingCache {
    waiting: FxHashMap<WakeableId, FxHashSet<ExpirationTime>>,
}

impl PingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that work at `time` is blocked on `wakeable`.
    ///
    /// Returns `true` if this pair was not already recorded, meaning the
    /// caller should subscribe to the dependency's resolution.
    pub fn attach(&mut self, wakeable: WakeableId, time: ExpirationTime) -> bool {
        self.waiting.entry(wakeable).or_default().insert(time)
    }

    pub fn is_waiting(&self, wakeable: WakeableId) -> bool {
        self.waiting.contains_key(&wakeable)
    }

    /// Number of dependencies with work waiting on them.
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    /// `wakeable` resolved: forget it and ping every time still suspended on it.
    ///
    /// Times that are no longer inside the root's suspended range are stale and
    /// are not pinged. Returns the pinged times, most urgent first.
    pub fn ping(
        &mut self,
        wakeable: WakeableId,
        times: &mut RootTimeState,
    ) -> Vec<ExpirationTime> {
        let Some(waiting) = self.waiting.remove(&wakeable) else {
            return Vec::new();
        };

        let mut pinged: Vec<ExpirationTime> = waiting
            .into_iter()
            .filter(|time| times.is_suspended_at_time(*time))
            .collect();
        pinged.sort_unstable_by(|a, b| b.cmp(a));

        for time in &pinged {
            times.mark_pinged_at_time(*time);
        }
        pinged
    }
}
