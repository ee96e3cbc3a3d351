//! Per-root timing metadata.
//!
//! Tracks which priority ranges of a work root are pending, suspended,
//! pinged, or expired. The external scheduler reads these to choose the next
//! pass priority and to decide whether to retry, wait, or force a root.

use crate::expiration::ExpirationTime;

const NO_WORK: ExpirationTime = ExpirationTime::NO_WORK;

/// Timing state for one work root.
///
/// The suspended range is `[last_suspended_time, first_suspended_time]` and is
/// active iff `first_suspended_time != NO_WORK`. When inactive both bounds
/// are `NO_WORK`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RootTimeState {
    first_pending_time: ExpirationTime,
    first_suspended_time: ExpirationTime,
    last_suspended_time: ExpirationTime,
    next_known_pending_level: ExpirationTime,
    last_pinged_time: ExpirationTime,
    last_expired_time: ExpirationTime,
    finished_expiration_time: ExpirationTime,
}

impl RootTimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most urgent pending time on the root.
    pub fn first_pending_time(&self) -> ExpirationTime {
        self.first_pending_time
    }

    /// Most urgent suspended time.
    pub fn first_suspended_time(&self) -> ExpirationTime {
        self.first_suspended_time
    }

    /// Least urgent suspended time.
    pub fn last_suspended_time(&self) -> ExpirationTime {
        self.last_suspended_time
    }

    /// The next known pending time after the suspended range.
    pub fn next_known_pending_level(&self) -> ExpirationTime {
        self.next_known_pending_level
    }

    pub fn last_pinged_time(&self) -> ExpirationTime {
        self.last_pinged_time
    }

    pub fn last_expired_time(&self) -> ExpirationTime {
        self.last_expired_time
    }

    /// Priority of the completed pass waiting to be committed, if any.
    pub fn finished_expiration_time(&self) -> ExpirationTime {
        self.finished_expiration_time
    }

    pub(crate) fn set_finished_expiration_time(&mut self, time: ExpirationTime) {
        self.finished_expiration_time = time;
    }

    fn clear_suspended_range(&mut self) {
        self.first_suspended_time = NO_WORK;
        self.last_suspended_time = NO_WORK;
        self.next_known_pending_level = NO_WORK;
    }

    pub fn is_suspended_at_time(&self, time: ExpirationTime) -> bool {
        self.first_suspended_time != NO_WORK
            && self.first_suspended_time >= time
            && self.last_suspended_time <= time
    }

    /// Record an update scheduled at `time`.
    ///
    /// Everything at or below `time` is treated as unsuspended.
    pub fn mark_updated_at_time(&mut self, time: ExpirationTime) {
        if time > self.first_pending_time {
            self.first_pending_time = time;
        }

        if self.first_suspended_time == NO_WORK {
            return;
        }

        if time >= self.first_suspended_time {
            // The entire suspended range is now unsuspended.
            self.clear_suspended_range();
        } else if time >= self.last_suspended_time {
            self.last_suspended_time = time.more_urgent();
        }

        if self.first_suspended_time != NO_WORK && time > self.next_known_pending_level {
            self.next_known_pending_level = time;
        }
    }

    /// Widen the suspended range to include `time`.
    pub fn mark_suspended_at_time(&mut self, time: ExpirationTime) {
        let was_unset = self.first_suspended_time == NO_WORK;
        if self.first_suspended_time < time {
            self.first_suspended_time = time;
        }
        if self.last_suspended_time > time || was_unset {
            self.last_suspended_time = time;
        }

        if time <= self.last_pinged_time {
            self.last_pinged_time = NO_WORK;
        }
        if time <= self.last_expired_time {
            self.last_expired_time = NO_WORK;
        }
    }

    /// A dependency blocking `time` has resolved.
    pub fn mark_pinged_at_time(&mut self, time: ExpirationTime) {
        if time > self.last_pinged_time {
            self.last_pinged_time = time;
        }
    }

    /// Force `time` (and everything more urgent) to complete synchronously.
    ///
    /// Keeps the lowest expired time, which covers every level above it.
    pub fn mark_expired_at_time(&mut self, time: ExpirationTime) {
        if self.last_expired_time == NO_WORK || self.last_expired_time > time {
            self.last_expired_time = time;
        }
    }

    /// A pass at `finished` committed, leaving `remaining` as the most urgent
    /// pending time.
    pub fn mark_finished_at_time(&mut self, finished: ExpirationTime, remaining: ExpirationTime) {
        self.first_pending_time = remaining;

        // Everything at or above `finished` is unsuspended.
        if finished <= self.last_suspended_time {
            self.clear_suspended_range();
        } else if finished <= self.first_suspended_time {
            self.first_suspended_time = finished.less_urgent();
        }

        if finished <= self.last_pinged_time {
            self.last_pinged_time = NO_WORK;
        }
        if finished <= self.last_expired_time {
            self.last_expired_time = NO_WORK;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(value: u32) -> ExpirationTime {
        ExpirationTime::new(value)
    }

    #[test]
    fn test_fresh_root_is_not_suspended() {
        let state = RootTimeState::new();
        assert!(!state.is_suspended_at_time(t(10)));
        assert!(!state.is_suspended_at_time(NO_WORK));
    }

    #[test]
    fn test_suspension_widens_range() {
        let mut state = RootTimeState::new();
        state.mark_suspended_at_time(t(10));
        assert_eq!(state.first_suspended_time(), t(10));
        assert_eq!(state.last_suspended_time(), t(10));

        state.mark_suspended_at_time(t(5));
        state.mark_suspended_at_time(t(20));
        assert_eq!(state.first_suspended_time(), t(20));
        assert_eq!(state.last_suspended_time(), t(5));
        assert!(state.is_suspended_at_time(t(12)));
        assert!(!state.is_suspended_at_time(t(4)));
        assert!(!state.is_suspended_at_time(t(21)));
    }

    #[test]
    fn test_update_above_range_unsuspends_everything() {
        let mut state = RootTimeState::new();
        state.mark_suspended_at_time(t(5));
        state.mark_suspended_at_time(t(10));
        state.mark_updated_at_time(t(10));

        assert_eq!(state.first_pending_time(), t(10));
        assert_eq!(state.first_suspended_time(), NO_WORK);
        assert_eq!(state.last_suspended_time(), NO_WORK);
        assert_eq!(state.next_known_pending_level(), NO_WORK);
    }

    #[test]
    fn test_update_inside_range_narrows_it() {
        let mut state = RootTimeState::new();
        state.mark_suspended_at_time(t(5));
        state.mark_suspended_at_time(t(10));
        state.mark_updated_at_time(t(7));

        assert_eq!(state.first_suspended_time(), t(10));
        assert_eq!(state.last_suspended_time(), t(8));
        assert_eq!(state.next_known_pending_level(), t(7));
        assert!(!state.is_suspended_at_time(t(7)));
        assert!(state.is_suspended_at_time(t(8)));
    }

    #[test]
    fn test_update_below_range_keeps_range() {
        let mut state = RootTimeState::new();
        state.mark_suspended_at_time(t(10));
        state.mark_updated_at_time(t(3));

        assert_eq!(state.first_suspended_time(), t(10));
        assert_eq!(state.last_suspended_time(), t(10));
        assert_eq!(state.next_known_pending_level(), t(3));
        state.mark_updated_at_time(t(2));
        assert_eq!(state.next_known_pending_level(), t(3));
    }

    #[test]
    fn test_suspension_clears_stale_ping_and_expiry() {
        let mut state = RootTimeState::new();
        state.mark_pinged_at_time(t(8));
        state.mark_expired_at_time(t(8));
        state.mark_suspended_at_time(t(9));
        assert_eq!(state.last_pinged_time(), t(8));
        assert_eq!(state.last_expired_time(), t(8));

        state.mark_suspended_at_time(t(8));
        assert_eq!(state.last_pinged_time(), NO_WORK);
        assert_eq!(state.last_expired_time(), NO_WORK);
    }

    #[test]
    fn test_ping_keeps_most_urgent() {
        let mut state = RootTimeState::new();
        state.mark_pinged_at_time(t(4));
        state.mark_pinged_at_time(t(9));
        state.mark_pinged_at_time(t(6));
        assert_eq!(state.last_pinged_time(), t(9));
    }

    #[test]
    fn test_expiry_keeps_least_urgent() {
        let mut state = RootTimeState::new();
        state.mark_expired_at_time(t(9));
        state.mark_expired_at_time(t(4));
        state.mark_expired_at_time(t(6));
        assert_eq!(state.last_expired_time(), t(4));
    }

    #[test]
    fn test_finish_below_range_clears_it() {
        let mut state = RootTimeState::new();
        state.mark_suspended_at_time(t(5));
        state.mark_suspended_at_time(t(10));
        state.mark_finished_at_time(t(5), t(2));

        assert_eq!(state.first_pending_time(), t(2));
        assert_eq!(state.first_suspended_time(), NO_WORK);
        assert_eq!(state.last_suspended_time(), NO_WORK);
    }

    #[test]
    fn test_finish_inside_range_narrows_top() {
        let mut state = RootTimeState::new();
        state.mark_suspended_at_time(t(5));
        state.mark_suspended_at_time(t(10));
        state.mark_finished_at_time(t(7), NO_WORK);

        assert_eq!(state.first_suspended_time(), t(6));
        assert_eq!(state.last_suspended_time(), t(5));
        assert!(state.is_suspended_at_time(t(6)));
        assert!(!state.is_suspended_at_time(t(7)));
    }

    #[test]
    fn test_finish_clears_ping_and_expiry_only_when_covered() {
        let mut state = RootTimeState::new();
        state.mark_pinged_at_time(t(6));
        state.mark_expired_at_time(t(4));
        state.mark_finished_at_time(t(5), NO_WORK);
        assert_eq!(state.last_pinged_time(), NO_WORK);
        assert_eq!(state.last_expired_time(), t(4));

        state.mark_finished_at_time(t(4), NO_WORK);
        assert_eq!(state.last_expired_time(), NO_WORK);
    }

    mod proptest_root_time {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Suspend(u32),
            Update(u32),
            Finish(u32, u32),
            Ping(u32),
            Expire(u32),
        }

        fn arb_op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (1u32..40).prop_map(Op::Suspend),
                (1u32..40).prop_map(Op::Update),
                (1u32..40, 0u32..40).prop_map(|(f, r)| Op::Finish(f, r)),
                (1u32..40).prop_map(Op::Ping),
                (1u32..40).prop_map(Op::Expire),
            ]
        }

        fn apply(state: &mut RootTimeState, op: &Op) {
            match *op {
                Op::Suspend(v) => state.mark_suspended_at_time(t(v)),
                Op::Update(v) => state.mark_updated_at_time(t(v)),
                Op::Finish(f, r) => state.mark_finished_at_time(t(f), t(r)),
                Op::Ping(v) => state.mark_pinged_at_time(t(v)),
                Op::Expire(v) => state.mark_expired_at_time(t(v)),
            }
        }

        proptest! {
            /// The suspended range stays well formed and the predicate agrees with it.
            #[test]
            fn suspended_range_invariant(ops in proptest::collection::vec(arb_op(), 0..60)) {
                let mut state = RootTimeState::new();
                for op in &ops {
                    apply(&mut state, op);

                    let first = state.first_suspended_time();
                    let last = state.last_suspended_time();
                    if first == NO_WORK {
                        prop_assert_eq!(last, NO_WORK);
                    } else {
                        prop_assert!(last <= first, "range inverted after {:?}: {} > {}", op, last, first);
                    }
                    for probe in 0u32..42 {
                        let probe = t(probe);
                        let expected = first != NO_WORK && last <= probe && probe <= first;
                        prop_assert_eq!(state.is_suspended_at_time(probe), expected);
                    }
                }
            }

            /// Finishing clears ping/expiry iff they are at or below the finished time.
            #[test]
            fn finish_clears_ping_and_expiry(
                ops in proptest::collection::vec(arb_op(), 0..30),
                finished in 1u32..40,
                remaining in 0u32..40,
            ) {
                let mut state = RootTimeState::new();
                for op in &ops {
                    apply(&mut state, op);
                }
                let pinged = state.last_pinged_time();
                let expired = state.last_expired_time();
                state.mark_finished_at_time(t(finished), t(remaining));

                let expected_ping = if pinged <= t(finished) { NO_WORK } else { pinged };
                let expected_expiry = if expired <= t(finished) { NO_WORK } else { expired };
                prop_assert_eq!(state.last_pinged_time(), expected_ping);
                prop_assert_eq!(state.last_expired_time(), expected_expiry);
                prop_assert_eq!(state.first_pending_time(), t(remaining));
            }
        }
    }
}
