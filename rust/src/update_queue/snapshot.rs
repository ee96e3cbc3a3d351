//! Queue snapshots: the committed queue and its copy-on-write candidate.

use crate::config::EngineConfig;
use crate::expiration::ExpirationTime;
use crate::{log_changes, log_debug};

use super::commit::commit_update_queue;
use super::process::{process_update_queue, ProcessOutcome};
use super::shared::{Serial, SharedQueue, UpdateId};
use super::update::{Callback, StateModel, Update};
use super::QueueError;

/// One snapshot of a stateful node's update queue.
///
/// `base_state` is the state immediately before the first update of
/// `base_queue`. `shared` is aliased by every snapshot of the same queue.
pub struct UpdateQueue<M: StateModel> {
    pub(crate) base_state: M::State,
    pub(crate) base_queue: Option<UpdateId>,
    pub(crate) shared: SharedQueue<M>,
    pub(crate) effects: Vec<Effect<M>>,
}

/// A callback waiting for commit, tagged with the update it came from.
pub(crate) struct Effect<M: StateModel> {
    pub(crate) serial: Serial,
    pub(crate) callback: Callback<M>,
}

impl<M: StateModel> Clone for Effect<M> {
    fn clone(&self) -> Self {
        Self {
            serial: self.serial,
            callback: self.callback.clone(),
        }
    }
}

impl<M: StateModel> UpdateQueue<M> {
    pub fn new(initial_state: M::State) -> Self {
        Self {
            base_state: initial_state,
            base_queue: None,
            shared: SharedQueue::new(),
            effects: Vec::new(),
        }
    }

    pub fn base_state(&self) -> &M::State {
        &self.base_state
    }

    /// Carried-over updates, oldest first.
    pub fn base_updates(&self) -> Vec<Update<M>> {
        self.shared.collect(self.base_queue)
    }

    pub fn shared(&self) -> &SharedQueue<M> {
        &self.shared
    }

    pub fn enqueue(&self, update: Update<M>) {
        self.shared.enqueue(update);
    }

    /// Number of callbacks waiting for commit.
    pub fn pending_effects(&self) -> usize {
        self.effects.len()
    }

    /// Shallow copy: the new snapshot aliases the same shared slot and the
    /// same base list.
    pub(crate) fn clone_for_pass(&self) -> Self {
        Self {
            base_state: self.base_state.clone(),
            base_queue: self.base_queue,
            shared: self.shared.clone(),
            effects: self.effects.clone(),
        }
    }

    /// Release this snapshot's base list unless `other` uses the same one.
    fn release_unshared(&self, other: &Self) {
        if let Some(tail) = self.base_queue {
            if self.base_queue != other.base_queue {
                self.shared.release_ring(tail);
            }
        }
    }
}

/// The committed queue plus, once diverged, the in-progress candidate.
///
/// Until [`QueueSnapshots::diverge`] runs the candidate *is* the committed
/// queue. A candidate can be dropped at any point before commit without
/// losing updates: everything enqueued lives in the shared slot or has been
/// absorbed into the committed base list.
pub struct QueueSnapshots<M: StateModel> {
    committed: UpdateQueue<M>,
    candidate: Option<UpdateQueue<M>>,
}

impl<M: StateModel> QueueSnapshots<M> {
    pub fn new(initial_state: M::State) -> Self {
        Self {
            committed: UpdateQueue::new(initial_state),
            candidate: None,
        }
    }

    /// Handle for enqueueing, usable from inside payload functions.
    pub fn shared(&self) -> SharedQueue<M> {
        self.committed.shared.clone()
    }

    pub fn enqueue(&self, update: Update<M>) {
        self.committed.enqueue(update);
    }

    pub fn committed(&self) -> &UpdateQueue<M> {
        &self.committed
    }

    /// The candidate, or the committed queue if not yet diverged.
    pub fn candidate(&self) -> &UpdateQueue<M> {
        self.candidate.as_ref().unwrap_or(&self.committed)
    }

    pub fn is_diverged(&self) -> bool {
        self.candidate.is_some()
    }

    /// Clone the committed queue into the candidate unless already cloned.
    pub fn diverge(&mut self) -> &mut UpdateQueue<M> {
        self.candidate
            .get_or_insert_with(|| self.committed.clone_for_pass())
    }

    /// Append an update straight to the candidate's base list.
    ///
    /// Used for error-recovery updates produced during a pass. The candidate
    /// list is copied first if it is still shared with the committed queue,
    /// so the committed queue never sees the captured update.
    pub fn enqueue_captured(&mut self, update: Update<M>, config: &EngineConfig) {
        let committed_tail = self.committed.base_queue;
        let candidate = self
            .candidate
            .get_or_insert_with(|| self.committed.clone_for_pass());
        if let Some(tail) = candidate.base_queue {
            if Some(tail) == committed_tail {
                log_debug!(config.verbosity, "Copying shared base list before capture");
                candidate.base_queue = Some(candidate.shared.copy_ring(tail));
            }
        }
        candidate.base_queue = Some(candidate.shared.append(candidate.base_queue, update));
    }

    /// Process the candidate at `target`, diverging first.
    pub fn process(
        &mut self,
        target: ExpirationTime,
        props: &M::Props,
        config: &EngineConfig,
    ) -> Result<ProcessOutcome<M>, QueueError> {
        let candidate = self
            .candidate
            .get_or_insert_with(|| self.committed.clone_for_pass());
        process_update_queue(candidate, Some(&mut self.committed), target, props, config)
    }

    /// Make the candidate the committed queue. Returns whether one existed.
    ///
    /// The old committed base list is released if the candidate no longer
    /// shares it.
    pub fn commit_candidate(&mut self) -> bool {
        match self.candidate.take() {
            Some(candidate) => {
                self.committed.release_unshared(&candidate);
                self.committed = candidate;
                true
            }
            None => false,
        }
    }

    /// Drop the candidate. Returns whether one existed.
    pub fn discard(&mut self, config: &EngineConfig) -> bool {
        let Some(candidate) = self.candidate.take() else {
            return false;
        };
        candidate.release_unshared(&self.committed);
        log_changes!(config.verbosity, "Discarded candidate queue");
        true
    }

    /// Commit the candidate and run its pending callbacks against `context`.
    pub fn commit(
        &mut self,
        context: &mut M::Context,
        config: &EngineConfig,
    ) -> Result<usize, QueueError> {
        self.commit_candidate();
        let ran = commit_update_queue(&mut self.committed, context)?;
        log_changes!(config.verbosity, "Committed queue, ran {} callbacks", ran);
        Ok(ran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update_queue::testing::{letter, logged, Letters, HIGH, LOW};

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn test_diverge_is_idempotent() {
        let mut snapshots = QueueSnapshots::<Letters>::new("s".to_string());
        assert!(!snapshots.is_diverged());
        snapshots.diverge().base_state = "changed".to_string();
        snapshots.diverge();
        assert_eq!(snapshots.candidate().base_state(), "changed");
        assert_eq!(snapshots.committed().base_state(), "s");
    }

    #[test]
    fn test_clone_shares_pending_slot() {
        let mut snapshots = QueueSnapshots::<Letters>::new(String::new());
        snapshots.diverge();
        snapshots.enqueue(letter(HIGH, "a"));
        assert!(snapshots.committed().shared().has_pending());
        assert!(snapshots.candidate().shared().has_pending());
        assert!(snapshots.committed().shared().ptr_eq(snapshots.candidate().shared()));
    }

    #[test]
    fn test_discarded_candidate_loses_nothing() {
        let mut snapshots = QueueSnapshots::<Letters>::new(String::new());
        snapshots.enqueue(letter(HIGH, "a"));
        snapshots.enqueue(letter(LOW, "b"));

        let outcome = snapshots.process(HIGH, &(), &config()).unwrap();
        assert_eq!(outcome.state, "a");
        assert!(snapshots.discard(&config()));

        snapshots.enqueue(letter(LOW, "c"));
        let outcome = snapshots.process(LOW, &(), &config()).unwrap();
        assert_eq!(outcome.state, "abc");
    }

    #[test]
    fn test_committed_absorbs_pending_after_candidate_diverged() {
        let mut snapshots = QueueSnapshots::<Letters>::new(String::new());
        snapshots.enqueue(letter(HIGH, "a"));
        snapshots.process(HIGH, &(), &config()).unwrap();

        // The candidate's base list is now empty and distinct from the committed one.
        snapshots.enqueue(letter(HIGH, "b"));
        let outcome = snapshots.process(HIGH, &(), &config()).unwrap();
        assert_eq!(outcome.state, "ab");

        snapshots.discard(&config());
        let outcome = snapshots.process(HIGH, &(), &config()).unwrap();
        assert_eq!(outcome.state, "ab");
    }

    #[test]
    fn test_commit_promotes_candidate() {
        let mut snapshots = QueueSnapshots::<Letters>::new(String::new());
        snapshots.enqueue(logged(HIGH, "a"));
        snapshots.enqueue(letter(LOW, "b"));
        snapshots.process(HIGH, &(), &config()).unwrap();

        let mut log = Vec::new();
        assert_eq!(snapshots.commit(&mut log, &config()).unwrap(), 1);
        assert_eq!(log, vec!["a".to_string()]);
        assert!(!snapshots.is_diverged());
        assert_eq!(snapshots.committed().base_state(), "a");
        assert_eq!(snapshots.committed().base_updates().len(), 1);
    }

    #[test]
    fn test_captured_update_stays_out_of_committed_queue() {
        let mut snapshots = QueueSnapshots::<Letters>::new(String::new());
        snapshots.enqueue(letter(LOW, "a"));
        snapshots.process(HIGH, &(), &config()).unwrap();
        snapshots.commit(&mut Vec::new(), &config()).unwrap();
        assert_eq!(snapshots.committed().base_updates().len(), 1);

        snapshots.enqueue_captured(letter(ExpirationTime::SYNC, "!"), &config());
        assert_eq!(snapshots.committed().base_updates().len(), 1);
        assert_eq!(snapshots.candidate().base_updates().len(), 2);

        let outcome = snapshots.process(LOW, &(), &config()).unwrap();
        assert_eq!(outcome.state, "a!");
    }

    #[test]
    fn test_starved_update_keeps_arena_bounded() {
        let mut snapshots = QueueSnapshots::<Letters>::new(String::new());
        let shared = snapshots.shared();
        snapshots.enqueue(letter(LOW, "a"));
        for _ in 0..200 {
            snapshots.enqueue(letter(HIGH, "b"));
            snapshots.process(HIGH, &(), &config()).unwrap();
            snapshots.commit(&mut Vec::new(), &config()).unwrap();
        }

        let live = snapshots.committed().base_updates().len();
        assert_eq!(live, 201);
        assert_eq!(shared.live(), live);
        assert!(shared.allocated() <= 2 * live + 2);
    }

    #[test]
    fn test_discard_releases_candidate_nodes() {
        let mut snapshots = QueueSnapshots::<Letters>::new(String::new());
        let shared = snapshots.shared();
        snapshots.enqueue(letter(LOW, "a"));
        snapshots.process(HIGH, &(), &config()).unwrap();
        assert_eq!(shared.live(), 2);

        snapshots.discard(&config());
        assert_eq!(shared.live(), 1);
        let outcome = snapshots.process(LOW, &(), &config()).unwrap();
        assert_eq!(outcome.state, "a");
    }

    #[test]
    fn test_captured_update_on_empty_queue() {
        let mut snapshots = QueueSnapshots::<Letters>::new("x".to_string());
        snapshots.enqueue_captured(letter(HIGH, "y"), &config());
        assert!(snapshots.committed().base_updates().is_empty());
        let outcome = snapshots.process(HIGH, &(), &config()).unwrap();
        assert_eq!(outcome.state, "xy");
    }
}
