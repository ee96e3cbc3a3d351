//! Work root: a root's timing state paired with its update queue.
//!
//! This is the surface an external reconciliation driver uses. It keeps the
//! tracker in step with the queue: scheduling marks the root updated, a
//! completed pass records the finished time, and committing tells the
//! tracker what remains.

use crate::config::EngineConfig;
use crate::expiration::ExpirationTime;
use crate::ping_cache::{PingCache, WakeableId};
use crate::root_time::RootTimeState;
use crate::update_queue::{
    ProcessOutcome, QueueError, QueueSnapshots, SharedQueue, StateModel, Update,
};
use crate::{log_changes, log_checks};

/// A top-level stateful entity and its scheduling metadata.
pub struct WorkRoot<M: StateModel> {
    config: EngineConfig,
    times: RootTimeState,
    ping_cache: PingCache,
    queue: QueueSnapshots<M>,
    /// State of the last committed pass.
    committed_state: M::State,
    /// Result of the finished, not yet committed pass.
    finished: Option<Finished<M>>,
}

struct Finished<M: StateModel> {
    state: M::State,
    remaining: ExpirationTime,
}

impl<M: StateModel> WorkRoot<M> {
    pub fn new(initial_state: M::State, config: EngineConfig) -> Self {
        Self {
            config,
            times: RootTimeState::new(),
            ping_cache: PingCache::new(),
            queue: QueueSnapshots::new(initial_state.clone()),
            committed_state: initial_state,
            finished: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn times(&self) -> &RootTimeState {
        &self.times
    }

    pub fn queue(&self) -> &QueueSnapshots<M> {
        &self.queue
    }

    pub fn committed_state(&self) -> &M::State {
        &self.committed_state
    }

    /// Handle for enqueueing from inside payload functions.
    ///
    /// Updates enqueued through it do not touch the root's pending range;
    /// use [`WorkRoot::schedule_update`] from outside a pass.
    pub fn shared(&self) -> SharedQueue<M> {
        self.queue.shared()
    }

    /// Enqueue `update` and record its priority as pending.
    pub fn schedule_update(&mut self, update: Update<M>) {
        let priority = update.priority;
        self.queue.enqueue(update);
        self.times.mark_updated_at_time(priority);
        log_checks!(self.config.verbosity, "Scheduled update at {}", priority);
    }

    /// Run a pass at `target`, starting from the committed queue.
    ///
    /// Any earlier uncommitted pass is abandoned first. On success the root
    /// holds the pass as finished until [`WorkRoot::commit`].
    pub fn render(
        &mut self,
        target: ExpirationTime,
        props: &M::Props,
    ) -> Result<ProcessOutcome<M>, QueueError> {
        self.abandon();
        let outcome = self.queue.process(target, props, &self.config)?;
        self.times.set_finished_expiration_time(target);
        self.finished = Some(Finished {
            state: outcome.state.clone(),
            remaining: outcome.remaining,
        });
        Ok(outcome)
    }

    /// Drop the in-progress pass, if any.
    pub fn abandon(&mut self) {
        self.finished = None;
        self.times.set_finished_expiration_time(ExpirationTime::NO_WORK);
        self.queue.discard(&self.config);
    }

    /// Commit the finished pass and run its callbacks against `context`.
    ///
    /// Returns `Ok(false)` if no pass was finished. The queue is promoted and
    /// the tracker updated before callbacks run, so a failing callback does
    /// not undo the commit. Updates scheduled after the pass finished still
    /// count as remaining work.
    pub fn commit(&mut self, context: &mut M::Context) -> Result<bool, QueueError> {
        let Some(finished) = self.finished.take() else {
            return Ok(false);
        };
        let finished_time = self.times.finished_expiration_time();
        let remaining = finished.remaining.max(self.queue.shared().pending_priority());
        self.times.set_finished_expiration_time(ExpirationTime::NO_WORK);
        self.times.mark_finished_at_time(finished_time, remaining);
        self.committed_state = finished.state;
        log_changes!(
            self.config.verbosity,
            "Root committed at {}, remaining {}",
            finished_time,
            remaining
        );
        self.queue.commit(context, &self.config)?;
        Ok(true)
    }

    /// Work at `time` is blocked on `wakeable`.
    ///
    /// Returns `true` if the caller should subscribe to the dependency.
    pub fn suspend(&mut self, time: ExpirationTime, wakeable: WakeableId) -> bool {
        self.times.mark_suspended_at_time(time);
        self.ping_cache.attach(wakeable, time)
    }

    /// `wakeable` resolved; returns the times that were pinged.
    pub fn ping(&mut self, wakeable: WakeableId) -> Vec<ExpirationTime> {
        self.ping_cache.ping(wakeable, &mut self.times)
    }

    pub fn expire(&mut self, time: ExpirationTime) {
        self.times.mark_expired_at_time(time);
    }

    pub fn is_suspended_at_time(&self, time: ExpirationTime) -> bool {
        self.times.is_suspended_at_time(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update_queue::testing::{letter, logged, Letters, HIGH, LOW};

    fn root() -> WorkRoot<Letters> {
        WorkRoot::new(String::new(), EngineConfig::default())
    }

    #[test]
    fn test_schedule_marks_pending() {
        let mut root = root();
        root.schedule_update(letter(LOW, "a"));
        root.schedule_update(letter(HIGH, "b"));
        assert_eq!(root.times().first_pending_time(), HIGH);
    }

    #[test]
    fn test_render_commit_cycle() {
        let mut root = root();
        root.schedule_update(logged(HIGH, "a"));
        root.schedule_update(logged(LOW, "b"));

        let outcome = root.render(HIGH, &()).unwrap();
        assert_eq!(outcome.state, "a");
        assert_eq!(root.times().finished_expiration_time(), HIGH);

        let mut log = Vec::new();
        assert!(root.commit(&mut log).unwrap());
        assert_eq!(root.committed_state(), "a");
        assert_eq!(root.times().first_pending_time(), LOW);
        assert_eq!(root.times().finished_expiration_time(), ExpirationTime::NO_WORK);
        assert_eq!(log, vec!["a"]);

        root.render(LOW, &()).unwrap();
        root.commit(&mut log).unwrap();
        assert_eq!(root.committed_state(), "ab");
        assert_eq!(root.times().first_pending_time(), ExpirationTime::NO_WORK);
        assert_eq!(log, vec!["a", "b"]);
    }

    #[test]
    fn test_update_scheduled_after_render_stays_pending() {
        let mut root = root();
        root.schedule_update(letter(HIGH, "a"));
        root.render(HIGH, &()).unwrap();
        root.schedule_update(letter(LOW, "b"));

        root.commit(&mut Vec::new()).unwrap();
        assert_eq!(root.committed_state(), "a");
        assert_eq!(root.times().first_pending_time(), LOW);

        root.render(LOW, &()).unwrap();
        root.commit(&mut Vec::new()).unwrap();
        assert_eq!(root.committed_state(), "ab");
        assert_eq!(root.times().first_pending_time(), ExpirationTime::NO_WORK);
    }

    #[test]
    fn test_commit_without_render_is_noop() {
        let mut root = root();
        assert!(!root.commit(&mut Vec::new()).unwrap());
    }

    #[test]
    fn test_rerender_restarts_from_committed() {
        let mut root = root();
        root.schedule_update(letter(HIGH, "a"));
        root.schedule_update(letter(LOW, "b"));

        assert_eq!(root.render(HIGH, &()).unwrap().state, "a");
        assert_eq!(root.render(LOW, &()).unwrap().state, "ab");
        root.commit(&mut Vec::new()).unwrap();
        assert_eq!(root.committed_state(), "ab");
    }

    #[test]
    fn test_abandon_keeps_updates() {
        let mut root = root();
        root.schedule_update(letter(HIGH, "a"));
        root.render(HIGH, &()).unwrap();
        root.abandon();
        assert!(!root.commit(&mut Vec::new()).unwrap());

        assert_eq!(root.render(HIGH, &()).unwrap().state, "a");
    }

    #[test]
    fn test_suspend_ping_finish() {
        let mut root = root();
        root.schedule_update(letter(LOW, "a"));
        assert!(root.suspend(LOW, 1));
        assert!(!root.suspend(LOW, 1));
        assert!(root.is_suspended_at_time(LOW));

        assert_eq!(root.ping(1), vec![LOW]);
        assert_eq!(root.times().last_pinged_time(), LOW);

        root.render(LOW, &()).unwrap();
        root.commit(&mut Vec::new()).unwrap();
        assert!(!root.is_suspended_at_time(LOW));
        assert_eq!(root.times().last_pinged_time(), ExpirationTime::NO_WORK);
    }

    #[test]
    fn test_expire_then_finish_clears() {
        let mut root = root();
        root.schedule_update(letter(LOW, "a"));
        root.expire(LOW);
        assert_eq!(root.times().last_expired_time(), LOW);

        root.render(LOW, &()).unwrap();
        root.commit(&mut Vec::new()).unwrap();
        assert_eq!(root.times().last_expired_time(), ExpirationTime::NO_WORK);
    }
}
