//! The merge/rebase walk that applies a queue up to a target priority.
//!
//! Result of a pass does not depend on how work is split: an update applied
//! after an earlier one was skipped is kept in the residual list as a
//! `SYNC` copy, so the next pass replays it after the skipped update in the
//! original order.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::config::EngineConfig;
use crate::expiration::ExpirationTime;
use crate::{log_changes, log_checks, log_debug};

use super::shared::{Residual, SharedQueue, UpdateId};
use super::snapshot::{Effect, UpdateQueue};
use super::update::{Payload, StateModel, Update, UpdateKind};
use super::QueueError;

/// What a pass produced.
pub struct ProcessOutcome<M: StateModel> {
    /// State after applying every sufficient-priority update.
    pub state: M::State,
    /// Most urgent priority among skipped updates, or `NO_WORK`.
    pub remaining: ExpirationTime,
    /// A `ForceRerender` update was applied.
    pub force_rerender: bool,
    /// A `CaptureError` update was applied.
    pub did_capture: bool,
    pub applied: usize,
    pub skipped: usize,
}

impl<M: StateModel> fmt::Debug for ProcessOutcome<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessOutcome")
            .field("state", &self.state)
            .field("remaining", &self.remaining)
            .field("force_rerender", &self.force_rerender)
            .field("did_capture", &self.did_capture)
            .field("applied", &self.applied)
            .field("skipped", &self.skipped)
            .finish()
    }
}

#[derive(Default)]
struct PassFlags {
    force_rerender: bool,
    did_capture: bool,
}

/// Merge the pending list into `queue` and apply it at `target`.
///
/// `alternate` is the other snapshot of the same queue. Whatever pending
/// updates are merged here are recorded in its base list as well, so
/// dropping `queue` afterwards loses nothing.
///
/// The merge is persisted as soon as it happens; it changes where updates
/// live, not which updates the queue holds. `base_state`, the residual base
/// list, and `effects` are written only after the walk completes, so an
/// evaluation failure leaves them untouched.
///
/// A callback is queued at most once between commits: replaying a rebased
/// copy on the same snapshot does not queue its callback again.
///
/// The walk keeps going as long as payloads enqueue new updates. A payload
/// that always enqueues another update never lets the pass finish.
pub(crate) fn process_update_queue<M: StateModel>(
    queue: &mut UpdateQueue<M>,
    mut alternate: Option<&mut UpdateQueue<M>>,
    target: ExpirationTime,
    props: &M::Props,
    config: &EngineConfig,
) -> Result<ProcessOutcome<M>, QueueError> {
    let verbosity = config.verbosity;
    let shared = queue.shared.clone();

    if let Some(pending) = shared.take_pending() {
        log_debug!(verbosity, "  Merging pending updates into base list");
        let tail = absorb_pending(&shared, queue.base_queue, pending, alternate.as_deref_mut());
        queue.base_queue = Some(tail);
    }

    let Some(mut tail) = queue.base_queue else {
        log_changes!(verbosity, "Pass at {}: queue empty", target);
        return Ok(ProcessOutcome {
            state: queue.base_state.clone(),
            remaining: ExpirationTime::NO_WORK,
            force_rerender: false,
            did_capture: false,
            applied: 0,
            skipped: 0,
        });
    };

    let first = shared.next(tail);
    let mut cursor = first;

    let mut new_state = queue.base_state.clone();
    let mut new_base_state: Option<M::State> = None;
    let mut residual: Vec<Residual<M>> = Vec::new();
    let mut effects: Vec<Effect<M>> = queue.effects.clone();
    let mut queued: FxHashSet<_> = effects.iter().map(|effect| effect.serial).collect();
    let mut remaining = ExpirationTime::NO_WORK;
    let mut flags = PassFlags::default();
    let mut applied = 0usize;
    let mut skipped = 0usize;

    loop {
        let (update, serial) = shared.entry(cursor);

        if update.priority < target {
            log_checks!(
                verbosity,
                "  Skip {} update at {} (target {})",
                update.kind.name(),
                update.priority,
                target
            );
            if residual.is_empty() {
                new_base_state = Some(new_state.clone());
            }
            if update.priority > remaining {
                remaining = update.priority;
            }
            residual.push(Residual::Kept(cursor));
            skipped += 1;
        } else {
            log_checks!(
                verbosity,
                "  Apply {} update at {}",
                update.kind.name(),
                update.priority
            );
            if !residual.is_empty() {
                log_debug!(verbosity, "    Rebasing applied update behind skipped ones");
                residual.push(Residual::Rebased(update.rebased(), serial));
            }
            new_state = get_state_from_update(&update, &new_state, props, &mut flags)?;
            if let Some(callback) = update.callback {
                if queued.insert(serial) {
                    effects.push(Effect { serial, callback });
                }
            }
            applied += 1;
        }

        cursor = shared.next(cursor);
        if cursor == first {
            // Payloads may have enqueued more updates while we walked.
            let Some(pending) = shared.take_pending() else {
                break;
            };
            log_debug!(verbosity, "  Merging updates enqueued during the pass");
            let old_tail = tail;
            tail = absorb_pending(&shared, Some(old_tail), pending, alternate.as_deref_mut());
            queue.base_queue = Some(tail);
            cursor = shared.next(old_tail);
        }
    }

    // The ring is rewritten in place unless the other snapshot still uses it.
    let in_place = alternate.map_or(true, |alternate| alternate.base_queue != Some(tail));
    queue.base_state = new_base_state.unwrap_or_else(|| new_state.clone());
    queue.base_queue = shared.rebuild(tail, residual, in_place);
    queue.effects = effects;

    log_changes!(
        verbosity,
        "Pass at {}: applied {}, skipped {}, remaining {}",
        target,
        applied,
        skipped,
        remaining
    );

    Ok(ProcessOutcome {
        state: new_state,
        remaining,
        force_rerender: flags.force_rerender,
        did_capture: flags.did_capture,
        applied,
        skipped,
    })
}

/// Splice `pending` after `tail` and mirror the same updates into `alternate`.
///
/// Snapshots whose base lists have the same tail share the list itself, so
/// the alternate just follows the new tail. Otherwise it gets its own copy.
fn absorb_pending<M: StateModel>(
    shared: &SharedQueue<M>,
    tail: Option<UpdateId>,
    pending: UpdateId,
    alternate: Option<&mut UpdateQueue<M>>,
) -> UpdateId {
    match alternate {
        Some(alternate) if alternate.base_queue == tail => {
            let joined = shared.splice(tail, pending);
            alternate.base_queue = Some(joined);
            joined
        }
        Some(alternate) => {
            let copy = shared.copy_ring(pending);
            alternate.base_queue = Some(shared.splice(alternate.base_queue, copy));
            shared.splice(tail, pending)
        }
        None => shared.splice(tail, pending),
    }
}

fn get_state_from_update<M: StateModel>(
    update: &Update<M>,
    prev: &M::State,
    props: &M::Props,
    flags: &mut PassFlags,
) -> Result<M::State, QueueError> {
    match &update.kind {
        UpdateKind::Replace(payload) => {
            payload.evaluate(prev, props).map_err(QueueError::EvaluationFailure)
        }
        UpdateKind::CaptureError(payload) => {
            flags.did_capture = true;
            merge_partial(payload, prev, props)
        }
        UpdateKind::Set(payload) => merge_partial(payload, prev, props),
        UpdateKind::ForceRerender => {
            flags.force_rerender = true;
            Ok(prev.clone())
        }
    }
}

fn merge_partial<M: StateModel>(
    payload: &Payload<M, Option<M::Partial>>,
    prev: &M::State,
    props: &M::Props,
) -> Result<M::State, QueueError> {
    let partial = payload
        .evaluate(prev, props)
        .map_err(QueueError::EvaluationFailure)?;
    match partial {
        None => Ok(prev.clone()),
        Some(partial) => M::merge(prev, &partial).map_err(QueueError::EvaluationFailure),
    }
}
