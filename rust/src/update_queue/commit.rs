//! Running callbacks of a committed queue.

use super::snapshot::UpdateQueue;
use super::update::StateModel;
use super::QueueError;

/// Run every pending callback of `queue`, in order, against `context`.
///
/// The effect list is emptied before any callback runs, so a retried commit
/// never re-invokes a callback that already ran or failed. If a callback
/// fails, the ones after it are put back for the next commit and the error
/// is returned. Returns the number of callbacks that ran successfully.
pub fn commit_update_queue<M: StateModel>(
    queue: &mut UpdateQueue<M>,
    context: &mut M::Context,
) -> Result<usize, QueueError> {
    let effects = std::mem::take(&mut queue.effects);
    for (index, effect) in effects.iter().enumerate() {
        if let Err(err) = effect.callback.invoke(context) {
            queue.effects = effects[index + 1..].to_vec();
            return Err(err);
        }
    }
    Ok(effects.len())
}
