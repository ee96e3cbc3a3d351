//! Persistent, priority-ordered update queue.
//!
//! Updates are appended to a circular list reachable from a [`SharedQueue`]
//! slot that the committed and candidate snapshots of a queue both hold.
//! Processing merges that list into the snapshot's base list and applies
//! every update at or above a target priority, rebasing the rest so the final
//! state never depends on how work was split across passes.

mod commit;
mod process;
mod shared;
mod snapshot;
mod update;

pub use commit::commit_update_queue;
pub use process::ProcessOutcome;
pub use shared::SharedQueue;
pub use snapshot::{QueueSnapshots, UpdateQueue};
pub use update::{Callback, HookError, Payload, StateModel, Update, UpdateKind};

use thiserror::Error;

/// Errors surfaced by processing and committing a queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Update payload failed to evaluate: {0}")]
    EvaluationFailure(HookError),
    #[error("Commit callback failed: {0}")]
    CallbackFailure(HookError),
    #[error("Invalid argument passed as callback. Expected a function. Instead received: {0}")]
    InvalidCallback(String),
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for queue tests.

    use super::{HookError, StateModel, Update};
    use crate::expiration::ExpirationTime;

    /// State is a string; every `Set` appends its partial.
    pub(crate) struct Letters;

    impl StateModel for Letters {
        type State = String;
        type Partial = String;
        type Props = ();
        type Context = Vec<String>;

        fn merge(prev: &String, partial: &String) -> Result<String, HookError> {
            Ok(format!("{}{}", prev, partial))
        }
    }

    pub(crate) const HIGH: ExpirationTime = ExpirationTime::new(1000);
    pub(crate) const LOW: ExpirationTime = ExpirationTime::new(100);

    pub(crate) fn letter(priority: ExpirationTime, letter: &str) -> Update<Letters> {
        Update::set(priority, letter.to_string())
    }

    /// Update whose callback logs `name` into the commit context.
    pub(crate) fn logged(priority: ExpirationTime, name: &'static str) -> Update<Letters> {
        letter(priority, name).with_callback(move |log: &mut Vec<String>| {
            log.push(name.to_string());
            Ok(())
        })
    }
}
