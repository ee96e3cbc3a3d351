//! Priority-ordered, deterministic update scheduling for tree reconciliation.
//!
//! For a work root this crate decides which pending state updates are
//! applied during a priority pass, guarantees no update is dropped across
//! repeated, restarted, or abandoned passes, and tracks the root's pending,
//! suspended, pinged, and expired priority ranges for an external scheduler.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::prelude::*;

mod config;
pub mod expiration;
pub mod logging;
pub mod ping_cache;
pub mod priority;
mod python;
pub mod root;
pub mod root_time;
pub mod update_queue;

pub use config::EngineConfig;
pub use expiration::{ExpirationTime, RootTag, MAX_SIGNED_31_BIT_INT};
pub use ping_cache::{PingCache, WakeableId};
pub use priority::PriorityLevel;
pub use python::{PyDictModel, PyValue};
pub use root::WorkRoot;
pub use root_time::RootTimeState;
pub use update_queue::{
    commit_update_queue, Callback, HookError, Payload, ProcessOutcome, QueueError, QueueSnapshots,
    SharedQueue, StateModel, Update, UpdateKind, UpdateQueue,
};

/// The fiberq.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Config
    m.add_class::<EngineConfig>()?;

    // Root tracking
    m.add_class::<python::PyRootTimes>()?;
    m.add_class::<python::PyPingCache>()?;

    // Queues
    m.add_class::<python::PyUpdateQueue>()?;

    m.add("NO_WORK", ExpirationTime::NO_WORK.value())?;
    m.add("NEVER", ExpirationTime::NEVER.value())?;
    m.add("IDLE", ExpirationTime::IDLE.value())?;
    m.add("BATCHED", ExpirationTime::BATCHED.value())?;
    m.add("SYNC", ExpirationTime::SYNC.value())?;

    Ok(())
}
