//! PyO3 wrappers: the root time tracker, the ping cache, and a queue whose
//! state is a Python dict.
//!
//! Dict queues follow the usual rules: `set` payloads are a mapping, `None`,
//! or a callable `(prev_state, props) -> mapping | None`; `replace` payloads
//! are a state or a callable returning one. Callbacks are called with the
//! commit context. A callback that is not callable is stored as-is and fails
//! the commit with `TypeError`.

use std::cell::RefCell;
use std::fmt;

use pyo3::exceptions::{PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyMapping};

use crate::config::EngineConfig;
use crate::expiration::ExpirationTime;
use crate::ping_cache::PingCache;
use crate::root_time::RootTimeState;
use crate::update_queue::{
    Callback, HookError, Payload, QueueError, QueueSnapshots, SharedQueue, StateModel, Update,
    UpdateKind,
};

/// A Python object held as queue state.
pub struct PyValue(PyObject);

impl Clone for PyValue {
    fn clone(&self) -> Self {
        Python::with_gil(|py| Self(self.0.clone_ref(py)))
    }
}

impl fmt::Debug for PyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Python::with_gil(|py| match self.0.bind(py).repr() {
            Ok(repr) => write!(f, "{}", repr),
            Err(_) => write!(f, "<unrepresentable object>"),
        })
    }
}

fn hook_error(err: PyErr) -> HookError {
    HookError::new(err.to_string())
}

fn describe(py: Python<'_>, obj: &PyObject) -> String {
    obj.bind(py)
        .repr()
        .map(|repr| repr.to_string())
        .unwrap_or_else(|_| "<unrepresentable object>".to_string())
}

/// Dict state; `set` is a shallow `dict.update` over a copy.
pub struct PyDictModel;

impl StateModel for PyDictModel {
    type State = PyValue;
    type Partial = PyValue;
    type Props = PyObject;
    type Context = PyObject;

    fn merge(prev: &PyValue, partial: &PyValue) -> Result<PyValue, HookError> {
        Python::with_gil(|py| {
            let prev = prev
                .0
                .bind(py)
                .downcast::<PyDict>()
                .map_err(|e| HookError::new(e.to_string()))?;
            let partial = partial
                .0
                .bind(py)
                .downcast::<PyMapping>()
                .map_err(|e| HookError::new(e.to_string()))?;
            let merged = prev.copy().map_err(hook_error)?;
            merged.update(partial).map_err(hook_error)?;
            Ok(PyValue(merged.into_any().unbind()))
        })
    }
}

fn partial_payload(
    py: Python<'_>,
    payload: Option<PyObject>,
) -> Payload<PyDictModel, Option<PyValue>> {
    match payload {
        Some(f) if f.bind(py).is_callable() => {
            Payload::function(move |prev: &PyValue, props: &PyObject| {
                Python::with_gil(|py| {
                    let out = f
                        .call1(py, (prev.0.clone_ref(py), props.clone_ref(py)))
                        .map_err(hook_error)?;
                    Ok(if out.is_none(py) { None } else { Some(PyValue(out)) })
                })
            })
        }
        Some(literal) if !literal.is_none(py) => Payload::Literal(Some(PyValue(literal))),
        _ => Payload::Literal(None),
    }
}

fn state_payload(py: Python<'_>, payload: Option<PyObject>) -> Payload<PyDictModel, PyValue> {
    match payload {
        Some(f) if f.bind(py).is_callable() => {
            Payload::function(move |prev: &PyValue, props: &PyObject| {
                Python::with_gil(|py| {
                    f.call1(py, (prev.0.clone_ref(py), props.clone_ref(py)))
                        .map(PyValue)
                        .map_err(hook_error)
                })
            })
        }
        Some(literal) => Payload::Literal(PyValue(literal)),
        None => Payload::Literal(PyValue(py.None())),
    }
}

fn make_callback(py: Python<'_>, callback: PyObject) -> Callback<PyDictModel> {
    if !callback.bind(py).is_callable() {
        return Callback::Uncallable(describe(py, &callback));
    }
    Callback::new(move |context: &mut PyObject| {
        Python::with_gil(|py| {
            callback
                .call1(py, (context.clone_ref(py),))
                .map(|_| ())
                .map_err(hook_error)
        })
    })
}

fn build_update(
    py: Python<'_>,
    priority: u32,
    kind: &str,
    payload: Option<PyObject>,
) -> PyResult<Update<PyDictModel>> {
    let kind = match kind {
        "set" => UpdateKind::Set(partial_payload(py, payload)),
        "replace" => UpdateKind::Replace(state_payload(py, payload)),
        "force" | "force_rerender" => UpdateKind::ForceRerender,
        "capture" | "capture_error" => UpdateKind::CaptureError(partial_payload(py, payload)),
        other => {
            return Err(PyValueError::new_err(format!("Unknown update kind: {}", other)));
        }
    };
    Ok(Update::new(ExpirationTime::new(priority), kind))
}

fn queue_err_to_py(err: QueueError) -> PyErr {
    match err {
        QueueError::InvalidCallback(_) => PyTypeError::new_err(err.to_string()),
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

/// Update queue over dict state (PyO3 wrapper).
///
/// Enqueueing only touches the shared slot, so payload functions may call
/// `enqueue` on the queue that is processing them.
#[pyclass(unsendable, name = "UpdateQueue")]
pub struct PyUpdateQueue {
    shared: SharedQueue<PyDictModel>,
    snapshots: RefCell<QueueSnapshots<PyDictModel>>,
    config: EngineConfig,
}

#[pymethods]
impl PyUpdateQueue {
    #[new]
    #[pyo3(signature = (initial_state, config=None))]
    fn new(initial_state: PyObject, config: Option<EngineConfig>) -> Self {
        let snapshots = QueueSnapshots::new(PyValue(initial_state));
        Self {
            shared: snapshots.shared(),
            snapshots: RefCell::new(snapshots),
            config: config.unwrap_or_default(),
        }
    }

    #[pyo3(signature = (priority, kind="set", payload=None, callback=None))]
    fn enqueue(
        &self,
        py: Python<'_>,
        priority: u32,
        kind: &str,
        payload: Option<PyObject>,
        callback: Option<PyObject>,
    ) -> PyResult<()> {
        let mut update = build_update(py, priority, kind, payload)?;
        if let Some(callback) = callback {
            update = update.with_raw_callback(make_callback(py, callback));
        }
        self.shared.enqueue(update);
        Ok(())
    }

    /// Process at `target`. Returns `(state, remaining, force_rerender)`.
    #[pyo3(signature = (target, props=None))]
    fn process(
        &self,
        py: Python<'_>,
        target: u32,
        props: Option<PyObject>,
    ) -> PyResult<(PyObject, u32, bool)> {
        let props = props.unwrap_or_else(|| py.None());
        let mut snapshots = self
            .snapshots
            .try_borrow_mut()
            .map_err(|_| PyRuntimeError::new_err("UpdateQueue is already being processed"))?;
        let outcome = snapshots
            .process(ExpirationTime::new(target), &props, &self.config)
            .map_err(queue_err_to_py)?;
        Ok((
            outcome.state.0,
            outcome.remaining.value(),
            outcome.force_rerender,
        ))
    }

    /// Commit the candidate and run its callbacks. Returns how many ran.
    #[pyo3(signature = (context=None))]
    fn commit(&self, py: Python<'_>, context: Option<PyObject>) -> PyResult<usize> {
        let mut context = context.unwrap_or_else(|| py.None());
        let mut snapshots = self
            .snapshots
            .try_borrow_mut()
            .map_err(|_| PyRuntimeError::new_err("UpdateQueue is already being processed"))?;
        snapshots
            .commit(&mut context, &self.config)
            .map_err(queue_err_to_py)
    }

    fn discard(&self) -> PyResult<bool> {
        let mut snapshots = self
            .snapshots
            .try_borrow_mut()
            .map_err(|_| PyRuntimeError::new_err("UpdateQueue is already being processed"))?;
        Ok(snapshots.discard(&self.config))
    }

    #[getter]
    fn base_state(&self, py: Python<'_>) -> PyResult<PyObject> {
        let snapshots = self
            .snapshots
            .try_borrow()
            .map_err(|_| PyRuntimeError::new_err("UpdateQueue is already being processed"))?;
        Ok(snapshots.committed().base_state().0.clone_ref(py))
    }

    #[getter]
    fn has_pending(&self) -> bool {
        self.shared.has_pending()
    }

    fn __repr__(&self) -> String {
        format!("UpdateQueue(has_pending={})", self.shared.has_pending())
    }
}

/// Root time tracker (PyO3 wrapper). Times are raw expiration values.
#[pyclass(name = "RootTimes")]
#[derive(Clone, Debug, Default)]
pub struct PyRootTimes {
    inner: RootTimeState,
}

#[pymethods]
impl PyRootTimes {
    #[new]
    fn new() -> Self {
        Self::default()
    }

    fn is_suspended_at_time(&self, time: u32) -> bool {
        self.inner.is_suspended_at_time(ExpirationTime::new(time))
    }

    fn mark_updated_at_time(&mut self, time: u32) {
        self.inner.mark_updated_at_time(ExpirationTime::new(time));
    }

    fn mark_suspended_at_time(&mut self, time: u32) {
        self.inner.mark_suspended_at_time(ExpirationTime::new(time));
    }

    fn mark_pinged_at_time(&mut self, time: u32) {
        self.inner.mark_pinged_at_time(ExpirationTime::new(time));
    }

    fn mark_expired_at_time(&mut self, time: u32) {
        self.inner.mark_expired_at_time(ExpirationTime::new(time));
    }

    fn mark_finished_at_time(&mut self, finished: u32, remaining: u32) {
        self.inner
            .mark_finished_at_time(ExpirationTime::new(finished), ExpirationTime::new(remaining));
    }

    #[getter]
    fn first_pending_time(&self) -> u32 {
        self.inner.first_pending_time().value()
    }

    #[getter]
    fn first_suspended_time(&self) -> u32 {
        self.inner.first_suspended_time().value()
    }

    #[getter]
    fn last_suspended_time(&self) -> u32 {
        self.inner.last_suspended_time().value()
    }

    #[getter]
    fn next_known_pending_level(&self) -> u32 {
        self.inner.next_known_pending_level().value()
    }

    #[getter]
    fn last_pinged_time(&self) -> u32 {
        self.inner.last_pinged_time().value()
    }

    #[getter]
    fn last_expired_time(&self) -> u32 {
        self.inner.last_expired_time().value()
    }

    #[getter]
    fn finished_expiration_time(&self) -> u32 {
        self.inner.finished_expiration_time().value()
    }

    fn __repr__(&self) -> String {
        format!(
            "RootTimes(pending={}, suspended=[{}, {}], pinged={}, expired={})",
            self.inner.first_pending_time(),
            self.inner.last_suspended_time(),
            self.inner.first_suspended_time(),
            self.inner.last_pinged_time(),
            self.inner.last_expired_time()
        )
    }
}

/// Ping cache (PyO3 wrapper).
#[pyclass(name = "PingCache")]
#[derive(Clone, Debug, Default)]
pub struct PyPingCache {
    inner: PingCache,
}

#[pymethods]
impl PyPingCache {
    #[new]
    fn new() -> Self {
        Self::default()
    }

    fn attach(&mut self, wakeable: u64, time: u32) -> bool {
        self.inner.attach(wakeable, ExpirationTime::new(time))
    }

    fn ping(&mut self, wakeable: u64, mut times: PyRefMut<'_, PyRootTimes>) -> Vec<u32> {
        self.inner
            .ping(wakeable, &mut times.inner)
            .into_iter()
            .map(ExpirationTime::value)
            .collect()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }
}
