//! Update records: what a queued state mutation carries.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::expiration::ExpirationTime;

use super::QueueError;

/// Error raised by caller-supplied code: payload functions, merges, callbacks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Types a queue is parameterized over.
///
/// `merge` defines the `Set` rule: how a partial state is laid over the
/// previous one. Everything else about a state is opaque to the queue.
pub trait StateModel: 'static {
    type State: Clone + fmt::Debug;
    type Partial: Clone;
    /// Evaluation context handed to function payloads.
    type Props;
    /// Context bound to commit callbacks.
    type Context;

    fn merge(prev: &Self::State, partial: &Self::Partial) -> Result<Self::State, HookError>;
}

type PayloadFn<M, T> =
    Rc<dyn Fn(&<M as StateModel>::State, &<M as StateModel>::Props) -> Result<T, HookError>>;

/// An update payload: either a literal value or a function of
/// `(previous state, props)`.
pub enum Payload<M: StateModel, T> {
    Literal(T),
    Function(PayloadFn<M, T>),
}

impl<M: StateModel, T: Clone> Payload<M, T> {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&M::State, &M::Props) -> Result<T, HookError> + 'static,
    {
        Self::Function(Rc::new(f))
    }

    pub(crate) fn evaluate(&self, prev: &M::State, props: &M::Props) -> Result<T, HookError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Function(f) => f(prev, props),
        }
    }
}

impl<M: StateModel, T: Clone> Clone for Payload<M, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(value) => Self::Literal(value.clone()),
            Self::Function(f) => Self::Function(Rc::clone(f)),
        }
    }
}

/// What an update does to the state when applied.
pub enum UpdateKind<M: StateModel> {
    /// Merge a partial over the previous state; an absent partial is a no-op.
    Set(Payload<M, Option<M::Partial>>),
    /// Replace the state outright.
    Replace(Payload<M, M::State>),
    /// Leave the state alone but mark the pass as productive.
    ForceRerender,
    /// Mark the node as having captured an error, then apply like `Set`.
    CaptureError(Payload<M, Option<M::Partial>>),
}

impl<M: StateModel> UpdateKind<M> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Replace(_) => "replace",
            Self::ForceRerender => "force_rerender",
            Self::CaptureError(_) => "capture_error",
        }
    }
}

impl<M: StateModel> Clone for UpdateKind<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Set(payload) => Self::Set(payload.clone()),
            Self::Replace(payload) => Self::Replace(payload.clone()),
            Self::ForceRerender => Self::ForceRerender,
            Self::CaptureError(payload) => Self::CaptureError(payload.clone()),
        }
    }
}

type CallbackFn<M> = Rc<dyn Fn(&mut <M as StateModel>::Context) -> Result<(), HookError>>;

/// Procedure to run once the pass that applied its update commits.
pub enum Callback<M: StateModel> {
    Procedure(CallbackFn<M>),
    /// A value that cannot be called, described for the error message.
    ///
    /// Only dynamic hosts produce this; invoking it fails with
    /// [`QueueError::InvalidCallback`].
    Uncallable(String),
}

impl<M: StateModel> Callback<M> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut M::Context) -> Result<(), HookError> + 'static,
    {
        Self::Procedure(Rc::new(f))
    }

    pub(crate) fn invoke(&self, context: &mut M::Context) -> Result<(), QueueError> {
        match self {
            Self::Procedure(f) => f(context).map_err(QueueError::CallbackFailure),
            Self::Uncallable(description) => {
                Err(QueueError::InvalidCallback(description.clone()))
            }
        }
    }
}

impl<M: StateModel> Clone for Callback<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Procedure(f) => Self::Procedure(Rc::clone(f)),
            Self::Uncallable(description) => Self::Uncallable(description.clone()),
        }
    }
}

/// A queued state mutation.
pub struct Update<M: StateModel> {
    pub priority: ExpirationTime,
    pub kind: UpdateKind<M>,
    pub callback: Option<Callback<M>>,
}

impl<M: StateModel> Update<M> {
    pub fn new(priority: ExpirationTime, kind: UpdateKind<M>) -> Self {
        Self {
            priority,
            kind,
            callback: None,
        }
    }

    /// Merge a literal partial state.
    pub fn set(priority: ExpirationTime, partial: M::Partial) -> Self {
        Self::new(priority, UpdateKind::Set(Payload::Literal(Some(partial))))
    }

    /// Merge the partial computed from `(previous state, props)`.
    pub fn set_with<F>(priority: ExpirationTime, f: F) -> Self
    where
        F: Fn(&M::State, &M::Props) -> Result<Option<M::Partial>, HookError> + 'static,
    {
        Self::new(priority, UpdateKind::Set(Payload::function(f)))
    }

    pub fn replace(priority: ExpirationTime, state: M::State) -> Self {
        Self::new(priority, UpdateKind::Replace(Payload::Literal(state)))
    }

    pub fn replace_with<F>(priority: ExpirationTime, f: F) -> Self
    where
        F: Fn(&M::State, &M::Props) -> Result<M::State, HookError> + 'static,
    {
        Self::new(priority, UpdateKind::Replace(Payload::function(f)))
    }

    pub fn force_rerender(priority: ExpirationTime) -> Self {
        Self::new(priority, UpdateKind::ForceRerender)
    }

    pub fn capture_error<F>(priority: ExpirationTime, f: F) -> Self
    where
        F: Fn(&M::State, &M::Props) -> Result<Option<M::Partial>, HookError> + 'static,
    {
        Self::new(priority, UpdateKind::CaptureError(Payload::function(f)))
    }

    pub fn with_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut M::Context) -> Result<(), HookError> + 'static,
    {
        self.callback = Some(Callback::new(f));
        self
    }

    pub fn with_raw_callback(mut self, callback: Callback<M>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Copy of this update that can never be skipped again.
    pub(crate) fn rebased(&self) -> Self {
        Self {
            priority: ExpirationTime::SYNC,
            ..self.clone()
        }
    }
}

impl<M: StateModel> Clone for Update<M> {
    fn clone(&self) -> Self {
        Self {
            priority: self.priority,
            kind: self.kind.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<M: StateModel> fmt::Debug for Update<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("priority", &self.priority)
            .field("kind", &self.kind.name())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
