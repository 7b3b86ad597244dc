//! Resumable computations.
//!
//! Rust has no stable generator facility, so a task body is an explicit
//! state machine: a [`Coroutine`] that the scheduler drives one [`resume`]
//! at a time, injecting a pending signal and receiving either the next
//! suspended value or a termination outcome.
//!
//! [`resume`]: Coroutine::resume

use std::any::Any;
use std::sync::Arc;

/// Dynamic value produced by task bodies and carried by signals.
pub type TaskValue = Arc<dyn Any + Send + Sync>;

/// Boxed task body.
pub type BoxedCoroutine = Box<dyn Coroutine>;

/// Outcome of resuming a coroutine by one step.
pub enum Resume {
    /// The body suspended again, optionally producing a value.
    Suspended(Option<TaskValue>),
    /// The body finished normally with its final value.
    Completed(Option<TaskValue>),
    /// The body failed; the error becomes the task's terminal state.
    Failed(anyhow::Error),
}

impl Resume {
    /// Suspend without producing a value.
    #[inline]
    pub fn suspend() -> Self {
        Resume::Suspended(None)
    }

    /// Suspend, producing `v`.
    #[inline]
    pub fn suspend_with<T: Any + Send + Sync>(v: T) -> Self {
        Resume::Suspended(Some(Arc::new(v)))
    }

    /// Complete without a final value.
    #[inline]
    pub fn done() -> Self {
        Resume::Completed(None)
    }

    /// Complete with final value `v`.
    #[inline]
    pub fn done_with<T: Any + Send + Sync>(v: T) -> Self {
        Resume::Completed(Some(Arc::new(v)))
    }
}

/// A resumable unit of cooperative work.
///
/// The scheduler calls [`resume`](Coroutine::resume) once per time slice.
/// `signal` carries the pending mailbox message, if any; it is consumed by
/// this call whether or not the body looks at it.
pub trait Coroutine {
    /// Advance by one step.
    fn resume(&mut self, signal: Option<TaskValue>) -> Resume;
}

/// Box a concrete value as a [`TaskValue`].
#[inline]
pub fn value<T: Any + Send + Sync>(v: T) -> TaskValue {
    Arc::new(v)
}

/// Downcast a [`TaskValue`] back to a concrete type.
#[inline]
pub fn downcast<T: Any + Send + Sync>(v: &TaskValue) -> Option<&T> {
    v.downcast_ref()
}

/// Coroutine from a closure driven once per step.
///
/// The closure owns whatever state the body needs; each call is one time
/// slice and returns the step's [`Resume`] outcome.
pub fn from_fn<F>(f: F) -> BoxedCoroutine
where
    F: FnMut(Option<TaskValue>) -> Resume + 'static,
{
    Box::new(FnCoroutine(f))
}

struct FnCoroutine<F>(F);

impl<F> Coroutine for FnCoroutine<F>
where
    F: FnMut(Option<TaskValue>) -> Resume,
{
    fn resume(&mut self, signal: Option<TaskValue>) -> Resume {
        (self.0)(signal)
    }
}

/// Coroutine yielding each iterator item as one suspended value.
///
/// The iterator's end is normal completion (with no final value).
pub fn from_iter<I>(iter: I) -> BoxedCoroutine
where
    I: IntoIterator + 'static,
    I::IntoIter: 'static,
    I::Item: Any + Send + Sync,
{
    Box::new(IterCoroutine(iter.into_iter()))
}

struct IterCoroutine<I>(I);

impl<I> Coroutine for IterCoroutine<I>
where
    I: Iterator,
    I::Item: Any + Send + Sync,
{
    fn resume(&mut self, _signal: Option<TaskValue>) -> Resume {
        match self.0.next() {
            Some(v) => Resume::Suspended(Some(Arc::new(v))),
            None => Resume::Completed(None),
        }
    }
}

/// Coroutine that completes on its first step with final value `v`.
pub fn done_with<T: Any + Send + Sync>(v: T) -> BoxedCoroutine {
    Box::new(DoneCoroutine(Some(Arc::new(v))))
}

struct DoneCoroutine(Option<TaskValue>);

impl Coroutine for DoneCoroutine {
    fn resume(&mut self, _signal: Option<TaskValue>) -> Resume {
        Resume::Completed(self.0.take())
    }
}
