//! Task wrapper: one resumable computation plus its completion callback.
//!
//! `Task::step` is the scheduler's core reliability contract: it never
//! panics, whatever the body or the callback does. A single malformed task
//! can never crash the stepping loop.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error};

use super::coroutine::{BoxedCoroutine, Resume, TaskValue};

/// Unique task identifier.
///
/// Ids are handed out monotonically and never recycled, even after the task
/// terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Iterator for generating task ids.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    next_id: u64,
}

impl TaskIdGenerator {
    /// Create a new task id generator.
    #[inline]
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Generate the next task id. The first id is 1.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId(self.next_id)
    }
}

/// Completion callback, invoked with the task's final produced value.
///
/// Both arities of the callback contract are covered: [`Callback::new`]
/// receives the final value, [`Callback::unit`] adapts a zero-argument
/// closure to ignore it.
pub struct Callback(Box<dyn FnOnce(Option<TaskValue>)>);

impl Callback {
    /// One-argument form: receives the final produced value.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Option<TaskValue>) + 'static,
    {
        Self(Box::new(f))
    }

    /// Zero-argument form.
    pub fn unit<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self(Box::new(move |_| f()))
    }

    fn invoke(self, value: Option<TaskValue>) {
        (self.0)(value)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

/// A single schedulable unit of cooperative work.
pub struct Task {
    /// Unique task id.
    id: TaskId,
    /// The resumable computation.
    body: BoxedCoroutine,
    /// Last value produced by the body.
    last: Option<TaskValue>,
    /// Terminal error of a failed body.
    failure: Option<anyhow::Error>,
    /// Completion callback, consumed on normal completion.
    callback: Option<Callback>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("has_value", &self.last.is_some())
            .field("failed", &self.failure.is_some())
            .finish()
    }
}

impl Task {
    /// Build a task from a zero-argument body factory and an optional
    /// completion callback. The factory runs immediately.
    pub(crate) fn new<F>(id: TaskId, body: F, callback: Option<Callback>) -> Self
    where
        F: FnOnce() -> BoxedCoroutine,
    {
        Self {
            id,
            body: body(),
            last: None,
            failure: None,
            callback,
        }
    }

    /// Get the task id.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Last value produced by the body, if any.
    #[inline]
    pub fn last_value(&self) -> Option<&TaskValue> {
        self.last.as_ref()
    }

    /// Terminal error of a failed body.
    #[inline]
    pub fn failure(&self) -> Option<&anyhow::Error> {
        self.failure.as_ref()
    }

    /// Whether the body has failed.
    #[inline]
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Advance the body by one step, injecting `signal` if one is pending.
    ///
    /// Returns `true` while the task is still alive. Normal completion runs
    /// the callback with the final value; a body failure is logged, stored
    /// as the terminal state, and does *not* run the callback. This call
    /// never panics.
    pub(crate) fn step(&mut self, signal: Option<TaskValue>) -> bool {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.body.resume(signal)))
            .unwrap_or_else(|payload| {
                Resume::Failed(anyhow::anyhow!(
                    "task body panicked: {}",
                    panic_message(payload.as_ref())
                ))
            });

        match outcome {
            Resume::Suspended(value) => {
                self.last = value;
                true
            }
            Resume::Completed(value) => {
                self.last = value;
                if let Some(callback) = self.callback.take() {
                    let final_value = self.last.clone();
                    let id = self.id;
                    if catch_unwind(AssertUnwindSafe(move || callback.invoke(final_value)))
                        .is_err()
                    {
                        error!("completion callback for {id} panicked");
                    }
                }
                debug!("{} completed", self.id);
                false
            }
            Resume::Failed(err) => {
                // {:?} on anyhow prints the whole error chain
                error!("{} failed: {:?}", self.id, err);
                self.failure = Some(err);
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
