//! Cooperative round-robin task scheduler.
//!
//! The scheduler owns four containers: the registry of live tasks (the
//! single source of truth for liveness), the ready rotation, a per-task
//! signal mailbox, and the join-dependency graph. An external host driver
//! calls [`Scheduler::step`] periodically (e.g. from an idle or per-frame
//! callback), or [`Scheduler::run`] to drain synchronously.
//!
//! # Architecture
//!
//! - [`Coroutine`] / [`Resume`] - the resumable-computation abstraction
//! - [`Task`] - wraps one computation, isolating its failures
//! - [`TaskId`] / [`TaskIdGenerator`] - unique, never-recycled task ids
//! - [`Scheduler`] - registry, rotation, mailbox and join graph
//! - [`SchedulerError`] - errors for the scheduler's own fallible calls

pub mod coroutine;
pub mod task;

pub use coroutine::{
    done_with, downcast, from_fn, from_iter, value, BoxedCoroutine, Coroutine, Resume, TaskValue,
};
pub use task::{Callback, Task, TaskId, TaskIdGenerator};

use std::collections::{HashMap, VecDeque};
use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

/// Scheduler result.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Referenced task id is not registered (never spawned, finished, or
    /// killed — terminated tasks are no longer joinable).
    #[error("No active task: {0}")]
    UnknownTask(TaskId),

    /// A task cannot wait on its own completion.
    #[error("{0} cannot join itself")]
    SelfJoin(TaskId),
}

/// Outcome of one scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A task received one time slice.
    Ran(TaskId),
    /// Live tasks exist but every one of them is join-blocked; stepping
    /// again without killing a blocker will not make progress.
    Idle,
    /// No live tasks remain.
    Empty,
}

/// Cooperative round-robin scheduler.
///
/// One instance encapsulates all scheduling state, so independent
/// schedulers can coexist and be tested in isolation. Every method is
/// called from the single scheduling thread; nothing here needs locking.
#[derive(Default)]
pub struct Scheduler {
    /// Live tasks; the single source of truth for "is this task alive".
    registry: HashMap<TaskId, Task>,
    /// Rotation of tasks eligible for their next step, strict FIFO.
    ready: VecDeque<TaskId>,
    /// Pending signals, at most one per task (last write wins).
    signals: HashMap<TaskId, TaskValue>,
    /// Join graph: blocker -> dependents waiting on it.
    waiters: HashMap<TaskId, Vec<TaskId>>,
    /// Join graph: dependent -> blockers it still waits for.
    blockers: HashMap<TaskId, Vec<TaskId>>,
    /// Task id source.
    ids: TaskIdGenerator,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.registry.len())
            .field("ready", &self.ready.len())
            .field("signals", &self.signals.len())
            .field("blocked", &self.blockers.len())
            .finish()
    }
}

impl Scheduler {
    /// Create an empty scheduler.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task for `body` and place it at the tail of the
    /// ready rotation. Returns the id of the new task.
    pub fn spawn<F>(&mut self, body: F, callback: Option<Callback>) -> TaskId
    where
        F: FnOnce() -> BoxedCoroutine,
    {
        let id = self.insert(body, callback);
        self.ready.push_back(id);
        debug!("spawned {id}");
        id
    }

    /// Register a new task for `body` *without* making it runnable.
    ///
    /// The task stays off the rotation until a [`join`](Self::join)
    /// dependency recorded for it resolves. Use this to create a task that
    /// must not start before the tasks it waits on have finished.
    pub fn defer_spawn<F>(&mut self, body: F, callback: Option<Callback>) -> TaskId
    where
        F: FnOnce() -> BoxedCoroutine,
    {
        let id = self.insert(body, callback);
        debug!("deferred {id}");
        id
    }

    fn insert<F>(&mut self, body: F, callback: Option<Callback>) -> TaskId
    where
        F: FnOnce() -> BoxedCoroutine,
    {
        let id = self.ids.next();
        self.registry.insert(id, Task::new(id, body, callback));
        id
    }

    /// Remove a task from the scheduler.
    ///
    /// Every dependent waiting (in part) on it loses this blocker; a
    /// dependent whose blocker list drains to empty is admitted into the
    /// ready rotation. Returns the removed task, or `None` if the id was
    /// unknown — repeated kills are no-ops.
    pub fn kill(&mut self, id: TaskId) -> Option<Task> {
        let removed = self.registry.remove(&id)?;
        self.unlink(id);
        Some(removed)
    }

    /// Drop all bookkeeping for a task that just left the registry and
    /// release any dependents it was blocking.
    fn unlink(&mut self, id: TaskId) {
        self.signals.remove(&id);

        // The task may itself have been waiting on others.
        if let Some(blocking) = self.blockers.remove(&id) {
            for blocker in blocking {
                if let Some(deps) = self.waiters.get_mut(&blocker) {
                    deps.retain(|d| *d != id);
                    if deps.is_empty() {
                        self.waiters.remove(&blocker);
                    }
                }
            }
        }

        let Some(dependents) = self.waiters.remove(&id) else {
            return;
        };
        for dep in dependents {
            let freed = match self.blockers.get_mut(&dep) {
                Some(list) => {
                    list.retain(|b| *b != id);
                    list.is_empty()
                }
                None => false,
            };
            if freed {
                self.blockers.remove(&dep);
                if self.registry.contains_key(&dep) && !self.ready.contains(&dep) {
                    debug!("{dep} released, was waiting on {id}");
                    self.ready.push_back(dep);
                }
            }
        }
    }

    /// Record that `dependent` may not run until `blocker` completes.
    ///
    /// Both ids must refer to live tasks; a finished or killed task is no
    /// longer joinable and yields [`SchedulerError::UnknownTask`]. The
    /// dependent is pulled out of the ready rotation while it has blockers.
    /// Returns the dependent's current blocker list.
    pub fn join(&mut self, blocker: TaskId, dependent: TaskId) -> SchedulerResult<Vec<TaskId>> {
        if blocker == dependent {
            return Err(SchedulerError::SelfJoin(blocker));
        }
        if !self.registry.contains_key(&blocker) {
            return Err(SchedulerError::UnknownTask(blocker));
        }
        if !self.registry.contains_key(&dependent) {
            return Err(SchedulerError::UnknownTask(dependent));
        }

        let waiting = self.waiters.entry(blocker).or_default();
        if !waiting.contains(&dependent) {
            waiting.push(dependent);
        }

        // Invariant: a task with blockers never sits in the rotation.
        self.ready.retain(|t| *t != dependent);

        let list = self.blockers.entry(dependent).or_default();
        if !list.contains(&blocker) {
            list.push(blocker);
        }
        Ok(list.clone())
    }

    /// Queue `message` for delivery on the task's next step.
    ///
    /// A new signal overwrites an undelivered one; unknown ids are ignored.
    pub fn signal(&mut self, id: TaskId, message: TaskValue) {
        if self.registry.contains_key(&id) {
            self.signals.insert(id, message);
        }
    }

    /// Execute one time slice.
    ///
    /// Pops the first still-registered task off the rotation, delivers and
    /// clears its pending signal, and steps it. A task that stays alive
    /// moves to the tail of the rotation; a finished task is removed with
    /// full join-graph resolution. Rotation entries for tasks killed
    /// out-of-band are discarded while searching for a live head.
    pub fn step(&mut self) -> Step {
        if self.registry.is_empty() {
            return Step::Empty;
        }
        let (id, mut task) = loop {
            match self.ready.pop_front() {
                Some(id) => {
                    if let Some(task) = self.registry.remove(&id) {
                        break (id, task);
                    }
                    // stale entry, task was killed out-of-band
                }
                None => return Step::Idle,
            }
        };

        let signal = self.signals.remove(&id);
        if task.step(signal) {
            self.registry.insert(id, task);
            self.ready.push_back(id);
        } else {
            self.unlink(id);
        }
        Step::Ran(id)
    }

    /// Step until no live tasks remain.
    ///
    /// A convenience driver for contexts with no external host loop.
    /// Stops (with a warning) if every remaining task is join-blocked,
    /// rather than spinning forever. Returns the number of time slices
    /// executed.
    pub fn run(&mut self) -> usize {
        let mut slices = 0;
        loop {
            match self.step() {
                Step::Ran(_) => slices += 1,
                Step::Idle => {
                    warn!(
                        "scheduler stalled: {} task(s) blocked on unfinished joins",
                        self.registry.len()
                    );
                    break;
                }
                Step::Empty => break,
            }
        }
        slices
    }

    /// Clear the registry, rotation, mailbox and join graph in place.
    ///
    /// Task ids keep increasing across a reset; they are never recycled.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.ready.clear();
        self.signals.clear();
        self.waiters.clear();
        self.blockers.clear();
    }

    /// Read-only snapshot of the live tasks, ordered by id.
    pub fn list_jobs(&self) -> Vec<(TaskId, &Task)> {
        let mut jobs: Vec<_> = self.registry.iter().map(|(id, t)| (*id, t)).collect();
        jobs.sort_by_key(|(id, _)| *id);
        jobs
    }

    /// Read-only snapshot of the join graph (blocker -> dependents),
    /// ordered by blocker id.
    pub fn list_waiting(&self) -> Vec<(TaskId, &[TaskId])> {
        let mut waiting: Vec<_> = self
            .waiters
            .iter()
            .map(|(id, deps)| (*id, deps.as_slice()))
            .collect();
        waiting.sort_by_key(|(id, _)| *id);
        waiting
    }

    /// Number of live tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether no live tasks remain.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Whether the task is registered.
    #[inline]
    pub fn contains(&self, id: TaskId) -> bool {
        self.registry.contains_key(&id)
    }

    /// Whether the task currently sits in the ready rotation.
    #[inline]
    pub fn is_ready(&self, id: TaskId) -> bool {
        self.ready.contains(&id)
    }
}

#[cfg(test)]
mod tests;
