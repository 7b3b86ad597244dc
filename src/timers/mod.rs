//! Timer values and time-gated task-body combinators.
//!
//! Timers implement non-busy waiting *inside* a task body: construct one,
//! then suspend once per scheduler step while it is still
//! [`active`](DelayTimer::active). Nothing external enforces the deadline;
//! a timed body checks elapsed time at its own suspension points.
//!
//! The [`delay`], [`after`] and [`repeat`] combinators wrap an existing
//! body factory with an initial wait, an absolute-time gate, or bounded /
//! unbounded repetition.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::scheduler::{BoxedCoroutine, Coroutine, Resume, TaskValue};

/// Active from construction until `delay` has elapsed.
///
/// `{ expiry }` is the timer's only state; it is immutable after
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayTimer {
    expiry: Instant,
}

impl DelayTimer {
    /// Start a timer that stays active for `delay`.
    #[inline]
    pub fn new(delay: Duration) -> Self {
        Self {
            expiry: Instant::now() + delay,
        }
    }

    /// Still waiting?
    #[inline]
    pub fn active(&self) -> bool {
        Instant::now() < self.expiry
    }

    /// The absolute expiry time.
    #[inline]
    pub fn expiry(&self) -> Instant {
        self.expiry
    }
}

/// Active until an absolute target time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwaitTimer {
    expiry: Instant,
}

impl AwaitTimer {
    /// A timer that stays active until `target`.
    #[inline]
    pub fn new(target: Instant) -> Self {
        Self { expiry: target }
    }

    /// Still waiting?
    #[inline]
    pub fn active(&self) -> bool {
        Instant::now() < self.expiry
    }

    /// The absolute expiry time.
    #[inline]
    pub fn expiry(&self) -> Instant {
        self.expiry
    }
}

/// How a wrapper coroutine's gate is anchored in time.
#[derive(Debug, Clone, Copy)]
enum Gate {
    /// Relative to the coroutine's first step.
    Relative(Duration),
    /// A fixed point in time.
    Absolute(Instant),
}

impl Gate {
    fn expiry(self) -> Instant {
        match self {
            Gate::Relative(d) => Instant::now() + d,
            Gate::Absolute(t) => t,
        }
    }
}

/// Wrap `body` so it waits `delay_time` before starting.
///
/// The returned factory produces a coroutine that suspends once per step
/// while the delay runs (measured from its first step), then drives the
/// wrapped body to completion, forwarding every value and signal.
pub fn delay<F>(body: F, delay_time: Duration) -> impl FnMut() -> BoxedCoroutine
where
    F: FnMut() -> BoxedCoroutine + 'static,
{
    gated(body, Gate::Relative(delay_time))
}

/// Wrap `body` so it will not start before the absolute `start_time`.
pub fn after<F>(body: F, start_time: Instant) -> impl FnMut() -> BoxedCoroutine
where
    F: FnMut() -> BoxedCoroutine + 'static,
{
    gated(body, Gate::Absolute(start_time))
}

fn gated<F>(body: F, gate: Gate) -> impl FnMut() -> BoxedCoroutine
where
    F: FnMut() -> BoxedCoroutine + 'static,
{
    let body = Rc::new(RefCell::new(body));
    move || {
        Box::new(Gated {
            body: body.clone(),
            gate,
            state: GatedState::Idle,
        })
    }
}

enum GatedState {
    /// Not yet stepped; the gate clock starts on the first step.
    Idle,
    /// Waiting out the gate.
    Waiting(Instant),
    /// Driving the inner body.
    Driving(BoxedCoroutine),
    /// Terminal.
    Finished,
}

struct Gated<F> {
    body: Rc<RefCell<F>>,
    gate: Gate,
    state: GatedState,
}

impl<F> Coroutine for Gated<F>
where
    F: FnMut() -> BoxedCoroutine,
{
    fn resume(&mut self, signal: Option<TaskValue>) -> Resume {
        loop {
            match &mut self.state {
                GatedState::Idle => {
                    self.state = GatedState::Waiting(self.gate.expiry());
                }
                GatedState::Waiting(expiry) => {
                    if Instant::now() < *expiry {
                        return Resume::suspend();
                    }
                    let inner = (self.body.borrow_mut())();
                    self.state = GatedState::Driving(inner);
                }
                GatedState::Driving(inner) => {
                    return match inner.resume(signal) {
                        Resume::Suspended(v) => Resume::Suspended(v),
                        Resume::Completed(v) => {
                            self.state = GatedState::Finished;
                            Resume::Completed(v)
                        }
                        Resume::Failed(e) => {
                            self.state = GatedState::Finished;
                            Resume::Failed(e)
                        }
                    };
                }
                GatedState::Finished => return Resume::done(),
            }
        }
    }
}

/// Wrap `body` with an initial delay and timed repetition.
///
/// After `initial_delay`, each iteration instantiates a fresh body, drives
/// it to completion (forwarding its values and signals), then waits
/// `repeat_delay` before the next iteration. `repeat_count == 0` repeats
/// forever; otherwise the wrapper completes after exactly `repeat_count`
/// iterations, with no trailing wait.
pub fn repeat<F>(
    body: F,
    initial_delay: Duration,
    repeat_delay: Duration,
    repeat_count: usize,
) -> impl FnMut() -> BoxedCoroutine
where
    F: FnMut() -> BoxedCoroutine + 'static,
{
    let body = Rc::new(RefCell::new(body));
    move || {
        Box::new(Repeater {
            body: body.clone(),
            initial_delay,
            repeat_delay,
            remaining: (repeat_count != 0).then_some(repeat_count),
            state: RepeaterState::Idle,
        })
    }
}

enum RepeaterState {
    Idle,
    InitialWait(Instant),
    Running(BoxedCoroutine),
    Pause(Instant),
    Finished,
}

struct Repeater<F> {
    body: Rc<RefCell<F>>,
    initial_delay: Duration,
    repeat_delay: Duration,
    /// Iterations left; `None` means unbounded.
    remaining: Option<usize>,
    state: RepeaterState,
}

impl<F> Repeater<F>
where
    F: FnMut() -> BoxedCoroutine,
{
    fn start_iteration(&mut self) {
        let inner = (self.body.borrow_mut())();
        self.state = RepeaterState::Running(inner);
    }
}

impl<F> Coroutine for Repeater<F>
where
    F: FnMut() -> BoxedCoroutine,
{
    fn resume(&mut self, signal: Option<TaskValue>) -> Resume {
        loop {
            match &mut self.state {
                RepeaterState::Idle => {
                    self.state = RepeaterState::InitialWait(Instant::now() + self.initial_delay);
                }
                RepeaterState::InitialWait(expiry) | RepeaterState::Pause(expiry) => {
                    if Instant::now() < *expiry {
                        return Resume::suspend();
                    }
                    self.start_iteration();
                }
                RepeaterState::Running(inner) => {
                    return match inner.resume(signal) {
                        Resume::Suspended(v) => Resume::Suspended(v),
                        Resume::Completed(v) => {
                            let last = match &mut self.remaining {
                                Some(n) => {
                                    *n -= 1;
                                    *n == 0
                                }
                                None => false,
                            };
                            if last {
                                self.state = RepeaterState::Finished;
                                Resume::Completed(v)
                            } else {
                                self.state =
                                    RepeaterState::Pause(Instant::now() + self.repeat_delay);
                                Resume::Suspended(v)
                            }
                        }
                        Resume::Failed(e) => {
                            self.state = RepeaterState::Finished;
                            Resume::Failed(e)
                        }
                    };
                }
                RepeaterState::Finished => return Resume::done(),
            }
        }
    }
}
