//! Bridge between the cooperative scheduler and real background threads.
//!
//! Each bridge runs one genuinely blocking function on a real OS thread
//! and exposes its progress to the scheduler as ordinary suspend points,
//! so the scheduling thread is never blocked. Synchronization crosses the
//! thread boundary through exactly two primitives: a completion flag and
//! (for the result-carrying bridges) a thread-safe channel. Everything
//! else stays on the scheduling thread.
//!
//! The background thread is started lazily on the bridge's first step and
//! detached; it can never hold the process open. Its completion flag is
//! raised by a drop guard, so a panicking background function still
//! unblocks the waiting task — only its output will be missing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, warn};

use crate::scheduler::{Coroutine, Resume, TaskValue};

/// Raises the completion flag when dropped, whether the background
/// function returned or panicked.
struct DoneGuard(Arc<AtomicBool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Shared bridge plumbing: lazy thread start, completion flag, deadline.
struct BridgeCore {
    work: Option<Box<dyn FnOnce() + Send>>,
    done: Arc<AtomicBool>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl BridgeCore {
    fn new(work: impl FnOnce() + Send + 'static) -> Self {
        Self {
            work: Some(Box::new(work)),
            done: Arc::new(AtomicBool::new(false)),
            timeout: None,
            deadline: None,
        }
    }

    /// Start the background thread on the first call; later calls no-op.
    fn start(&mut self) {
        let Some(work) = self.work.take() else {
            return;
        };
        self.deadline = self.timeout.map(|t| Instant::now() + t);
        let done = self.done.clone();
        let spawned = thread::Builder::new()
            .name("cotask-bridge".into())
            .spawn(move || {
                let _guard = DoneGuard(done);
                work();
            });
        if let Err(err) = spawned {
            // Surface the failure as an immediately-finished job so the
            // task terminates instead of waiting forever.
            error!("failed to spawn bridge thread: {err}");
            self.done.store(true, Ordering::Release);
        }
    }

    fn finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn timed_out(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Runs a blocking function on a background thread, exposed to the
/// scheduler as an ordinary task body.
///
/// Each step suspends until the completion flag is observed, then invokes
/// the callback (if any) exactly once and completes. If the timeout
/// elapses first, the job is logged as timed out and the thread is
/// abandoned — it still runs to completion but its result is never
/// surfaced.
pub struct AsyncTask {
    core: BridgeCore,
    callback: Option<Box<dyn FnOnce()>>,
    finished: bool,
}

impl AsyncTask {
    /// Bridge the blocking function `work`.
    pub fn new(work: impl FnOnce() + Send + 'static) -> Self {
        Self {
            core: BridgeCore::new(work),
            callback: None,
            finished: false,
        }
    }

    /// Invoke `callback` once when the background thread completes.
    pub fn with_callback(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Give up waiting after `timeout` of scheduled time.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.core.timeout = Some(timeout);
        self
    }
}

impl Coroutine for AsyncTask {
    fn resume(&mut self, _signal: Option<TaskValue>) -> Resume {
        if self.finished {
            return Resume::done();
        }
        self.core.start();
        if self.core.finished() {
            self.finished = true;
            if let Some(callback) = self.callback.take() {
                callback();
            }
            debug!("bridge job completed");
            Resume::done()
        } else if self.core.timed_out() {
            self.finished = true;
            warn!("bridge job timed out, abandoning thread");
            Resume::done()
        } else {
            Resume::suspend()
        }
    }
}

/// [`AsyncTask`] plus a thread-safe result channel.
///
/// The background function receives the [`Sender`] and may push zero or
/// more items incrementally; the completion callback receives the
/// [`Receiver`] for final draining.
pub struct AsyncResultTask<T: Send + 'static> {
    core: BridgeCore,
    rx: Receiver<T>,
    callback: Option<Box<dyn FnOnce(&Receiver<T>)>>,
    finished: bool,
}

impl<T: Send + 'static> AsyncResultTask<T> {
    /// Bridge `work`, handing it the producing end of the result channel.
    pub fn new(work: impl FnOnce(Sender<T>) + Send + 'static) -> Self {
        let (tx, rx) = unbounded();
        Self {
            core: BridgeCore::new(move || work(tx)),
            rx,
            callback: None,
            finished: false,
        }
    }

    /// Adapt a channel-less function: compute one value, push it once.
    pub fn from_value(work: impl FnOnce() -> T + Send + 'static) -> Self {
        Self::new(move |tx| {
            let _ = tx.send(work());
        })
    }

    /// Invoke `callback` with the result channel once the thread completes.
    pub fn with_callback(mut self, callback: impl FnOnce(&Receiver<T>) + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Give up waiting after `timeout` of scheduled time.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.core.timeout = Some(timeout);
        self
    }

    /// Consuming end of the result channel.
    pub fn receiver(&self) -> &Receiver<T> {
        &self.rx
    }
}

impl<T: Send + 'static> Coroutine for AsyncResultTask<T> {
    fn resume(&mut self, _signal: Option<TaskValue>) -> Resume {
        if self.finished {
            return Resume::done();
        }
        self.core.start();
        if self.core.finished() {
            self.finished = true;
            if let Some(callback) = self.callback.take() {
                callback(&self.rx);
            }
            debug!("bridge job completed");
            Resume::done()
        } else if self.core.timed_out() {
            self.finished = true;
            warn!("bridge job timed out, abandoning thread");
            Resume::done()
        } else {
            Resume::suspend()
        }
    }
}

/// [`AsyncResultTask`] with per-step monitoring.
///
/// The monitor callback is invoked with the result channel on *every* step
/// while the background thread is active (and once more on completion,
/// before the final callback), enabling incremental consumption of
/// streamed results entirely from the scheduling thread.
pub struct AsyncPollTask<T: Send + 'static> {
    core: BridgeCore,
    rx: Receiver<T>,
    monitor: Box<dyn FnMut(&Receiver<T>)>,
    callback: Option<Box<dyn FnOnce(&Receiver<T>)>>,
    finished: bool,
}

impl<T: Send + 'static> AsyncPollTask<T> {
    /// Bridge `work`, invoking `monitor` with the result channel each step.
    pub fn new(
        work: impl FnOnce(Sender<T>) + Send + 'static,
        monitor: impl FnMut(&Receiver<T>) + 'static,
    ) -> Self {
        let (tx, rx) = unbounded();
        Self {
            core: BridgeCore::new(move || work(tx)),
            rx,
            monitor: Box::new(monitor),
            callback: None,
            finished: false,
        }
    }

    /// Invoke `callback` with the result channel once the thread completes.
    pub fn with_callback(mut self, callback: impl FnOnce(&Receiver<T>) + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Give up waiting after `timeout` of scheduled time.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.core.timeout = Some(timeout);
        self
    }
}

impl<T: Send + 'static> Coroutine for AsyncPollTask<T> {
    fn resume(&mut self, _signal: Option<TaskValue>) -> Resume {
        if self.finished {
            return Resume::done();
        }
        self.core.start();
        if self.core.finished() {
            self.finished = true;
            // one last look at anything that arrived before the flag
            (self.monitor)(&self.rx);
            if let Some(callback) = self.callback.take() {
                callback(&self.rx);
            }
            debug!("bridge job completed");
            Resume::done()
        } else if self.core.timed_out() {
            self.finished = true;
            warn!("bridge job timed out, abandoning thread");
            Resume::done()
        } else {
            (self.monitor)(&self.rx);
            Resume::suspend()
        }
    }
}
