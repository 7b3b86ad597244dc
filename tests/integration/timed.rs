//! Timers driven through a live scheduler.
//!
//! Timing assertions use generous slack: lower bounds are exact (a timer
//! can never fire early), upper bounds are loose.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use cotask::scheduler::{from_fn, Resume, Scheduler};
use cotask::timers::{after, delay, repeat, DelayTimer};

/// Body factory that records an `Instant` when it completes (on its first
/// step).
fn stamper(stamps: Rc<RefCell<Vec<Instant>>>) -> impl FnMut() -> cotask::scheduler::BoxedCoroutine
{
    move || {
        let stamps = stamps.clone();
        from_fn(move |_| {
            stamps.borrow_mut().push(Instant::now());
            Resume::done()
        })
    }
}

#[test]
fn delay_timer_used_inline() {
    // The canonical idiom: construct a timer, suspend while it is active.
    let mut scheduler = Scheduler::new();
    let finished_at = Rc::new(RefCell::new(None));
    let sink = finished_at.clone();
    scheduler.spawn(
        move || {
            let sink = sink.clone();
            let waiting = DelayTimer::new(Duration::from_millis(50));
            from_fn(move |_| {
                if waiting.active() {
                    Resume::suspend()
                } else {
                    *sink.borrow_mut() = Some(Instant::now());
                    Resume::done()
                }
            })
        },
        None,
    );

    let started = Instant::now();
    scheduler.run();
    let finished = finished_at.borrow().expect("task finished");
    assert!(finished - started >= Duration::from_millis(50));
}

#[test]
fn delayed_body_starts_late() {
    let stamps = Rc::new(RefCell::new(Vec::new()));
    let mut scheduler = Scheduler::new();
    scheduler.spawn(delay(stamper(stamps.clone()), Duration::from_millis(40)), None);

    let started = Instant::now();
    scheduler.run();
    assert_eq!(stamps.borrow().len(), 1);
    assert!(stamps.borrow()[0] - started >= Duration::from_millis(40));
}

#[test]
fn after_gates_on_absolute_time() {
    let stamps = Rc::new(RefCell::new(Vec::new()));
    let target = Instant::now() + Duration::from_millis(40);
    let mut scheduler = Scheduler::new();
    scheduler.spawn(after(stamper(stamps.clone()), target), None);

    scheduler.run();
    assert_eq!(stamps.borrow().len(), 1);
    assert!(stamps.borrow()[0] >= target);
}

#[test]
fn repeat_three_times_with_spacing() {
    let stamps = Rc::new(RefCell::new(Vec::new()));
    let mut scheduler = Scheduler::new();
    scheduler.spawn(
        repeat(
            stamper(stamps.clone()),
            Duration::ZERO,
            Duration::from_millis(50),
            3,
        ),
        None,
    );

    scheduler.run();
    assert!(scheduler.is_empty());

    let stamps = stamps.borrow();
    assert_eq!(stamps.len(), 3, "body must run exactly three times");
    for pair in stamps.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(50));
    }
}

#[test]
fn unbounded_repeat_keeps_going_until_killed() {
    let stamps = Rc::new(RefCell::new(Vec::new()));
    let mut scheduler = Scheduler::new();
    let id = scheduler.spawn(
        repeat(
            stamper(stamps.clone()),
            Duration::ZERO,
            Duration::ZERO,
            0,
        ),
        None,
    );

    for _ in 0..10 {
        scheduler.step();
    }
    assert!(stamps.borrow().len() >= 4, "repetition must be unbounded");
    scheduler.kill(id);
    assert!(scheduler.is_empty());
}
