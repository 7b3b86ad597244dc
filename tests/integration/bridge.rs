//! Thread bridges driven through a live scheduler.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use cotask::bridge::{AsyncPollTask, AsyncResultTask, AsyncTask};
use cotask::scheduler::{from_fn, BoxedCoroutine, Resume, Scheduler};

#[test]
fn blocking_work_never_blocks_the_loop() {
    let mut scheduler = Scheduler::new();
    let loop_turns = Rc::new(Cell::new(0u32));

    let turns = loop_turns.clone();
    let spinner = scheduler.spawn(
        move || {
            let turns = turns.clone();
            from_fn(move |_| {
                turns.set(turns.get() + 1);
                Resume::suspend()
            })
        },
        None,
    );
    scheduler.spawn(
        || Box::new(AsyncTask::new(|| thread::sleep(Duration::from_millis(60)))) as BoxedCoroutine,
        None,
    );

    // Drain: the spinner never finishes, so step until the bridge is gone.
    while scheduler.len() > 1 {
        scheduler.step();
    }
    // The loop kept turning while the background thread slept.
    assert!(loop_turns.get() > 10);
    scheduler.kill(spinner);
}

#[test]
fn result_channel_carries_exactly_what_was_pushed() {
    let collected = Rc::new(RefCell::new(Vec::new()));
    let sink = collected.clone();
    let mut scheduler = Scheduler::new();
    scheduler.spawn(
        move || {
            let task = AsyncResultTask::new(|tx| {
                for i in 0..3u32 {
                    thread::sleep(Duration::from_millis(10));
                    tx.send(i).unwrap();
                }
            })
            .with_callback(move |rx| sink.borrow_mut().extend(rx.try_iter()));
            Box::new(task) as BoxedCoroutine
        },
        None,
    );

    scheduler.run();
    assert_eq!(*collected.borrow(), vec![0, 1, 2]);
}

#[test]
fn poll_monitor_sees_items_as_they_arrive() {
    let seen_mid_flight = Rc::new(Cell::new(false));
    let drained = Rc::new(RefCell::new(Vec::new()));
    let observed = seen_mid_flight.clone();
    let sink = drained.clone();

    let mut scheduler = Scheduler::new();
    scheduler.spawn(
        move || {
            let task = AsyncPollTask::new(
                |tx| {
                    for i in 0..3u32 {
                        tx.send(i).unwrap();
                        thread::sleep(Duration::from_millis(15));
                    }
                },
                move |rx| {
                    let mut got: Vec<u32> = rx.try_iter().collect();
                    if !got.is_empty() {
                        // an item was consumed while the producer thread
                        // was still alive
                        observed.set(true);
                    }
                    sink.borrow_mut().append(&mut got);
                },
            );
            Box::new(task) as BoxedCoroutine
        },
        None,
    );

    scheduler.run();
    assert!(seen_mid_flight.get());
    assert_eq!(*drained.borrow(), vec![0, 1, 2]);
}

#[test]
fn timed_out_bridge_ends_the_task_quickly() {
    let mut scheduler = Scheduler::new();
    scheduler.spawn(
        || {
            let task = AsyncTask::new(|| thread::sleep(Duration::from_secs(30)))
                .with_timeout(Duration::from_millis(40));
            Box::new(task) as BoxedCoroutine
        },
        None,
    );

    let started = Instant::now();
    scheduler.run();
    assert!(scheduler.is_empty());
    assert!(started.elapsed() < Duration::from_secs(10));
}
