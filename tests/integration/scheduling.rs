//! End-to-end scheduling scenarios through the public API.

use std::cell::RefCell;
use std::rc::Rc;

use cotask::scheduler::{from_fn, from_iter, value, Callback, Resume, Scheduler, Step};

#[test]
fn mixed_workload_drains() {
    let mut scheduler = Scheduler::new();
    scheduler.spawn(|| from_iter(0..10u32), None);
    scheduler.spawn(|| from_iter("stream of characters".chars()), None);
    scheduler.spawn(|| from_fn(|_| Resume::done()), None);

    scheduler.run();
    assert!(scheduler.is_empty());
}

#[test]
fn pipeline_of_joined_stages() {
    // Three stages: each stage only starts once the previous one finished.
    let order = Rc::new(RefCell::new(Vec::new()));
    let stage = |tag: &'static str, order: Rc<RefCell<Vec<&'static str>>>| {
        move || {
            let order = order.clone();
            let mut remaining = 3u8;
            from_fn(move |_| {
                if remaining > 0 {
                    remaining -= 1;
                    Resume::suspend()
                } else {
                    order.borrow_mut().push(tag);
                    Resume::done()
                }
            })
        }
    };

    let mut scheduler = Scheduler::new();
    let first = scheduler.spawn(stage("first", order.clone()), None);
    let second = scheduler.defer_spawn(stage("second", order.clone()), None);
    let third = scheduler.defer_spawn(stage("third", order.clone()), None);
    scheduler.join(first, second).unwrap();
    scheduler.join(second, third).unwrap();

    scheduler.run();
    assert!(scheduler.is_empty());
    assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
}

#[test]
fn signal_steers_a_polling_task() {
    let mut scheduler = Scheduler::new();
    let result = Rc::new(RefCell::new(None));
    let sink = result.clone();
    let id = scheduler.spawn(
        move || {
            let sink = sink.clone();
            from_fn(move |signal| match signal {
                Some(s) => {
                    *sink.borrow_mut() = cotask::scheduler::downcast::<&str>(&s).copied();
                    Resume::done()
                }
                None => Resume::suspend(),
            })
        },
        None,
    );

    for _ in 0..5 {
        scheduler.step();
    }
    assert!(result.borrow().is_none());

    scheduler.signal(id, value("stop"));
    assert_eq!(scheduler.step(), Step::Ran(id));
    assert_eq!(*result.borrow(), Some("stop"));
    assert!(scheduler.is_empty());
}

#[test]
fn failed_stage_never_fires_callback_but_releases_waiters() {
    let callback_fired = Rc::new(RefCell::new(false));
    let fired = callback_fired.clone();
    let mut scheduler = Scheduler::new();

    let failing = scheduler.spawn(
        || from_fn(|_| Resume::Failed(anyhow::anyhow!("stage exploded"))),
        Some(Callback::unit(move || *fired.borrow_mut() = true)),
    );
    let dependent = scheduler.defer_spawn(|| from_iter(0..1u8), None);
    scheduler.join(failing, dependent).unwrap();

    scheduler.run();
    assert!(scheduler.is_empty(), "dependent ran after the failure");
    assert!(!*callback_fired.borrow());
}
