//! Expiry, restart, and retry behavior of `Tlist::service`.
use core::cell::Cell;

use crate::harness::*;

#[test]
fn one_shot_fires_once() {
    let log = Log::default();
    let (p1, p2, p3) = (Probe::new("t1", &log), Probe::new("t2", &log), Probe::new("t3", &log));
    let now = Cell::new(0u8);
    let mut list: List<_, 4> = Tlist::with_handler(Counter::new(|| now.get()), Unwind);
    let t1 = add(&mut list, &p1);
    let t2 = add(&mut list, &p2);
    let t3 = add(&mut list, &p3);
    list.set(t3, 50, TimerKind::OneShot);
    list.arm(t1, 10, TimerKind::OneShot);
    list.arm(t2, 10, TimerKind::OneShot);

    service_after(&mut list, &now, 10);
    service_after(&mut list, &now, 10);

    assert_eq!(*log.borrow(), ["t1", "t2"]);
    assert!(!list.is_active(t1));
    assert!(!list.is_active(t2));
    assert!(!list.is_active(t3));
    assert!(list.is_empty());
}

#[test]
fn ascending_periods_fire_in_order() {
    let log = Log::default();
    let (p1, p2, p3) = (Probe::new("t1", &log), Probe::new("t2", &log), Probe::new("t3", &log));
    let now = Cell::new(0u16);
    let mut list: List<_, 3> = Tlist::with_handler(Counter::new(|| now.get()), Unwind);
    let t3 = add(&mut list, &p3);
    let t1 = add(&mut list, &p1);
    let t2 = add(&mut list, &p2);
    list.arm(t3, 50, TimerKind::OneShot);
    list.arm(t2, 15, TimerKind::OneShot);
    list.arm(t1, 10, TimerKind::OneShot);

    service_after(&mut list, &now, 50);
    assert_eq!(*log.borrow(), ["t1", "t2", "t3"]);

    service_after(&mut list, &now, 50);
    assert_eq!(*log.borrow(), ["t1", "t2", "t3"]);
}

#[test]
fn one_shot_across_u8_wraparound() {
    let log = Log::default();
    let p1 = Probe::new("t1", &log);
    let now = Cell::new(u8::MAX);
    let mut list: List<_, 1> = Tlist::with_handler(Counter::new(|| now.get()), Unwind);
    let t1 = add(&mut list, &p1);
    list.arm(t1, 10, TimerKind::OneShot);

    now.set_ticks(8);
    list.service();
    assert_eq!(p1.fires.get(), 0);
    assert_eq!(list.remaining(t1), Some(1));

    now.set_ticks(9);
    list.service();
    list.service();
    assert_eq!(p1.fires.get(), 1);
}

#[test]
fn periodic_keeps_firing() {
    let log = Log::default();
    let (p1, p2, p3) = (Probe::new("t1", &log), Probe::new("t2", &log), Probe::new("t3", &log));
    let now = Cell::new(0u8);
    let mut list: List<_, 4> = Tlist::with_handler(Counter::new(|| now.get()), Unwind);
    let t1 = add(&mut list, &p1);
    let t2 = add(&mut list, &p2);
    let t3 = add(&mut list, &p3);
    list.arm(t1, 10, TimerKind::Periodic);
    list.arm(t2, 20, TimerKind::Periodic);
    list.arm(t3, 100, TimerKind::Periodic);

    for _ in 0..4 {
        service_after(&mut list, &now, 10);
    }

    assert_eq!(p1.fires.get(), 4);
    assert_eq!(p2.fires.get(), 2);
    assert_eq!(p3.fires.get(), 0);
    assert_eq!(list.remaining(t3), Some(60));
}

#[test]
fn one_shot_and_periodic_expiry_order() {
    let log = Log::default();
    let probes = [
        Probe::new("t1", &log),
        Probe::new("t2", &log),
        Probe::new("t3", &log),
        Probe::new("t4", &log),
        Probe::new("t5", &log),
    ];
    let now = Cell::new(0u8);
    let mut list: List<_, 5> = Tlist::with_handler(Counter::new(|| now.get()), Unwind);
    let ids: Vec<_> = probes.iter().map(|p| add(&mut list, p)).collect();
    list.arm(ids[0], 10, TimerKind::OneShot);
    list.arm(ids[1], 11, TimerKind::Periodic);
    list.arm(ids[2], 15, TimerKind::Periodic);
    list.arm(ids[3], 32, TimerKind::OneShot);

    // t1 expires; t2 = 1 left, t3 = 5 left, t4 = 22 left
    service_after(&mut list, &now, 10);
    // t2 and t3 expire; t4 = 12 left
    service_after(&mut list, &now, 10);
    // t2 = 1 left, t3 = 5 left, t4 = 2 left
    service_after(&mut list, &now, 10);
    list.arm(ids[4], 10, TimerKind::OneShot);
    // t2, t4, t3, t5 expire
    service_after(&mut list, &now, 10);
    // t2 and t3 expire
    service_after(&mut list, &now, 40);

    assert_eq!(
        *log.borrow(),
        ["t1", "t2", "t3", "t2", "t4", "t3", "t5", "t2", "t3"]
    );
}

#[test]
fn one_shot_retries_until_handled() {
    let log = Log::default();
    let p1 = Probe::new("t1", &log);
    let now = Cell::new(0u8);
    let mut list: List<_, 1> = Tlist::with_handler(Counter::new(|| now.get()), Unwind);
    let t1 = add(&mut list, &p1);
    p1.handled.set(false);
    list.arm(t1, 10, TimerKind::OneShot);

    service_after(&mut list, &now, 10);
    for _ in 0..3 {
        service_after(&mut list, &now, 0);
    }
    assert_eq!(p1.fires.get(), 4);
    assert!(list.is_active(t1));
    assert_eq!(list.remaining(t1), Some(0));

    p1.handled.set(true);
    service_after(&mut list, &now, 0);
    service_after(&mut list, &now, 0);
    service_after(&mut list, &now, 0);

    assert_eq!(p1.fires.get(), 5);
    assert!(!list.is_active(t1));
}

#[test]
fn periodic_retries_then_restarts() {
    let log = Log::default();
    let p1 = Probe::new("t1", &log);
    let now = Cell::new(0u8);
    let mut list: List<_, 1> = Tlist::with_handler(Counter::new(|| now.get()), Unwind);
    let t1 = add(&mut list, &p1);
    p1.handled.set(false);
    list.arm(t1, 10, TimerKind::Periodic);

    service_after(&mut list, &now, 10);
    for _ in 0..3 {
        service_after(&mut list, &now, 0);
    }
    assert_eq!(p1.fires.get(), 4);

    p1.handled.set(true);
    service_after(&mut list, &now, 0);
    assert_eq!(p1.fires.get(), 5);
    assert_eq!(list.remaining(t1), Some(10));

    service_after(&mut list, &now, 5);
    service_after(&mut list, &now, 5);
    service_after(&mut list, &now, 5);
    service_after(&mut list, &now, 5);

    assert_eq!(p1.fires.get(), 7);
}

#[test]
fn failed_timer_does_not_block_others() {
    let log = Log::default();
    let (p1, p2) = (Probe::new("t1", &log), Probe::new("t2", &log));
    let now = Cell::new(0u8);
    let mut list: List<_, 2> = Tlist::with_handler(Counter::new(|| now.get()), Unwind);
    let t1 = add(&mut list, &p1);
    let t2 = add(&mut list, &p2);
    p1.handled.set(false);
    list.arm(t1, 5, TimerKind::OneShot);
    list.arm(t2, 8, TimerKind::OneShot);

    service_after(&mut list, &now, 10);
    assert_eq!(*log.borrow(), ["t1", "t2"]);

    service_after(&mut list, &now, 1);
    assert_eq!(*log.borrow(), ["t1", "t2", "t1"]);
    assert!(list.is_active(t1));
    assert!(!list.is_active(t2));
}

#[test]
fn tick_wraparound() {
    let log = Log::default();
    let (p1, p2) = (Probe::new("t1", &log), Probe::new("t2", &log));
    let now = Cell::new(255u8);
    let mut list: List<_, 2> = Tlist::with_handler(Counter::new(|| now.get()), Unwind);
    let t1 = add(&mut list, &p1);
    let t2 = add(&mut list, &p2);
    list.arm(t1, 10, TimerKind::Periodic);
    list.arm(t2, 20, TimerKind::OneShot);

    // 255 -> 9
    service_after(&mut list, &now, 10);
    assert_eq!(*log.borrow(), ["t1"]);
    assert_eq!(list.remaining(t2), Some(10));

    // Both expire at 19; t2 was queued first
    service_after(&mut list, &now, 10);
    assert_eq!(*log.borrow(), ["t1", "t2", "t1"]);
}

#[test]
fn late_service_from_now() {
    let log = Log::default();
    let p1 = Probe::new("t1", &log);
    let now = Cell::new(0u16);
    let mut list: List<_, 1> = Tlist::with_handler(Counter::new(|| now.get()), Unwind);
    assert_eq!(list.reschedule(), Reschedule::FromNow);
    let t1 = add(&mut list, &p1);
    list.arm(t1, 10, TimerKind::Periodic);

    service_after(&mut list, &now, 35);
    assert_eq!(p1.fires.get(), 1);
    assert_eq!(list.remaining(t1), Some(10));
}

#[test]
fn late_service_from_deadline_catches_up() {
    let log = Log::default();
    let p1 = Probe::new("t1", &log);
    let now = Cell::new(0u16);
    let mut list: List<_, 1> = Tlist::with_handler(Counter::new(|| now.get()), Unwind)
        .with_reschedule(Reschedule::FromDeadline);
    let t1 = add(&mut list, &p1);
    list.arm(t1, 10, TimerKind::Periodic);

    // Deadlines at 10, 20, and 30 have passed
    service_after(&mut list, &now, 35);
    assert_eq!(p1.fires.get(), 3);
    assert_eq!(list.remaining(t1), Some(5));

    service_after(&mut list, &now, 5);
    assert_eq!(p1.fires.get(), 4);
    assert_eq!(list.remaining(t1), Some(10));
}

#[test]
fn catch_up_keeps_deadline_order() {
    let log = Log::default();
    let (p, r) = (Probe::new("p", &log), Probe::new("r", &log));
    let now = Cell::new(0u8);
    let mut list: List<_, 2> = Tlist::with_handler(Counter::new(|| now.get()), Unwind)
        .with_reschedule(Reschedule::FromDeadline);
    let tp = add(&mut list, &p);
    let tr = add(&mut list, &r);
    list.arm(tp, 10, TimerKind::Periodic);
    list.arm(tr, 25, TimerKind::OneShot);

    // Deadlines: p at 10, 20, 30 and r at 25
    service_after(&mut list, &now, 35);
    assert_eq!(*log.borrow(), ["p", "p", "r", "p"]);
    assert_eq!(order(&list), ["p"]);
    assert_eq!(list.remaining(tp), Some(5));
}

#[test]
fn catch_up_behind_failed_timer() {
    let log = Log::default();
    let (p, r) = (Probe::new("p", &log), Probe::new("r", &log));
    r.handled.set(false);
    let now = Cell::new(0u8);
    let mut list: List<_, 2> = Tlist::with_handler(Counter::new(|| now.get()), Unwind)
        .with_reschedule(Reschedule::FromDeadline);
    let tp = add(&mut list, &p);
    let tr = add(&mut list, &r);
    list.arm(tr, 5, TimerKind::OneShot);
    list.arm(tp, 10, TimerKind::Periodic);

    service_after(&mut list, &now, 5);
    assert_eq!(*log.borrow(), ["r"]);

    // r is retried first, then p catches up on 10, 20, and 30
    service_after(&mut list, &now, 30);
    assert_eq!(*log.borrow(), ["r", "r", "p", "p", "p"]);
    assert_eq!(order(&list), ["r", "p"]);
    assert_eq!(list.remaining(tr), Some(0));
    assert_eq!(list.remaining(tp), Some(5));
}

#[test]
fn from_deadline_across_wraparound() {
    let log = Log::default();
    let p1 = Probe::new("t1", &log);
    let now = Cell::new(250u8);
    let mut list: List<_, 1> = Tlist::with_handler(Counter::new(|| now.get()), Unwind)
        .with_reschedule(Reschedule::FromDeadline);
    let t1 = add(&mut list, &p1);
    list.arm(t1, 4, TimerKind::Periodic);

    // Deadlines at 254 and 2 have passed; the next one is at 6
    service_after(&mut list, &now, 9);
    assert_eq!(p1.fires.get(), 2);
    assert_eq!(list.remaining(t1), Some(3));
}
