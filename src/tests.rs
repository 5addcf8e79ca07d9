// The MIT License (MIT)

// Copyright (c) 2015 Rustcc Developers

//  Permission is hereby granted, free of charge, to any person obtaining a
//  copy of this software and associated documentation files (the "Software"),
//  to deal in the Software without restriction, including without limitation
//  the rights to use, copy, modify, merge, publish, distribute, sublicense,
//  and/or sell copies of the Software, and to permit persons to whom the
//  Software is furnished to do so, subject to the following conditions:
//
//  The above copyright notice and this permission notice shall be included in
//  all copies or substantial portions of the Software.
//
//  THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
//  OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//  FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//  AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//  LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
//  FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
//  DEALINGS IN THE SOFTWARE.

use std::rc::Rc;
use std::sync::mpsc::channel;

use crate::{CoroutineRef, Scheduler, Status};

#[test]
fn test_interleave() {
    let (tx, rx) = channel();
    let mut sched = Scheduler::new();

    let mut handles = Vec::new();
    for name in ["A", "B"] {
        let tx = tx.clone();
        handles.push(sched.spawn(move |c| {
            for round in 1..=3 {
                tx.send(format!("{}{}", name, round)).unwrap();
                if round < 3 {
                    c.yield_now();
                }
            }
        }));
    }

    for _ in 0..3 {
        for &h in &handles {
            sched.resume(h).unwrap();
        }
    }

    let order: Vec<String> = rx.try_iter().collect();
    assert_eq!(order, ["A1", "B1", "A2", "B2", "A3", "B3"]);

    assert_eq!(sched.alive(), 0);
    for &h in &handles {
        assert_eq!(sched.status(h), Status::Dead);
    }
}

// Every frame of a 100-deep chain writes sentinels into a local array, the
// innermost frame yields, and the sentinels are checked while the chain
// unwinds after the resume. Exercises the byte-exact stack restore.
#[test]
fn test_stack_depth_preserved() {
    fn dive(c: CoroutineRef, depth: usize) -> u64 {
        let mut frame = [0u64; 8];
        for (i, slot) in frame.iter_mut().enumerate() {
            *slot = (depth * 31 + i) as u64;
        }

        let below = if depth == 0 {
            c.yield_now();
            0
        } else {
            dive(c, depth - 1)
        };

        let mut sum = below;
        for (i, slot) in frame.iter().enumerate() {
            assert_eq!(*slot, (depth * 31 + i) as u64);
            sum += *slot;
        }
        sum
    }

    let (tx, rx) = channel();
    let mut sched = Scheduler::new();
    let co = sched.spawn(move |c| {
        tx.send(dive(c, 100)).unwrap();
    });

    sched.resume(co).unwrap();
    assert_eq!(sched.status(co), Status::Suspend);

    sched.resume(co).unwrap();
    let expected: u64 = (0..=100u64)
        .map(|depth| (0..8u64).map(|i| depth * 31 + i).sum::<u64>())
        .sum();
    assert_eq!(rx.recv().unwrap(), expected);
    assert_eq!(sched.status(co), Status::Dead);
}

#[test]
fn test_locals_survive_yield() {
    let (tx, rx) = channel();
    let mut sched = Scheduler::new();
    let co = sched.spawn(move |c| {
        let word = 0x5eed_u64;
        let owned = vec![1, 2, 3];
        c.yield_now();
        tx.send((word, owned.iter().sum::<i32>())).unwrap();
    });

    sched.resume(co).unwrap();
    sched.resume(co).unwrap();
    assert_eq!(rx.recv().unwrap(), (0x5eed, 6));
}

#[test]
fn test_table_growth() {
    let mut sched = Scheduler::new();
    assert_eq!(sched.capacity(), 16);

    let handles: Vec<_> = (0..17).map(|_| sched.spawn(|_| {})).collect();
    assert_eq!(sched.capacity(), 32);
    assert_eq!(sched.alive(), 17);

    // Handles must cover 0..17, though not necessarily in spawn order.
    let mut sorted = handles.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..17).collect::<Vec<_>>());

    for &h in &handles {
        sched.resume(h).unwrap();
        assert_eq!(sched.status(h), Status::Dead);
    }
    assert_eq!(sched.alive(), 0);
}

#[test]
fn test_handle_reuse() {
    let mut sched = Scheduler::new();

    let a = sched.spawn(|_| {});
    assert_eq!(a, 0);
    sched.resume(a).unwrap();
    assert_eq!(sched.status(a), Status::Dead);

    // The vacated slot is the first probe candidate again.
    let b = sched.spawn(|_| {});
    assert_eq!(b, 0);
}

#[test]
fn test_self_interrogation() {
    let (tx, rx) = channel();
    let mut sched = Scheduler::new();
    let co = sched.spawn(move |c| {
        let me = c.running().expect("a running coroutine sees itself");
        tx.send((me, c.status(me))).unwrap();
    });

    sched.resume(co).unwrap();
    assert_eq!(rx.recv().unwrap(), (co, Status::Running));
    assert_eq!(sched.running(), None);
}

#[test]
fn test_status_is_idempotent() {
    let mut sched = Scheduler::new();
    let co = sched.spawn(|c| c.yield_now());

    for _ in 0..3 {
        assert_eq!(sched.status(co), Status::Ready);
    }
    sched.resume(co).unwrap();
    for _ in 0..3 {
        assert_eq!(sched.status(co), Status::Suspend);
    }
    sched.resume(co).unwrap();
    for _ in 0..3 {
        assert_eq!(sched.status(co), Status::Dead);
    }
}

#[test]
fn test_resume_vacated_slot_is_noop() {
    let mut sched = Scheduler::new();
    let co = sched.spawn(|_| {});
    sched.resume(co).unwrap();
    assert_eq!(sched.status(co), Status::Dead);

    // A late caller polling a stale handle gets a quiet pass.
    assert!(sched.resume(co).is_ok());
    assert_eq!(sched.alive(), 0);
}

#[test]
fn test_coroutine_panic() {
    let mut sched = Scheduler::new();
    let co = sched.spawn(|_| panic!("Panic inside a coroutine!!"));

    let err = sched.resume(co).unwrap_err();
    assert_eq!(
        err.downcast_ref::<&str>(),
        Some(&"Panic inside a coroutine!!")
    );

    // A panic tears the coroutine down like a normal return.
    assert_eq!(sched.status(co), Status::Dead);
    assert_eq!(sched.alive(), 0);

    // The scheduler stays usable.
    let next = sched.spawn(|_| {});
    sched.resume(next).unwrap();
}

#[test]
fn test_drop_with_suspended_coroutine() {
    let mut sched = Scheduler::new();
    let co = sched.spawn(|c| c.yield_now());
    sched.resume(co).unwrap();
    assert_eq!(sched.status(co), Status::Suspend);

    // Suspended state is abandoned, not unwound.
    drop(sched);
}

#[test]
fn test_unstarted_closure_dropped_with_scheduler() {
    let token = Rc::new(());
    let held = token.clone();

    let mut sched = Scheduler::new();
    sched.spawn(move |_| {
        let _keep = held;
    });
    assert_eq!(Rc::strong_count(&token), 2);

    // A Ready closure never moved onto the shared stack, so dropping the
    // scheduler drops it normally.
    drop(sched);
    assert_eq!(Rc::strong_count(&token), 1);
}

#[test]
fn test_schedulers_are_independent() {
    let (tx, rx) = channel();
    let mut left = Scheduler::new();
    let mut right = Scheduler::new();

    let tx_l = tx.clone();
    let l = left.spawn(move |c| {
        tx_l.send("l1").unwrap();
        c.yield_now();
        tx_l.send("l2").unwrap();
    });
    let r = right.spawn(move |c| {
        tx.send("r1").unwrap();
        c.yield_now();
        tx.send("r2").unwrap();
    });

    left.resume(l).unwrap();
    right.resume(r).unwrap();
    assert_eq!(left.running(), None);
    assert_eq!(right.running(), None);
    left.resume(l).unwrap();
    right.resume(r).unwrap();

    let order: Vec<&str> = rx.try_iter().collect();
    assert_eq!(order, ["l1", "r1", "l2", "r2"]);
}
