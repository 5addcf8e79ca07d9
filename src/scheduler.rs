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

//! The scheduler: a slot table of coroutines multiplexed onto one shared
//! execution stack.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, error};

use crate::context::Context;
use crate::coroutine::{Coroutine, Status};
use crate::stack::SharedStack;

/* One scheduler, one execution stack, many coroutines:
 *
 *                        +----------------------+
 *        resume(id)      |     shared stack     |      yield_now()
 *   main context >-------| [ live frames of the |-------> main context
 *                        |    running coroutine]|
 *                        +----------------------+
 *            copy back        ^            |        copy out
 *            on resume        |            v        on yield
 *                        +----------------------+
 *                        | per-coroutine save   |
 *                        | buffer (heap)        |
 *                        +----------------------+
 *
 * Control always bounces through the main context: a running coroutine can
 * only yield back to whoever resumed it, never sideways into another
 * coroutine. While coroutine `id` runs, the shared stack holds its live
 * frames; the frames of every suspended coroutine sit in that coroutine's
 * save buffer, waiting to be copied back to the exact addresses they were
 * saved from.
 */

/// Usable size of the shared execution stack. Bounds the deepest call chain
/// of any single coroutine.
pub const STACK_SIZE: usize = 1024 * 1024;

/// Initial length of the coroutine table; grown by doubling.
const INIT_COROUTINES: usize = 16;

/// Index of a coroutine in its scheduler's table. Stable while the
/// coroutine is alive; reissued to a later spawn once it is dead.
pub type Handle = usize;

/// Return type of resuming.
///
/// `Err` carries the payload of a panic that terminated the coroutine
/// during this resume.
pub type ResumeResult<T> = Result<T, Box<dyn Any + Send>>;

/// A single-threaded asymmetric coroutine scheduler.
///
/// Every coroutine spawned here executes on the scheduler's one shared
/// stack. Yielding copies the live portion of that stack into the
/// coroutine's save buffer; resuming copies it back. A coroutine therefore
/// costs only what it actually keeps live across a yield, not a
/// reserved-worst-case stack.
pub struct Scheduler {
    stack: SharedStack,
    /// The caller's context while a coroutine runs.
    main: Context,
    /// Slot table. A coroutine's handle is its index here.
    co: Vec<Option<Box<Coroutine>>>,
    /// Number of occupied slots.
    nco: usize,
    /// Slot of the coroutine on the shared stack, `None` when the main
    /// context is executing.
    running: Option<Handle>,
    /// Panic payload carried from the entry trampoline to the resumer.
    panic: Option<Box<dyn Any + Send>>,
}

impl Scheduler {
    /// Create a scheduler with an empty table and a freshly mapped shared
    /// stack.
    ///
    /// Boxed, because suspended coroutine frames hold the scheduler's
    /// address: it must not move while any coroutine is alive.
    pub fn new() -> Box<Scheduler> {
        let mut co = Vec::with_capacity(INIT_COROUTINES);
        co.resize_with(INIT_COROUTINES, || None);

        Box::new(Scheduler {
            stack: SharedStack::new(STACK_SIZE),
            main: Context::empty(),
            co,
            nco: 0,
            running: None,
            panic: None,
        })
    }

    /// Create a coroutine in `Ready` state and return its handle. The
    /// function does not run until the first [`resume`](Scheduler::resume).
    pub fn spawn<F>(&mut self, f: F) -> Handle
    where
        F: FnOnce(CoroutineRef) + 'static,
    {
        let co = Coroutine::new(Box::new(f));
        let cap = self.co.len();

        let id = if self.nco >= cap {
            // Table full: double it and take the first fresh slot.
            debug!("growing coroutine table from {} to {}", cap, cap * 2);
            self.co.resize_with(cap * 2, || None);
            self.co[cap] = Some(co);
            cap
        } else {
            // Probe from nco: when the table is nearly full the low indices
            // are the least likely to be vacant. Placement, not correctness.
            let slot = (0..cap)
                .map(|i| (self.nco + i) % cap)
                .find(|&slot| self.co[slot].is_none())
                .expect("occupancy count disagrees with the table");
            self.co[slot] = Some(co);
            slot
        };

        self.nco += 1;
        id
    }

    /// Hand control to coroutine `id` until it yields or terminates.
    ///
    /// Resuming a vacated slot is a no-op: the coroutine already terminated,
    /// and a caller polling by handle is allowed to be late. Resuming while
    /// another coroutine is running, or resuming out of table range, is a
    /// caller bug and panics.
    ///
    /// Returns `Err` with the panic payload if the coroutine panicked
    /// during this resume; the coroutine is dead afterwards either way.
    pub fn resume(&mut self, id: Handle) -> ResumeResult<()> {
        assert!(
            self.running.is_none(),
            "resume requires the main context to be active"
        );
        assert!(id < self.co.len(), "coroutine handle {} out of range", id);

        let status = match self.co[id] {
            Some(ref co) => co.status,
            None => return Ok(()),
        };
        debug!("resuming coroutine {} ({:?})", id, status);

        match status {
            Status::Ready => {
                let sched: *mut Scheduler = self;
                {
                    let co = self.co[id].as_mut().unwrap();
                    co.ctx = Context::new(coroutine_entry, sched as usize, &self.stack);
                    co.status = Status::Running;
                }
                self.running = Some(id);
                self.swap_in(id);
                self.take_panic()
            }
            Status::Suspend => {
                {
                    let co = self.co[id].as_mut().unwrap();
                    // We are on the caller's own stack here, so the write to
                    // the shared stack clobbers nothing live.
                    unsafe { co.restore_stack(self.stack.end()) };
                    co.status = Status::Running;
                }
                self.running = Some(id);
                self.swap_in(id);
                self.take_panic()
            }
            Status::Running | Status::Dead => {
                panic!("coroutine {} cannot be resumed while {:?}", id, status)
            }
        }
    }

    /// Status of the slot behind `id`. A vacated slot reports `Dead`.
    pub fn status(&self, id: Handle) -> Status {
        assert!(id < self.co.len(), "coroutine handle {} out of range", id);
        match self.co[id] {
            Some(ref co) => co.status,
            None => Status::Dead,
        }
    }

    /// Handle of the coroutine currently on the shared stack, or `None`
    /// when the main context is executing.
    pub fn running(&self) -> Option<Handle> {
        self.running
    }

    /// Number of live coroutines.
    pub fn alive(&self) -> usize {
        self.nco
    }

    /// Current length of the coroutine table.
    pub fn capacity(&self) -> usize {
        self.co.len()
    }

    /// Suspend the running coroutine and return to the `resume` call that
    /// entered it.
    fn yield_now(&mut self) {
        let id = self
            .running
            .expect("yield is only legal while a coroutine is running");
        debug!("coroutine {} yielding", id);

        let top = self.stack.end();
        let co: *mut Coroutine = &mut **self.co[id].as_mut().unwrap();
        unsafe {
            (*co).save_stack(top);
            (*co).status = Status::Suspend;
            self.running = None;
            // The switch is entered straight from this frame: everything
            // below it is outside the snapshot and dead once the coroutine
            // resumes.
            Context::swap(&mut (*co).ctx, &self.main);
        }
        // Resumed: the frames above, this one included, are back on the
        // shared stack at their original addresses.
    }

    /// Park the caller in `main` and activate coroutine `id`'s context.
    fn swap_in(&mut self, id: Handle) {
        let main: *mut Context = &mut self.main;
        let ctx: *const Context = &self.co[id].as_ref().unwrap().ctx;
        // The coroutine mutates this scheduler through its own pointer while
        // `main` is parked, so only raw pointers cross the switch.
        unsafe { Context::swap(&mut *main, &*ctx) };
    }

    fn take_panic(&mut self) -> ResumeResult<()> {
        match self.panic.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Unreachable from inside a coroutine: resume holds the scheduler
        // borrowed for the whole activation.
        debug_assert!(self.running.is_none());
    }
}

/// Entry of every coroutine, called by the bootstrap shim on the shared
/// stack with the scheduler's address as its argument.
extern "C" fn coroutine_entry(sched: usize) -> ! {
    let sched = unsafe { &mut *(sched as *mut Scheduler) };
    let id = sched
        .running
        .expect("entered the trampoline with no coroutine scheduled");
    let func = sched.co[id]
        .as_mut()
        .unwrap()
        .func
        .take()
        .expect("coroutine entered twice");

    let this = CoroutineRef {
        sched: sched as *mut Scheduler,
    };
    if let Err(err) = panic::catch_unwind(AssertUnwindSafe(move || func(this))) {
        error!("coroutine {} panicked at '{}'", id, panic_message(&*err));
        sched.panic = Some(err);
    }

    // Terminated, by return or by panic: vacate the slot, then hand the
    // stack back to the main context. Both steps happen while the main
    // context is parked, so no caller observes the half-torn-down state.
    sched.co[id] = None;
    sched.nco -= 1;
    sched.running = None;

    let mut done = Context::empty();
    Context::swap(&mut done, &sched.main);

    unreachable!("a completed coroutine was resumed");
}

fn panic_message(err: &(dyn Any + Send)) -> &str {
    match err.downcast_ref::<&'static str>() {
        Some(s) => s,
        None => match err.downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<Any>",
        },
    }
}

/// The running coroutine's view of its scheduler, passed to the user
/// function. `Copy`, so it can be handed freely down the coroutine's own
/// call chain.
#[derive(Copy, Clone)]
pub struct CoroutineRef {
    sched: *mut Scheduler,
}

impl CoroutineRef {
    /// Suspend the calling coroutine. Returns when the coroutine is next
    /// resumed, with every local intact.
    ///
    /// Panics if called while the main context is executing, which can only
    /// happen if the ref was smuggled out of its coroutine.
    pub fn yield_now(&self) {
        unsafe { (*self.sched).yield_now() }
    }

    /// See [`Scheduler::status`].
    pub fn status(&self, id: Handle) -> Status {
        unsafe { (*self.sched).status(id) }
    }

    /// See [`Scheduler::running`]. From inside a coroutine's user function
    /// this reports the coroutine's own handle.
    pub fn running(&self) -> Option<Handle> {
        unsafe { (*self.sched).running() }
    }
}
