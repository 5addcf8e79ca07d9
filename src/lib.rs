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

//! Shared-stack asymmetric coroutines.
//!
//! A [`Scheduler`] owns one 1 MiB execution stack and a table of
//! coroutines that take turns running on it. When a coroutine yields, the
//! live portion of the stack is copied into that coroutine's private save
//! buffer; when it is resumed, the bytes are copied back to the exact
//! addresses they came from and execution continues after the yield. A
//! suspended coroutine therefore costs only as much memory as it actually
//! keeps live, instead of a reserved worst-case stack.
//!
//! Scheduling is cooperative and strictly asymmetric: control moves from
//! the main context into a coroutine on [`resume`](Scheduler::resume) and
//! back on [`yield_now`](CoroutineRef::yield_now) or on return of the user
//! function, never from one coroutine directly into another. One scheduler
//! belongs to one thread; several schedulers can coexist, each with its own
//! stack.
//!
//! ```rust
//! use costack::{Scheduler, Status};
//!
//! let mut sched = Scheduler::new();
//!
//! let co = sched.spawn(|c| {
//!     println!("first half");
//!     c.yield_now();
//!     println!("second half");
//! });
//!
//! sched.resume(co).unwrap();
//! assert_eq!(sched.status(co), Status::Suspend);
//!
//! sched.resume(co).unwrap();
//! assert_eq!(sched.status(co), Status::Dead);
//! ```

pub use crate::coroutine::Status;
pub use crate::scheduler::{CoroutineRef, Handle, ResumeResult, Scheduler, STACK_SIZE};

mod context;
mod coroutine;
mod scheduler;
mod stack;

#[cfg(test)]
mod tests;
