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

//! Per-coroutine state: the record the scheduler keeps in each table slot,
//! and the public `Status` a slot reports.

use std::ptr;

use crate::context::Context;
use crate::scheduler::{CoroutineRef, STACK_SIZE};

/// Status of a coroutine slot.
///
/// The discriminant values are part of the public contract.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    /// Ran to completion and its slot was vacated, or the slot never held a
    /// coroutine. A handle reporting `Dead` may be reissued by a later
    /// spawn.
    Dead = 0,

    /// Created but never resumed. No stack contents exist yet.
    Ready = 1,

    /// Currently executing on the shared stack.
    Running = 2,

    /// Yielded. The live portion of the shared stack at the moment of the
    /// yield is parked in the save buffer.
    Suspend = 3,
}

/// One live coroutine. Owned by its table slot; the slot is vacated when the
/// user function returns.
pub(crate) struct Coroutine {
    /// The user function. Taken by the entry trampoline on first resume.
    pub(crate) func: Option<Box<dyn FnOnce(CoroutineRef) + 'static>>,

    /// Where to resume: the register set parked by the last yield, or the
    /// fresh entry frame for a `Ready` coroutine.
    pub(crate) ctx: Context,

    /// Save buffer: the live bytes of the shared stack at the last yield.
    /// `len` is the live size, `capacity` the allocated size.
    pub(crate) saved: Vec<u8>,

    pub(crate) status: Status,
}

impl Coroutine {
    pub(crate) fn new(func: Box<dyn FnOnce(CoroutineRef) + 'static>) -> Box<Coroutine> {
        Box::new(Coroutine {
            func: Some(func),
            ctx: Context::empty(),
            saved: Vec::new(),
            status: Status::Ready,
        })
    }

    /// Snapshot the live portion of the shared stack, `[&dummy, top)`, into
    /// the save buffer.
    ///
    /// `dummy` is a local of this frame, which sits below the caller's, so
    /// the snapshot is guaranteed to cover the caller's entire frame — the
    /// frame execution re-enters when the coroutine resumes. Never inlined:
    /// folded into the caller, `dummy` could land above parts of the
    /// caller's own frame and the snapshot would miss them.
    #[inline(never)]
    pub(crate) fn save_stack(&mut self, top: *const u8) {
        let dummy: u8 = 0;
        let used = top as usize - &dummy as *const u8 as usize;
        assert!(
            used <= STACK_SIZE,
            "coroutine overflowed the shared stack: {} bytes live",
            used
        );

        // A buffer that must grow is replaced with one of exactly the live
        // size; it is never doubled in place.
        if self.saved.capacity() < used {
            self.saved = Vec::with_capacity(used);
        }
        unsafe {
            ptr::copy_nonoverlapping(top.sub(used), self.saved.as_mut_ptr(), used);
            self.saved.set_len(used);
        }
    }

    /// Copy the parked frames back to the high end of the shared stack, the
    /// exact addresses they were saved from. Frames hold absolute pointers
    /// into each other; restoring anywhere else would corrupt them.
    ///
    /// Must be called from the main context: the caller's own frames must
    /// not live in the region being written.
    pub(crate) unsafe fn restore_stack(&self, top: *const u8) {
        ptr::copy_nonoverlapping(
            self.saved.as_ptr(),
            top.sub(self.saved.len()) as *mut u8,
            self.saved.len(),
        );
    }
}
