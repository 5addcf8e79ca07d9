// Copyright 2013-2014 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Machine context save and restore.
//!
//! A `Context` is a parked callee-saved register set. Swapping stores the
//! live set into one context and loads another; the loaded context resumes
//! at the return address it was parked with. The actual register traffic is
//! done by `costack_swap_registers`, assembled from `src/asm/<arch>/` by the
//! build script.

use crate::stack::SharedStack;

/// Entry function of a fresh context. Receives the word stashed at
/// context-creation time and must never return: there is nothing on the new
/// stack to return to.
pub type InitFn = extern "C" fn(usize) -> !;

#[link(name = "ctxswtch", kind = "static")]
extern "C" {
    fn costack_swap_registers(out_regs: *mut Registers, in_regs: *const Registers);
    fn costack_bootstrap();
}

#[derive(Debug)]
pub struct Context {
    regs: Registers,
}

impl Context {
    /// A context with a zeroed register set. Only useful as the target of a
    /// save: activating it is undefined.
    pub fn empty() -> Context {
        Context {
            regs: Registers::new(),
        }
    }

    /// Create a context that, when first activated, calls `init(arg)` at the
    /// top of `stack`.
    pub fn new(init: InitFn, arg: usize, stack: &SharedStack) -> Context {
        let mut regs = Registers::new();
        initialize_call_frame(&mut regs, init, arg, stack);
        Context { regs }
    }

    /// Suspend the current execution context into `out_context` and resume
    /// `in_context` where it was suspended.
    ///
    /// The resumption point travels in the context record, not on the
    /// stack, so a suspended context can be re-entered on freshly restored
    /// stack bytes. Forced inline: the switch has to be entered straight
    /// from the frame that snapshotted the stack — a wrapper frame below it
    /// would be resurrected from stale snapshot bytes when the coroutine
    /// resumes.
    #[inline(always)]
    pub fn swap(out_context: &mut Context, in_context: &Context) {
        unsafe { costack_swap_registers(&mut out_context.regs, &in_context.regs) }
    }
}

// One field per callee-saved register of the target ABI, in the exact order
// the assembly stores them. Keep in sync with src/asm/<arch>/_context.S.

#[cfg(target_arch = "x86_64")]
#[repr(C)]
#[derive(Debug)]
struct Registers {
    sp: usize,
    /// Where the switch resumes this context. Kept in the record rather
    /// than read back off the stack: the bytes at the return slot may be a
    /// stale snapshot copy by the time the context is re-entered.
    ip: usize,
    rbp: usize,
    rbx: usize,
    r12: usize,
    r13: usize,
    r14: usize,
    r15: usize,
}

#[cfg(target_arch = "x86_64")]
impl Registers {
    fn new() -> Registers {
        Registers {
            sp: 0,
            ip: 0,
            rbp: 0,
            rbx: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn initialize_call_frame(regs: &mut Registers, fptr: InitFn, arg: usize, stack: &SharedStack) {
    // 16-byte aligned, so the `callq` in costack_bootstrap leaves %rsp at
    // entry alignment for the trampoline.
    regs.sp = align_down(stack.end() as *mut usize) as usize;

    // The switch jumps into the bootstrap shim, which forwards `arg` from
    // %r12 and calls the entry function stashed in %r13.
    regs.ip = costack_bootstrap as usize;
    regs.r12 = arg;
    regs.r13 = fptr as usize;

    // Bottom of the new call chain.
    regs.rbp = 0;
}

#[cfg(target_arch = "aarch64")]
#[repr(C)]
#[derive(Debug)]
struct Registers {
    sp: usize,
    x19: usize,
    x20: usize,
    x21: usize,
    x22: usize,
    x23: usize,
    x24: usize,
    x25: usize,
    x26: usize,
    x27: usize,
    x28: usize,
    fp: usize,
    lr: usize,
    fpr: [u64; 8],
}

#[cfg(target_arch = "aarch64")]
impl Registers {
    fn new() -> Registers {
        Registers {
            sp: 0,
            x19: 0,
            x20: 0,
            x21: 0,
            x22: 0,
            x23: 0,
            x24: 0,
            x25: 0,
            x26: 0,
            x27: 0,
            x28: 0,
            fp: 0,
            lr: 0,
            fpr: [0; 8],
        }
    }
}

#[cfg(target_arch = "aarch64")]
fn initialize_call_frame(regs: &mut Registers, fptr: InitFn, arg: usize, stack: &SharedStack) {
    // sp must stay 16-byte aligned at all times on AArch64. Nothing is
    // pushed on entry: the switch loads x30 with the bootstrap shim and
    // `ret`s straight into it.
    regs.sp = align_down(stack.end() as *mut usize) as usize;
    regs.lr = costack_bootstrap as usize;
    regs.x19 = arg;
    regs.x20 = fptr as usize;

    // Bottom of the new call chain.
    regs.fp = 0;
}

fn align_down(sp: *mut usize) -> *mut usize {
    let sp = (sp as usize) & !(16 - 1);
    sp as *mut usize
}
