// Copyright 2013 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The shared execution stack.
//!
//! One `SharedStack` is the region every coroutine of a scheduler runs on.
//! It is mapped once, guarded below, and outlives every coroutine; what
//! moves around is the *contents*, copied out to per-coroutine save buffers
//! on yield and back on resume.

use std::io;

// Try to use MAP_STACK where the platform supports it (this is a stack, so
// say so), but not everywhere: on FreeBSD MAP_STACK implies MAP_FIXED so the
// mapping always fails, and DragonFly returns the same address for every
// MAP_STACK mapping. Apple never grew the flag.
#[cfg(all(
    unix,
    not(target_os = "freebsd"),
    not(target_os = "dragonfly"),
    not(target_vendor = "apple")
))]
const STACK_FLAGS: libc::c_int = libc::MAP_STACK | libc::MAP_PRIVATE | libc::MAP_ANON;
#[cfg(any(target_os = "freebsd", target_os = "dragonfly", target_vendor = "apple"))]
const STACK_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON;

/// A guard-paged memory mapping holding the execution stack.
#[derive(Debug)]
pub struct SharedStack {
    buf: *mut libc::c_void,
    /// Total mapping length, guard page included.
    len: usize,
    /// Usable bytes between `start` and `end`.
    min_size: usize,
}

impl SharedStack {
    /// Map a stack of `size` usable bytes plus one guard page below them.
    ///
    /// There is no graceful path out of a failed mapping; like a failed heap
    /// allocation it ends the caller.
    pub fn new(size: usize) -> SharedStack {
        let page = page_size();
        let len = size + page;

        let buf = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                STACK_FLAGS,
                -1,
                0,
            )
        };
        if buf == libc::MAP_FAILED {
            panic!(
                "mmap for stack of size {} failed: {}",
                len,
                io::Error::last_os_error()
            );
        }

        // Make the lowest page inaccessible, so running off the stack faults
        // instead of quietly trampling whatever is mapped next.
        if !protect_last_page(buf) {
            panic!(
                "could not memory-protect guard page at {:p}: {}",
                buf,
                io::Error::last_os_error()
            );
        }

        SharedStack {
            buf,
            len,
            min_size: size,
        }
    }

    /// Lowest usable address, one page above the mapping base.
    pub fn start(&self) -> *const u8 {
        unsafe { (self.buf as *const u8).add(self.len - self.min_size) }
    }

    /// One byte past the highest usable address. Frames grow down from
    /// here, and suspended frames are restored against it.
    pub fn end(&self) -> *const u8 {
        unsafe { (self.buf as *const u8).add(self.len) }
    }

    /// Usable size of the stack in bytes.
    #[allow(dead_code)]
    pub fn min_size(&self) -> usize {
        self.min_size
    }
}

impl Drop for SharedStack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.buf, self.len);
        }
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

fn protect_last_page(stack: *mut libc::c_void) -> bool {
    unsafe {
        // This may seem backwards: the start of the mapping is the last page
        // of the stack. The stack grows from the high end of the mapping
        // toward the low end.
        libc::mprotect(stack, page_size(), libc::PROT_NONE) != -1
    }
}
