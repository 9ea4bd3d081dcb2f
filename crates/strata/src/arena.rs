//! Monotonic bump (arena) allocator.
//!
//! The arena hands out memory by advancing an offset through a caller-owned
//! buffer. Individual allocations are never reclaimed; the only way to reuse
//! memory is [`deallocate_all`](ArenaAllocator::deallocate_all), which resets
//! the arena to its initial state. This makes allocation O(1) with zero
//! per-allocation overhead and zero fragmentation, at the cost of bulk-only
//! reclamation. A good fit for short-lived, phase-scoped allocations.
//!
//! # Memory Layout
//!
//! ```text
//! ┌────────────────┬─────────┬──────────────────────────┐
//! │ allocated      │ padding │ free                     │
//! └────────────────┴─────────┴──────────────────────────┘
//! buf              ^ prev_offset        ^ curr_offset
//! ```
//!
//! `prev_offset` remembers where the most recent allocation starts so that
//! [`reallocate`](ArenaAllocator::reallocate) can grow or shrink it in place.

use core::{alloc::Layout, ptr};

use snafu::ensure;

use crate::{
    align::align_forward,
    error::{Result, alloc_error},
};

/// A monotonic bump allocator over a fixed, caller-owned buffer.
///
/// # Thread Safety
///
/// `ArenaAllocator` is `Send` but not `Sync`. Concurrent calls against the
/// same instance must be serialized externally.
#[derive(Debug)]
pub struct ArenaAllocator {
    buf: *mut u8,
    buf_len: usize,
    prev_offset: usize,
    curr_offset: usize,
}

unsafe impl Send for ArenaAllocator {}

impl ArenaAllocator {
    /// Creates an arena over the buffer `buf..buf + buf_len`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - The region `buf..buf + buf_len` is valid for reads and writes
    /// - The region is used by no other allocator or code while this arena
    ///   is alive
    /// - The region outlives the arena; pointers returned by the arena are
    ///   loans into it
    #[must_use]
    pub unsafe fn new(buf: *mut u8, buf_len: usize) -> Self {
        assert!(!buf.is_null(), "backing buffer must not be null");
        Self {
            buf,
            buf_len,
            prev_offset: 0,
            curr_offset: 0,
        }
    }

    /// Total capacity of the backing buffer in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf_len
    }

    /// Bytes consumed so far, padding included.
    #[must_use]
    pub fn used(&self) -> usize {
        self.curr_offset
    }

    /// Allocates `layout.size()` bytes aligned to `layout.align()`.
    ///
    /// Fails with [`AllocError::OutOfMemory`](crate::AllocError::OutOfMemory)
    /// when the remaining space,
    /// after alignment padding, cannot hold the request.
    pub fn allocate(&mut self, layout: Layout) -> Result<*mut u8> {
        let curr_addr = self.buf.addr() + self.curr_offset;
        let offset = align_forward(curr_addr, layout.align()) - self.buf.addr();

        ensure!(
            offset + layout.size() <= self.buf_len,
            alloc_error::OutOfMemorySnafu {
                size: layout.size(),
                align: layout.align(),
            }
        );

        self.prev_offset = offset;
        self.curr_offset = offset + layout.size();
        Ok(self.buf.map_addr(|addr| addr + offset))
    }

    /// Like [`allocate`](Self::allocate), but zero-fills the returned block.
    pub fn allocate_zeroed(&mut self, layout: Layout) -> Result<*mut u8> {
        let ptr = self.allocate(layout)?;
        unsafe {
            ptr.write_bytes(0, layout.size());
        }
        Ok(ptr)
    }

    /// Resizes an allocation to `new_layout`.
    ///
    /// A null `old_ptr` (or a zero `old_size`) behaves as a plain
    /// [`allocate`](Self::allocate). The most recent allocation is grown or
    /// shrunk in place by moving the current offset. Any other live
    /// allocation is copied into fresh storage; its old storage is abandoned
    /// (arenas never reclaim individual blocks).
    ///
    /// # Safety
    ///
    /// `old_ptr` must be null or a pointer previously returned by this arena
    /// with at least `old_size` valid bytes, not invalidated by a
    /// [`deallocate_all`](Self::deallocate_all).
    pub unsafe fn reallocate(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_layout: Layout,
    ) -> Result<*mut u8> {
        unsafe { self.reallocate_impl(old_ptr, old_size, new_layout, false) }
    }

    /// Like [`reallocate`](Self::reallocate), but zero-fills the tail of an
    /// in-place growth and any freshly allocated storage beyond the copied
    /// prefix.
    ///
    /// # Safety
    ///
    /// Same contract as [`reallocate`](Self::reallocate).
    pub unsafe fn reallocate_zeroed(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_layout: Layout,
    ) -> Result<*mut u8> {
        unsafe { self.reallocate_impl(old_ptr, old_size, new_layout, true) }
    }

    unsafe fn reallocate_impl(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_layout: Layout,
        zeroed: bool,
    ) -> Result<*mut u8> {
        if old_ptr.is_null() || old_size == 0 {
            return if zeroed {
                self.allocate_zeroed(new_layout)
            } else {
                self.allocate(new_layout)
            };
        }

        let addr = old_ptr.addr();
        let start = self.buf.addr();
        ensure!(
            addr >= start && addr < start + self.buf_len,
            alloc_error::OutOfBoundsAddressSnafu { addr }
        );

        let new_size = new_layout.size();
        if addr == start + self.prev_offset {
            // Most recent allocation: move the bump offset in place.
            ensure!(
                self.prev_offset + new_size <= self.buf_len,
                alloc_error::OutOfMemorySnafu {
                    size: new_size,
                    align: new_layout.align(),
                }
            );
            let old_end = self.curr_offset;
            self.curr_offset = self.prev_offset + new_size;
            if zeroed && self.curr_offset > old_end {
                unsafe {
                    self.buf
                        .map_addr(|a| a + old_end)
                        .write_bytes(0, self.curr_offset - old_end);
                }
            }
            return Ok(old_ptr);
        }

        let new_ptr = if zeroed {
            self.allocate_zeroed(new_layout)?
        } else {
            self.allocate(new_layout)?
        };
        unsafe {
            ptr::copy(old_ptr, new_ptr, old_size.min(new_size));
        }
        Ok(new_ptr)
    }

    /// Always succeeds without reclaiming anything; arenas provide no
    /// per-object deallocation.
    pub fn deallocate(&mut self, _ptr: *mut u8) -> Result<()> {
        Ok(())
    }

    /// Resets the arena, discarding every outstanding allocation.
    ///
    /// Every pointer previously returned by this arena is invalidated; the
    /// caller must not dereference them afterwards.
    pub fn deallocate_all(&mut self) {
        self.prev_offset = 0;
        self.curr_offset = 0;
    }
}
