//! LIFO stack allocator with validated deallocation.
//!
//! Like the arena, the stack allocator bumps an offset through a caller-owned
//! buffer, but it additionally writes a small header before every payload so
//! that allocations can be released one at a time, strictly in reverse
//! allocation order. The headers form an implicit singly linked list threaded
//! through the buffer: each one records where the previous live block starts,
//! which is exactly the state needed to pop the top allocation.
//!
//! # Memory Layout
//!
//! ```text
//! ┌─────────┬───────────────┬────────┬─────────┬───────────────┬────────┐
//! │ padding │ StackHeader   │ data A │ padding │ StackHeader   │ data B │
//! └─────────┴───────────────┴────────┴─────────┴───────────────┴────────┘
//! ^ prev block start                 ^ prev_offset        curr_offset ─┘
//! ```
//!
//! Freeing anything but the most recent live allocation is detected and
//! reported as [`AllocError::OutOfOrderFree`](crate::AllocError::OutOfOrderFree);
//! freeing memory that has
//! already been reclaimed is tolerated as a harmless no-op.

use core::{alloc::Layout, ptr};

use snafu::ensure;

use crate::{
    align::padding_with_header,
    error::{Result, alloc_error},
};

/// Per-allocation metadata written immediately before each payload.
///
/// `prev_offset` is the start offset of the block that was on top of the
/// stack before this one was allocated; `padding` is the total number of
/// bytes (header included) between this block's start and its payload.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct StackHeader {
    prev_offset: usize,
    padding: usize,
}

/// A LIFO allocator over a fixed, caller-owned buffer.
///
/// Supports scoped, nested lifetime patterns cheaper than a general free
/// list while still catching non-LIFO frees deterministically.
///
/// # Thread Safety
///
/// `StackAllocator` is `Send` but not `Sync`. Concurrent calls against the
/// same instance must be serialized externally.
#[derive(Debug)]
pub struct StackAllocator {
    buf: *mut u8,
    buf_len: usize,
    /// Start offset (padding included) of the most recent live allocation.
    prev_offset: usize,
    curr_offset: usize,
}

unsafe impl Send for StackAllocator {}

impl StackAllocator {
    /// Creates a stack allocator over the buffer `buf..buf + buf_len`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - The region `buf..buf + buf_len` is valid for reads and writes
    /// - The region is used by no other allocator or code while this
    ///   allocator is alive
    /// - The region outlives the allocator
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

    /// Bytes consumed so far, headers and padding included.
    #[must_use]
    pub fn used(&self) -> usize {
        self.curr_offset
    }

    /// Allocates `layout.size()` bytes aligned to `layout.align()`, with a
    /// [`StackHeader`] tucked into the padding before the payload.
    pub fn allocate(&mut self, layout: Layout) -> Result<*mut u8> {
        let curr_addr = self.buf.addr() + self.curr_offset;
        let padding = padding_with_header(curr_addr, layout.align(), size_of::<StackHeader>());

        ensure!(
            self.curr_offset + padding + layout.size() <= self.buf_len,
            alloc_error::OutOfMemorySnafu {
                size: layout.size(),
                align: layout.align(),
            }
        );

        let block_start = self.curr_offset;
        let payload = self.buf.map_addr(|addr| addr + block_start + padding);

        // The payload alignment may be smaller than the header's, so the
        // header write must not assume alignment.
        let header_ptr = payload
            .map_addr(|addr| addr - size_of::<StackHeader>())
            .cast::<StackHeader>();
        unsafe {
            header_ptr.write_unaligned(StackHeader {
                prev_offset: self.prev_offset,
                padding,
            });
        }

        self.prev_offset = block_start;
        self.curr_offset = block_start + padding + layout.size();
        Ok(payload)
    }

    /// Like [`allocate`](Self::allocate), but zero-fills the returned block.
    pub fn allocate_zeroed(&mut self, layout: Layout) -> Result<*mut u8> {
        let ptr = self.allocate(layout)?;
        unsafe {
            ptr.write_bytes(0, layout.size());
        }
        Ok(ptr)
    }

    /// Releases the most recent live allocation.
    ///
    /// A null pointer and a pointer into the already-reclaimed region above
    /// the live area are harmless no-ops (tolerating defensive double-free
    /// call sites). A pointer outside the buffer fails with
    /// [`AllocError::OutOfBoundsAddress`](crate::AllocError::OutOfBoundsAddress);
    /// a pointer to a live block that is not the top of the stack fails with
    /// [`AllocError::OutOfOrderFree`](crate::AllocError::OutOfOrderFree) and
    /// leaves the allocator untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by this
    /// allocator.
    pub unsafe fn deallocate(&mut self, ptr: *mut u8) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }

        let addr = ptr.addr();
        let start = self.buf.addr();
        ensure!(
            addr >= start && addr < start + self.buf_len,
            alloc_error::OutOfBoundsAddressSnafu { addr }
        );

        if addr >= start + self.curr_offset {
            // Double free of an already-reclaimed block.
            return Ok(());
        }

        let header = unsafe {
            ptr.map_addr(|a| a - size_of::<StackHeader>())
                .cast::<StackHeader>()
                .read_unaligned()
        };

        let block_start = addr - header.padding - start;
        ensure!(
            block_start == self.prev_offset,
            alloc_error::OutOfOrderFreeSnafu { addr }
        );

        self.curr_offset = block_start;
        self.prev_offset = header.prev_offset;
        Ok(())
    }

    /// Resizes an allocation to `new_layout`.
    ///
    /// A null `old_ptr` behaves as [`allocate`](Self::allocate); a zero
    /// `new_layout.size()` behaves as [`deallocate`](Self::deallocate) and
    /// returns a null pointer. Equal old and new sizes return `old_ptr`
    /// unchanged. Everything else allocates fresh storage on top of the
    /// stack and copies `min(old_size, new_size)` bytes; the old block stays
    /// where it is until unwound.
    ///
    /// # Safety
    ///
    /// `old_ptr` must be null or a pointer previously returned by this
    /// allocator with at least `old_size` valid bytes.
    pub unsafe fn reallocate(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_layout: Layout,
    ) -> Result<*mut u8> {
        if old_ptr.is_null() {
            return self.allocate(new_layout);
        }
        if new_layout.size() == 0 {
            unsafe {
                self.deallocate(old_ptr)?;
            }
            return Ok(ptr::null_mut());
        }

        let addr = old_ptr.addr();
        let start = self.buf.addr();
        ensure!(
            addr >= start && addr < start + self.buf_len,
            alloc_error::OutOfBoundsAddressSnafu { addr }
        );
        // Reallocating a block that has already been unwound is misuse.
        ensure!(
            addr < start + self.curr_offset,
            alloc_error::OutOfOrderFreeSnafu { addr }
        );

        if old_size == new_layout.size() {
            return Ok(old_ptr);
        }

        let new_ptr = self.allocate(new_layout)?;
        unsafe {
            ptr::copy(old_ptr, new_ptr, old_size.min(new_layout.size()));
        }
        Ok(new_ptr)
    }

    /// Resets the stack, discarding every outstanding allocation.
    ///
    /// Every pointer previously returned by this allocator is invalidated.
    pub fn deallocate_all(&mut self) {
        self.prev_offset = 0;
        self.curr_offset = 0;
    }
}
