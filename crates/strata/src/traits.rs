//! Strategy-agnostic allocation interface.
//!
//! [`BufferAllocator`] gives every strategy in this crate one operation
//! surface (allocate, reallocate, deallocate, deallocate-all) so call
//! sites can hold a `&mut dyn BufferAllocator` and stay oblivious to which
//! strategy backs it. Swapping the bound strategy changes allocation
//! behavior without touching the call sites.
//!
//! The trait is a view over strategy state the caller owns; it owns nothing
//! itself and adds no bookkeeping of its own.

use core::alloc::Layout;

use snafu::ensure;

use crate::{
    arena::ArenaAllocator,
    error::{Result, alloc_error},
    free_list::FreeListAllocator,
    pool::PoolAllocator,
    stack::StackAllocator,
};

/// Uniform dispatch surface over one allocation strategy.
///
/// Implementations forward to the strategy's inherent methods; see those for
/// the per-strategy semantics and error conditions. The pool strategy is
/// fixed-size, so its [`allocate`](Self::allocate) additionally fails with
/// `OutOfMemory` when the requested layout does not fit the configured
/// chunk, and its [`reallocate`](Self::reallocate) always fails with
/// `UnsupportedOperation`.
pub trait BufferAllocator {
    /// Allocates a block for `layout`.
    fn allocate(&mut self, layout: Layout) -> Result<*mut u8>;

    /// Allocates a block for `layout` and zero-fills it.
    fn allocate_zeroed(&mut self, layout: Layout) -> Result<*mut u8> {
        let ptr = self.allocate(layout)?;
        unsafe {
            ptr.write_bytes(0, layout.size());
        }
        Ok(ptr)
    }

    /// Resizes `old_ptr` (with `old_size` valid bytes) to `new_layout`.
    ///
    /// # Safety
    ///
    /// `old_ptr` must be null or a live pointer previously returned by this
    /// allocator with at least `old_size` valid bytes.
    unsafe fn reallocate(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_layout: Layout,
    ) -> Result<*mut u8>;

    /// Releases `ptr` according to the strategy's discipline.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by this
    /// allocator.
    unsafe fn deallocate(&mut self, ptr: *mut u8) -> Result<()>;

    /// Discards every outstanding allocation, invalidating all previously
    /// returned pointers.
    fn deallocate_all(&mut self);
}

impl BufferAllocator for ArenaAllocator {
    fn allocate(&mut self, layout: Layout) -> Result<*mut u8> {
        Self::allocate(self, layout)
    }

    fn allocate_zeroed(&mut self, layout: Layout) -> Result<*mut u8> {
        Self::allocate_zeroed(self, layout)
    }

    unsafe fn reallocate(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_layout: Layout,
    ) -> Result<*mut u8> {
        unsafe { Self::reallocate(self, old_ptr, old_size, new_layout) }
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8) -> Result<()> {
        Self::deallocate(self, ptr)
    }

    fn deallocate_all(&mut self) {
        Self::deallocate_all(self);
    }
}

impl BufferAllocator for StackAllocator {
    fn allocate(&mut self, layout: Layout) -> Result<*mut u8> {
        Self::allocate(self, layout)
    }

    fn allocate_zeroed(&mut self, layout: Layout) -> Result<*mut u8> {
        Self::allocate_zeroed(self, layout)
    }

    unsafe fn reallocate(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_layout: Layout,
    ) -> Result<*mut u8> {
        unsafe { Self::reallocate(self, old_ptr, old_size, new_layout) }
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8) -> Result<()> {
        unsafe { Self::deallocate(self, ptr) }
    }

    fn deallocate_all(&mut self) {
        Self::deallocate_all(self);
    }
}

impl BufferAllocator for PoolAllocator {
    fn allocate(&mut self, layout: Layout) -> Result<*mut u8> {
        ensure!(
            layout.size() <= self.chunk_size() && layout.align() <= self.chunk_align(),
            alloc_error::OutOfMemorySnafu {
                size: layout.size(),
                align: layout.align(),
            }
        );
        Self::allocate(self)
    }

    fn allocate_zeroed(&mut self, layout: Layout) -> Result<*mut u8> {
        ensure!(
            layout.size() <= self.chunk_size() && layout.align() <= self.chunk_align(),
            alloc_error::OutOfMemorySnafu {
                size: layout.size(),
                align: layout.align(),
            }
        );
        Self::allocate_zeroed(self)
    }

    unsafe fn reallocate(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_layout: Layout,
    ) -> Result<*mut u8> {
        Self::reallocate(self, old_ptr, old_size, new_layout)
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8) -> Result<()> {
        unsafe { Self::deallocate(self, ptr) }
    }

    fn deallocate_all(&mut self) {
        Self::deallocate_all(self);
    }
}

impl BufferAllocator for FreeListAllocator {
    fn allocate(&mut self, layout: Layout) -> Result<*mut u8> {
        Self::allocate(self, layout)
    }

    fn allocate_zeroed(&mut self, layout: Layout) -> Result<*mut u8> {
        Self::allocate_zeroed(self, layout)
    }

    unsafe fn reallocate(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_layout: Layout,
    ) -> Result<*mut u8> {
        unsafe { Self::reallocate(self, old_ptr, old_size, new_layout) }
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8) -> Result<()> {
        unsafe { Self::deallocate(self, ptr) }
    }

    fn deallocate_all(&mut self) {
        Self::deallocate_all(self);
    }
}
