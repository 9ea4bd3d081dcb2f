//! Fixed-chunk pool allocator.
//!
//! The pool partitions a caller-owned buffer into equally sized chunks and
//! threads the free ones into an intrusive singly linked list: a free chunk's
//! first bytes hold the link to the next free chunk, so the list costs no
//! memory beyond the buffer itself. Allocation pops the head and
//! deallocation pushes the chunk back, both O(1), with no per-chunk header
//! and no fragmentation. The right tool for many objects of one size.
//!
//! Chunks are uniform, so [`reallocate`](PoolAllocator::reallocate) is
//! structurally impossible and always fails with
//! [`AllocError::UnsupportedOperation`](crate::AllocError::UnsupportedOperation).

use core::{alloc::Layout, ptr};

use snafu::ensure;

use crate::{
    align::align_forward,
    error::{Result, alloc_error},
};

/// Intrusive free-list link stored in the first bytes of each free chunk.
#[derive(Debug)]
#[repr(C)]
struct PoolFreeNode {
    next: *mut PoolFreeNode,
}

/// A fixed-size chunk allocator over a caller-owned buffer.
///
/// Every pointer returned by (or accepted back into) the pool is
/// `buffer_start + k * chunk_size` for some integer `k`, where
/// `buffer_start` is the chunk-aligned start of the usable region.
///
/// # Thread Safety
///
/// `PoolAllocator` is `Send` but not `Sync`. Concurrent calls against the
/// same instance must be serialized externally.
#[derive(Debug)]
pub struct PoolAllocator {
    buf: *mut u8,
    buf_len: usize,
    chunk_size: usize,
    chunk_align: usize,
    head: *mut PoolFreeNode,
}

unsafe impl Send for PoolAllocator {}

impl PoolAllocator {
    /// Creates a pool over the buffer `buf..buf + buf_len`, partitioned into
    /// chunks of `chunk_size` bytes aligned to `chunk_align`.
    ///
    /// The buffer start is aligned forward to `chunk_align` (shrinking the
    /// usable length accordingly) and `chunk_size` is rounded up to a
    /// multiple of `chunk_align`. Fails with
    /// [`AllocError::InvalidAlignment`](crate::AllocError::InvalidAlignment)
    /// if `chunk_align` is not a power of two, and with
    /// [`AllocError::OutOfMemory`](crate::AllocError::OutOfMemory) if the
    /// aligned buffer cannot hold a single chunk.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - The region `buf..buf + buf_len` is valid for reads and writes
    /// - The region is used by no other allocator or code while this pool
    ///   is alive
    /// - The region outlives the pool
    ///
    /// # Panics
    ///
    /// Panics if the rounded chunk size is too small to hold the intrusive
    /// free-list link.
    pub unsafe fn new(
        buf: *mut u8,
        buf_len: usize,
        chunk_size: usize,
        chunk_align: usize,
    ) -> Result<Self> {
        assert!(!buf.is_null(), "backing buffer must not be null");
        ensure!(
            chunk_align.is_power_of_two(),
            alloc_error::InvalidAlignmentSnafu { align: chunk_align }
        );

        let start = align_forward(buf.addr(), chunk_align);
        let buf_len = buf_len.saturating_sub(start - buf.addr());
        let chunk_size = align_forward(chunk_size, chunk_align);

        assert!(
            chunk_size >= size_of::<PoolFreeNode>(),
            "chunk size too small to hold a free-list link"
        );
        ensure!(
            buf_len >= chunk_size,
            alloc_error::OutOfMemorySnafu {
                size: chunk_size,
                align: chunk_align,
            }
        );

        let mut pool = Self {
            buf: buf.with_addr(start),
            buf_len,
            chunk_size,
            chunk_align,
            head: ptr::null_mut(),
        };
        pool.deallocate_all();
        Ok(pool)
    }

    /// Effective chunk size in bytes, after rounding to the chunk alignment.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks the pool manages.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.buf_len / self.chunk_size
    }

    /// Alignment every chunk start satisfies.
    #[must_use]
    pub fn chunk_align(&self) -> usize {
        self.chunk_align
    }

    /// Pops one chunk off the free list.
    ///
    /// Fails with [`AllocError::OutOfMemory`](crate::AllocError::OutOfMemory)
    /// when every chunk is live.
    pub fn allocate(&mut self) -> Result<*mut u8> {
        ensure!(
            !self.head.is_null(),
            alloc_error::OutOfMemorySnafu {
                size: self.chunk_size,
                align: self.chunk_align,
            }
        );

        let node = self.head;
        // Chunks may be less aligned than the link type if the caller chose
        // a small chunk alignment.
        self.head = unsafe { node.read_unaligned().next };
        Ok(node.cast())
    }

    /// Like [`allocate`](Self::allocate), but zero-fills the whole chunk.
    pub fn allocate_zeroed(&mut self) -> Result<*mut u8> {
        let ptr = self.allocate()?;
        unsafe {
            ptr.write_bytes(0, self.chunk_size);
        }
        Ok(ptr)
    }

    /// Returns a chunk to the free list.
    ///
    /// A null pointer is a harmless no-op; a pointer outside the buffer
    /// fails with
    /// [`AllocError::OutOfBoundsAddress`](crate::AllocError::OutOfBoundsAddress).
    /// Chunks are uniform,
    /// so there is nothing to coalesce.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by this pool
    /// that is not already on the free list.
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

        let node = ptr.cast::<PoolFreeNode>();
        unsafe {
            node.write_unaligned(PoolFreeNode { next: self.head });
        }
        self.head = node;
        Ok(())
    }

    /// Always fails with
    /// [`AllocError::UnsupportedOperation`](crate::AllocError::UnsupportedOperation);
    /// every chunk
    /// in a pool has the same size, so there is nothing to resize into.
    pub fn reallocate(
        &mut self,
        _old_ptr: *mut u8,
        _old_size: usize,
        _new_layout: Layout,
    ) -> Result<*mut u8> {
        alloc_error::UnsupportedOperationSnafu.fail()
    }

    /// Relinks every chunk into the free list, discarding all outstanding
    /// allocations.
    ///
    /// Every pointer previously returned by this pool is invalidated.
    pub fn deallocate_all(&mut self) {
        self.head = ptr::null_mut();
        for i in 0..self.chunk_count() {
            let node = self
                .buf
                .map_addr(|addr| addr + i * self.chunk_size)
                .cast::<PoolFreeNode>();
            unsafe {
                node.write_unaligned(PoolFreeNode { next: self.head });
            }
            self.head = node;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::AllocError, test_heap::with_test_heap};

    fn with_pool<F>(size: usize, chunk_size: usize, chunk_align: usize, test_fn: F)
    where
        F: FnOnce(&mut PoolAllocator),
    {
        with_test_heap(size, |heap_start, heap_size| unsafe {
            let mut pool = PoolAllocator::new(heap_start, heap_size, chunk_size, chunk_align).unwrap();
            test_fn(&mut pool);
        });
    }

    #[test]
    fn test_exact_capacity_then_exhaustion() {
        with_pool(256, 64, 8, |pool| {
            assert_eq!(pool.chunk_count(), 4);

            let ptrs: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();
            assert!(matches!(
                pool.allocate(),
                Err(AllocError::OutOfMemory { .. })
            ));

            // All four chunks are distinct slots, one chunk size apart.
            let mut sorted = ptrs.clone();
            sorted.sort();
            for pair in sorted.windows(2) {
                assert_eq!(pair[1].addr() - pair[0].addr(), 64);
            }
        });
    }

    #[test]
    fn test_free_then_reallocate_reuses_slot() {
        with_pool(256, 64, 8, |pool| unsafe {
            let ptrs: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();

            pool.deallocate(ptrs[1]).unwrap();
            let reused = pool.allocate().unwrap();
            assert_eq!(reused, ptrs[1]);
        });
    }

    #[test]
    fn test_chunk_size_rounds_up_to_alignment() {
        with_pool(256, 24, 16, |pool| {
            assert_eq!(pool.chunk_size(), 32);
            let ptr = pool.allocate().unwrap();
            assert_eq!(ptr.addr() % 16, 0);
        });
    }

    #[test]
    fn test_out_of_bounds_free() {
        with_pool(256, 64, 8, |pool| unsafe {
            let mut other = [0_u8; 16];
            let result = pool.deallocate(other.as_mut_ptr());
            assert!(matches!(result, Err(AllocError::OutOfBoundsAddress { .. })));
        });
    }

    #[test]
    fn test_reallocate_is_unsupported() {
        with_pool(256, 64, 8, |pool| {
            let ptr = pool.allocate().unwrap();
            let layout = Layout::from_size_align(64, 8).unwrap();
            assert_eq!(
                pool.reallocate(ptr, 64, layout),
                Err(AllocError::UnsupportedOperation)
            );
        });
    }

    #[test]
    fn test_zeroed_chunk() {
        with_pool(256, 64, 8, |pool| unsafe {
            let dirty = pool.allocate().unwrap();
            dirty.write_bytes(0xAA, 64);
            pool.deallocate(dirty).unwrap();

            let ptr = pool.allocate_zeroed().unwrap();
            assert_eq!(ptr, dirty);
            for i in 0..64 {
                assert_eq!(ptr.add(i).read(), 0);
            }
        });
    }

    #[test]
    fn test_reset_round_trip_returns_identical_addresses() {
        with_pool(512, 64, 8, |pool| {
            let first: Vec<_> = (0..pool.chunk_count())
                .map(|_| pool.allocate().unwrap())
                .collect();

            pool.deallocate_all();

            let second: Vec<_> = (0..pool.chunk_count())
                .map(|_| pool.allocate().unwrap())
                .collect();
            assert_eq!(first, second);
        });
    }

    #[test]
    fn test_invalid_chunk_alignment() {
        with_test_heap(256, |heap_start, heap_size| unsafe {
            let result = PoolAllocator::new(heap_start, heap_size, 64, 12);
            assert!(matches!(
                result,
                Err(AllocError::InvalidAlignment { align: 12 })
            ));
        });
    }

    #[test]
    fn test_buffer_too_small_for_one_chunk() {
        with_test_heap(32, |heap_start, heap_size| unsafe {
            let result = PoolAllocator::new(heap_start, heap_size, 64, 8);
            assert!(matches!(result, Err(AllocError::OutOfMemory { .. })));
        });
    }
}
