//! General-purpose free-list allocator with placement policies and
//! coalescing.
//!
//! Free regions are kept in a singly linked list of intrusive [`FreeNode`]s
//! sorted by ascending address. Allocation searches the list under the
//! configured [`PlacementPolicy`], carves the request out of the chosen node
//! and re-inserts any leftover tail as a new free node. Deallocation inserts
//! the block back at its address-ordered position and merges it with
//! address-adjacent neighbors, so fragmentation heals as blocks are freed.
//!
//! # Memory Layout
//!
//! ```text
//! Live block:
//! ┌───────────────┬───────────────────┬──────────────────────┐
//! │ align padding │ BlockHeader       │ payload              │
//! └───────────────┴───────────────────┴──────────────────────┘
//! ^ block start   ^ payload − 16      ^ returned pointer
//! └────────────── padding ────────────┘
//!
//! Free block:
//! ┌──────────────────────────────────┬───────────────────────┐
//! │ FreeNode { next, block_size }    │ unused                │
//! └──────────────────────────────────┴───────────────────────┘
//! ```
//!
//! The union of free-node spans and live-block spans exactly tiles the
//! usable buffer; free nodes never overlap. To keep every block start
//! aligned for the intrusive node, requested sizes are rounded up to the
//! node alignment (with a floor of one node) and requested alignments are
//! clamped to at least the node alignment.
//!
//! # Performance Characteristics
//!
//! - **Allocation**: O(n) in the number of free blocks (first-fit stops
//!   early, best-fit always scans the whole list)
//! - **Deallocation**: O(n) for the address-ordered insertion
//! - **Coalescing**: O(1), checked against the two immediate neighbors

use core::{alloc::Layout, ptr};

use snafu::ensure;

use crate::{
    align::{align_forward, padding_with_header},
    error::{Result, alloc_error},
};

/// Intrusive node stored at the start of every free block.
#[derive(Debug)]
#[repr(C)]
struct FreeNode {
    next: *mut FreeNode,
    block_size: usize,
}

/// Metadata written immediately before each live payload.
///
/// `padding` is the total distance from the block start to the payload
/// (header included); `block_size` spans padding plus payload, so
/// `payload - padding` recovers the block start and `block_size` its extent.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct BlockHeader {
    block_size: usize,
    padding: usize,
}

/// Rule for choosing which free block satisfies a request.
///
/// Selected once at construction and fixed for the allocator's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPolicy {
    /// Take the first block, in address order, that fits.
    #[default]
    FirstFit,
    /// Scan the whole list and take the block leaving the least slack.
    BestFit,
}

/// A variable-size allocator with reclamation over a caller-owned buffer.
///
/// Handles variable-size, variable-lifetime allocations with block
/// coalescing to fight fragmentation, at the cost of O(n) search. For
/// uniform object sizes prefer [`PoolAllocator`](crate::PoolAllocator);
/// for phase-scoped lifetimes prefer
/// [`ArenaAllocator`](crate::ArenaAllocator).
///
/// # Thread Safety
///
/// `FreeListAllocator` is `Send` but not `Sync`. Concurrent calls against
/// the same instance must be serialized externally.
#[derive(Debug)]
pub struct FreeListAllocator {
    buf: *mut u8,
    buf_len: usize,
    used: usize,
    head: *mut FreeNode,
    policy: PlacementPolicy,
}

unsafe impl Send for FreeListAllocator {}

impl FreeListAllocator {
    /// Creates a free-list allocator over the buffer `buf..buf + buf_len`.
    ///
    /// The buffer start is aligned forward for the intrusive node and the
    /// usable length rounded down to a node-sized granule; fails with
    /// [`AllocError::OutOfMemory`](crate::AllocError::OutOfMemory) if the
    /// aligned region cannot hold a single free node.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - The region `buf..buf + buf_len` is valid for reads and writes
    /// - The region is used by no other allocator or code while this
    ///   allocator is alive
    /// - The region outlives the allocator
    pub unsafe fn new(buf: *mut u8, buf_len: usize, policy: PlacementPolicy) -> Result<Self> {
        assert!(!buf.is_null(), "backing buffer must not be null");

        let start = align_forward(buf.addr(), align_of::<FreeNode>());
        let usable = buf_len.saturating_sub(start - buf.addr()) / align_of::<FreeNode>()
            * align_of::<FreeNode>();
        ensure!(
            usable >= size_of::<FreeNode>(),
            alloc_error::OutOfMemorySnafu {
                size: size_of::<FreeNode>(),
                align: align_of::<FreeNode>(),
            }
        );

        let mut list = Self {
            buf: buf.with_addr(start),
            buf_len: usable,
            used: 0,
            head: ptr::null_mut(),
            policy,
        };
        list.deallocate_all();
        Ok(list)
    }

    /// Usable capacity of the backing buffer in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf_len
    }

    /// Bytes currently live, padding and headers included.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used
    }

    /// The placement policy this allocator was constructed with.
    #[must_use]
    pub fn policy(&self) -> PlacementPolicy {
        self.policy
    }

    /// Allocates `layout.size()` bytes aligned to `layout.align()`.
    ///
    /// Searches the free list under the placement policy; fails with
    /// [`AllocError::OutOfMemory`](crate::AllocError::OutOfMemory) when no
    /// free block is large enough.
    pub fn allocate(&mut self, layout: Layout) -> Result<*mut u8> {
        let size = layout
            .size()
            .max(size_of::<FreeNode>())
            .next_multiple_of(align_of::<FreeNode>());
        let align = layout.align().max(align_of::<FreeNode>());

        let found = match self.policy {
            PlacementPolicy::FirstFit => self.find_first(size, align),
            PlacementPolicy::BestFit => self.find_best(size, align),
        };
        let Some((node, prev, padding)) = found else {
            return alloc_error::OutOfMemorySnafu {
                size: layout.size(),
                align: layout.align(),
            }
            .fail();
        };

        let (next, node_size) = unsafe { ((*node).next, (*node).block_size) };
        let required = size + padding;
        let remaining = node_size - required;

        let carved = if remaining >= size_of::<FreeNode>() {
            // Split the leftover tail off as a new free node; it sits right
            // after the carved span, so the list stays address ordered.
            let tail = node.map_addr(|addr| addr + required);
            unsafe {
                tail.write(FreeNode {
                    next,
                    block_size: remaining,
                });
            }
            self.set_link(prev, tail);
            required
        } else {
            // Too small to hold a node; fold the slack into the block.
            self.set_link(prev, next);
            node_size
        };

        let payload = node.cast::<u8>().map_addr(|addr| addr + padding);
        let header_ptr = payload
            .map_addr(|addr| addr - size_of::<BlockHeader>())
            .cast::<BlockHeader>();
        unsafe {
            header_ptr.write(BlockHeader {
                block_size: carved,
                padding,
            });
        }

        self.used += carved;
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

    /// Returns a block to the free list and merges it with address-adjacent
    /// neighbors.
    ///
    /// A null pointer is a harmless no-op; a pointer outside the buffer
    /// fails with
    /// [`AllocError::OutOfBoundsAddress`](crate::AllocError::OutOfBoundsAddress).
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by this
    /// allocator that has not been deallocated since.
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

        let header = unsafe {
            ptr.map_addr(|a| a - size_of::<BlockHeader>())
                .cast::<BlockHeader>()
                .read()
        };
        let block = ptr.map_addr(|a| a - header.padding).cast::<FreeNode>();

        // Find the insertion point: the first node past the freed block.
        let mut prev: *mut FreeNode = ptr::null_mut();
        let mut node = self.head;
        while !node.is_null() && node.addr() < block.addr() {
            prev = node;
            node = unsafe { (*node).next };
        }

        unsafe {
            block.write(FreeNode {
                next: node,
                block_size: header.block_size,
            });
        }
        self.set_link(prev, block);
        self.used -= header.block_size;

        // Merge with the successor, then the predecessor. One step in each
        // direction; a single free can close both gaps.
        unsafe {
            let next = (*block).next;
            if !next.is_null() && block.addr() + (*block).block_size == next.addr() {
                (*block).block_size += (*next).block_size;
                (*block).next = (*next).next;
            }
            if !prev.is_null() && prev.addr() + (*prev).block_size == block.addr() {
                (*prev).block_size += (*block).block_size;
                (*prev).next = (*block).next;
            }
        }
        Ok(())
    }

    /// Resizes an allocation to `new_layout` by allocating fresh storage,
    /// copying `min(old_size, new_size)` bytes, and freeing the old block.
    /// No in-place growth is attempted. A null `old_ptr` (or zero
    /// `old_size`) behaves as a plain [`allocate`](Self::allocate).
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
        if old_ptr.is_null() || old_size == 0 {
            return self.allocate(new_layout);
        }

        let addr = old_ptr.addr();
        let start = self.buf.addr();
        ensure!(
            addr >= start && addr < start + self.buf_len,
            alloc_error::OutOfBoundsAddressSnafu { addr }
        );

        let new_ptr = self.allocate(new_layout)?;
        unsafe {
            ptr::copy(old_ptr, new_ptr, old_size.min(new_layout.size()));
            self.deallocate(old_ptr)?;
        }
        Ok(new_ptr)
    }

    /// Discards all bookkeeping and reinitializes the free list to a single
    /// node spanning the whole usable buffer.
    ///
    /// Every pointer previously returned by this allocator is invalidated.
    pub fn deallocate_all(&mut self) {
        let first = self.buf.cast::<FreeNode>();
        unsafe {
            first.write(FreeNode {
                next: ptr::null_mut(),
                block_size: self.buf_len,
            });
        }
        self.head = first;
        self.used = 0;
    }

    /// Points `prev` (or the list head when `prev` is null) at `target`.
    fn set_link(&mut self, prev: *mut FreeNode, target: *mut FreeNode) {
        if prev.is_null() {
            self.head = target;
        } else {
            unsafe {
                (*prev).next = target;
            }
        }
    }

    /// First node, in address order, whose block can hold `size` bytes plus
    /// the padding required at that node's address.
    fn find_first(&self, size: usize, align: usize) -> Option<(*mut FreeNode, *mut FreeNode, usize)> {
        let mut prev = ptr::null_mut();
        let mut node = self.head;
        while !node.is_null() {
            let padding = padding_with_header(node.addr(), align, size_of::<BlockHeader>());
            if unsafe { (*node).block_size } >= size + padding {
                return Some((node, prev, padding));
            }
            prev = node;
            node = unsafe { (*node).next };
        }
        None
    }

    /// Node leaving the smallest leftover after carving, among all nodes
    /// large enough.
    fn find_best(&self, size: usize, align: usize) -> Option<(*mut FreeNode, *mut FreeNode, usize)> {
        let mut best = None;
        let mut smallest_diff = usize::MAX;

        let mut prev = ptr::null_mut();
        let mut node = self.head;
        while !node.is_null() {
            let padding = padding_with_header(node.addr(), align, size_of::<BlockHeader>());
            let required = size + padding;
            let block_size = unsafe { (*node).block_size };
            if block_size >= required && block_size - required < smallest_diff {
                smallest_diff = block_size - required;
                best = Some((node, prev, padding));
            }
            prev = node;
            node = unsafe { (*node).next };
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::AllocError, test_heap::with_test_heap};

    fn with_free_list<F>(size: usize, policy: PlacementPolicy, test_fn: F)
    where
        F: FnOnce(&mut FreeListAllocator),
    {
        with_test_heap(size, |heap_start, heap_size| unsafe {
            let mut list = FreeListAllocator::new(heap_start, heap_size, policy).unwrap();
            test_fn(&mut list);
        });
    }

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn test_basic_allocation() {
        with_free_list(1024, PlacementPolicy::FirstFit, |list| unsafe {
            let ptr = list.allocate(layout(64)).unwrap();
            assert!(!ptr.is_null());
            assert_eq!(ptr.addr() % 8, 0);
            assert!(list.used() > 0);

            list.deallocate(ptr).unwrap();
            assert_eq!(list.used(), 0);
        });
    }

    #[test]
    fn test_alignment() {
        with_free_list(4096, PlacementPolicy::FirstFit, |list| {
            for align in [8_usize, 16, 64, 256] {
                let l = Layout::from_size_align(32, align).unwrap();
                let ptr = list.allocate(l).unwrap();
                assert_eq!(ptr.addr() % align, 0);
            }
        });
    }

    #[test]
    fn test_out_of_memory() {
        with_free_list(128, PlacementPolicy::FirstFit, |list| {
            assert!(matches!(
                list.allocate(layout(4096)),
                Err(AllocError::OutOfMemory { size: 4096, .. })
            ));
        });
    }

    #[test]
    fn test_out_of_bounds_free() {
        with_free_list(1024, PlacementPolicy::FirstFit, |list| unsafe {
            let mut other = [0_u8; 16];
            let result = list.deallocate(other.as_mut_ptr());
            assert!(matches!(result, Err(AllocError::OutOfBoundsAddress { .. })));
        });
    }

    #[test]
    fn test_coalescing_forward_and_backward() {
        with_free_list(1024, PlacementPolicy::FirstFit, |list| unsafe {
            let a = list.allocate(layout(100)).unwrap();
            let b = list.allocate(layout(100)).unwrap();
            let _guard = list.allocate(layout(16)).unwrap();

            // Free in both orders across two runs of this pattern: first
            // A then B (B merges backward into A) ...
            list.deallocate(a).unwrap();
            list.deallocate(b).unwrap();

            // One request spanning both payloads now fits in the merged
            // block and lands exactly where A was.
            let merged = list.allocate(layout(224)).unwrap();
            assert_eq!(merged, a);

            list.deallocate(merged).unwrap();

            // ... then re-create and free B before A (A merges forward).
            let a2 = list.allocate(layout(100)).unwrap();
            let b2 = list.allocate(layout(100)).unwrap();
            assert_eq!((a2, b2), (a, b));
            list.deallocate(b2).unwrap();
            list.deallocate(a2).unwrap();

            let merged = list.allocate(layout(224)).unwrap();
            assert_eq!(merged, a);
        });
    }

    #[test]
    fn test_free_middle_block_merges_both_neighbors() {
        with_free_list(2048, PlacementPolicy::FirstFit, |list| unsafe {
            let a = list.allocate(layout(64)).unwrap();
            let b = list.allocate(layout(64)).unwrap();
            let c = list.allocate(layout(64)).unwrap();
            let _guard = list.allocate(layout(16)).unwrap();

            list.deallocate(a).unwrap();
            list.deallocate(c).unwrap();
            // Freeing b closes both gaps in a single call.
            list.deallocate(b).unwrap();

            let merged = list.allocate(layout(208)).unwrap();
            assert_eq!(merged, a);
        });
    }

    /// Builds a free list holding blocks of roughly 100, 50, and 200
    /// payload bytes, in ascending address order, separated by live guards.
    unsafe fn carve_fragments(list: &mut FreeListAllocator) -> (*mut u8, *mut u8, *mut u8) {
        unsafe {
            let a = list.allocate(layout(100)).unwrap();
            let _g1 = list.allocate(layout(16)).unwrap();
            let b = list.allocate(layout(50)).unwrap();
            let _g2 = list.allocate(layout(16)).unwrap();
            let c = list.allocate(layout(200)).unwrap();
            let _g3 = list.allocate(layout(16)).unwrap();

            list.deallocate(a).unwrap();
            list.deallocate(b).unwrap();
            list.deallocate(c).unwrap();
            (a, b, c)
        }
    }

    #[test]
    fn test_first_fit_takes_first_sufficient_block() {
        with_free_list(2048, PlacementPolicy::FirstFit, |list| unsafe {
            let (a, _b, _c) = carve_fragments(list);

            // The 100-block is first in address order and large enough.
            let ptr = list.allocate(layout(40)).unwrap();
            assert_eq!(ptr, a);
        });
    }

    #[test]
    fn test_best_fit_takes_tightest_block() {
        with_free_list(2048, PlacementPolicy::BestFit, |list| unsafe {
            let (_a, b, _c) = carve_fragments(list);

            // The 50-block leaves the smallest remainder.
            let ptr = list.allocate(layout(40)).unwrap();
            assert_eq!(ptr, b);
        });
    }

    #[test]
    fn test_first_fit_skips_too_small_blocks() {
        with_free_list(2048, PlacementPolicy::FirstFit, |list| unsafe {
            let small = list.allocate(layout(24)).unwrap();
            let _guard = list.allocate(layout(16)).unwrap();
            list.deallocate(small).unwrap();

            // Too big for the freed hole; must come from the tail.
            let big = list.allocate(layout(256)).unwrap();
            assert!(big > small);

            // The hole is still available for a matching request.
            let reused = list.allocate(layout(24)).unwrap();
            assert_eq!(reused, small);
        });
    }

    #[test]
    fn test_used_accounting_balances() {
        with_free_list(2048, PlacementPolicy::FirstFit, |list| unsafe {
            let ptrs: Vec<_> = (0..6)
                .map(|i| list.allocate(layout(32 * (i + 1))).unwrap())
                .collect();
            assert!(list.used() > 0);

            for ptr in ptrs {
                list.deallocate(ptr).unwrap();
            }
            assert_eq!(list.used(), 0);

            // Everything coalesced back: the full buffer is allocatable.
            let all = list.allocate(layout(list.capacity() - 16)).unwrap();
            assert!(!all.is_null());
        });
    }

    #[test]
    fn test_reallocate_copies_and_frees() {
        with_free_list(2048, PlacementPolicy::FirstFit, |list| unsafe {
            let ptr = list.allocate(layout(64)).unwrap();
            ptr.write_bytes(0x5A, 64);
            let used_before = list.used();

            let grown = list.reallocate(ptr, 64, layout(128)).unwrap();
            for i in 0..64 {
                assert_eq!(grown.add(i).read(), 0x5A);
            }
            // The old block was freed, not leaked.
            assert!(list.used() > used_before);
            list.deallocate(grown).unwrap();
            assert_eq!(list.used(), 0);
        });
    }

    #[test]
    fn test_reallocate_null_allocates() {
        with_free_list(1024, PlacementPolicy::FirstFit, |list| unsafe {
            let ptr = list.reallocate(ptr::null_mut(), 0, layout(64)).unwrap();
            assert!(!ptr.is_null());
        });
    }

    #[test]
    fn test_reset_round_trip_returns_identical_addresses() {
        with_free_list(2048, PlacementPolicy::BestFit, |list| {
            let sizes = [64_usize, 24, 128, 48];
            let first: Vec<_> = sizes.iter().map(|&s| list.allocate(layout(s)).unwrap()).collect();

            list.deallocate_all();
            assert_eq!(list.used(), 0);

            let second: Vec<_> = sizes.iter().map(|&s| list.allocate(layout(s)).unwrap()).collect();
            assert_eq!(first, second);
        });
    }

    #[test]
    fn test_zeroed_allocation() {
        with_free_list(1024, PlacementPolicy::FirstFit, |list| unsafe {
            let dirty = list.allocate(layout(64)).unwrap();
            dirty.write_bytes(0xAA, 64);
            list.deallocate(dirty).unwrap();

            let ptr = list.allocate_zeroed(layout(64)).unwrap();
            for i in 0..64 {
                assert_eq!(ptr.add(i).read(), 0);
            }
        });
    }

    #[test]
    fn test_small_requests_are_padded_to_node_granularity() {
        with_free_list(1024, PlacementPolicy::FirstFit, |list| {
            // A 1-byte request still consumes a node-sized block.
            let before = list.used();
            let _ptr = list.allocate(Layout::from_size_align(1, 1).unwrap()).unwrap();
            assert!(list.used() >= before + size_of::<FreeNode>());
        });
    }
}
