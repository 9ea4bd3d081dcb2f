//! Allocation strategies that carve a caller-provided memory buffer.
//!
//! This crate provides allocators that manage a fixed region of memory
//! handed to them at construction. They never grow, never call a backing
//! allocator, and are `no_std` compatible, making them suitable for
//! embedded targets, scratch memory, and subsystems that want hard
//! capacity limits.
//!
//! # Available Allocators
//!
//! ## [`ArenaAllocator`]
//!
//! A bump allocator that hands out memory linearly and frees everything
//! at once. Best suited for:
//!
//! - Per-frame or per-request scratch memory
//! - Many small allocations with a shared lifetime
//! - Code that never frees individual allocations
//!
//! **Performance**: O(1) allocation, individual deallocation is a no-op.
//!
//! ## [`StackAllocator`]
//!
//! A bump allocator with per-allocation headers that supports freeing in
//! reverse allocation order. Best suited for:
//!
//! - Nested scopes with strictly last-in first-out lifetimes
//! - Temporary allocations unwound before their parents
//!
//! **Performance**: O(1) allocation and deallocation, 8 bytes of header
//! per allocation.
//!
//! ## [`PoolAllocator`]
//!
//! A fixed-chunk allocator backed by an intrusive free list. Best suited
//! for:
//!
//! - Many objects of one size and alignment
//! - Frequent allocation and release in arbitrary order
//! - Bounding fragmentation to zero
//!
//! **Performance**: O(1) allocation and deallocation, no per-chunk
//! overhead while allocated.
//!
//! ## [`FreeListAllocator`]
//!
//! A general-purpose allocator that maintains an address-ordered list of
//! free blocks with [first-fit or best-fit placement](PlacementPolicy)
//! and neighbor coalescing. Best suited for:
//!
//! - Variable-sized allocations with unpredictable lifetimes
//! - Long-lived heaps where freed memory must be reusable
//!
//! **Performance**: O(n) allocation and deallocation where n is the
//! number of free blocks.
//!
//! # Usage Examples
//!
//! ## Basic `ArenaAllocator` Usage
//!
//! ```rust
//! use core::alloc::Layout;
//!
//! use strata::ArenaAllocator;
//!
//! let mut heap = vec![0u8; 4096]; // Any exclusively owned region works.
//! let mut arena = unsafe { ArenaAllocator::new(heap.as_mut_ptr(), heap.len()) };
//!
//! let layout = Layout::from_size_align(64, 8).unwrap();
//! let ptr = arena.allocate(layout).unwrap();
//! // Use the memory, then release the whole arena at once.
//! let _ = ptr;
//! arena.deallocate_all();
//! assert_eq!(arena.used(), 0);
//! ```
//!
//! ## Strategy-Independent Code via [`BufferAllocator`]
//!
//! ```rust
//! use core::alloc::Layout;
//!
//! use strata::{ArenaAllocator, BufferAllocator, FreeListAllocator, PlacementPolicy};
//!
//! fn fill(alloc: &mut dyn BufferAllocator) -> strata::Result<()> {
//!     let layout = Layout::from_size_align(128, 16).unwrap();
//!     let ptr = alloc.allocate_zeroed(layout)?;
//!     unsafe {
//!         alloc.deallocate(ptr)?;
//!     }
//!     Ok(())
//! }
//!
//! let mut heap = vec![0u8; 4096];
//! let mut arena = unsafe { ArenaAllocator::new(heap.as_mut_ptr(), heap.len()) };
//! fill(&mut arena).unwrap();
//! arena.deallocate_all();
//!
//! let mut list = unsafe {
//!     FreeListAllocator::new(heap.as_mut_ptr(), heap.len(), PlacementPolicy::BestFit).unwrap()
//! };
//! fill(&mut list).unwrap();
//! ```
//!
//! # Design Considerations
//!
//! ## Memory Safety
//!
//! Constructing an allocator over a buffer is `unsafe`: the caller must
//! guarantee the region is valid for reads and writes for the
//! allocator's lifetime and is not used by anything else. Deallocation
//! is `unsafe` because the allocators cannot prove a pointer came from
//! them, though they reject pointers outside their buffer with
//! [`AllocError::OutOfBoundsAddress`].
//!
//! ## Thread Safety
//!
//! The allocators are `Send` but not `Sync`. They can be moved between
//! threads but require external synchronization (e.g., mutexes) for
//! concurrent access.
//!
//! ## Performance Characteristics
//!
//! | Allocator | Allocation | Deallocation | Overhead | Best Use Case |
//! |-----------|------------|--------------|----------|---------------|
//! | [`ArenaAllocator`] | O(1) | bulk only | none | Scratch memory |
//! | [`StackAllocator`] | O(1) | O(1), LIFO | 8 bytes/allocation | Nested scopes |
//! | [`PoolAllocator`] | O(1) | O(1) | none | Uniform objects |
//! | [`FreeListAllocator`] | O(n) | O(n) | 16 bytes/free block | General purpose |

#![cfg_attr(not(test), no_std)]

pub mod align;
mod arena;
mod error;
mod free_list;
mod pool;
mod stack;
mod traits;

pub use self::{
    arena::ArenaAllocator,
    error::{AllocError, Result},
    free_list::{FreeListAllocator, PlacementPolicy},
    pool::PoolAllocator,
    stack::StackAllocator,
    traits::BufferAllocator,
};
