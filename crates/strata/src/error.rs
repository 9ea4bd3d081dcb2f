//! Error types shared by every allocation strategy.

use snafu::Snafu;

/// Errors surfaced by the allocation strategies in this crate.
///
/// Every failure is reported to the immediate caller; no operation retries
/// internally. [`OutOfMemory`](Self::OutOfMemory) is the only recoverable
/// kind (the caller may free memory and retry); the remaining kinds signal
/// caller misuse and should be treated as programming errors.
#[derive(Debug, Snafu, Clone, Copy, PartialEq, Eq)]
#[snafu(module, visibility(pub(crate)))]
pub enum AllocError {
    /// No free region, chunk, or offset satisfies the request.
    #[snafu(display("out of memory: no free region holds {size} bytes aligned to {align}"))]
    OutOfMemory {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },

    /// An address passed to `deallocate` or `reallocate` does not lie within
    /// the backing buffer owned by this allocator.
    #[snafu(display("address {addr:#x} is outside the backing buffer"))]
    OutOfBoundsAddress {
        /// The offending address.
        addr: usize,
    },

    /// A stack deallocation targeted a block that is not the most recently
    /// allocated live block.
    #[snafu(display("deallocation of {addr:#x} violates LIFO order"))]
    OutOfOrderFree {
        /// Address of the block whose free was out of order.
        addr: usize,
    },

    /// The strategy cannot perform the requested operation
    /// (pool allocators do not reallocate).
    #[snafu(display("operation is not supported by this allocation strategy"))]
    UnsupportedOperation,

    /// An alignment argument was not a power of two.
    #[snafu(display("alignment {align} is not a power of two"))]
    InvalidAlignment {
        /// The offending alignment.
        align: usize,
    },
}

/// Short-hand result type for allocator operations.
pub type Result<T, E = AllocError> = core::result::Result<T, E>;
