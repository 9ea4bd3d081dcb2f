//! Address alignment and header-padding arithmetic.
//!
//! Every strategy in this crate places allocations at aligned addresses and,
//! for the header-carrying strategies, reserves room for the header inside
//! the padding that precedes the payload. The functions here are pure and
//! operate on plain `usize` addresses so they can be unit tested without any
//! backing memory.

/// Rounds `addr` up to the next multiple of `align`.
///
/// Returns `addr` unchanged when it is already aligned.
///
/// # Panics
///
/// Panics if `align` is not a power of two. A non-power-of-two alignment is
/// a contract violation, not a recoverable condition.
#[must_use]
pub fn align_forward(addr: usize, align: usize) -> usize {
    assert!(align.is_power_of_two(), "alignment must be a power of two");

    let modulo = addr & (align - 1);
    if modulo == 0 { addr } else { addr + (align - modulo) }
}

/// Computes the smallest padding `p` such that `addr + p` is a multiple of
/// `align` and a header of `header_size` bytes fits entirely within the
/// padding region (`p >= header_size`).
///
/// The header is written at `addr + p - header_size`, immediately before the
/// payload at `addr + p`.
///
/// # Panics
///
/// Panics if `align` is not a power of two.
#[must_use]
pub fn padding_with_header(addr: usize, align: usize, header_size: usize) -> usize {
    assert!(align.is_power_of_two(), "alignment must be a power of two");

    let modulo = addr & (align - 1);
    let mut padding = if modulo == 0 { 0 } else { align - modulo };

    if padding < header_size {
        // Round up by whole alignment multiples until the header fits.
        let needed = header_size - padding;
        padding += needed.next_multiple_of(align);
    }

    padding
}
