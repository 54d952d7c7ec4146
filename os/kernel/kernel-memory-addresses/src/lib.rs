//! # Physical and Virtual Memory Address Types (i386)
//!
//! Strongly typed wrappers for raw 32-bit addresses and frame numbers used by
//! the frame allocator and the two-level paging code.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 32-bit address, either physical or virtual. |
//! | [`PhysicalAddress`] | Refers to physical memory (RAM / MMIO). |
//! | [`VirtualAddress`] | Refers to paging-translated memory. |
//! | [`FrameNumber`] | Absolute index of a 4 KiB physical frame (`pa >> 12`). |
//!
//! With classic (non-PAE) i386 paging every page and every frame is 4 KiB,
//! so unlike the x86-64 variant there is no page-size marker type; the layout
//! constants below are the whole story:
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x4000_1234);
//! assert_eq!(va.page_base().as_u32(), 0x4000_1000);
//! assert_eq!(va.offset(), 0x234);
//!
//! let frame = FrameNumber::new(0x200);
//! assert_eq!(frame.base().as_u32(), 0x20_0000);
//! assert_eq!(PhysicalAddress::new(0x20_0FFF).frame(), frame);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod frame_number;
mod physical_address;
mod virtual_address;

pub use crate::frame_number::FrameNumber;
pub use crate::physical_address::PhysicalAddress;
pub use crate::virtual_address::VirtualAddress;

use core::fmt;

/// log2 of the page size.
pub const PAGE_SHIFT: u32 = 12;

/// Size of a virtual page in bytes.
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;

/// Size of a physical frame in bytes. Frames and pages are the same size.
pub const FRAME_SIZE: u32 = PAGE_SIZE;

/// Frames in the 4 GiB physical address space; the highest frame number
/// an entry can hold is `FRAME_COUNT - 1`.
pub const FRAME_COUNT: u32 = 1 << (32 - PAGE_SHIFT);

/// Number of 32-bit entries in a page directory or page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes of virtual address space covered by a single page table (4 MiB).
pub const TABLE_SPAN: u32 = PAGE_SIZE * ENTRIES_PER_TABLE as u32;

/// Principal raw memory address ([virtual](VirtualAddress) or [physical](PhysicalAddress)).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryAddress(u32);

impl MemoryAddress {
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The address with the in-page offset cleared.
    #[inline]
    #[must_use]
    pub const fn page_base(self) -> Self {
        Self(align_down(self.0, PAGE_SIZE))
    }

    /// The offset of this address inside its 4 KiB page.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0 & (PAGE_SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.offset() == 0
    }

    /// Adds `rhs` bytes, returning `None` if the result leaves the 32-bit space.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryAddress(0x{:08X})", self.0)
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Align `x` down to the nearest multiple of `a`.
///
/// ### Preconditions
/// - `a` must be **non-zero** and a **power of two**.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(0,    4096), 0);
/// assert_eq!(align_down(4095, 4096), 0);
/// assert_eq!(align_down(4096, 4096), 4096);
/// assert_eq!(align_down(8191, 4096), 4096);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u32, a: u32) -> u32 {
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a`.
///
/// Returns `None` when the aligned value does not fit into 32 bits.
///
/// ### Preconditions
/// - `a` must be **non-zero** and a **power of two**.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::align_up;
/// assert_eq!(align_up(0,    4096), Some(0));
/// assert_eq!(align_up(1,    4096), Some(4096));
/// assert_eq!(align_up(4096, 4096), Some(4096));
/// assert_eq!(align_up(4097, 4096), Some(8192));
/// assert_eq!(align_up(u32::MAX, 4096), None);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: u32, a: u32) -> Option<u32> {
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}

/// Number of whole pages needed to hold `bytes` bytes.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u32) -> u32 {
    bytes.div_ceil(PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_constants_agree() {
        assert_eq!(PAGE_SIZE, 4096);
        assert_eq!(TABLE_SPAN, 4 * 1024 * 1024);
        assert_eq!(ENTRIES_PER_TABLE * 4, PAGE_SIZE as usize);
    }

    #[test]
    fn pages_for_rounds_up() {
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(PAGE_SIZE), 1);
        assert_eq!(pages_for(PAGE_SIZE + 1), 2);
        assert_eq!(pages_for(u32::MAX), 1 << 20);
    }

    #[test]
    fn checked_add_stops_at_4g() {
        let a = MemoryAddress::new(0xFFFF_F000);
        assert_eq!(a.checked_add(0xFFF), Some(MemoryAddress::new(0xFFFF_FFFF)));
        assert_eq!(a.checked_add(0x1000), None);
    }
}
