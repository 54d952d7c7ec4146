//! # Virtual-memory pools
//!
//! A [`VmPool`] carves page-granular [`Region`]s out of a virtual span. It
//! only hands out addresses; the pages behind them are backed lazily by
//! the fault handler, and released through
//! [`AddressSpace::release`](crate::AddressSpace::release).
//!
//! ```text
//! base            base + 4K                                   base + size
//! ├───────────────┼──────────┬─────┬────────────┬─────────────┤
//! │ region table  │ region 0 │ gap │ region 1   │    free     │
//! └───────────────┴──────────┴─────┴────────────┴─────────────┘
//! ```
//!
//! The first page of the span is reserved for the region table, so the
//! table is bounded by what fits into one page ([`MAX_REGIONS`]).

use crate::table::RECURSIVE_SLOT;
use alloc::vec::Vec;
use kernel_alloc::PoolId;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress, pages_for};
use log::debug;

/// A contiguous run of allocated pages.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct Region {
    base: VirtualAddress,
    size: u32,
}

impl Region {
    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    /// Size in bytes; always a whole number of pages.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u32 {
        self.size / PAGE_SIZE
    }

    /// First address past the region.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.base.as_u32() + self.size
    }

    /// Base address of every page in the region.
    pub fn page_addresses(&self) -> impl Iterator<Item = VirtualAddress> {
        let base = self.base.as_u32();
        (0..self.pages()).map(move |i| VirtualAddress::new(base + i * PAGE_SIZE))
    }
}

/// Regions that fit into the reserved first page.
#[allow(clippy::cast_possible_truncation)]
pub const MAX_REGIONS: usize = PAGE_SIZE as usize / size_of::<Region>();

/// Errors reported by [`VmPool`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmPoolError {
    #[error("cannot allocate zero bytes")]
    ZeroSize,
    #[error("no gap of {pages} page(s) left in the pool")]
    NoSpace { pages: u32 },
    #[error("region table is full")]
    RegionTableFull,
    #[error("pool base and size must be page aligned")]
    Unaligned,
    #[error("pool must span more than its reserved first page")]
    TooSmall,
    #[error("pool span runs past the end of the address space")]
    Overflow,
    #[error("pool span reaches the recursive table window")]
    RecursiveWindow,
    #[error("pool span overlaps the shared region below {shared:#x}")]
    SharedOverlap { shared: u32 },
}

/// Region tracker for one virtual span.
#[derive(Debug)]
pub struct VmPool {
    base: VirtualAddress,
    size: u32,
    frame_pool: PoolId,
    regions: Vec<Region>,
}

impl VmPool {
    /// Creates a pool over `[base, base + size)` whose pages are backed by
    /// frames from `frame_pool`.
    ///
    /// # Errors
    /// - [`VmPoolError::Unaligned`] if `base` or `size` is not page aligned.
    /// - [`VmPoolError::TooSmall`] if `size` is no more than one page.
    /// - [`VmPoolError::Overflow`] if the span wraps past 4 GiB.
    /// - [`VmPoolError::RecursiveWindow`] if the span reaches the directory
    ///   slot that maps the tables.
    pub fn new(base: VirtualAddress, size: u32, frame_pool: PoolId) -> Result<Self, VmPoolError> {
        if !base.is_page_aligned() || !size.is_multiple_of(PAGE_SIZE) {
            return Err(VmPoolError::Unaligned);
        }
        if size <= PAGE_SIZE {
            return Err(VmPoolError::TooSmall);
        }
        let Some(end) = base.checked_add(size) else {
            return Err(VmPoolError::Overflow);
        };
        if end > RECURSIVE_SLOT.base() {
            return Err(VmPoolError::RecursiveWindow);
        }
        Ok(Self {
            base,
            size,
            frame_pool,
            regions: Vec::new(),
        })
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Frame pool that backs faults inside this span.
    #[inline]
    #[must_use]
    pub const fn frame_pool(&self) -> PoolId {
        self.frame_pool
    }

    /// Allocated regions, sorted by base address.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Whether a region starts exactly at `start`.
    #[must_use]
    pub fn contains_region(&self, start: VirtualAddress) -> bool {
        self.regions.iter().any(|r| r.base == start)
    }

    /// Whether `addr` lies inside the span, reserved page included.
    #[inline]
    #[must_use]
    pub const fn is_legitimate(&self, addr: VirtualAddress) -> bool {
        let a = addr.as_u32();
        let base = self.base.as_u32();
        a >= base && a - base < self.size
    }

    /// Reserves `size` bytes, rounded up to whole pages, and returns the
    /// page-aligned start of the new region.
    ///
    /// The lowest gap that fits wins, searching upwards from the page after
    /// the reserved one.
    ///
    /// # Errors
    /// - [`VmPoolError::ZeroSize`] for `size == 0`.
    /// - [`VmPoolError::RegionTableFull`] if [`MAX_REGIONS`] are allocated.
    /// - [`VmPoolError::NoSpace`] if no gap is large enough.
    pub fn allocate(&mut self, size: u32) -> Result<VirtualAddress, VmPoolError> {
        if size == 0 {
            return Err(VmPoolError::ZeroSize);
        }
        if self.regions.len() >= MAX_REGIONS {
            return Err(VmPoolError::RegionTableFull);
        }

        let pages = pages_for(size);
        let bytes = pages
            .checked_mul(PAGE_SIZE)
            .ok_or(VmPoolError::NoSpace { pages })?;

        let mut cursor = self.base.as_u32() + PAGE_SIZE;
        let mut slot = self.regions.len();
        for (i, r) in self.regions.iter().enumerate() {
            if r.base.as_u32() - cursor >= bytes {
                slot = i;
                break;
            }
            cursor = r.end();
        }

        let end = self.base.as_u32() + self.size;
        if slot == self.regions.len() && end - cursor < bytes {
            return Err(VmPoolError::NoSpace { pages });
        }

        let region = Region {
            base: VirtualAddress::new(cursor),
            size: bytes,
        };
        self.regions.insert(slot, region);
        debug!(
            "vm pool {}: allocated {pages} page(s) at {} ({} regions)",
            self.base,
            region.base,
            self.regions.len()
        );
        Ok(region.base)
    }

    /// The region starting exactly at `start`.
    #[must_use]
    pub fn region_at(&self, start: VirtualAddress) -> Option<Region> {
        self.regions.iter().find(|r| r.base == start).copied()
    }

    /// Removes the region starting exactly at `start`.
    pub(crate) fn take_region(&mut self, start: VirtualAddress) -> Option<Region> {
        let i = self.regions.iter().position(|r| r.base == start)?;
        Some(self.regions.remove(i))
    }
}
