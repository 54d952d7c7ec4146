//! # i386 Page Directory and Page Table
//!
//! Both levels of classic 32-bit paging are a 4 KiB-aligned array of 1024
//! [`PageEntry`] values:
//!
//! - [`DirectoryIndex`]: VA bits `[31:22]`, selects a directory slot.
//! - [`TableIndex`]: VA bits `[21:12]`, selects a table entry.
//! - [`PageTable`]: 1024 PTEs, each mapping one 4 KiB page.
//! - [`PageDirectory`]: 1024 PDEs, each pointing at a [`PageTable`].
//!
//! Slot [`RECURSIVE_SLOT`] of every directory points back at the directory
//! itself, which makes the directory and all of its tables visible in the
//! top 4 MiB of the address space once paging is on.

use crate::PageEntry;
use kernel_memory_addresses::{ENTRIES_PER_TABLE, VirtualAddress};

/// Directory slot that maps the directory onto itself.
pub const RECURSIVE_SLOT: DirectoryIndex = DirectoryIndex::new(1023);

/// Index into the page directory (VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DirectoryIndex(u16);

/// Index into a page table (VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl DirectoryIndex {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new((va.as_u32() >> 22) as u16)
    }

    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// First virtual address covered by this slot.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new((self.0 as u32) << 22)
    }
}

impl TableIndex {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(((va.as_u32() >> 12) & 0x3FF) as u16)
    }

    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Split a virtual address into its directory and table indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (DirectoryIndex, TableIndex) {
    (DirectoryIndex::from(va), TableIndex::from(va))
}

/// A page table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntry; ENTRIES_PER_TABLE],
}

/// The page directory: a [`PageTable`]-shaped array of PDEs.
#[doc(alias = "PD")]
#[repr(transparent)]
pub struct PageDirectory(PageTable);

impl PageTable {
    /// Every entry set to `entry`.
    #[inline]
    #[must_use]
    pub const fn filled(entry: PageEntry) -> Self {
        Self {
            entries: [entry; ENTRIES_PER_TABLE],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageEntry {
        self.entries[i.as_usize()]
    }

    /// Caller must handle any required TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageEntry) {
        self.entries[i.as_usize()] = e;
    }

    pub fn fill(&mut self, e: PageEntry) {
        self.entries.fill(e);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageEntry> {
        self.entries.iter()
    }

    /// Reinterprets this table as a directory.
    #[inline]
    pub const fn as_directory_mut(&mut self) -> &mut PageDirectory {
        // SAFETY: PageDirectory is repr(transparent) over PageTable.
        unsafe { &mut *core::ptr::from_mut(self).cast::<PageDirectory>() }
    }
}

impl PageDirectory {
    #[inline]
    #[must_use]
    pub const fn get(&self, i: DirectoryIndex) -> PageEntry {
        self.0.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: DirectoryIndex, e: PageEntry) {
        self.0.entries[i.as_usize()] = e;
    }

    pub fn fill(&mut self, e: PageEntry) {
        self.0.fill(e);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageEntry> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::FrameNumber;

    #[test]
    fn indices_split_the_address() {
        let (d, t) = split_indices(VirtualAddress::new(0x4080_3123));
        assert_eq!(d.as_usize(), 0x102);
        assert_eq!(t.as_usize(), 0x003);
        assert_eq!(d.base(), VirtualAddress::new(0x4080_0000));

        let (d, t) = split_indices(VirtualAddress::new(0xFFFF_FFFF));
        assert_eq!(d, RECURSIVE_SLOT);
        assert_eq!(t.as_usize(), 1023);
    }

    #[test]
    fn table_is_one_frame() {
        assert_eq!(size_of::<PageTable>(), 4096);
        assert_eq!(align_of::<PageTable>(), 4096);
        assert_eq!(size_of::<PageDirectory>(), 4096);
    }

    #[test]
    fn directory_view_shares_storage() {
        let mut t = PageTable::filled(PageEntry::not_present());
        t.as_directory_mut()
            .set(DirectoryIndex::new(5), PageEntry::present_frame(FrameNumber::new(9)));
        assert_eq!(t.get(TableIndex::new(5)).frame(), FrameNumber::new(9));
        assert_eq!(t.iter().filter(|e| e.present()).count(), 1);
    }
}
