//! # Reaching directory and table memory
//!
//! The paging code never dereferences a physical frame on its own. It asks a
//! [`TableAccess`] for a typed view of the frame:
//!
//! - [`RecursiveWindow`] is what the kernel uses. Before paging is enabled
//!   physical addresses are used as-is. Afterwards the loaded directory is
//!   reached through its own [`RECURSIVE_SLOT`]:
//!
//!   ```text
//!   directory            0xFFFF_F000
//!   table behind slot s  0xFFC0_0000 | s << 12
//!   ```
//!
//!   Frames below the identity-mapped shared region stay reachable directly,
//!   which is how directories that are not loaded get edited.
//! - [`FrameArena`] keeps tables in heap boxes keyed by frame number and
//!   rejects frames outside its range. Hosted tests run on it.

use crate::table::{DirectoryIndex, PageDirectory, PageTable, RECURSIVE_SLOT};
use crate::PageEntry;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use kernel_memory_addresses::FrameNumber;

/// Errors reported by a [`TableAccess`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TableAccessError {
    #[error("frame {frame} is not reachable as a paging structure")]
    FrameOutOfRange { frame: FrameNumber },
}

/// Typed access to the frames that hold directories and tables.
pub trait TableAccess {
    /// The directory stored in frame `directory`.
    ///
    /// # Errors
    /// [`TableAccessError::FrameOutOfRange`] if the frame cannot be reached.
    fn directory_mut(
        &mut self,
        directory: FrameNumber,
    ) -> Result<&mut PageDirectory, TableAccessError>;

    /// The table stored in frame `table`, linked from `slot` of `directory`.
    ///
    /// # Errors
    /// [`TableAccessError::FrameOutOfRange`] if the frame cannot be reached.
    fn table_mut(
        &mut self,
        directory: FrameNumber,
        slot: DirectoryIndex,
        table: FrameNumber,
    ) -> Result<&mut PageTable, TableAccessError>;

    /// Called after `directory` was written to CR3.
    fn directory_loaded(&mut self, _directory: FrameNumber) {}

    /// Called after CR0.PG was set.
    fn paging_enabled(&mut self) {}
}

/// Virtual address of the loaded directory through the recursive slot.
pub const RECURSIVE_DIRECTORY: u32 = 0xFFFF_F000;

/// Virtual base of the tables of the loaded directory through the recursive slot.
pub const RECURSIVE_TABLES: u32 = 0xFFC0_0000;

const _: () = assert!(RECURSIVE_TABLES == (RECURSIVE_SLOT.as_usize() as u32) << 22);

/// Address of the table behind `slot` in the recursive window.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn recursive_table_address(slot: DirectoryIndex) -> u32 {
    RECURSIVE_TABLES | ((slot.as_usize() as u32) << 12)
}

/// [`TableAccess`] for the running kernel.
pub struct RecursiveWindow {
    identity_frames: u32,
    loaded: Option<FrameNumber>,
    paging: bool,
}

impl RecursiveWindow {
    /// Creates the window.
    ///
    /// `identity_frames` is the number of frames, starting at frame 0, that
    /// every address space maps 1:1.
    ///
    /// # Safety
    /// Every frame handed to [`TableAccess`] methods must be RAM owned by the
    /// paging code, and `identity_frames` must not exceed the shared region.
    #[must_use]
    pub const unsafe fn new(identity_frames: u32) -> Self {
        Self {
            identity_frames,
            loaded: None,
            paging: false,
        }
    }

    fn address_of(
        &self,
        directory: FrameNumber,
        recursive: u32,
        frame: FrameNumber,
    ) -> Result<usize, TableAccessError> {
        if !self.paging || frame.as_u32() < self.identity_frames {
            return Ok(frame.base().as_u32() as usize);
        }
        if self.loaded == Some(directory) {
            return Ok(recursive as usize);
        }
        Err(TableAccessError::FrameOutOfRange { frame })
    }
}

impl TableAccess for RecursiveWindow {
    fn directory_mut(
        &mut self,
        directory: FrameNumber,
    ) -> Result<&mut PageDirectory, TableAccessError> {
        let addr = self.address_of(directory, RECURSIVE_DIRECTORY, directory)?;
        // SAFETY: the address is either identity-mapped RAM or the recursive
        // view of the loaded directory (see `new`).
        Ok(unsafe { &mut *(addr as *mut PageDirectory) })
    }

    fn table_mut(
        &mut self,
        directory: FrameNumber,
        slot: DirectoryIndex,
        table: FrameNumber,
    ) -> Result<&mut PageTable, TableAccessError> {
        let addr = self.address_of(directory, recursive_table_address(slot), table)?;
        // SAFETY: see `directory_mut`.
        Ok(unsafe { &mut *(addr as *mut PageTable) })
    }

    fn directory_loaded(&mut self, directory: FrameNumber) {
        self.loaded = Some(directory);
    }

    fn paging_enabled(&mut self) {
        self.paging = true;
    }
}

/// Heap-backed stand-in for physical memory holding paging structures.
///
/// Frames are materialized on first access and filled with a junk pattern,
/// like RAM that was never cleared.
pub struct FrameArena {
    first: FrameNumber,
    count: u32,
    frames: BTreeMap<FrameNumber, Box<PageTable>>,
}

impl FrameArena {
    /// Pattern of a frame that was never written.
    pub const JUNK: PageEntry = PageEntry::from_bits(0xDEAD_BEEF);

    /// Accepts the frames `[first, first + count)`.
    #[must_use]
    pub const fn new(first: FrameNumber, count: u32) -> Self {
        Self {
            first,
            count,
            frames: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, frame: FrameNumber) -> bool {
        frame >= self.first && frame - self.first < self.count
    }

    /// The table stored in `frame`, if it was ever touched.
    #[must_use]
    pub fn get(&self, frame: FrameNumber) -> Option<&PageTable> {
        self.frames.get(&frame).map(AsRef::as_ref)
    }

    /// Number of frames touched so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn frame_mut(&mut self, frame: FrameNumber) -> Result<&mut PageTable, TableAccessError> {
        if !self.contains(frame) {
            return Err(TableAccessError::FrameOutOfRange { frame });
        }
        Ok(self
            .frames
            .entry(frame)
            .or_insert_with(|| Box::new(PageTable::filled(Self::JUNK))))
    }
}

impl TableAccess for FrameArena {
    fn directory_mut(
        &mut self,
        directory: FrameNumber,
    ) -> Result<&mut PageDirectory, TableAccessError> {
        Ok(self.frame_mut(directory)?.as_directory_mut())
    }

    fn table_mut(
        &mut self,
        _directory: FrameNumber,
        _slot: DirectoryIndex,
        table: FrameNumber,
    ) -> Result<&mut PageTable, TableAccessError> {
        self.frame_mut(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableIndex;

    #[test]
    fn recursive_addresses() {
        assert_eq!(recursive_table_address(DirectoryIndex::new(0)), 0xFFC0_0000);
        assert_eq!(recursive_table_address(DirectoryIndex::new(1)), 0xFFC0_1000);
        // the directory is the "table" behind its own slot
        assert_eq!(recursive_table_address(RECURSIVE_SLOT), RECURSIVE_DIRECTORY);
    }

    #[test]
    fn window_addresses_follow_paging_state() {
        let mut w = unsafe { RecursiveWindow::new(1024) };
        let dir = FrameNumber::new(2048);
        let low = FrameNumber::new(600);
        let slot = DirectoryIndex::new(0x100);

        assert_eq!(w.address_of(dir, RECURSIVE_DIRECTORY, dir), Ok(0x0080_0000));

        w.directory_loaded(dir);
        w.paging_enabled();
        assert_eq!(
            w.address_of(dir, RECURSIVE_DIRECTORY, dir),
            Ok(RECURSIVE_DIRECTORY as usize)
        );
        assert_eq!(
            w.address_of(dir, recursive_table_address(slot), FrameNumber::new(4000)),
            Ok(0xFFD0_0000)
        );
        assert_eq!(w.address_of(dir, 0, low), Ok(0x0025_8000));

        let other = FrameNumber::new(3000);
        assert_eq!(
            w.address_of(other, RECURSIVE_DIRECTORY, other),
            Err(TableAccessError::FrameOutOfRange { frame: other })
        );
    }

    #[test]
    fn arena_bounds_and_junk() {
        let mut arena = FrameArena::new(FrameNumber::new(10), 4);
        assert!(arena.is_empty());
        let t = arena
            .table_mut(FrameNumber::new(0), DirectoryIndex::new(0), FrameNumber::new(13))
            .unwrap();
        assert_eq!(t.get(TableIndex::new(7)), FrameArena::JUNK);
        t.set(TableIndex::new(7), PageEntry::not_present());

        assert_eq!(
            arena.get(FrameNumber::new(13)).unwrap().get(TableIndex::new(7)),
            PageEntry::not_present()
        );
        assert_eq!(
            arena.directory_mut(FrameNumber::new(14)).err(),
            Some(TableAccessError::FrameOutOfRange {
                frame: FrameNumber::new(14)
            })
        );
        assert_eq!(arena.len(), 1);
    }
}
