//! # Address Space (i386, two-level)
//!
//! One page directory plus the VM pools registered against it.
//!
//! ## Highlights
//!
//! - [`AddressSpace::new`] builds a directory that identity-maps the shared
//!   region through its first table and maps itself through
//!   [`RECURSIVE_SLOT`].
//! - [`AddressSpace::handle_fault`] backs a page on first touch, creating
//!   the page table first if the directory slot is empty.
//! - [`AddressSpace::free_page`] gives a page's frame back to its pool.
//! - [`AddressSpace::allocate`] / [`AddressSpace::release`] manage regions of
//!   the registered [`VmPool`]s.
//! - [`AddressSpace::translate`] walks the tables for a VA.
//!
//! Every method takes the shared [`Paging`] state explicitly.

use crate::fault::{FaultResolution, PageFault, PageFaultError};
use crate::mmu::Mmu;
use crate::paging::{Paging, PagingError};
use crate::table::{DirectoryIndex, RECURSIVE_SLOT, TableIndex, split_indices};
use crate::table_access::TableAccess;
use crate::vm_pool::{Region, VmPool, VmPoolError};
use crate::PageEntry;
use alloc::vec::Vec;
use kernel_alloc::PoolId;
use kernel_memory_addresses::{ENTRIES_PER_TABLE, FrameNumber, PhysicalAddress, VirtualAddress};
use kernel_registers::InterruptGuard;
use log::{debug, info, warn};

/// Handle of a VM pool registered with an [`AddressSpace`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VmPoolId(usize);

impl VmPoolId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A page directory and its VM pools.
#[derive(Debug)]
pub struct AddressSpace {
    directory: FrameNumber,
    pools: Vec<VmPool>,
}

impl AddressSpace {
    /// Builds a new directory.
    ///
    /// Allocates the directory and its first table from the configured table
    /// pool. The first table identity-maps the shared region; every other
    /// directory slot is empty except [`RECURSIVE_SLOT`], which points back
    /// at the directory.
    ///
    /// # Errors
    /// Frame exhaustion or unreachable table memory. Nothing stays allocated
    /// on failure.
    pub fn new<T: TableAccess, M: Mmu>(paging: &mut Paging<T, M>) -> Result<Self, PagingError> {
        let source = paging.config.table_pool();
        let directory = paging.frames.get_frames(source, 1)?;
        let table = match paging.frames.get_frames(source, 1) {
            Ok(table) => table,
            Err(e) => {
                Self::give_back(paging, &[directory]);
                return Err(e.into());
            }
        };

        if let Err(e) = Self::write_initial_tables(paging, directory, table) {
            Self::give_back(paging, &[table, directory]);
            return Err(e);
        }

        info!(
            "address space: directory {}, first table {}, {} shared page(s)",
            directory.base(),
            table.base(),
            paging.config.shared_pages()
        );
        Ok(Self {
            directory,
            pools: Vec::new(),
        })
    }

    /// Returns frames taken by a construction that failed half way. The
    /// construction error is what the caller reports.
    fn give_back<T: TableAccess, M: Mmu>(paging: &mut Paging<T, M>, frames: &[FrameNumber]) {
        for &frame in frames {
            if let Err(e) = paging.frames.release_frames(frame) {
                warn!("address space cleanup: frame {frame} not returned: {e}");
            }
        }
    }

    fn write_initial_tables<T: TableAccess, M: Mmu>(
        paging: &mut Paging<T, M>,
        directory: FrameNumber,
        table: FrameNumber,
    ) -> Result<(), PagingError> {
        let first = DirectoryIndex::new(0);
        let shared = paging.config.shared_pages() as usize;

        let pt = paging.tables.table_mut(directory, first, table)?;
        for i in 0..ENTRIES_PER_TABLE {
            #[allow(clippy::cast_possible_truncation)]
            let entry = if i < shared {
                PageEntry::present_frame(FrameNumber::new(i as u32))
            } else {
                PageEntry::not_present()
            };
            #[allow(clippy::cast_possible_truncation)]
            pt.set(TableIndex::new(i as u16), entry);
        }

        let pd = paging.tables.directory_mut(directory)?;
        pd.fill(PageEntry::not_present());
        pd.set(first, PageEntry::present_frame(table));
        pd.set(RECURSIVE_SLOT, PageEntry::present_frame(directory));
        Ok(())
    }

    /// Frame holding the page directory.
    #[inline]
    #[must_use]
    pub const fn directory_frame(&self) -> FrameNumber {
        self.directory
    }

    /// Makes this the current address space (writes CR3).
    pub fn load<T: TableAccess, M: Mmu>(&self, paging: &mut Paging<T, M>) {
        paging.loaded = Some(self.directory);
        paging.tables.directory_loaded(self.directory);
        paging.mmu.load_directory(self.directory.base());
        debug!("loaded directory {}", self.directory.base());
    }

    /// Whether this space is the one in CR3.
    #[must_use]
    pub fn is_loaded<T: TableAccess, M: Mmu>(&self, paging: &Paging<T, M>) -> bool {
        paging.loaded == Some(self.directory)
    }

    /// Resolves a page fault at `fault.address`.
    ///
    /// When at least one VM pool is registered the address must lie inside
    /// one of them. Pages are always backed from the process pool.
    ///
    /// # Errors
    /// - [`PageFaultError::ProtectionViolation`] for faults on present pages.
    /// - [`PageFaultError::Illegitimate`] for addresses outside every pool
    ///   and for the recursive table window; nothing is mapped.
    /// - [`PageFaultError::OutOfMemory`] if no frame is left for the table or
    ///   the page.
    pub fn handle_fault<T: TableAccess, M: Mmu>(
        &mut self,
        paging: &mut Paging<T, M>,
        fault: PageFault,
    ) -> Result<FaultResolution, PageFaultError> {
        let address = fault.address;
        if fault.code.present() {
            return Err(PageFaultError::ProtectionViolation {
                address,
                code: fault.code,
            });
        }

        let (di, ti) = split_indices(address);
        if di == RECURSIVE_SLOT
            || !(self.pools.is_empty() || self.pools.iter().any(|p| p.is_legitimate(address)))
        {
            return Err(PageFaultError::Illegitimate { address });
        }

        let _guard = InterruptGuard::new();

        let pde = paging.tables.directory_mut(self.directory)?.get(di);
        let (table, table_created) = if pde.present() {
            (pde.frame(), false)
        } else {
            let table = paging.frames.get_frames(paging.config.table_pool(), 1)?;
            paging
                .tables
                .directory_mut(self.directory)?
                .set(di, PageEntry::present_frame(table));
            paging
                .tables
                .table_mut(self.directory, di, table)?
                .fill(PageEntry::not_present());
            (table, true)
        };

        let pt = paging.tables.table_mut(self.directory, di, table)?;
        if pt.get(ti).present() {
            paging.mmu.flush_tlb();
            debug!("fault at {address}: already mapped");
            return Ok(FaultResolution::AlreadyMapped);
        }

        let frame = paging.frames.get_frames(paging.config.process_pool, 1)?;
        pt.set(ti, PageEntry::present_frame(frame));

        debug!(
            "fault at {address} ({}): mapped frame {frame}, new table: {table_created}",
            fault.code.explain()
        );
        Ok(FaultResolution::Mapped {
            table_created,
            frame,
        })
    }

    /// Registers `pool` for fault validation; pools are consulted in
    /// registration order.
    ///
    /// # Errors
    /// - [`PagingError::ForeignFramePool`] unless the pool is backed by the
    ///   process pool.
    /// - [`VmPoolError::SharedOverlap`] if the span overlaps the
    ///   identity-mapped shared region.
    pub fn register_pool<T: TableAccess, M: Mmu>(
        &mut self,
        paging: &Paging<T, M>,
        pool: VmPool,
    ) -> Result<VmPoolId, PagingError> {
        if pool.frame_pool() != paging.config.process_pool {
            return Err(PagingError::ForeignFramePool {
                pool: pool.frame_pool(),
            });
        }
        let shared = paging.config.shared_size;
        if pool.base().as_u32() < shared {
            return Err(VmPoolError::SharedOverlap { shared }.into());
        }

        let id = VmPoolId(self.pools.len());
        info!(
            "vm pool {} registered: {}..+{:#x}, frames from pool {}",
            id.0,
            pool.base(),
            pool.size(),
            pool.frame_pool().index()
        );
        self.pools.push(pool);
        Ok(id)
    }

    /// Creates a [`VmPool`] and registers it.
    ///
    /// # Errors
    /// Whatever [`VmPool::new`] and [`AddressSpace::register_pool`] report.
    pub fn create_pool<T: TableAccess, M: Mmu>(
        &mut self,
        paging: &Paging<T, M>,
        base: VirtualAddress,
        size: u32,
        frame_pool: PoolId,
    ) -> Result<VmPoolId, PagingError> {
        self.register_pool(paging, VmPool::new(base, size, frame_pool)?)
    }

    #[must_use]
    pub fn pool(&self, id: VmPoolId) -> Option<&VmPool> {
        self.pools.get(id.0)
    }

    /// Registered pools, in registration order.
    #[must_use]
    pub fn pools(&self) -> &[VmPool] {
        &self.pools
    }

    /// Allocates a region of at least `size` bytes in pool `id`.
    ///
    /// # Errors
    /// [`PagingError::UnknownVmPool`], or what [`VmPool::allocate`] reports.
    pub fn allocate(&mut self, id: VmPoolId, size: u32) -> Result<VirtualAddress, PagingError> {
        let pool = self.pools.get_mut(id.0).ok_or(PagingError::UnknownVmPool)?;
        Ok(pool.allocate(size)?)
    }

    /// Releases the region of pool `id` that starts at `start` and frees
    /// every page behind it.
    ///
    /// A `start` that is not the base of a region is ignored and yields
    /// `Ok(None)`. The region leaves the pool only once every page is freed;
    /// after a failure it stays allocated.
    ///
    /// # Errors
    /// [`PagingError::UnknownVmPool`], or a failure while freeing a page.
    pub fn release<T: TableAccess, M: Mmu>(
        &mut self,
        paging: &mut Paging<T, M>,
        id: VmPoolId,
        start: VirtualAddress,
    ) -> Result<Option<Region>, PagingError> {
        let pool = self.pools.get(id.0).ok_or(PagingError::UnknownVmPool)?;
        let Some(region) = pool.region_at(start) else {
            warn!("release of {start}: no region starts there");
            return Ok(None);
        };

        let mut freed = 0;
        for page in region.page_addresses() {
            if self.free_page(paging, page)? {
                freed += 1;
            }
        }
        self.pools[id.0].take_region(start);
        debug!(
            "released region {}..+{:#x}, {freed} of {} page(s) were backed",
            region.base(),
            region.size(),
            region.pages()
        );
        Ok(Some(region))
    }

    /// Unmaps the page containing `va` and returns its frame to the owning
    /// pool. Returns whether a page was mapped.
    ///
    /// The TLB is flushed if this space is loaded.
    ///
    /// # Errors
    /// - [`PagingError::ProtectedPage`] for the shared region and the
    ///   recursive table window, whose frames the fault handler never handed
    ///   out.
    /// - Unreachable tables, or a frame no registered pool owns.
    pub fn free_page<T: TableAccess, M: Mmu>(
        &mut self,
        paging: &mut Paging<T, M>,
        va: VirtualAddress,
    ) -> Result<bool, PagingError> {
        let (di, ti) = split_indices(va);
        if va.as_u32() < paging.config.shared_size || di == RECURSIVE_SLOT {
            return Err(PagingError::ProtectedPage { address: va });
        }

        let _guard = InterruptGuard::new();
        let pde = paging.tables.directory_mut(self.directory)?.get(di);
        if !pde.present() {
            return Ok(false);
        }
        let pt = paging.tables.table_mut(self.directory, di, pde.frame())?;
        let pte = pt.get(ti);
        if !pte.present() {
            return Ok(false);
        }

        paging.frames.release_frames(pte.frame())?;
        pt.set(ti, PageEntry::not_present());
        if paging.loaded == Some(self.directory) {
            paging.mmu.flush_tlb();
        }
        Ok(true)
    }

    /// Physical address `va` maps to, if any.
    pub fn translate<T: TableAccess, M: Mmu>(
        &self,
        paging: &mut Paging<T, M>,
        va: VirtualAddress,
    ) -> Option<PhysicalAddress> {
        let (di, ti) = split_indices(va);
        let pde = paging.tables.directory_mut(self.directory).ok()?.get(di);
        if !pde.present() {
            return None;
        }
        let pte = paging
            .tables
            .table_mut(self.directory, di, pde.frame())
            .ok()?
            .get(ti);
        pte.present().then(|| pte.physical_address() + va.offset())
    }
}
