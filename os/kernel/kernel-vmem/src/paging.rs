use crate::mmu::Mmu;
use crate::table_access::{TableAccess, TableAccessError};
use crate::vm_pool::VmPoolError;
use kernel_alloc::{FramePoolError, FramePools, PoolId};
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, TABLE_SPAN, VirtualAddress};
use log::info;

/// Pool that supplies frames for directories and tables.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TableSource {
    /// The kernel pool. Its frames sit inside the identity-mapped region,
    /// so tables stay reachable without the recursive window.
    Kernel,
    /// The process pool.
    #[default]
    Process,
}

/// Paging parameters shared by every address space.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PagingConfig {
    pub kernel_pool: PoolId,
    pub process_pool: PoolId,
    /// Bytes from physical address 0 identity-mapped into every space.
    pub shared_size: u32,
    pub table_source: TableSource,
}

impl PagingConfig {
    #[must_use]
    pub const fn new(kernel_pool: PoolId, process_pool: PoolId, shared_size: u32) -> Self {
        Self {
            kernel_pool,
            process_pool,
            shared_size,
            table_source: TableSource::Process,
        }
    }

    #[must_use]
    pub const fn with_table_source(mut self, table_source: TableSource) -> Self {
        self.table_source = table_source;
        self
    }

    /// Pool that [`TableSource`] selects.
    #[must_use]
    pub const fn table_pool(&self) -> PoolId {
        match self.table_source {
            TableSource::Kernel => self.kernel_pool,
            TableSource::Process => self.process_pool,
        }
    }

    /// Number of identity-mapped pages.
    #[must_use]
    pub const fn shared_pages(&self) -> u32 {
        self.shared_size / PAGE_SIZE
    }
}

/// Errors of the paging layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PagingError {
    #[error(transparent)]
    Frames(#[from] FramePoolError),
    #[error(transparent)]
    Tables(#[from] TableAccessError),
    #[error(transparent)]
    VmPool(#[from] VmPoolError),
    #[error("shared region of {size:#x} bytes does not fit into one page table")]
    SharedSizeTooLarge { size: u32 },
    #[error("shared region size {size:#x} is not page aligned")]
    Unaligned { size: u32 },
    #[error("no address space has been loaded")]
    NoAddressSpaceLoaded,
    #[error("no VM pool registered under this id")]
    UnknownVmPool,
    #[error("VM pool pages must come from the process pool, not frame pool {}", .pool.index())]
    ForeignFramePool { pool: PoolId },
    #[error("{address} is in the shared region or the table window")]
    ProtectedPage { address: VirtualAddress },
}

/// Paging state shared by every [`AddressSpace`](crate::AddressSpace): the
/// frame pools, the way to reach table memory, the MMU and which directory
/// is loaded.
pub struct Paging<T: TableAccess, M: Mmu> {
    pub(crate) frames: FramePools,
    pub(crate) config: PagingConfig,
    pub(crate) tables: T,
    pub(crate) mmu: M,
    pub(crate) loaded: Option<FrameNumber>,
    enabled: bool,
}

impl<T: TableAccess, M: Mmu> Paging<T, M> {
    /// Installs the global paging configuration.
    ///
    /// # Errors
    /// - [`PagingError::Unaligned`] / [`PagingError::SharedSizeTooLarge`] for
    ///   a shared size that is not page aligned or exceeds one table (4 MiB).
    /// - [`FramePoolError::UnknownPool`] if a configured pool is not
    ///   registered in `frames`.
    pub fn new(
        frames: FramePools,
        config: PagingConfig,
        tables: T,
        mmu: M,
    ) -> Result<Self, PagingError> {
        let size = config.shared_size;
        if !size.is_multiple_of(PAGE_SIZE) {
            return Err(PagingError::Unaligned { size });
        }
        if size > TABLE_SPAN {
            return Err(PagingError::SharedSizeTooLarge { size });
        }
        for id in [config.kernel_pool, config.process_pool] {
            if frames.get(id).is_none() {
                return Err(FramePoolError::UnknownPool.into());
            }
        }

        info!(
            "paging configured: kernel pool {}, process pool {}, shared {size:#x} bytes, tables from {:?}",
            config.kernel_pool.index(),
            config.process_pool.index(),
            config.table_source
        );
        Ok(Self {
            frames,
            config,
            tables,
            mmu,
            loaded: None,
            enabled: false,
        })
    }

    /// Sets CR0.PG.
    ///
    /// # Errors
    /// [`PagingError::NoAddressSpaceLoaded`] unless a space was loaded first.
    pub fn enable(&mut self) -> Result<(), PagingError> {
        let Some(directory) = self.loaded else {
            return Err(PagingError::NoAddressSpaceLoaded);
        };
        self.mmu.enable_paging();
        self.enabled = true;
        self.tables.paging_enabled();
        info!("paging enabled, directory at {}", directory.base());
        Ok(())
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub const fn config(&self) -> &PagingConfig {
        &self.config
    }

    /// Frame of the directory currently in CR3.
    #[must_use]
    pub const fn loaded_directory(&self) -> Option<FrameNumber> {
        self.loaded
    }

    #[must_use]
    pub const fn frames(&self) -> &FramePools {
        &self.frames
    }

    pub const fn frames_mut(&mut self) -> &mut FramePools {
        &mut self.frames
    }

    #[must_use]
    pub const fn tables(&self) -> &T {
        &self.tables
    }

    #[must_use]
    pub const fn mmu(&self) -> &M {
        &self.mmu
    }
}
