//! # Virtual Memory Support
//!
//! Two-level i386 paging with demand-backed pages and per-space VM pools.
//!
//! ## What you get
//! - [`PageEntry`], [`PageTable`] and [`PageDirectory`]: the 32-bit paging
//!   structures, typed.
//! - [`Paging`]: state shared by every address space (frame pools, paging
//!   configuration, table access, MMU).
//! - [`AddressSpace`]: one directory, its fault handler and its [`VmPool`]s.
//! - [`VmPool`]: first-fit allocator of page-granular virtual regions.
//! - Seams to the machine: [`TableAccess`] for table memory and [`Mmu`] for
//!   CR0/CR3.
//!
//! ## i386 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! ```text
//!  CR3 → Page Directory → Page Table → 4 KiB frame
//!         (1024 PDEs)      (1024 PTEs)
//! ```
//!
//! Directory slot 1023 points at the directory itself. With paging on, the
//! directory then shows up at `0xFFFF_F000` and the table behind slot `s` at
//! `0xFFC0_0000 | s << 12`, see [`RecursiveWindow`].
//!
//! ## Bring-up
//!
//! ```rust
//! use kernel_alloc::{ContFramePool, FramePools};
//! use kernel_memory_addresses::{FrameNumber, TABLE_SPAN, VirtualAddress};
//! use kernel_vmem::{
//!     AddressSpace, FaultResolution, FrameArena, PageFault, Paging, PagingConfig, RecordingMmu,
//! };
//!
//! let mut frames = FramePools::new();
//! let kernel = frames.register(ContFramePool::new(FrameNumber::new(512), 512, None)?)?;
//! let process = frames.register(ContFramePool::new(FrameNumber::new(1024), 1024, None)?)?;
//!
//! let mut paging = Paging::new(
//!     frames,
//!     PagingConfig::new(kernel, process, TABLE_SPAN),
//!     FrameArena::new(FrameNumber::new(0), 2048),
//!     RecordingMmu::new(),
//! )?;
//! let mut space = AddressSpace::new(&mut paging)?;
//! space.load(&mut paging);
//! paging.enable()?;
//!
//! let heap = space.create_pool(&paging, VirtualAddress::new(0x4000_0000), 0x40_0000, process)?;
//! let va = space.allocate(heap, 3 * 4096)?;
//! let res = space.handle_fault(&mut paging, PageFault::not_present(va, true))?;
//! assert!(matches!(res, FaultResolution::Mapped { table_created: true, .. }));
//! space.release(&mut paging, heap, va)?;
//! # Ok::<(), Box<dyn core::error::Error>>(())
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

extern crate alloc;

mod address_space;
mod entry;
mod fault;
mod mmu;
mod paging;
pub mod table;
mod table_access;
mod vm_pool;

pub use crate::address_space::{AddressSpace, VmPoolId};
pub use crate::entry::PageEntry;
pub use crate::fault::{FaultResolution, PageFault, PageFaultCode, PageFaultError};
#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use crate::mmu::X86Mmu;
pub use crate::mmu::{Mmu, RecordingMmu};
pub use crate::paging::{Paging, PagingConfig, PagingError, TableSource};
pub use crate::table::{PageDirectory, PageTable};
pub use crate::table_access::{
    FrameArena, RECURSIVE_DIRECTORY, RECURSIVE_TABLES, RecursiveWindow, TableAccess,
    TableAccessError, recursive_table_address,
};
pub use crate::vm_pool::{MAX_REGIONS, Region, VmPool, VmPoolError};
