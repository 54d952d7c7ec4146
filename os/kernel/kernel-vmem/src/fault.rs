use crate::table_access::TableAccessError;
use bitfield_struct::bitfield;
use kernel_alloc::FramePoolError;
use kernel_memory_addresses::{FrameNumber, VirtualAddress};

/// Page-fault error code pushed by the CPU (32-bit protected mode).
///
/// Each bit describes the condition that caused the fault.
/// Reference: Intel SDM Vol. 3A, §6.15 "Page-Fault Exception (#PF)".
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct PageFaultCode {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read or execute.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor (CPL 0–2).
    /// 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = caused by reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch.
    pub instruction_fetch: bool, // bit 4

    /// 1 = protection-key violation.
    pub protection_key: bool, // bit 5

    /// 1 = shadow stack access.
    pub shadow_stack: bool, // bit 6

    #[bits(25)]
    __: u32,
}

impl PageFaultCode {
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if !self.present() {
            "Non-present page (first touch or released page)"
        } else if self.instruction_fetch() {
            if self.user() {
                "User-mode instruction fetch on protected page"
            } else {
                "Kernel instruction fetch on protected page"
            }
        } else if self.write() {
            "Write access to protected page"
        } else {
            "Read access to protected page"
        }
    }
}

/// A page fault as delivered by the exception entry code.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageFault {
    /// Faulting linear address (CR2).
    pub address: VirtualAddress,
    pub code: PageFaultCode,
}

impl PageFault {
    /// A fault on a non-present page at `address`.
    #[must_use]
    pub const fn not_present(address: VirtualAddress, write: bool) -> Self {
        Self {
            address,
            code: PageFaultCode::new().with_write(write),
        }
    }

    /// Builds the fault from CR2 and the error code the CPU pushed.
    ///
    /// # Safety
    /// Ring 0, inside the `#PF` handler before anything can fault again.
    #[cfg(all(feature = "asm", target_arch = "x86"))]
    #[must_use]
    pub unsafe fn from_cpu(error_code: u32) -> Self {
        use kernel_registers::{Cr2, LoadRegisterUnsafe};
        let cr2 = unsafe { Cr2::load_unsafe() };
        Self {
            address: cr2.fault_address(),
            code: PageFaultCode::from_bits(error_code),
        }
    }
}

/// What [`AddressSpace::handle_fault`](crate::AddressSpace::handle_fault) did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultResolution {
    /// A backing frame was mapped; `table_created` if the directory slot was
    /// empty and a fresh table was installed first.
    Mapped {
        table_created: bool,
        frame: FrameNumber,
    },
    /// The entry was already present (stale TLB); the TLB was flushed.
    AlreadyMapped,
}

/// Faults that cannot be resolved. The caller treats them as fatal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PageFaultError {
    #[error("protection violation at {address}: {}", .code.explain())]
    ProtectionViolation {
        address: VirtualAddress,
        code: PageFaultCode,
    },
    #[error("{address} lies outside every registered VM pool")]
    Illegitimate { address: VirtualAddress },
    #[error("out of memory while resolving fault: {0}")]
    OutOfMemory(FramePoolError),
    #[error("frame pool failure while resolving fault: {0}")]
    Frames(FramePoolError),
    #[error(transparent)]
    Tables(#[from] TableAccessError),
}

impl From<FramePoolError> for PageFaultError {
    fn from(e: FramePoolError) -> Self {
        match e {
            FramePoolError::OutOfFrames { .. } | FramePoolError::Fragmented { .. } => {
                Self::OutOfMemory(e)
            }
            _ => Self::Frames(e),
        }
    }
}
