//! The three things the paging code asks of the MMU.

use alloc::vec::Vec;
use kernel_memory_addresses::PhysicalAddress;

/// Hardware side of address translation.
pub trait Mmu {
    /// Points CR3 at the directory at `directory`.
    fn load_directory(&mut self, directory: PhysicalAddress);

    /// Sets CR0.PG.
    fn enable_paging(&mut self);

    /// Drops every non-global TLB entry (CR3 reload).
    fn flush_tlb(&mut self);
}

/// [`Mmu`] that drives CR0/CR3 directly.
#[cfg(all(feature = "asm", target_arch = "x86"))]
pub struct X86Mmu(());

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl X86Mmu {
    /// # Safety
    /// Ring 0 only. The caller must make sure every directory it loads maps
    /// the code and data that run after the switch.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self(())
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl Mmu for X86Mmu {
    fn load_directory(&mut self, directory: PhysicalAddress) {
        use kernel_registers::{Cr3, StoreRegisterUnsafe};
        unsafe { Cr3::from_directory_phys(directory).store_unsafe() }
    }

    fn enable_paging(&mut self) {
        use kernel_registers::{Cr0, LoadRegisterUnsafe, StoreRegisterUnsafe};
        unsafe {
            let cr0 = Cr0::load_unsafe();
            cr0.with_paging_enabled().store_unsafe();
        }
    }

    fn flush_tlb(&mut self) {
        use kernel_registers::{Cr3, LoadRegisterUnsafe, StoreRegisterUnsafe};
        unsafe { Cr3::load_unsafe().store_unsafe() }
    }
}

/// [`Mmu`] that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingMmu {
    /// Every directory written to CR3, in order.
    pub loads: Vec<PhysicalAddress>,
    pub paging_enabled: bool,
    pub flushes: usize,
}

impl RecordingMmu {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            loads: Vec::new(),
            paging_enabled: false,
            flushes: 0,
        }
    }

    /// The directory CR3 would currently hold.
    #[must_use]
    pub fn current(&self) -> Option<PhysicalAddress> {
        self.loads.last().copied()
    }
}

impl Mmu for RecordingMmu {
    fn load_directory(&mut self, directory: PhysicalAddress) {
        self.loads.push(directory);
    }

    fn enable_paging(&mut self) {
        self.paging_enabled = true;
    }

    fn flush_tlb(&mut self) {
        self.flushes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_mmu_tracks_the_last_load() {
        let mut mmu = RecordingMmu::new();
        assert_eq!(mmu.current(), None);

        mmu.load_directory(PhysicalAddress::new(0x20_0000));
        mmu.load_directory(PhysicalAddress::new(0x40_1000));
        mmu.enable_paging();
        mmu.flush_tlb();

        assert_eq!(mmu.current(), Some(PhysicalAddress::new(0x40_1000)));
        assert_eq!(mmu.loads.len(), 2);
        assert!(mmu.paging_enabled);
        assert_eq!(mmu.flushes, 1);
    }
}
