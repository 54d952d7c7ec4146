use bitfield_struct::bitfield;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress};

/// A single 32-bit i386 page-directory or page-table entry (no PAE).
///
/// Directory entries (PDE) and table entries (PTE) share one layout; only the
/// meaning of the frame field differs. A PDE points at the frame holding a
/// [`PageTable`](crate::PageTable), a PTE at the 4 KiB frame backing a page.
///
/// ### Bit layout
///
/// | Bits  | Name        | Meaning |
/// |-------|-------------|---------|
/// | 0     | `P`         | Present |
/// | 1     | `RW`        | Writable |
/// | 2     | `US`        | User-mode accessible |
/// | 3     | `PWT`       | Write-through caching |
/// | 4     | `PCD`       | Cache disable |
/// | 5     | `A`         | Accessed |
/// | 6     | `D`         | Dirty (PTE only) |
/// | 7     | `PS`        | 4 MiB page (PDE only, unused here) |
/// | 8     | `G`         | Global (PTE only) |
/// | 9–11  | OS avail    | Ignored by hardware |
/// | 12–31 | frame       | Physical frame number |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageEntry;
/// # use kernel_memory_addresses::FrameNumber;
/// let e = PageEntry::present_frame(FrameNumber::new(0x123));
/// assert!(e.present());
/// assert!(e.writable());
/// assert_eq!(e.frame(), FrameNumber::new(0x123));
/// assert_eq!(e.into_bits(), 0x0012_3003);
/// ```
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct PageEntry {
    /// Present (P, bit 0).
    ///
    /// Clear means any access through this entry raises `#PF`.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6). Set by the CPU on the first write through a PTE.
    pub dirty: bool,

    /// Page Size (PS, bit 7). Would select a 4 MiB page in a PDE; always
    /// clear in entries written by this crate.
    pub large_page: bool,

    /// Global (G, bit 8).
    pub global_translation: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame_bits: u32,
}

impl PageEntry {
    /// Supervisor, writable, **not present**.
    ///
    /// Every unused directory slot and every unused table entry holds this
    /// value.
    #[inline]
    #[must_use]
    pub const fn not_present() -> Self {
        Self::new().with_writable(true)
    }

    /// Supervisor, writable, present entry pointing at `frame`.
    #[inline]
    #[must_use]
    pub const fn present_frame(frame: FrameNumber) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_frame(frame)
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> FrameNumber {
        FrameNumber::new(self.frame_bits())
    }

    /// ### Panics
    /// If `frame` is not below [`FRAME_COUNT`](kernel_memory_addresses::FRAME_COUNT).
    #[inline]
    #[must_use]
    pub const fn with_frame(self, frame: FrameNumber) -> Self {
        self.with_frame_bits(frame.as_u32())
    }

    #[inline]
    pub const fn set_frame(&mut self, frame: FrameNumber) {
        self.set_frame_bits(frame.as_u32());
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        self.frame().base()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_present_is_writable_only() {
        let e = PageEntry::not_present();
        assert_eq!(e.into_bits(), 0b10);
        assert!(!e.present());
    }

    #[test]
    fn frame_field_is_the_top_twenty_bits() {
        let mut e = PageEntry::present_frame(FrameNumber::new(0xF_FFFF));
        assert_eq!(e.into_bits(), 0xFFFF_F003);
        assert_eq!(e.physical_address().as_u32(), 0xFFFF_F000);

        e.set_frame(FrameNumber::new(1));
        assert_eq!(e.into_bits(), 0x0000_1003);
    }

    #[test]
    fn hardware_bits_do_not_disturb_the_frame() {
        let e = PageEntry::from_bits(0x0040_0000 | 0b110_0110_0001);
        assert!(e.present());
        assert!(e.accessed());
        assert!(e.dirty());
        assert_eq!(e.os_available(), 0b011);
        assert_eq!(e.frame(), FrameNumber::new(0x400));
    }
}
