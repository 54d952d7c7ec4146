use crate::{MemoryAddress, PAGE_SHIFT};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Virtual memory address.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **virtual** addresses.
/// It only carries the *kind* of address at the type level so you don't
/// accidentally mix virtual and physical values.
///
/// The paging code splits it as `[directory:10][table:10][offset:12]`; the
/// index extraction lives next to the table types in `kernel-vmem`.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x0040_2010);
/// assert_eq!(va.page_base(), VirtualAddress::new(0x0040_2000));
/// assert_eq!(va.page_number(), 0x402);
/// assert!(!va.is_page_aligned());
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(pub(crate) MemoryAddress);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0.as_u32()
    }

    /// Base of the page containing this address.
    #[inline]
    #[must_use]
    pub const fn page_base(self) -> Self {
        Self(self.0.page_base())
    }

    /// Offset inside the containing page.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0.offset()
    }

    /// Virtual page number (`va >> 12`).
    #[inline]
    #[must_use]
    pub const fn page_number(self) -> u32 {
        self.as_u32() >> PAGE_SHIFT
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0.is_page_aligned()
    }

    /// Adds `rhs` bytes; `None` when crossing the top of the 32-bit space.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(a) => Some(Self(a)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.as_u32())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u32())
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self::new(self.as_u32() + rhs)
    }
}

impl AddAssign<u32> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}
