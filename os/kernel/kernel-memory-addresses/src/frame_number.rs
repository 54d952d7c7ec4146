use crate::{PAGE_SHIFT, PhysicalAddress};
use core::fmt;
use core::ops::{Add, Sub};

/// Absolute number of a 4 KiB physical frame.
///
/// Frame `n` covers the physical bytes `[n * 4096, (n + 1) * 4096)`. Frame
/// pools, page-table entries and the release path all speak in frame
/// numbers rather than byte addresses.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameNumber(u32);

impl FrameNumber {
    #[inline]
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// First byte of the frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 << PAGE_SHIFT)
    }

    /// The frame `n` frames after this one, or `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, n: u32) -> Option<Self> {
        match self.0.checked_add(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:#x})", self.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for FrameNumber {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl Add<u32> for FrameNumber {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// Distance in frames between two frame numbers.
impl Sub for FrameNumber {
    type Output = u32;
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_base_and_back() {
        let f = FrameNumber::new(1023);
        assert_eq!(f.base().as_u32(), 0x003F_F000);
        assert_eq!(f.base().frame(), f);
        assert_eq!(PhysicalAddress::new(0x003F_FFFF).frame(), f);
    }

    #[test]
    fn frame_arithmetic() {
        let f = FrameNumber::new(10);
        assert_eq!(f + 5, FrameNumber::new(15));
        assert_eq!(FrameNumber::new(15) - f, 5);
        assert_eq!(FrameNumber::new(u32::MAX).checked_add(1), None);
    }
}
