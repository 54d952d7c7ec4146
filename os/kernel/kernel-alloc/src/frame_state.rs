//! Packed per-frame allocation state.
//!
//! Every frame of a pool is in one of three states. Two bits per frame are
//! enough, so four frames share one byte:
//!
//! ```text
//!  byte k:  | f(4k+3) | f(4k+2) | f(4k+1) | f(4k+0) |
//!  bits:      7..6      5..4      3..2      1..0
//! ```
//!
//! Only [`FrameStateMap::get`] and [`FrameStateMap::set`] touch the raw
//! bits; everything else works with [`FrameState`].

use alloc::vec;
use alloc::vec::Vec;

/// Allocation state of a single physical frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FrameState {
    /// Available for allocation.
    Free,
    /// Allocated, but not the first frame of its run.
    Allocated,
    /// First frame of an allocated run (single- or multi-frame).
    HeadOfSequence,
}

impl FrameState {
    const MASK: u8 = 0b11;

    #[inline]
    const fn into_bits(self) -> u8 {
        match self {
            Self::Free => 0b00,
            Self::Allocated => 0b01,
            Self::HeadOfSequence => 0b10,
        }
    }

    #[inline]
    const fn from_bits(bits: u8) -> Self {
        match bits & Self::MASK {
            0b00 => Self::Free,
            0b01 => Self::Allocated,
            0b10 => Self::HeadOfSequence,
            _ => unreachable!(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

/// Two-bit-per-frame state array for `len` frames.
///
/// Freshly created maps report every frame as [`FrameState::Free`].
pub struct FrameStateMap {
    bytes: Vec<u8>,
    len: usize,
}

impl FrameStateMap {
    /// Frames encoded per storage byte.
    pub const FRAMES_PER_BYTE: usize = 4;

    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; Self::bytes_for(len)],
            len,
        }
    }

    /// Storage bytes needed for `len` frames.
    #[inline]
    #[must_use]
    pub const fn bytes_for(len: usize) -> usize {
        len.div_ceil(Self::FRAMES_PER_BYTE)
    }

    /// Number of frames tracked.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    const fn locate(index: usize) -> (usize, u32) {
        (
            index / Self::FRAMES_PER_BYTE,
            ((index % Self::FRAMES_PER_BYTE) * 2) as u32,
        )
    }

    /// State of the frame at pool-relative `index`.
    ///
    /// # Panics
    /// If `index` is outside the map.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> FrameState {
        assert!(index < self.len, "frame index {index} out of range");
        let (byte, shift) = Self::locate(index);
        FrameState::from_bits(self.bytes[byte] >> shift)
    }

    /// Overwrite the state of the frame at pool-relative `index`.
    ///
    /// # Panics
    /// If `index` is outside the map.
    #[inline]
    pub fn set(&mut self, index: usize, state: FrameState) {
        assert!(index < self.len, "frame index {index} out of range");
        let (byte, shift) = Self::locate(index);
        let cell = &mut self.bytes[byte];
        *cell = (*cell & !(FrameState::MASK << shift)) | (state.into_bits() << shift);
    }

    /// Number of frames currently in `state`.
    #[must_use]
    pub fn count(&self, state: FrameState) -> usize {
        (0..self.len).filter(|&i| self.get(i) == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_map_is_all_free() {
        let m = FrameStateMap::new(13);
        assert_eq!(m.len(), 13);
        assert_eq!(m.count(FrameState::Free), 13);
        assert_eq!(FrameStateMap::bytes_for(13), 4);
    }

    #[test]
    fn neighbours_in_one_byte_are_independent() {
        let mut m = FrameStateMap::new(8);
        m.set(0, FrameState::HeadOfSequence);
        m.set(1, FrameState::Allocated);
        m.set(3, FrameState::HeadOfSequence);
        assert_eq!(m.get(0), FrameState::HeadOfSequence);
        assert_eq!(m.get(1), FrameState::Allocated);
        assert_eq!(m.get(2), FrameState::Free);
        assert_eq!(m.get(3), FrameState::HeadOfSequence);
        assert_eq!(m.get(4), FrameState::Free);

        m.set(1, FrameState::Free);
        assert_eq!(m.get(0), FrameState::HeadOfSequence);
        assert_eq!(m.get(1), FrameState::Free);
        assert_eq!(m.get(3), FrameState::HeadOfSequence);
    }

    #[test]
    fn every_transition_is_reversible() {
        let all = [
            FrameState::Free,
            FrameState::Allocated,
            FrameState::HeadOfSequence,
        ];
        let mut m = FrameStateMap::new(4);
        for from in all {
            for to in all {
                m.set(2, from);
                m.set(2, to);
                assert_eq!(m.get(2), to);
                assert_eq!(m.count(FrameState::Free), 3 + usize::from(to.is_free()));
            }
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn get_past_end_panics() {
        let m = FrameStateMap::new(5);
        let _ = m.get(5);
    }
}
