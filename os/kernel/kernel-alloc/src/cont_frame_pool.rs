//! Contiguous frame pool.
//!
//! A [`ContFramePool`] owns the frames `[base, base + count)` and hands out
//! runs of physically contiguous frames. The state of each frame lives in a
//! [`FrameStateMap`]:
//!
//! - a run is one [`FrameState::HeadOfSequence`] frame followed by zero or
//!   more [`FrameState::Allocated`] frames;
//! - releasing a run only needs its first frame, the map tells where it ends.
//!
//! The pool accounts for its own metadata: unless an external info frame is
//! supplied, the first [`needed_info_frames`] frames of the pool are reserved
//! as a run and never handed out.

use crate::frame_state::{FrameState, FrameStateMap};
use kernel_memory_addresses::{FRAME_COUNT, FRAME_SIZE, FrameNumber};
use log::trace;

/// Frames whose state fits into one metadata frame (two bits per frame).
#[allow(clippy::cast_possible_truncation)]
pub const FRAMES_PER_INFO_FRAME: u32 = FRAME_SIZE * FrameStateMap::FRAMES_PER_BYTE as u32;

/// Number of frames needed to store the state of `n_frames` frames.
///
/// Callers use this to size external metadata before building a pool.
///
/// ```
/// # use kernel_alloc::needed_info_frames;
/// assert_eq!(needed_info_frames(1), 1);
/// assert_eq!(needed_info_frames(16 * 1024), 1);
/// assert_eq!(needed_info_frames(16 * 1024 + 1), 2);
/// ```
#[inline]
#[must_use]
pub const fn needed_info_frames(n_frames: u32) -> u32 {
    n_frames.div_ceil(FRAMES_PER_INFO_FRAME)
}

/// Errors reported by frame pools and the pool registry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FramePoolError {
    #[error("a frame pool must contain at least one frame")]
    EmptyPool,
    #[error("pool of {count} frames cannot hold its own {needed} metadata frame(s)")]
    NoRoomForMetadata { count: u32, needed: u32 },
    #[error("requested zero frames")]
    ZeroFrames,
    #[error("requested {requested} frames, only {free} free")]
    OutOfFrames { requested: u32, free: u32 },
    #[error("no contiguous run of {requested} free frames")]
    Fragmented { requested: u32 },
    #[error("frame {frame} is outside the pool")]
    OutOfRange { frame: FrameNumber },
    #[error("frame {frame} is not the head of an allocated run")]
    NotHeadOfSequence { frame: FrameNumber },
    #[error("frame {frame} belongs to no registered pool")]
    UnknownFrame { frame: FrameNumber },
    #[error("pool at {base} ({count} frames) overlaps a registered pool")]
    Overlap { base: FrameNumber, count: u32 },
    #[error("no pool registered under this id")]
    UnknownPool,
}

/// Contiguous physical frame allocator for one range of frames.
pub struct ContFramePool {
    base: FrameNumber,
    count: u32,
    free: u32,
    info_frame: Option<FrameNumber>,
    states: FrameStateMap,
}

impl ContFramePool {
    /// Creates a pool managing the frames `[base_frame, base_frame + frame_count)`.
    ///
    /// With `info_frame == None` the state map is self-hosted: the first
    /// [`needed_info_frames(frame_count)`](needed_info_frames) frames of the
    /// pool are reserved for it. With `Some(frame)` the caller has already
    /// reserved that frame somewhere (typically in another pool).
    ///
    /// # Errors
    /// - [`FramePoolError::EmptyPool`] for `frame_count == 0`.
    /// - [`FramePoolError::OutOfRange`] if the range runs past the last
    ///   frame of the 4 GiB physical space.
    /// - [`FramePoolError::NoRoomForMetadata`] if a self-hosted pool is too
    ///   small for its metadata.
    pub fn new(
        base_frame: FrameNumber,
        frame_count: u32,
        info_frame: Option<FrameNumber>,
    ) -> Result<Self, FramePoolError> {
        if frame_count == 0 {
            return Err(FramePoolError::EmptyPool);
        }
        match base_frame.checked_add(frame_count) {
            Some(end) if end.as_u32() <= FRAME_COUNT => {}
            _ => return Err(FramePoolError::OutOfRange { frame: base_frame }),
        }

        let mut pool = Self {
            base: base_frame,
            count: frame_count,
            free: frame_count,
            info_frame,
            states: FrameStateMap::new(frame_count as usize),
        };

        if info_frame.is_none() {
            let needed = needed_info_frames(frame_count);
            if needed >= frame_count {
                return Err(FramePoolError::NoRoomForMetadata {
                    count: frame_count,
                    needed,
                });
            }
            pool.claim(0, needed);
        }

        trace!(
            "frame pool {base_frame}..+{frame_count}: {} free, info frame {:?}",
            pool.free,
            pool.info_frame
        );
        Ok(pool)
    }

    /// First frame managed by this pool.
    #[inline]
    #[must_use]
    pub const fn base_frame(&self) -> FrameNumber {
        self.base
    }

    /// Number of frames managed by this pool.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u32 {
        self.count
    }

    /// Number of frames currently [`FrameState::Free`].
    #[inline]
    #[must_use]
    pub const fn free_frames(&self) -> u32 {
        self.free
    }

    /// The external metadata frame, if one was supplied.
    #[inline]
    #[must_use]
    pub const fn info_frame(&self) -> Option<FrameNumber> {
        self.info_frame
    }

    /// Whether `frame` lies inside this pool.
    #[inline]
    #[must_use]
    pub fn contains(&self, frame: FrameNumber) -> bool {
        frame >= self.base && frame - self.base < self.count
    }

    /// Whether `[frame, frame + n)` lies entirely inside this pool.
    #[inline]
    fn contains_run(&self, frame: FrameNumber, n: u32) -> bool {
        self.contains(frame) && n <= self.count - (frame - self.base)
    }

    /// State of `frame`, or `None` if it is not part of this pool.
    #[must_use]
    pub fn state(&self, frame: FrameNumber) -> Option<FrameState> {
        self.contains(frame)
            .then(|| self.states.get(self.index_of(frame)))
    }

    #[inline]
    fn index_of(&self, frame: FrameNumber) -> usize {
        (frame - self.base) as usize
    }

    /// Marks `n` frames starting at pool index `first` as one allocated run.
    fn claim(&mut self, first: usize, n: u32) {
        for i in first..first + n as usize {
            if self.states.get(i).is_free() {
                self.free -= 1;
            }
            let state = if i == first {
                FrameState::HeadOfSequence
            } else {
                FrameState::Allocated
            };
            self.states.set(i, state);
        }
    }

    /// Allocates `n_frames` contiguous frames and returns the first one.
    ///
    /// First fit, low to high: a candidate run is abandoned at its first
    /// non-free frame and scanning resumes right after that frame.
    ///
    /// # Errors
    /// - [`FramePoolError::ZeroFrames`] for `n_frames == 0`.
    /// - [`FramePoolError::OutOfFrames`] if fewer than `n_frames` frames are
    ///   free in total.
    /// - [`FramePoolError::Fragmented`] if enough frames are free but no run
    ///   of `n_frames` contiguous ones exists.
    pub fn get_frames(&mut self, n_frames: u32) -> Result<FrameNumber, FramePoolError> {
        if n_frames == 0 {
            return Err(FramePoolError::ZeroFrames);
        }
        if n_frames > self.free {
            return Err(FramePoolError::OutOfFrames {
                requested: n_frames,
                free: self.free,
            });
        }

        let n = n_frames as usize;
        let mut start = 0;
        while start + n <= self.states.len() {
            match (start..start + n).find(|&i| !self.states.get(i).is_free()) {
                Some(busy) => start = busy + 1,
                None => {
                    self.claim(start, n_frames);
                    #[allow(clippy::cast_possible_truncation)]
                    let head = self.base + start as u32;
                    trace!("get_frames({n_frames}) -> {head}, {} free", self.free);
                    return Ok(head);
                }
            }
        }

        Err(FramePoolError::Fragmented {
            requested: n_frames,
        })
    }

    /// Reserves `n_frames` frames starting at `base_frame` without searching.
    ///
    /// Used for frames the pool must never hand out, e.g. the memory hole or
    /// frames occupied by the kernel image. The first frame becomes a run
    /// head, the rest [`FrameState::Allocated`]. Frames that were already
    /// allocated are re-tagged without touching the free counter.
    ///
    /// # Errors
    /// - [`FramePoolError::ZeroFrames`] for `n_frames == 0`.
    /// - [`FramePoolError::OutOfRange`] if the run leaves the pool.
    pub fn mark_inaccessible(
        &mut self,
        base_frame: FrameNumber,
        n_frames: u32,
    ) -> Result<(), FramePoolError> {
        if n_frames == 0 {
            return Err(FramePoolError::ZeroFrames);
        }
        if !self.contains_run(base_frame, n_frames) {
            return Err(FramePoolError::OutOfRange { frame: base_frame });
        }
        self.claim(self.index_of(base_frame), n_frames);
        trace!("mark_inaccessible({base_frame}, {n_frames}), {} free", self.free);
        Ok(())
    }

    /// Releases the run headed by `first_frame`; returns how many frames were freed.
    ///
    /// The run extends over every following [`FrameState::Allocated`] frame
    /// up to the next free frame, the next run head, or the end of the pool.
    ///
    /// # Errors
    /// - [`FramePoolError::OutOfRange`] if the frame is not in this pool.
    /// - [`FramePoolError::NotHeadOfSequence`] if it is not a run head; the
    ///   pool is left untouched.
    pub fn release(&mut self, first_frame: FrameNumber) -> Result<u32, FramePoolError> {
        if !self.contains(first_frame) {
            return Err(FramePoolError::OutOfRange { frame: first_frame });
        }
        let head = self.index_of(first_frame);
        if self.states.get(head) != FrameState::HeadOfSequence {
            return Err(FramePoolError::NotHeadOfSequence { frame: first_frame });
        }

        self.states.set(head, FrameState::Free);
        let mut freed = 1;
        let mut i = head + 1;
        while i < self.states.len() && self.states.get(i) == FrameState::Allocated {
            self.states.set(i, FrameState::Free);
            freed += 1;
            i += 1;
        }
        self.free += freed;

        trace!("release({first_frame}) freed {freed}, {} free", self.free);
        Ok(freed)
    }
}

impl core::fmt::Debug for ContFramePool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContFramePool")
            .field("base", &self.base)
            .field("count", &self.count)
            .field("free", &self.free)
            .field("info_frame", &self.info_frame)
            .finish_non_exhaustive()
    }
}
