//! Registry of every frame pool in the system.
//!
//! Releasing a run only knows the run's first frame; [`FramePools`] finds the
//! pool that contains it and forwards the request.

use crate::cont_frame_pool::{ContFramePool, FramePoolError};
use alloc::vec::Vec;
use kernel_memory_addresses::FrameNumber;
use log::{info, trace};

/// Handle of a pool registered in [`FramePools`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PoolId(usize);

impl PoolId {
    /// Position of the pool in registration order.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Append-ordered set of non-overlapping [`ContFramePool`]s.
#[derive(Debug, Default)]
pub struct FramePools {
    pools: Vec<ContFramePool>,
}

impl FramePools {
    #[must_use]
    pub const fn new() -> Self {
        Self { pools: Vec::new() }
    }

    /// Adds `pool` to the registry.
    ///
    /// # Errors
    /// [`FramePoolError::Overlap`] if any frame of `pool` already belongs to
    /// a registered pool.
    pub fn register(&mut self, pool: ContFramePool) -> Result<PoolId, FramePoolError> {
        let base = pool.base_frame();
        let count = pool.frame_count();
        let overlaps = self.pools.iter().any(|p| {
            base.as_u32() < p.base_frame().as_u32() + p.frame_count()
                && p.base_frame().as_u32() < base.as_u32() + count
        });
        if overlaps {
            return Err(FramePoolError::Overlap { base, count });
        }

        let id = PoolId(self.pools.len());
        info!(
            "frame pool {} registered: frames {base}..+{count}, {} free",
            id.0,
            pool.free_frames()
        );
        self.pools.push(pool);
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: PoolId) -> Option<&ContFramePool> {
        self.pools.get(id.0)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: PoolId) -> Option<&mut ContFramePool> {
        self.pools.get_mut(id.0)
    }

    /// The pool that owns `frame`.
    #[must_use]
    pub fn pool_of(&self, frame: FrameNumber) -> Option<PoolId> {
        self.pools.iter().position(|p| p.contains(frame)).map(PoolId)
    }

    /// Allocates `n_frames` contiguous frames from pool `id`.
    ///
    /// # Errors
    /// [`FramePoolError::UnknownPool`], or whatever
    /// [`ContFramePool::get_frames`] reports.
    pub fn get_frames(&mut self, id: PoolId, n_frames: u32) -> Result<FrameNumber, FramePoolError> {
        self.get_mut(id)
            .ok_or(FramePoolError::UnknownPool)?
            .get_frames(n_frames)
    }

    /// Releases the run headed by `first_frame`, whichever pool owns it.
    ///
    /// # Errors
    /// - [`FramePoolError::UnknownFrame`] if no registered pool contains the frame.
    /// - [`FramePoolError::NotHeadOfSequence`] from the owning pool.
    pub fn release_frames(&mut self, first_frame: FrameNumber) -> Result<u32, FramePoolError> {
        let pool = self
            .pools
            .iter_mut()
            .find(|p| p.contains(first_frame))
            .ok_or(FramePoolError::UnknownFrame { frame: first_frame })?;
        trace!("release_frames({first_frame}) -> pool at {}", pool.base_frame());
        pool.release(first_frame)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &ContFramePool)> {
        self.pools.iter().enumerate().map(|(i, p)| (PoolId(i), p))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Logs one line per registered pool.
    pub fn log_summary(&self) {
        for (id, pool) in self.iter() {
            info!(
                "pool {}: base {}, {} frames, {} free, info frame {:?}",
                id.0,
                pool.base_frame(),
                pool.frame_count(),
                pool.free_frames(),
                pool.info_frame()
            );
        }
    }
}
