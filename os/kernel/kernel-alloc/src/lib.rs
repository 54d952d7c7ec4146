//! # Physical Frame Pools
//!
//! Contiguous physical frame allocation for the i386 memory manager.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ FramePools                                   │
//! │   • registration order, no overlaps          │
//! │   • routes release_frames to the owner       │
//! └───────┬──────────────────────────┬───────────┘
//!         │                          │
//! ┌───────▼──────────┐      ┌────────▼─────────┐
//! │ ContFramePool    │ ...  │ ContFramePool    │
//! │  kernel frames   │      │  process frames  │
//! └───────┬──────────┘      └──────────────────┘
//!         │
//! ┌───────▼──────────────────────────────────────┐
//! │ FrameStateMap: 2 bits per frame              │
//! │   Free / Allocated / HeadOfSequence          │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! A pool hands out runs of contiguous frames. The first frame of a run is
//! tagged [`FrameState::HeadOfSequence`], which is all
//! [`FramePools::release_frames`] needs to give the whole run back.
//!
//! ## Metadata
//!
//! Each pool needs [`needed_info_frames`] frames of bookkeeping. A pool
//! either keeps them at its own base (self-hosted) or is handed a frame that
//! was allocated from another pool:
//!
//! ```rust
//! use kernel_alloc::{ContFramePool, FramePools, needed_info_frames};
//! use kernel_memory_addresses::FrameNumber;
//!
//! let mut pools = FramePools::new();
//! let kernel = pools
//!     .register(ContFramePool::new(FrameNumber::new(512), 512, None).unwrap())
//!     .unwrap();
//!
//! let n_info = needed_info_frames(7 * 1024);
//! let info = pools.get_frames(kernel, n_info).unwrap();
//! let process = pools
//!     .register(ContFramePool::new(FrameNumber::new(1024), 7 * 1024, Some(info)).unwrap())
//!     .unwrap();
//!
//! let run = pools.get_frames(process, 3).unwrap();
//! assert_eq!(pools.release_frames(run), Ok(3));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod cont_frame_pool;
mod frame_pools;
mod frame_state;

pub use cont_frame_pool::{ContFramePool, FRAMES_PER_INFO_FRAME, FramePoolError, needed_info_frames};
pub use frame_pools::{FramePools, PoolId};
pub use frame_state::{FrameState, FrameStateMap};
