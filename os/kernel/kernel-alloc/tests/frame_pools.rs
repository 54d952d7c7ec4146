use kernel_alloc::{ContFramePool, FramePoolError, FramePools, FrameState, PoolId};
use kernel_memory_addresses::FrameNumber;

fn free_count(pools: &FramePools, id: PoolId) -> u32 {
    let pool = pools.get(id).unwrap();
    (0..pool.frame_count())
        .filter(|&i| pool.state(pool.base_frame() + i) == Some(FrameState::Free))
        .map(|_| 1)
        .sum()
}

#[test]
fn sixteen_frame_pool_end_to_end() {
    let mut pools = FramePools::new();
    let id = pools
        .register(ContFramePool::new(FrameNumber::new(0), 16, Some(FrameNumber::new(100))).unwrap())
        .unwrap();

    pools
        .get_mut(id)
        .unwrap()
        .mark_inaccessible(FrameNumber::new(0), 2)
        .unwrap();

    let head = pools.get_frames(id, 3).unwrap();
    assert_eq!(head, FrameNumber::new(2));
    let pool = pools.get(id).unwrap();
    assert_eq!(pool.state(FrameNumber::new(2)), Some(FrameState::HeadOfSequence));
    assert_eq!(pool.state(FrameNumber::new(3)), Some(FrameState::Allocated));
    assert_eq!(pool.state(FrameNumber::new(4)), Some(FrameState::Allocated));
    assert_eq!(pool.free_frames(), 11);

    assert_eq!(pools.release_frames(head), Ok(3));
    let pool = pools.get(id).unwrap();
    for f in 2..5 {
        assert_eq!(pool.state(FrameNumber::new(f)), Some(FrameState::Free));
    }
    assert_eq!(pool.state(FrameNumber::new(0)), Some(FrameState::HeadOfSequence));
    assert_eq!(pool.state(FrameNumber::new(1)), Some(FrameState::Allocated));
    assert_eq!(pool.free_frames(), 14);
}

#[test]
fn fragmented_pool_refuses_a_pair() {
    let mut pools = FramePools::new();
    let id = pools
        .register(ContFramePool::new(FrameNumber::new(0), 10, Some(FrameNumber::new(50))).unwrap())
        .unwrap();

    let singles: Vec<_> = (0..10).map(|_| pools.get_frames(id, 1).unwrap()).collect();
    for f in singles.iter().skip(1).step_by(2) {
        pools.release_frames(*f).unwrap();
    }

    // {0,2,4,6,8} still allocated
    assert_eq!(pools.get(id).unwrap().free_frames(), 5);
    assert_eq!(
        pools.get_frames(id, 2),
        Err(FramePoolError::Fragmented { requested: 2 })
    );
}

#[test]
fn release_of_a_tail_frame_is_a_no_op() {
    let mut pools = FramePools::new();
    let id = pools
        .register(ContFramePool::new(FrameNumber::new(32), 32, None).unwrap())
        .unwrap();
    let head = pools.get_frames(id, 4).unwrap();
    let before = pools.get(id).unwrap().free_frames();

    assert_eq!(
        pools.release_frames(head + 2),
        Err(FramePoolError::NotHeadOfSequence { frame: head + 2 })
    );
    assert_eq!(pools.get(id).unwrap().free_frames(), before);
    assert_eq!(
        pools.get(id).unwrap().state(head + 2),
        Some(FrameState::Allocated)
    );
}

#[test]
fn info_frames_come_from_the_kernel_pool() {
    let mut pools = FramePools::new();
    let kernel = pools
        .register(ContFramePool::new(FrameNumber::new(512), 512, None).unwrap())
        .unwrap();

    let info = pools
        .get_frames(kernel, kernel_alloc::needed_info_frames(7 * 1024))
        .unwrap();
    let process = pools
        .register(ContFramePool::new(FrameNumber::new(1024), 7 * 1024, Some(info)).unwrap())
        .unwrap();

    assert_eq!(info, FrameNumber::new(513));
    assert_eq!(pools.get(kernel).unwrap().free_frames(), 510);
    assert_eq!(pools.get(process).unwrap().free_frames(), 7 * 1024);

    // the 15 MiB hole
    pools
        .get_mut(process)
        .unwrap()
        .mark_inaccessible(FrameNumber::new(15 * 256), 256)
        .unwrap();
    assert_eq!(pools.get(process).unwrap().free_frames(), 7 * 1024 - 256);
    assert_eq!(pools.pool_of(info), Some(kernel));
}

/// Small deterministic generator so the sequence is reproducible.
struct Lcg(u32);

impl Lcg {
    fn next(&mut self, bound: u32) -> u32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (self.0 >> 16) % bound
    }
}

#[test]
fn free_counter_tracks_states_through_mixed_traffic() {
    let mut pools = FramePools::new();
    let id = pools
        .register(ContFramePool::new(FrameNumber::new(0), 96, None).unwrap())
        .unwrap();

    let mut rng = Lcg(7);
    let mut live: Vec<(FrameNumber, u32)> = Vec::new();

    for _ in 0..500 {
        if live.is_empty() || rng.next(3) > 0 {
            let n = rng.next(6) + 1;
            if let Ok(head) = pools.get_frames(id, n) {
                let pool = pools.get(id).unwrap();
                assert_eq!(pool.state(head), Some(FrameState::HeadOfSequence));
                for i in 1..n {
                    assert_eq!(pool.state(head + i), Some(FrameState::Allocated));
                }
                for &(other, m) in &live {
                    let disjoint = head + n <= other || other + m <= head;
                    assert!(disjoint, "{head:?}+{n} overlaps {other:?}+{m}");
                }
                live.push((head, n));
            }
        } else {
            let (head, n) = live.swap_remove(rng.next(live.len() as u32) as usize);
            assert_eq!(pools.release_frames(head), Ok(n));
        }

        assert_eq!(pools.get(id).unwrap().free_frames(), free_count(&pools, id));
    }
}
