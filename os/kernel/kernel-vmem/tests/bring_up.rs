use kernel_alloc::{ContFramePool, FramePools, PoolId, needed_info_frames};
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, TABLE_SPAN, VirtualAddress};
use kernel_vmem::{
    AddressSpace, FaultResolution, FrameArena, PageFault, PageFaultError, Paging, PagingConfig,
    RecordingMmu, VmPoolId,
};

const MB: u32 = 1 << 20;
const FRAMES_PER_MB: u32 = MB / PAGE_SIZE;

const KERNEL_POOL_START: u32 = 2 * FRAMES_PER_MB;
const KERNEL_POOL_SIZE: u32 = 2 * FRAMES_PER_MB;
const PROCESS_POOL_START: u32 = 4 * FRAMES_PER_MB;
const PROCESS_POOL_SIZE: u32 = 28 * FRAMES_PER_MB;
const MEM_HOLE_START: u32 = 15 * FRAMES_PER_MB;
const MEM_HOLE_SIZE: u32 = FRAMES_PER_MB;

type Machine = Paging<FrameArena, RecordingMmu>;

struct Booted {
    paging: Machine,
    space: AddressSpace,
    process: PoolId,
    code: VmPoolId,
    heap: VmPoolId,
}

fn boot() -> Booted {
    let mut frames = FramePools::new();
    let kernel = frames
        .register(
            ContFramePool::new(FrameNumber::new(KERNEL_POOL_START), KERNEL_POOL_SIZE, None)
                .unwrap(),
        )
        .unwrap();

    let n_info = needed_info_frames(PROCESS_POOL_SIZE);
    let info = frames.get_frames(kernel, n_info).unwrap();
    let process = frames
        .register(
            ContFramePool::new(
                FrameNumber::new(PROCESS_POOL_START),
                PROCESS_POOL_SIZE,
                Some(info),
            )
            .unwrap(),
        )
        .unwrap();
    frames
        .get_mut(process)
        .unwrap()
        .mark_inaccessible(FrameNumber::new(MEM_HOLE_START), MEM_HOLE_SIZE)
        .unwrap();
    frames.log_summary();

    let mut paging = Paging::new(
        frames,
        PagingConfig::new(kernel, process, TABLE_SPAN),
        FrameArena::new(FrameNumber::new(0), PROCESS_POOL_START + PROCESS_POOL_SIZE),
        RecordingMmu::new(),
    )
    .unwrap();

    let mut space = AddressSpace::new(&mut paging).unwrap();
    space.load(&mut paging);
    paging.enable().unwrap();

    let code = space
        .create_pool(&paging, VirtualAddress::new(512 * MB), 256 * MB, process)
        .unwrap();
    let heap = space
        .create_pool(&paging, VirtualAddress::new(1024 * MB), 256 * MB, process)
        .unwrap();

    Booted {
        paging,
        space,
        process,
        code,
        heap,
    }
}

fn free(b: &Booted) -> u32 {
    b.paging.frames().get(b.process).unwrap().free_frames()
}

fn touch(b: &mut Booted, va: VirtualAddress) -> FaultResolution {
    b.space
        .handle_fault(&mut b.paging, PageFault::not_present(va, true))
        .unwrap()
}

#[test]
fn boot_sequence_loads_and_enables() {
    let b = boot();
    assert!(b.paging.is_enabled());
    assert_eq!(
        b.paging.mmu().current(),
        Some(b.space.directory_frame().base())
    );
    assert_eq!(b.space.pools().len(), 2);
    assert_eq!(
        free(&b),
        PROCESS_POOL_SIZE - MEM_HOLE_SIZE - 2,
        "directory and first table come from the process pool"
    );
}

#[test]
fn shared_region_is_identity_mapped() {
    let mut b = boot();
    for addr in [0x0, 0x1234, 0x20_0000, 0x3F_FFFF] {
        let va = VirtualAddress::new(addr);
        assert_eq!(
            b.space.translate(&mut b.paging, va).map(|pa| pa.as_u32()),
            Some(addr)
        );
    }
    assert_eq!(
        b.space
            .translate(&mut b.paging, VirtualAddress::new(0x40_0000)),
        None
    );
}

#[test]
fn heap_pages_never_land_in_the_hole() {
    let mut b = boot();
    let pages = 3000;
    let start = b.space.allocate(b.heap, pages * PAGE_SIZE).unwrap();
    assert_eq!(start, VirtualAddress::new(1024 * MB + PAGE_SIZE));

    for i in 0..pages {
        let va = start + i * PAGE_SIZE;
        let FaultResolution::Mapped { frame, .. } = touch(&mut b, va) else {
            panic!("{va:?} was already mapped");
        };
        let f = frame.as_u32();
        assert!(
            !(MEM_HOLE_START..MEM_HOLE_START + MEM_HOLE_SIZE).contains(&f),
            "frame {f:#x} lies in the hole"
        );
        assert_eq!(b.paging.frames().pool_of(frame), Some(b.process));
    }
}

#[test]
fn allocate_touch_release_round_trip() {
    let mut b = boot();
    let baseline = free(&b);

    let sizes = [1, PAGE_SIZE, 3 * PAGE_SIZE + 1, 10 * PAGE_SIZE];
    let mut regions = Vec::new();
    let mut tables = 0;
    for size in sizes {
        let va = b.space.allocate(b.heap, size).unwrap();
        assert!(va.is_page_aligned());
        let pages = size.div_ceil(PAGE_SIZE);
        for i in 0..pages {
            if let FaultResolution::Mapped {
                table_created: true,
                ..
            } = touch(&mut b, va + i * PAGE_SIZE)
            {
                tables += 1;
            }
        }
        regions.push((va, pages));
    }

    let touched: u32 = regions.iter().map(|(_, p)| p).sum();
    assert_eq!(free(&b), baseline - touched - tables);

    // release out of order
    for &(va, pages) in regions.iter().rev().step_by(2) {
        let r = b.space.release(&mut b.paging, b.heap, va).unwrap().unwrap();
        assert_eq!(r.pages(), pages);
    }
    for &(va, pages) in regions.iter().rev().skip(1).step_by(2) {
        let r = b.space.release(&mut b.paging, b.heap, va).unwrap().unwrap();
        assert_eq!(r.pages(), pages);
    }

    // page tables stay; every page frame went back
    assert_eq!(free(&b), baseline - tables);
    assert_eq!(b.space.pool(b.heap).unwrap().region_count(), 0);
    for (va, _) in regions {
        assert_eq!(b.space.translate(&mut b.paging, va), None);
    }
}

#[test]
fn faults_outside_every_pool_are_fatal() {
    let mut b = boot();
    let before = free(&b);
    let address = VirtualAddress::new(0xC000_0000);
    assert_eq!(
        b.space
            .handle_fault(&mut b.paging, PageFault::not_present(address, false)),
        Err(PageFaultError::Illegitimate { address })
    );
    assert_eq!(free(&b), before);
}

#[test]
fn regions_stay_sorted_under_churn() {
    let mut b = boot();
    let mut live = Vec::new();
    for round in 0..40u32 {
        let size = (round % 7 + 1) * PAGE_SIZE;
        live.push(b.space.allocate(b.code, size).unwrap());
        if round % 3 == 2 {
            let victim = live.remove((round as usize * 5) % live.len());
            assert!(b.space.release(&mut b.paging, b.code, victim).unwrap().is_some());
        }

        let regions = b.space.pool(b.code).unwrap().regions();
        assert_eq!(regions.len(), live.len());
        for w in regions.windows(2) {
            assert!(w[0].end() <= w[1].base().as_u32());
        }
        assert!(regions[0].base().as_u32() >= 512 * MB + PAGE_SIZE);
    }
}

#[test]
fn release_of_unknown_start_is_ignored() {
    let mut b = boot();
    let va = b.space.allocate(b.heap, 2 * PAGE_SIZE).unwrap();
    touch(&mut b, va);
    let before = free(&b);

    assert_eq!(
        b.space
            .release(&mut b.paging, b.heap, va + PAGE_SIZE)
            .unwrap(),
        None
    );
    assert_eq!(free(&b), before);
    assert!(b.space.pool(b.heap).unwrap().contains_region(va));
}
