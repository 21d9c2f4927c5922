//! Region allocator behaviour over randomized workloads.

use std::ptr::NonNull;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rstiny_mcu::MmError;
use rstiny_mcu::mm::{BlockInfo, HEADER_SIZE, MemRegionFlags, RegionConfig, RegionId, RegionTable};

/// Word-aligned host memory standing in for physical regions.
struct Board {
    arenas: Vec<Vec<u32>>,
}

impl Board {
    fn new(sizes: &[usize]) -> Self {
        Self {
            arenas: sizes.iter().map(|&size| vec![0; size / 4]).collect(),
        }
    }

    fn table(&mut self) -> RegionTable {
        let configs: Vec<_> = self
            .arenas
            .iter_mut()
            .map(|arena| {
                RegionConfig::new(
                    "ram",
                    arena.as_mut_ptr() as usize,
                    arena.len() * 4,
                    MemRegionFlags::READ | MemRegionFlags::WRITE,
                )
            })
            .collect();
        unsafe { RegionTable::new(&configs) }.unwrap()
    }
}

fn id(index: usize) -> RegionId {
    RegionId::new(index).unwrap()
}

fn blocks(table: &RegionTable, region: RegionId) -> Vec<BlockInfo> {
    table.dump(region).unwrap().collect()
}

/// Checks ordering, contiguity, capacity and no-adjacent-free from the
/// dump alone, independently of `RegionTable::check`.
fn assert_chain_invariants(table: &RegionTable, region: RegionId) {
    let info = table.region(region).unwrap();
    let chain = blocks(table, region);
    let mut expected_addr = info.base();
    let mut covered = 0;
    for (i, block) in chain.iter().enumerate() {
        assert_eq!(block.addr, expected_addr, "block {i} not contiguous");
        expected_addr = block.addr + HEADER_SIZE + block.size;
        covered += HEADER_SIZE + block.size;
        match block.next {
            Some(next) => assert_eq!(next, expected_addr),
            None => assert_eq!(i, chain.len() - 1),
        }
        if i > 0 {
            assert!(block.used || chain[i - 1].used, "adjacent free blocks at {i}");
        }
    }
    assert_eq!(covered, info.capacity());
    table.check(region).unwrap();
}

#[test]
fn documented_scenario() {
    let mut board = Board::new(&[1024]);
    let mut table = board.table();
    let r = id(0);

    let sizes = |table: &RegionTable| -> Vec<(usize, bool)> {
        blocks(table, r).iter().map(|b| (b.size, b.used)).collect()
    };

    assert_eq!(sizes(&table), [(1016, false)]);
    let first = table.allocate(r, 100).unwrap();
    assert_eq!(sizes(&table), [(100, true), (908, false)]);
    let second = table.allocate(r, 908).unwrap();
    assert_eq!(sizes(&table), [(100, true), (908, true)]);
    table.free(first).unwrap();
    table.free(second).unwrap();
    assert_eq!(sizes(&table), [(1016, false)]);
    assert!(matches!(
        table.allocate(r, 2000),
        Err(MmError::OutOfMemory { requested: 2000, .. })
    ));
}

#[test]
fn random_workload_keeps_invariants_and_round_trips() {
    let mut board = Board::new(&[8192]);
    let mut table = board.table();
    let r = id(0);
    let base = table.region(r).unwrap().base().as_usize();
    let end = table.region(r).unwrap().end().as_usize();

    for seed in 0..8u64 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();

        for _ in 0..400 {
            if !live.is_empty() && rng.random_bool(0.45) {
                let (ptr, _) = live.swap_remove(rng.random_range(0..live.len()));
                table.free(ptr).unwrap();
            } else {
                let size = rng.random_range(0..600);
                let free_before: Vec<usize> = blocks(&table, r)
                    .iter()
                    .filter(|b| !b.used)
                    .map(|b| b.size)
                    .collect();
                match table.allocate(r, size) {
                    Ok(ptr) => {
                        let addr = ptr.as_ptr() as usize;
                        assert!(addr >= base + HEADER_SIZE && addr + size <= end);
                        let owner = blocks(&table, r)
                            .into_iter()
                            .find(|b| b.payload().as_usize() == addr)
                            .unwrap();
                        assert!(owner.used && owner.size >= size);
                        unsafe { ptr.as_ptr().write_bytes(0xA5, size) };
                        live.push((ptr, size));
                    }
                    Err(MmError::OutOfMemory { .. }) => {
                        assert!(free_before.iter().all(|&free| free < size));
                    }
                    Err(err) => panic!("unexpected error {err}"),
                }
            }
            assert_chain_invariants(&table, r);
        }

        for (ptr, _) in live.drain(..) {
            table.free(ptr).unwrap();
        }
        let chain = blocks(&table, r);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].size, 8192 - HEADER_SIZE);
        assert!(!chain[0].used);
    }
}

#[test]
fn payloads_do_not_overlap_headers() {
    let mut board = Board::new(&[2048]);
    let mut table = board.table();
    let r = id(0);

    let ptrs: Vec<_> = (0..10).map(|i| (table.allocate(r, 20 + i).unwrap(), 20 + i)).collect();
    for &(ptr, size) in &ptrs {
        unsafe { ptr.as_ptr().write_bytes(0xFF, size) };
    }
    assert_chain_invariants(&table, r);
    for (ptr, _) in ptrs.into_iter().rev() {
        table.free(ptr).unwrap();
    }
    assert_eq!(blocks(&table, r).len(), 1);
}

#[test]
fn allocation_never_falls_back_to_another_region() {
    let mut board = Board::new(&[128, 4096, 512, 256]);
    let mut table = board.table();

    assert!(matches!(
        table.allocate(id(0), 1000),
        Err(MmError::OutOfMemory { .. })
    ));
    assert_eq!(blocks(&table, id(1)).len(), 1);

    let ptrs: Vec<_> = (0..4).map(|i| table.allocate(id(i), 64).unwrap()).collect();
    for (i, &ptr) in ptrs.iter().enumerate() {
        assert_eq!(table.owner(ptr), Some(id(i)));
    }
    for ptr in ptrs {
        table.free(ptr).unwrap();
    }
    for i in 0..4 {
        assert_chain_invariants(&table, id(i));
        assert_eq!(table.check(id(i)).unwrap().blocks, 1);
    }
}

#[test]
fn overlapping_configuration_is_fatal() {
    let mut arena = vec![0u32; 64];
    let base = arena.as_mut_ptr() as usize;
    let configs = [
        RegionConfig::new("a", base, 128, MemRegionFlags::READ),
        RegionConfig::new("b", base + 64, 64, MemRegionFlags::READ),
    ];
    assert!(matches!(
        unsafe { RegionTable::new(&configs) },
        Err(MmError::Config(_))
    ));
}
