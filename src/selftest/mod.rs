//! Boot-time memory manager self test.
//!
//! Runs a set of allocate/free scenarios against one region of a live
//! region table and checks that every scenario leaves the region exactly as
//! it found it. Results are reported through the logger.

use core::ptr::NonNull;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::kernel::SELFTEST_ROUNDS;
use crate::error::MmError;
use crate::mm::{HEADER_SIZE, RegionId, RegionStats, RegionTable};

/// Live pointers a single scenario may hold at once.
const MAX_LIVE: usize = 32;

/// Test result structure
#[derive(Debug, Clone, Copy)]
pub struct TestResult {
    pub name: &'static str,
    pub passed: bool,
    pub error_msg: Option<&'static str>,
}

/// Totals of one suite run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuiteStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

type Outcome = Result<(), &'static str>;

/// Memory manager test suite
pub struct MmTestSuite<'a> {
    table: &'a mut RegionTable,
    region: RegionId,
    stats: SuiteStats,
}

impl<'a> MmTestSuite<'a> {
    pub fn new(table: &'a mut RegionTable, region: RegionId) -> Self {
        Self {
            table,
            region,
            stats: SuiteStats::default(),
        }
    }

    /// Run all tests
    pub fn run_all_tests(&mut self) -> SuiteStats {
        info!("Start testing memory region {}...", self.region);

        self.run("Basic allocation test", Self::test_basic_allocation);
        self.run("Split and coalesce test", Self::test_split_and_coalesce);
        self.run("Exhaustion test", Self::test_exhaustion);
        self.run("Many small allocations test", Self::test_many_small_allocations);
        self.run("Zero-size allocation test", Self::test_zero_size_allocation);
        self.run("Invalid free test", Self::test_invalid_free);
        self.run("Random workload test", Self::test_random_workload);

        info!(
            "Test completed: {}/{} passed",
            self.stats.passed, self.stats.total
        );
        if self.stats.failed > 0 {
            warn!("{} memory manager tests failed", self.stats.failed);
        }
        self.stats
    }

    fn run(&mut self, name: &'static str, test: fn(&mut Self) -> Outcome) {
        info!("Running test: {}", name);

        let outcome = match self.table.check(self.region) {
            Ok(before) => test(self).and_then(|()| self.expect_unchanged(before)),
            Err(_) => Err("region corrupted before test"),
        };
        let result = TestResult {
            name,
            passed: outcome.is_ok(),
            error_msg: outcome.err(),
        };

        self.stats.total += 1;
        if result.passed {
            self.stats.passed += 1;
            info!("ok   {}", result.name);
        } else {
            self.stats.failed += 1;
            error!(
                "FAIL {} - {}",
                result.name,
                result.error_msg.unwrap_or("Unknown error")
            );
        }
    }

    fn expect_unchanged(&self, before: RegionStats) -> Outcome {
        match self.table.check(self.region) {
            Ok(after) if after == before => Ok(()),
            Ok(_) => Err("region not restored"),
            Err(_) => Err("region corrupted"),
        }
    }

    fn alloc(&mut self, size: usize) -> Result<NonNull<u8>, &'static str> {
        self.table
            .allocate(self.region, size)
            .map_err(|_| "allocation failed")
    }

    fn free(&mut self, ptr: NonNull<u8>) -> Outcome {
        self.table.free(ptr).map_err(|_| "free failed")
    }

    fn largest_free(&self) -> usize {
        self.table
            .check(self.region)
            .map_or(0, |stats| stats.largest_free)
    }

    /// Basic allocation test
    fn test_basic_allocation(&mut self) -> Outcome {
        let ptr = self.alloc(100)?;
        if self.table.owner(ptr) != Some(self.region) {
            return Err("pointer outside selected region");
        }

        // SAFETY: 100 bytes were just handed to us.
        let payload = unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), 100) };
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte = i as u8;
        }
        if payload.iter().enumerate().any(|(i, &byte)| byte != i as u8) {
            return Err("payload read back mismatch");
        }
        if self.table.check(self.region).is_err() {
            return Err("payload write corrupted chain");
        }
        self.free(ptr)
    }

    /// Neighbouring frees in every order merge back into one block
    fn test_split_and_coalesce(&mut self) -> Outcome {
        for order in [[0, 1, 2], [2, 1, 0], [0, 2, 1]] {
            let ptrs = [self.alloc(48)?, self.alloc(48)?, self.alloc(48)?];
            for index in order {
                self.free(ptrs[index])?;
            }
        }
        Ok(())
    }

    /// Exhaustion test
    fn test_exhaustion(&mut self) -> Outcome {
        let largest = self.largest_free();
        match self.table.allocate(self.region, largest + 1) {
            Err(MmError::OutOfMemory { .. }) => {}
            Ok(ptr) => {
                self.free(ptr)?;
                return Err("oversized request succeeded");
            }
            Err(_) => return Err("unexpected error on oversized request"),
        }

        let ptr = self.alloc(largest)?;
        self.free(ptr)
    }

    /// Multiple small memory allocations test
    fn test_many_small_allocations(&mut self) -> Outcome {
        let mut live = [None; MAX_LIVE];
        for (i, slot) in live.iter_mut().enumerate() {
            *slot = Some(self.alloc(8 + i * 4)?);
        }
        // Free the even slots first to leave holes between used blocks.
        for step in [0, 1] {
            for slot in live.iter_mut().skip(step).step_by(2) {
                if let Some(ptr) = slot.take() {
                    self.free(ptr)?;
                }
            }
        }
        Ok(())
    }

    /// Zero-size allocation test
    fn test_zero_size_allocation(&mut self) -> Outcome {
        let a = self.alloc(0)?;
        let b = self.alloc(0)?;
        if a == b {
            return Err("zero-size allocations alias");
        }
        self.free(a)?;
        self.free(b)
    }

    /// Invalid free test
    fn test_invalid_free(&mut self) -> Outcome {
        let ptr = self.alloc(32)?;
        // SAFETY: still inside the 32-byte payload.
        let inner = unsafe { ptr.add(HEADER_SIZE) };
        if !matches!(self.table.free(inner), Err(MmError::InvalidFree(_))) {
            return Err("interior pointer accepted");
        }
        self.free(ptr)?;
        if !matches!(self.table.free(ptr), Err(MmError::DoubleFree(_))) {
            return Err("double free accepted");
        }
        Ok(())
    }

    /// Seeded random allocate/free rounds
    fn test_random_workload(&mut self) -> Outcome {
        let mut rng = SmallRng::seed_from_u64(0x5EED);
        let mut live: [Option<NonNull<u8>>; MAX_LIVE] = [None; MAX_LIVE];
        let max_size = (self.largest_free() / MAX_LIVE).max(1);

        for _ in 0..SELFTEST_ROUNDS {
            let slot = rng.random_range(0..MAX_LIVE);
            match live[slot].take() {
                Some(ptr) => self.free(ptr)?,
                None => {
                    match self.table.allocate(self.region, rng.random_range(0..=max_size)) {
                        Ok(ptr) => live[slot] = Some(ptr),
                        Err(MmError::OutOfMemory { .. }) => {}
                        Err(_) => return Err("unexpected allocation error"),
                    }
                }
            }
            if self.table.check(self.region).is_err() {
                return Err("invariant broken during workload");
            }
        }

        for ptr in live.iter_mut().filter_map(Option::take) {
            self.free(ptr)?;
        }
        Ok(())
    }
}

/// Convenient function to run memory manager tests on one region.
pub fn run_mm_tests(table: &mut RegionTable, region: RegionId) -> SuiteStats {
    MmTestSuite::new(table, region).run_all_tests()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::{MemRegionFlags, RegionConfig};

    #[test]
    fn suite_passes_on_fresh_region() {
        let mut arena = vec![0u32; 4096];
        let config = RegionConfig::new(
            "sram",
            arena.as_mut_ptr() as usize,
            arena.len() * 4,
            MemRegionFlags::READ | MemRegionFlags::WRITE,
        );
        let mut table = unsafe { RegionTable::new(&[config]) }.unwrap();
        let region = RegionId::new(0).unwrap();

        let stats = run_mm_tests(&mut table, region);
        assert_eq!(stats, SuiteStats { total: 7, passed: 7, failed: 0 });
        assert_eq!(table.check(region).unwrap().blocks, 1);
    }

    #[test]
    fn suite_passes_on_fragmented_region() {
        let mut arena = vec![0u32; 4096];
        let config = RegionConfig::new(
            "sram",
            arena.as_mut_ptr() as usize,
            arena.len() * 4,
            MemRegionFlags::READ | MemRegionFlags::WRITE,
        );
        let mut table = unsafe { RegionTable::new(&[config]) }.unwrap();
        let region = RegionId::new(0).unwrap();
        let keep = table.allocate(region, 64).unwrap();
        let hole = table.allocate(region, 200).unwrap();
        table.allocate(region, 64).unwrap();
        table.free(hole).unwrap();
        let _ = keep;

        let stats = run_mm_tests(&mut table, region);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn missing_region_fails_every_test() {
        let mut table = RegionTable::empty();
        let stats = run_mm_tests(&mut table, RegionId::new(1).unwrap());
        assert_eq!(stats, SuiteStats { total: 7, passed: 0, failed: 7 });
    }
}
