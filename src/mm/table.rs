//! The region table: every managed memory area of the board.

use core::ptr::NonNull;

use super::descriptor::{GRANULE, HEADER_SIZE, MAX_PAYLOAD, MIN_PAYLOAD};
use super::phys::RegionConfig;
use super::region::{Blocks, Region, RegionStats};
use super::{MAX_REGIONS, RegionId};
use crate::error::{ConfigError, MmError};

/// Explicitly owned set of up to [`MAX_REGIONS`] regions.
#[derive(Debug)]
pub struct RegionTable {
    regions: [Option<Region>; MAX_REGIONS],
}

impl RegionTable {
    /// A table with no configured region. Every operation on it reports
    /// [`MmError::NoSuchRegion`].
    pub const fn empty() -> Self {
        Self {
            regions: [const { None }; MAX_REGIONS],
        }
    }

    /// Validates `configs` and lays one free descriptor over each region.
    /// Entry `i` becomes region `i`.
    ///
    /// # Safety
    ///
    /// Every configured area must be RAM that is readable and writable now
    /// and is handed exclusively to the returned table for its lifetime.
    pub unsafe fn new(configs: &[RegionConfig]) -> Result<Self, MmError> {
        validate(configs)?;

        let mut table = Self::empty();
        for (index, config) in configs.iter().enumerate() {
            let id = RegionId(index as u8);
            // SAFETY: validated above; ownership of the memory is the caller's promise.
            table.regions[index] = Some(unsafe { Region::init(id, config) });
        }
        Ok(table)
    }

    pub fn region(&self, id: RegionId) -> Result<&Region, MmError> {
        self.regions[id.index()]
            .as_ref()
            .ok_or(MmError::NoSuchRegion(id))
    }

    fn region_mut(&mut self, id: RegionId) -> Result<&mut Region, MmError> {
        self.regions[id.index()]
            .as_mut()
            .ok_or(MmError::NoSuchRegion(id))
    }

    /// Configured regions in table order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().flatten()
    }

    /// Allocates `size` bytes from region `id`. Never falls back to another
    /// region.
    pub fn allocate(&mut self, id: RegionId, size: usize) -> Result<NonNull<u8>, MmError> {
        self.region_mut(id)?.allocate(size)
    }

    /// Releases a pointer returned by [`RegionTable::allocate`]. The owning
    /// region is found from the address.
    pub fn free(&mut self, ptr: NonNull<u8>) -> Result<(), MmError> {
        let addr = ptr.as_ptr() as usize;
        self.regions
            .iter_mut()
            .flatten()
            .find(|region| region.contains(addr))
            .ok_or(MmError::InvalidFree(addr))?
            .release(ptr)
    }

    /// Region owning `ptr`, if any.
    pub fn owner(&self, ptr: NonNull<u8>) -> Option<RegionId> {
        let addr = ptr.as_ptr() as usize;
        self.regions()
            .find(|region| region.contains(addr))
            .map(Region::id)
    }

    /// Read-only walk over region `id`'s descriptors.
    pub fn dump(&self, id: RegionId) -> Result<Blocks<'_>, MmError> {
        Ok(self.region(id)?.iter())
    }

    /// Verifies region `id`'s invariants and summarizes its occupancy.
    pub fn check(&self, id: RegionId) -> Result<RegionStats, MmError> {
        self.region(id)?.check()
    }
}

impl Default for RegionTable {
    fn default() -> Self {
        Self::empty()
    }
}

/// Rejects region tables the allocator cannot manage.
pub fn validate(configs: &[RegionConfig]) -> Result<(), ConfigError> {
    if configs.len() > MAX_REGIONS {
        return Err(ConfigError::TooManyRegions {
            count: configs.len(),
            max: MAX_REGIONS,
        });
    }

    for (index, config) in configs.iter().enumerate() {
        let size = config.size;
        if size == 0 {
            return Err(ConfigError::ZeroCapacity { index });
        }
        if size < HEADER_SIZE + MIN_PAYLOAD {
            return Err(ConfigError::TooSmall { index, size });
        }
        if size - HEADER_SIZE > MAX_PAYLOAD {
            return Err(ConfigError::TooLarge { index, size });
        }
        let base = config.base.as_usize();
        if !memory_addr::is_aligned(base, GRANULE) {
            return Err(ConfigError::Misaligned { index, base });
        }
        if base == 0 || config.end().is_none() {
            return Err(ConfigError::AddressOverflow { index });
        }
    }

    for (first, a) in configs.iter().enumerate() {
        for (offset, b) in configs[first + 1..].iter().enumerate() {
            let (a_start, b_start) = (a.base.as_usize(), b.base.as_usize());
            // Both ends were checked for overflow above.
            let (a_end, b_end) = (a_start + a.size, b_start + b.size);
            if a_start < b_end && b_start < a_end {
                return Err(ConfigError::Overlap {
                    first,
                    second: first + 1 + offset,
                });
            }
        }
    }
    Ok(())
}
