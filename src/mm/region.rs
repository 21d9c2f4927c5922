//! A single managed memory region and its descriptor chain.

use core::ptr::NonNull;

use memory_addr::PhysAddr;

use super::descriptor::{
    Descriptor, GRANULE, HEADER_SIZE, MAX_PAYLOAD, MIN_PAYLOAD, round_request,
};
use super::phys::{MemRegionFlags, RegionConfig};
use super::RegionId;
use crate::error::MmError;

/// Read-only view of one descriptor, as reported by [`Region::iter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Address of the descriptor header.
    pub addr: PhysAddr,
    /// Address of the successor's header, `None` for the last block.
    pub next: Option<PhysAddr>,
    /// Payload size in bytes.
    pub size: usize,
    pub used: bool,
}

impl BlockInfo {
    /// Placeholder for fixed-size dump buffers.
    pub const EMPTY: Self = Self {
        addr: PhysAddr::from_usize(0),
        next: None,
        size: 0,
        used: false,
    };

    /// Address of the first payload byte.
    pub fn payload(&self) -> PhysAddr {
        self.addr + HEADER_SIZE
    }
}

/// Occupancy summary produced by [`Region::check`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionStats {
    pub blocks: usize,
    pub free_blocks: usize,
    pub used_blocks: usize,
    pub free_bytes: usize,
    pub used_bytes: usize,
    pub largest_free: usize,
}

/// An independently managed memory area.
///
/// The region owns its chain exclusively: descriptors are only reached
/// through `&self`/`&mut self`, so the borrow checker serializes chain
/// mutation for one owner. Cross-context exclusion is the owner's job.
#[derive(Debug)]
pub struct Region {
    id: RegionId,
    name: &'static str,
    base: PhysAddr,
    capacity: usize,
    flags: MemRegionFlags,
}

impl Region {
    /// Writes the single free descriptor spanning the whole region.
    ///
    /// # Safety
    ///
    /// `config` must describe RAM that is readable, writable, aligned to
    /// [`GRANULE`] and not used by anything else for as long as the returned
    /// region lives. Its size must lie within `HEADER_SIZE + MIN_PAYLOAD..=
    /// HEADER_SIZE + MAX_PAYLOAD`.
    pub(super) unsafe fn init(id: RegionId, config: &RegionConfig) -> Self {
        let region = Self {
            id,
            name: config.name,
            base: config.base,
            capacity: config.size,
            flags: config.flags,
        };
        let payload = (config.size - HEADER_SIZE) & !(GRANULE - 1);
        // SAFETY: offset 0 is inside the region, per the caller's contract.
        unsafe { region.store(0, Descriptor::free(payload, None)) };
        debug!(
            "mm: region {} '{}' [{:#x}, {:#x}) payload {}",
            id,
            region.name,
            region.base.as_usize(),
            region.end().as_usize(),
            payload
        );
        region
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn base(&self) -> PhysAddr {
        self.base
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn flags(&self) -> MemRegionFlags {
        self.flags
    }

    pub fn end(&self) -> PhysAddr {
        self.base + self.capacity
    }

    /// Whether `addr` falls inside the region.
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base.as_usize() && addr < self.end().as_usize()
    }

    /// Bytes the chain is expected to cover. A capacity that is not a
    /// multiple of the granule leaves a tail no descriptor can describe.
    fn managed_bytes(&self) -> usize {
        HEADER_SIZE + ((self.capacity - HEADER_SIZE) & !(GRANULE - 1))
    }

    fn header_ptr(&self, offset: usize) -> *mut Descriptor {
        (self.base.as_usize() + offset) as *mut Descriptor
    }

    /// # Safety
    ///
    /// `offset` must be a descriptor boundary inside the region.
    unsafe fn load(&self, offset: usize) -> Descriptor {
        unsafe { self.header_ptr(offset).read() }
    }

    /// # Safety
    ///
    /// `offset + HEADER_SIZE` must lie inside the region and `offset` must be
    /// granule aligned.
    unsafe fn store(&self, offset: usize, desc: Descriptor) {
        unsafe { self.header_ptr(offset).write(desc) }
    }

    /// First-fit allocation of at least `size` bytes.
    ///
    /// A free block is split when the leftover exceeds another header plus
    /// [`MIN_PAYLOAD`] bytes; otherwise the whole block is handed out.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, MmError> {
        let want = match round_request(size) {
            Some(want) if want <= MAX_PAYLOAD => want,
            _ => return Err(self.out_of_memory(size)),
        };

        let mut cursor = Some(0);
        while let Some(offset) = cursor {
            // SAFETY: every offset reached from the head is a descriptor boundary.
            let mut desc = unsafe { self.load(offset) };
            if desc.is_free() && desc.size() >= want {
                let excess = desc.size() - want;
                if excess > HEADER_SIZE + MIN_PAYLOAD {
                    let rest = offset + HEADER_SIZE + want;
                    // SAFETY: `rest` lies within the block being split.
                    unsafe { self.store(rest, Descriptor::free(excess - HEADER_SIZE, desc.next())) };
                    desc.set_size(want);
                    desc.set_next(Some(rest));
                }
                desc.mark_used();
                // SAFETY: same boundary we just loaded.
                unsafe { self.store(offset, desc) };
                trace!(
                    "mm: region {} alloc {} -> {:#x} ({} bytes)",
                    self.id,
                    size,
                    self.base.as_usize() + offset + HEADER_SIZE,
                    desc.size()
                );
                return Ok(self.payload_ptr(offset));
            }
            cursor = desc.next();
        }

        let err = self.out_of_memory(size);
        debug!("mm: {}", err);
        Err(err)
    }

    fn payload_ptr(&self, offset: usize) -> NonNull<u8> {
        let addr = self.base.as_usize() + offset + HEADER_SIZE;
        // SAFETY: region addresses are never null, the base is validated non-wrapping.
        unsafe { NonNull::new_unchecked(addr as *mut u8) }
    }

    fn out_of_memory(&self, requested: usize) -> MmError {
        MmError::OutOfMemory {
            region: self.id,
            requested,
            largest_free: self.largest_free(),
        }
    }

    /// Largest free payload in the region.
    pub fn largest_free(&self) -> usize {
        self.iter()
            .filter(|block| !block.used)
            .map(|block| block.size)
            .max()
            .unwrap_or(0)
    }

    /// Returns the block starting at `ptr` to the free pool and merges it
    /// with free neighbours.
    ///
    /// The chain is walked from the head to find the predecessor, so a
    /// pointer that does not start a payload in this region, or whose block
    /// is already free, is rejected without touching the chain.
    pub fn release(&mut self, ptr: NonNull<u8>) -> Result<(), MmError> {
        let addr = ptr.as_ptr() as usize;
        let base = self.base.as_usize();
        if !self.contains(addr) || addr < base + HEADER_SIZE {
            return Err(MmError::InvalidFree(addr));
        }
        let target = addr - base - HEADER_SIZE;

        let mut prev = None;
        let mut cursor = Some(0);
        while let Some(offset) = cursor {
            if offset >= target {
                break;
            }
            prev = Some(offset);
            // SAFETY: reached from the head.
            cursor = unsafe { self.load(offset) }.next();
        }
        if cursor != Some(target) {
            return Err(MmError::InvalidFree(addr));
        }

        // SAFETY: `target` was found in the chain.
        let mut desc = unsafe { self.load(target) };
        if desc.is_free() {
            return Err(MmError::DoubleFree(addr));
        }
        desc.mark_free();
        trace!("mm: region {} free {:#x} ({} bytes)", self.id, addr, desc.size());

        if let Some(next) = desc.next() {
            // SAFETY: successor link of a chain member.
            let succ = unsafe { self.load(next) };
            if succ.is_free() {
                desc.set_size(desc.size() + succ.span());
                desc.set_next(succ.next());
            }
        }

        match prev {
            Some(prev) => {
                // SAFETY: predecessor found by the walk above.
                let mut pred = unsafe { self.load(prev) };
                if pred.is_free() {
                    pred.set_size(pred.size() + desc.span());
                    pred.set_next(desc.next());
                    unsafe { self.store(prev, pred) };
                } else {
                    unsafe { self.store(target, desc) };
                }
            }
            None => unsafe { self.store(target, desc) },
        }
        Ok(())
    }

    /// Walks the chain from head to terminator without modifying it.
    pub fn iter(&self) -> Blocks<'_> {
        Blocks {
            region: self,
            cursor: Some(0),
            remaining: self.managed_bytes() / (HEADER_SIZE + GRANULE),
        }
    }

    /// Verifies ordering, contiguity, full coverage and the no-adjacent-free
    /// rule. Corruption is reported, never repaired.
    pub fn check(&self) -> Result<RegionStats, MmError> {
        let corrupted = |offset, reason| MmError::Corrupted {
            region: self.id,
            offset,
            reason,
        };
        let limit = self.managed_bytes();
        let mut stats = RegionStats::default();
        let mut offset = 0;
        let mut prev_free = false;

        loop {
            if offset + HEADER_SIZE > limit {
                return Err(corrupted(offset, "header outside region"));
            }
            // SAFETY: bounds checked just above; offsets only grow by whole spans.
            let desc = unsafe { self.load(offset) };
            if desc.has_unknown_flags() {
                return Err(corrupted(offset, "reserved status bits set"));
            }
            if desc.size() % GRANULE != 0 {
                return Err(corrupted(offset, "payload size not granule aligned"));
            }
            let end = offset + desc.span();
            if end > limit {
                return Err(corrupted(offset, "block runs past region end"));
            }

            stats.blocks += 1;
            if desc.is_free() {
                if prev_free {
                    return Err(corrupted(offset, "adjacent free blocks"));
                }
                stats.free_blocks += 1;
                stats.free_bytes += desc.size();
                stats.largest_free = stats.largest_free.max(desc.size());
            } else {
                stats.used_blocks += 1;
                stats.used_bytes += desc.size();
            }
            prev_free = desc.is_free();

            match desc.next() {
                Some(next) if next != end => {
                    return Err(corrupted(offset, "successor not contiguous"));
                }
                Some(next) => offset = next,
                None if end != limit => {
                    return Err(corrupted(offset, "chain ends before region end"));
                }
                None => return Ok(stats),
            }
        }
    }
}

/// Iterator over a region's descriptors, see [`Region::iter`].
///
/// Stops at the terminator, or once more blocks were visited than the
/// region can physically hold (a cyclic chain is never followed forever).
pub struct Blocks<'a> {
    region: &'a Region,
    cursor: Option<usize>,
    remaining: usize,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        let offset = self.cursor?;
        if self.remaining == 0 || offset + HEADER_SIZE > self.region.capacity {
            self.cursor = None;
            return None;
        }
        self.remaining -= 1;
        // SAFETY: bounds checked above.
        let desc = unsafe { self.region.load(offset) };
        self.cursor = desc.next();
        let base = self.region.base;
        Some(BlockInfo {
            addr: base + offset,
            next: desc.next().map(|next| base + next),
            size: desc.size(),
            used: !desc.is_free(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Word-aligned scratch memory standing in for a physical region.
    struct Arena(Vec<u32>);

    impl Arena {
        fn new(bytes: usize) -> Self {
            Self(vec![0; bytes / 4])
        }

        fn base(&mut self) -> usize {
            self.0.as_mut_ptr() as usize
        }
    }

    fn region(arena: &mut Arena, size: usize) -> Region {
        let config = RegionConfig::new("test", arena.base(), size, MemRegionFlags::READ);
        unsafe { Region::init(RegionId::new(0).unwrap(), &config) }
    }

    fn layout(region: &Region) -> Vec<(usize, bool)> {
        region.iter().map(|block| (block.size, block.used)).collect()
    }

    #[test]
    fn fresh_region_is_one_free_block() {
        let mut arena = Arena::new(1024);
        let region = region(&mut arena, 1024);
        assert_eq!(layout(&region), [(1016, false)]);
        let stats = region.check().unwrap();
        assert_eq!(stats.free_bytes + stats.blocks * HEADER_SIZE, 1024);
    }

    #[test]
    fn split_then_exact_fit_then_coalesce() {
        let mut arena = Arena::new(1024);
        let mut region = region(&mut arena, 1024);

        let first = region.allocate(100).unwrap();
        assert_eq!(first.as_ptr() as usize, region.base().as_usize() + HEADER_SIZE);
        assert_eq!(layout(&region), [(100, true), (908, false)]);

        let second = region.allocate(908).unwrap();
        assert_eq!(layout(&region), [(100, true), (908, true)]);

        region.release(first).unwrap();
        assert_eq!(layout(&region), [(100, false), (908, true)]);
        region.release(second).unwrap();
        assert_eq!(layout(&region), [(1016, false)]);

        assert!(matches!(
            region.allocate(2000),
            Err(MmError::OutOfMemory { requested: 2000, largest_free: 1016, .. })
        ));
        region.check().unwrap();
    }

    #[test]
    fn small_leftover_is_not_split() {
        let mut arena = Arena::new(256);
        let mut region = region(&mut arena, 256);
        // 248 payload; leaving 12 bytes is less than header + minimum payload.
        region.allocate(236).unwrap();
        assert_eq!(layout(&region), [(248, true)]);
        region.check().unwrap();
    }

    #[test]
    fn leftover_of_exactly_header_plus_minimum_is_not_split() {
        let mut arena = Arena::new(256);
        let mut region = region(&mut arena, 256);
        region.allocate(232).unwrap();
        assert_eq!(layout(&region), [(248, true)]);
    }

    #[test]
    fn leftover_beyond_header_plus_minimum_is_split() {
        let mut arena = Arena::new(256);
        let mut region = region(&mut arena, 256);
        region.allocate(228).unwrap();
        assert_eq!(layout(&region), [(228, true), (12, false)]);
        region.check().unwrap();
    }

    #[test]
    fn first_fit_takes_lowest_address_hole() {
        let mut arena = Arena::new(1024);
        let mut region = region(&mut arena, 1024);
        let a = region.allocate(64).unwrap();
        let _b = region.allocate(16).unwrap();
        let c = region.allocate(64).unwrap();
        let _d = region.allocate(16).unwrap();
        region.release(a).unwrap();
        region.release(c).unwrap();

        let e = region.allocate(32).unwrap();
        assert_eq!(e, a);
        region.check().unwrap();
    }

    #[test]
    fn free_merges_with_both_neighbours() {
        let mut arena = Arena::new(512);
        let mut region = region(&mut arena, 512);
        let a = region.allocate(40).unwrap();
        let b = region.allocate(40).unwrap();
        let c = region.allocate(40).unwrap();
        let _d = region.allocate(40).unwrap();

        region.release(a).unwrap();
        region.release(c).unwrap();
        assert_eq!(region.check().unwrap().free_blocks, 3);

        region.release(b).unwrap();
        assert_eq!(layout(&region)[0], (40 * 3 + HEADER_SIZE * 2, false));
        region.check().unwrap();
    }

    #[test]
    fn foreign_and_double_free_are_rejected() {
        let mut arena = Arena::new(512);
        let mut region = region(&mut arena, 512);
        let a = region.allocate(40).unwrap();
        let before = layout(&region);

        let inside = NonNull::new(unsafe { a.as_ptr().add(4) }).unwrap();
        assert_eq!(region.release(inside), Err(MmError::InvalidFree(a.as_ptr() as usize + 4)));

        let outside = NonNull::new(region.end().as_usize() as *mut u8).unwrap();
        assert!(matches!(region.release(outside), Err(MmError::InvalidFree(_))));
        assert_eq!(layout(&region), before);

        region.release(a).unwrap();
        assert_eq!(region.release(a), Err(MmError::DoubleFree(a.as_ptr() as usize)));
        region.check().unwrap();
    }

    #[test]
    fn zero_sized_requests_get_distinct_blocks() {
        let mut arena = Arena::new(128);
        let mut region = region(&mut arena, 128);
        let a = region.allocate(0).unwrap();
        let b = region.allocate(0).unwrap();
        assert_ne!(a, b);
        assert_eq!(layout(&region)[0], (GRANULE, true));
    }

    #[test]
    fn oversized_request_is_out_of_memory() {
        let mut arena = Arena::new(128);
        let mut region = region(&mut arena, 128);
        assert!(matches!(
            region.allocate(usize::MAX),
            Err(MmError::OutOfMemory { .. })
        ));
        assert_eq!(layout(&region), [(120, false)]);
    }

    #[test]
    fn unaligned_capacity_tail_is_unmanaged() {
        let mut arena = Arena::new(128);
        let region = region(&mut arena, 126);
        assert_eq!(layout(&region), [(116, false)]);
        region.check().unwrap();
    }

    #[test]
    fn check_reports_adjacent_free_blocks() {
        let mut arena = Arena::new(256);
        let mut region = region(&mut arena, 256);
        region.allocate(32).unwrap();
        // Clear the status bit behind the allocator's back.
        unsafe {
            let mut head = region.load(0);
            head.mark_free();
            region.store(0, head);
        }
        assert!(matches!(
            region.check(),
            Err(MmError::Corrupted { reason: "adjacent free blocks", .. })
        ));
    }

    #[test]
    fn iter_stops_on_cyclic_chain() {
        let mut arena = Arena::new(256);
        let mut region = region(&mut arena, 256);
        region.allocate(32).unwrap();
        unsafe {
            let mut tail = region.load(40);
            tail.set_next(Some(40));
            region.store(40, tail);
        }
        assert!(region.iter().count() <= 256 / (HEADER_SIZE + GRANULE));
        assert!(region.check().is_err());
    }
}
