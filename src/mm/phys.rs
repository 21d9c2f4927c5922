//! Physical memory region description.

use core::fmt;

use memory_addr::PhysAddr;

bitflags::bitflags! {
    /// The flags of a physical memory region.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct MemRegionFlags: usize {
        /// Readable.
        const READ          = 1 << 0;
        /// Writable.
        const WRITE         = 1 << 1;
        /// Executable.
        const EXECUTE       = 1 << 2;
        /// Device memory. (e.g., MMIO regions)
        const DEVICE        = 1 << 4;
        /// Uncachable memory. (e.g., DMA buffers)
        const UNCACHED      = 1 << 5;
        /// Reachable by the DMA controllers.
        const DMA           = 1 << 6;
        /// Survives a processor reset.
        const PERSISTENT    = 1 << 7;
    }
}

impl fmt::Debug for MemRegionFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// One entry of the board's memory region table.
#[derive(Debug, Clone, Copy)]
pub struct RegionConfig {
    pub name: &'static str,
    pub base: PhysAddr,
    pub size: usize,
    pub flags: MemRegionFlags,
}

impl RegionConfig {
    pub const fn new(
        name: &'static str,
        base: usize,
        size: usize,
        flags: MemRegionFlags,
    ) -> Self {
        Self {
            name,
            base: PhysAddr::from_usize(base),
            size,
            flags,
        }
    }

    /// One past the last byte, or `None` if the region wraps.
    pub fn end(&self) -> Option<usize> {
        self.base.as_usize().checked_add(self.size)
    }
}
