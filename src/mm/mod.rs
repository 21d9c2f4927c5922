//! Memory management module.
//!
//! A fixed table of up to four independently managed physical regions
//! (on-chip SRAM, external SDRAM, DMA window, ...). Each region keeps an
//! address-ordered chain of in-place block descriptors:
//!
//! - allocation is first-fit and splits a block when the remainder is more
//!   than another descriptor plus a minimum payload,
//! - release coalesces with both address-adjacent neighbours, so no two
//!   neighbouring blocks are ever both free,
//! - descriptors carry no back-link; the predecessor is found by walking the
//!   chain from the head, which keeps headers at two words.
//!
//! [`RegionTable`] is the explicitly owned allocator. The kernel keeps one
//! instance behind an IRQ-masking lock, reachable through [`init`],
//! [`alloc`] and [`free`].

pub mod descriptor;
pub mod phys;
pub mod region;
pub mod table;

use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use lazyinit::LazyInit;

use crate::error::MmError;
use crate::hal::Mutex;

pub use descriptor::{DescFlags, Descriptor, HEADER_SIZE};
pub use phys::{MemRegionFlags, RegionConfig};
pub use region::{BlockInfo, Blocks, Region, RegionStats};
pub use table::RegionTable;

/// Number of slots in the region table.
pub const MAX_REGIONS: usize = 4;

/// Selects one slot of the region table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(u8);

impl RegionId {
    pub const fn new(index: usize) -> Option<Self> {
        if index < MAX_REGIONS {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Every slot, configured or not.
    pub fn all() -> impl Iterator<Item = RegionId> {
        (0..MAX_REGIONS as u8).map(RegionId)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static MEMORY: LazyInit<Mutex<RegionTable>> = LazyInit::new();

/// Set by the first [`init`] caller, cleared again if its table is rejected.
static INIT_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Initializes the kernel's region table (`mm_init`). Only the first call
/// can succeed; later or concurrent calls get
/// [`MmError::AlreadyInitialized`].
///
/// # Safety
///
/// See [`RegionTable::new`]: every configured region must be usable RAM
/// owned by nobody else.
pub unsafe fn init(configs: &[RegionConfig]) -> Result<(), MmError> {
    if INIT_CLAIMED.swap(true, Ordering::AcqRel) {
        return Err(MmError::AlreadyInitialized);
    }
    let table = match unsafe { RegionTable::new(configs) } {
        Ok(table) => table,
        Err(err) => {
            INIT_CLAIMED.store(false, Ordering::Release);
            return Err(err);
        }
    };
    for region in table.regions() {
        info!(
            "mm: {} '{}' [{:#x}, {:#x}) {:?}",
            region.id(),
            region.name(),
            region.base().as_usize(),
            region.end().as_usize(),
            region.flags()
        );
    }
    MEMORY.init_once(Mutex::new(table));
    Ok(())
}

/// Runs `f` with exclusive access to the kernel's region table. IRQs stay
/// masked for the duration of `f`.
pub fn with_table<R>(f: impl FnOnce(&mut RegionTable) -> R) -> Result<R, MmError> {
    let memory = MEMORY.get().ok_or(MmError::NotInitialized)?;
    Ok(f(&mut memory.lock()))
}

/// Allocates `size` bytes from region `id`.
pub fn alloc(id: RegionId, size: usize) -> Result<NonNull<u8>, MmError> {
    with_table(|table| table.allocate(id, size))?
}

/// Releases a pointer obtained from [`alloc`].
pub fn free(ptr: NonNull<u8>) -> Result<(), MmError> {
    with_table(|table| table.free(ptr))?
}

/// Checks region `id` and returns its occupancy.
pub fn stats(id: RegionId) -> Result<RegionStats, MmError> {
    with_table(|table| table.check(id))?
}

/// Whether region slot `id` of the kernel's table is configured.
pub fn is_configured(id: RegionId) -> bool {
    with_table(|table| table.region(id).is_ok()).unwrap_or(false)
}

/// Copies region `id`'s chain into `out` and returns how many blocks were
/// written. Blocks beyond `out.len()` are skipped.
pub fn dump_region(id: RegionId, out: &mut [BlockInfo]) -> Result<usize, MmError> {
    with_table(|table| {
        let blocks = table.dump(id)?;
        Ok(out.iter_mut().zip(blocks).map(|(slot, block)| *slot = block).count())
    })?
}

/// Descriptors [`print_region`] copies out of a region per call.
const PRINT_BLOCKS: usize = 32;

/// Copy of a region's chain, taken under the table lock so printing can
/// run with IRQs enabled.
struct RegionSnapshot {
    name: &'static str,
    blocks: [BlockInfo; PRINT_BLOCKS],
    copied: usize,
    total: usize,
    check: Result<RegionStats, MmError>,
}

impl RegionSnapshot {
    fn take(table: &RegionTable, id: RegionId) -> Result<Self, MmError> {
        let region = table.region(id)?;
        let mut blocks = [BlockInfo::EMPTY; PRINT_BLOCKS];
        let mut total = 0;
        for block in region.iter() {
            if let Some(slot) = blocks.get_mut(total) {
                *slot = block;
            }
            total += 1;
        }
        Ok(Self {
            name: region.name(),
            blocks,
            copied: total.min(PRINT_BLOCKS),
            total,
            check: region.check(),
        })
    }

    fn write_to(&self, out: &mut impl fmt::Write, id: RegionId) -> fmt::Result {
        writeln!(out, "Region {} '{}':", id, self.name)?;
        for block in &self.blocks[..self.copied] {
            writeln!(
                out,
                "  node {:#010x} next {:#010x} size {:>8} {}",
                block.addr.as_usize(),
                block.next.map_or(0, |next| next.as_usize()),
                block.size,
                if block.used { "used" } else { "free" }
            )?;
        }
        if self.total > self.copied {
            writeln!(out, "  ... {} more blocks", self.total - self.copied)?;
        }
        if let Err(err) = &self.check {
            writeln!(out, "  !! {}", err)?;
        }
        Ok(())
    }
}

/// Console sink for [`RegionSnapshot::write_to`].
struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        print!("{}", s);
        Ok(())
    }
}

/// Prints region `id`'s chain on the console, one line per descriptor. The
/// chain is copied under the lock and printed after it is released.
pub fn print_region(id: RegionId) {
    match with_table(|table| RegionSnapshot::take(table, id)) {
        Ok(Ok(snapshot)) => {
            let _ = snapshot.write_to(&mut Console, id);
        }
        Err(err) | Ok(Err(err)) => warn!("mm: cannot print region {}: {}", id, err),
    }
}
