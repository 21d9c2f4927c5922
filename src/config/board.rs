//! Board memory map.
//!
//! Cortex-M7 class microcontroller: 2 MiB internal flash holding the
//! bootloader and the kernel image, 384 KiB on-chip SRAM, external SDRAM.

use const_env::from_env;

use crate::mm::{MemRegionFlags, RegionConfig, RegionId};

pub const FLASH_BASE: usize = 0x0040_0000;
pub const FLASH_SIZE: usize = 0x0020_0000;

/// Bootloader slot at the start of flash.
pub const BOOT_START: usize = FLASH_BASE;
pub const BOOT_SIZE: usize = 0x4000;

/// Kernel image slot, right after the bootloader. The last 512 bytes of
/// flash are kept for the bootloader's settings page.
pub const KERNEL_START: usize = BOOT_START + BOOT_SIZE;
pub const KERNEL_MAX_SIZE: usize = 0x001F_BE00;

pub const DEBUG_UART_BASE: usize = 0x4002_8000;
pub const RESET_CONTROLLER_BASE: usize = 0x400E_1800;

const SRAM_HEAP_BASE: usize = 0x2040_8000;
const SRAM_HEAP_SIZE: usize = 0x0004_0000;
const DMA_BASE: usize = SRAM_HEAP_BASE + SRAM_HEAP_SIZE;
const DMA_SIZE: usize = 0x0001_0000;
const SDRAM_BASE: usize = 0x7000_0000;

/// External SDRAM size, overridable with `SDRAM_SIZE=<bytes>` at build time.
#[from_env]
pub const SDRAM_SIZE: usize = 0x0020_0000;

pub const SRAM: RegionId = region_id(0);
pub const SDRAM: RegionId = region_id(1);
pub const DMA: RegionId = region_id(2);

const fn region_id(index: usize) -> RegionId {
    match RegionId::new(index) {
        Some(id) => id,
        None => panic!("region index out of range"),
    }
}

/// Region table handed to `mm::init`. Entry order defines the region ids.
pub static MEMORY_REGIONS: &[RegionConfig] = &[
    RegionConfig::new(
        "sram",
        SRAM_HEAP_BASE,
        SRAM_HEAP_SIZE,
        MemRegionFlags::READ.union(MemRegionFlags::WRITE),
    ),
    RegionConfig::new(
        "sdram",
        SDRAM_BASE,
        SDRAM_SIZE,
        MemRegionFlags::READ.union(MemRegionFlags::WRITE),
    ),
    RegionConfig::new(
        "dma",
        DMA_BASE,
        DMA_SIZE,
        MemRegionFlags::READ
            .union(MemRegionFlags::WRITE)
            .union(MemRegionFlags::UNCACHED)
            .union(MemRegionFlags::DMA),
    ),
];
