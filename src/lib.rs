//! RstinyOS microcontroller kernel - bring-up layer.
//!
//! Hosts the region-based memory manager together with the pieces the board
//! image needs around it: board configuration, console/logging, the
//! IRQ-masking lock and the stay-in-bootloader panic path.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

#[macro_use]
pub mod console;

pub mod boot;
pub mod config;
pub mod drivers;
pub mod error;
pub mod hal;
pub mod mm;
pub mod selftest;

pub use error::{ConfigError, MmError, TinyResult};

use anyhow::Context;

/// Kernel bring-up sequence, run once by the board entry point after clocks,
/// SDRAM and the debug UART are configured.
pub fn kernel_init() -> TinyResult<()> {
    drivers::uart::init_early(memory_addr::pa!(config::board::DEBUG_UART_BASE));
    console::init_logger()?;

    boot::IMAGE_INFO
        .validate()
        .context("Image header is inconsistent")?;
    info!("{}", boot::IMAGE_INFO);

    // SAFETY: the board table only names RAM that nothing else owns, and the
    // memory controllers are up by the time the entry point calls us.
    unsafe { mm::init(config::board::MEMORY_REGIONS) }
        .context("Failed to initialize memory regions")?;

    #[cfg(feature = "selftest")]
    {
        let stats =
            mm::with_table(|table| selftest::run_mm_tests(table, config::board::SRAM))?;
        if stats.failed > 0 {
            anyhow::bail!(
                "Memory manager self test failed ({} of {})",
                stats.failed,
                stats.total
            );
        }
    }

    for id in mm::RegionId::all() {
        if mm::is_configured(id) {
            mm::print_region(id);
        }
    }
    Ok(())
}
