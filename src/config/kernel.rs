//! Kernel configuration constants.

/// Image format version written into the image header.
pub const IMAGE_MAJOR_VERSION: u32 = 0;
pub const IMAGE_MINOR_VERSION: u32 = 1;

/// Magic the bootloader looks for in the boot signature after a reset.
pub const STAY_IN_BOOTLOADER_MAGIC: &[u8; 16] = b"StayInBootloader";

/// Serial byte that sends a running kernel back to the bootloader.
pub const BOOTLOADER_REQUEST_BYTE: u8 = 0;

/// Size of the reset-persistent boot signature area.
pub const BOOT_SIGNATURE_SIZE: usize = 32;

/// Number of allocate/free rounds of the boot-time self test.
pub const SELFTEST_ROUNDS: usize = 64;
