//! Boot metadata and the way back into the bootloader.
//!
//! The bootloader reads [`IMAGE_INFO`] to find the kernel image, and checks
//! the boot signature after every reset: if it holds the stay-in-bootloader
//! magic it keeps control instead of jumping to the kernel. The kernel arms
//! it on panic and when the request byte arrives on the serial line.

pub mod image;
pub mod reset;

pub use image::{IMAGE_INFO, ImageInfo};
pub use reset::{BootSignature, on_serial_byte, reboot_to_bootloader};
