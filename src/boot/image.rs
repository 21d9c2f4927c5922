//! Firmware image header.

use core::fmt;

use crate::config::board::{
    BOOT_SIZE, BOOT_START, FLASH_BASE, FLASH_SIZE, KERNEL_MAX_SIZE, KERNEL_START,
};
use crate::config::kernel::{IMAGE_MAJOR_VERSION, IMAGE_MINOR_VERSION};
use crate::error::ConfigError;

/// Header the bootloader reads from the `.image_info` section.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub major_version: u32,
    pub minor_version: u32,
    pub boot_start: u32,
    pub boot_size: u32,
    pub kernel_start: u32,
    pub kernel_max_size: u32,
}

#[used]
#[cfg_attr(target_os = "none", unsafe(link_section = ".image_info"))]
pub static IMAGE_INFO: ImageInfo = ImageInfo {
    major_version: IMAGE_MAJOR_VERSION,
    minor_version: IMAGE_MINOR_VERSION,
    boot_start: BOOT_START as u32,
    boot_size: BOOT_SIZE as u32,
    kernel_start: KERNEL_START as u32,
    kernel_max_size: KERNEL_MAX_SIZE as u32,
};

impl ImageInfo {
    /// Checks that the kernel slot follows the bootloader and both fit in
    /// flash. The two slots are reported as region 0 and 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let flash = FLASH_BASE as u64..(FLASH_BASE + FLASH_SIZE) as u64;
        let boot_end = self.boot_start as u64 + self.boot_size as u64;
        let kernel_end = self.kernel_start as u64 + self.kernel_max_size as u64;

        if self.boot_size == 0 {
            return Err(ConfigError::ZeroCapacity { index: 0 });
        }
        if self.kernel_max_size == 0 {
            return Err(ConfigError::ZeroCapacity { index: 1 });
        }
        if !flash.contains(&(self.boot_start as u64)) || boot_end > flash.end {
            return Err(ConfigError::AddressOverflow { index: 0 });
        }
        if kernel_end > flash.end {
            return Err(ConfigError::AddressOverflow { index: 1 });
        }
        if (self.kernel_start as u64) < boot_end {
            return Err(ConfigError::Overlap { first: 0, second: 1 });
        }
        Ok(())
    }
}

impl fmt::Display for ImageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "image v{}.{}: boot [{:#010x}, +{:#x}) kernel [{:#010x}, +{:#x})",
            self.major_version,
            self.minor_version,
            self.boot_start,
            self.boot_size,
            self.kernel_start,
            self.kernel_max_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_header_is_consistent() {
        assert_eq!(IMAGE_INFO.validate(), Ok(()));
        assert_eq!(IMAGE_INFO.kernel_start, 0x0040_4000);
        assert_eq!(core::mem::size_of::<ImageInfo>(), 24);
    }

    #[test]
    fn kernel_inside_bootloader_is_rejected() {
        let header = ImageInfo {
            kernel_start: IMAGE_INFO.boot_start + 0x100,
            ..IMAGE_INFO
        };
        assert_eq!(
            header.validate(),
            Err(ConfigError::Overlap { first: 0, second: 1 })
        );
    }

    #[test]
    fn kernel_past_flash_end_is_rejected() {
        let header = ImageInfo {
            kernel_max_size: IMAGE_INFO.kernel_max_size + 0x400,
            ..IMAGE_INFO
        };
        assert_eq!(
            header.validate(),
            Err(ConfigError::AddressOverflow { index: 1 })
        );
    }
}
