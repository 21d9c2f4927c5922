//! Stay-in-bootloader reset path.
//!
//! On a fatal error the kernel writes the stay-in-bootloader magic into the
//! reset-persistent boot signature and asks the reset controller for a
//! processor reset. The bootloader then keeps running and waits for a new
//! image on the serial line. Nothing here touches allocator state.

use core::ptr::{NonNull, addr_of_mut};

use tock_registers::interfaces::Writeable;
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

use crate::config::board::RESET_CONTROLLER_BASE;
use crate::config::kernel::{
    BOOT_SIGNATURE_SIZE, BOOTLOADER_REQUEST_BYTE, STAY_IN_BOOTLOADER_MAGIC,
};
use crate::hal::irq::{disable_irqs, memory_barrier};

register_bitfields! [
    u32,
    RSTC_CR [
        /// Processor reset.
        PROCRST OFFSET(0) NUMBITS(1) [],
        /// Write access key.
        KEY OFFSET(24) NUMBITS(8) [
            Passwd = 0xA5
        ]
    ]
];

register_structs! {
    /// Reset controller register block.
    pub RstcRegs {
        (0x00 => cr: WriteOnly<u32, RSTC_CR::Register>),
        (0x04 => sr: ReadOnly<u32>),
        (0x08 => mr: ReadWrite<u32>),
        (0x0C => @END),
    }
}

/// Reset-persistent area the bootloader inspects after every reset.
#[repr(transparent)]
pub struct BootSignature([u8; BOOT_SIGNATURE_SIZE]);

impl BootSignature {
    pub const fn new() -> Self {
        Self([0; BOOT_SIGNATURE_SIZE])
    }

    /// Writes the stay-in-bootloader magic. Volatile so the stores survive
    /// into RAM even though nothing in the kernel reads them back.
    pub fn arm(&mut self) {
        let dst = self.0.as_mut_ptr();
        for (i, &byte) in STAY_IN_BOOTLOADER_MAGIC.iter().enumerate() {
            // SAFETY: the magic is shorter than the signature area.
            unsafe { dst.add(i).write_volatile(byte) };
        }
    }

    pub fn is_armed(&self) -> bool {
        self.0.starts_with(STAY_IN_BOOTLOADER_MAGIC)
    }

    pub fn as_bytes(&self) -> &[u8; BOOT_SIGNATURE_SIZE] {
        &self.0
    }
}

impl Default for BootSignature {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(target_os = "none", unsafe(link_section = ".bootsig"))]
static mut BOOT_SIGNATURE: BootSignature = BootSignature::new();

/// Requests a processor reset through the reset controller.
///
/// # Safety
///
/// `regs` must point at the reset controller of the running chip.
unsafe fn request_processor_reset(regs: NonNull<RstcRegs>) {
    let regs = unsafe { regs.as_ref() };
    regs.cr.write(RSTC_CR::KEY::Passwd + RSTC_CR::PROCRST::SET);
}

/// Resets into the bootloader and keeps it resident.
pub fn reboot_to_bootloader() -> ! {
    // SAFETY: the signature is only written here, on the way to a reset,
    // with nothing else running afterwards.
    unsafe { (*addr_of_mut!(BOOT_SIGNATURE)).arm() };
    memory_barrier();
    disable_irqs();

    if let Some(regs) = NonNull::new(RESET_CONTROLLER_BASE as *mut RstcRegs) {
        // SAFETY: board constant naming the on-chip reset controller.
        unsafe { request_processor_reset(regs) };
    }
    loop {
        core::hint::spin_loop();
    }
}

/// Whether a byte received on the serial line asks for the bootloader.
pub fn requests_bootloader(byte: u8) -> bool {
    byte == BOOTLOADER_REQUEST_BYTE
}

/// Serial receive hook. The host flashing tool sends the request byte to
/// stop the kernel; anything else is ignored.
pub fn on_serial_byte(byte: u8) {
    if requests_bootloader(byte) {
        reboot_to_bootloader();
    }
}

#[cfg(all(target_os = "none", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    if let Some(location) = info.location() {
        error!(
            "Panicked at {}:{} {}",
            location.file(),
            location.line(),
            info.message()
        );
    } else {
        error!("Panicked: {}", info.message());
    }

    reboot_to_bootloader()
}
