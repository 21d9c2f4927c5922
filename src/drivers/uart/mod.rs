//! ARM PL011 UART driver, the serial debug channel.
//!
//! Output written before [`init_early`] is discarded, so the console can be
//! used from code that also runs in hosted tests.

use arm_pl011::Pl011Uart;
use lazyinit::LazyInit;
use memory_addr::PhysAddr;

use crate::hal::Mutex;

static UART: LazyInit<Mutex<Pl011Uart>> = LazyInit::new();

fn do_putchar(uart: &mut Pl011Uart, c: u8) {
    match c {
        b'\n' => {
            uart.putchar(b'\r');
            uart.putchar(b'\n');
        }
        c => uart.putchar(c),
    }
}

/// Writes a byte to the console.
pub fn putchar(c: u8) {
    if let Some(uart) = UART.get() {
        do_putchar(&mut uart.lock(), c);
    }
}

/// Writes a whole string with the UART lock held once.
pub fn puts(s: &str) {
    if let Some(uart) = UART.get() {
        let mut uart = uart.lock();
        for c in s.bytes() {
            do_putchar(&mut uart, c);
        }
    }
}

/// Reads a byte from the console, or returns [`None`] if no input is available.
pub fn getchar() -> Option<u8> {
    UART.get()?.lock().getchar()
}

/// UART IRQ handler. Received bytes go to the stay-in-bootloader hook.
pub fn irq_handler() {
    let Some(uart) = UART.get() else {
        return;
    };
    let is_receive_interrupt = uart.lock().is_receive_interrupt();
    uart.lock().ack_interrupts();
    if is_receive_interrupt {
        while let Some(c) = getchar() {
            crate::boot::on_serial_byte(c);
        }
    }
}

/// Early stage initialization of the PL011 UART driver. The microcontroller
/// runs without an MMU, so the physical base is used as is.
pub fn init_early(uart_base: PhysAddr) {
    if UART.is_inited() {
        return;
    }
    UART.init_once(Mutex::new(Pl011Uart::new(uart_base.as_usize() as *mut u8)));
    UART.lock().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_before_init_is_ignored() {
        irq_handler();
        assert_eq!(getchar(), None);
    }
}
