//! Console print macros.
//!
//! Lines are formatted into a fixed buffer first and handed to the UART in
//! one piece, so output from an interrupt handler is never interleaved
//! mid-line.

use core::fmt::{self, Write};

use crate::hal::Mutex;

static PRINT_LOCK: Mutex<()> = Mutex::new(());

/// Buffer size for formatting output before sending to UART.
const PRINT_BUFFER_SIZE: usize = 256;

/// A printer that formats into a fixed-size buffer, then outputs atomically.
struct BufferedPrinter {
    buffer: [u8; PRINT_BUFFER_SIZE],
    pos: usize,
}

impl BufferedPrinter {
    const fn new() -> Self {
        Self {
            buffer: [0; PRINT_BUFFER_SIZE],
            pos: 0,
        }
    }

    fn flush(&mut self) {
        if self.pos == 0 {
            return;
        }
        // A full buffer may end inside a multi-byte character; emit the
        // valid prefix and carry the rest over.
        let valid = match core::str::from_utf8(&self.buffer[..self.pos]) {
            Ok(s) => s.len(),
            Err(err) => err.valid_up_to(),
        };
        if let Ok(s) = core::str::from_utf8(&self.buffer[..valid]) {
            crate::drivers::uart::puts(s);
        }
        self.buffer.copy_within(valid..self.pos, 0);
        self.pos -= valid;
    }
}

impl Write for BufferedPrinter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            if self.pos >= PRINT_BUFFER_SIZE {
                self.flush();
            }
            self.buffer[self.pos] = byte;
            self.pos += 1;
        }
        Ok(())
    }
}

impl Drop for BufferedPrinter {
    fn drop(&mut self) {
        self.flush();
    }
}

pub fn _print(args: fmt::Arguments) {
    let _guard = PRINT_LOCK.lock();

    let mut printer = BufferedPrinter::new();
    // Printing must never panic; a dropped line is acceptable.
    let _ = printer.write_fmt(args);
}

/// Simple console print operation.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ({
        $crate::console::print::_print(format_args!($($arg)*))
    });
}

/// Simple console print operation with newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
