//! HAL (Hardware Abstraction Layer) module.
//!
//! Only what the bring-up layer needs: local IRQ masking and the spin lock
//! built on it.

pub mod irq;
pub mod spin;

pub use irq::{disable_irqs, enable_irqs, irqs_disabled};
pub use spin::{Mutex, SpinNoIrq};
