//! Local interrupt masking.
//!
//! Cortex-M boards use `PRIMASK`, bare-metal AArch64 the I bit of `DAIF`.
//! Hosted builds run at user level without interrupts, so the mask is a
//! software flag there.

/// How local interrupts are masked on the build target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqBackend {
    /// `cpsid i` / `cpsie i` on ARMv7-M.
    Primask,
    /// `DAIF.I` on AArch64.
    Daif,
    /// Per-context flag, no hardware interrupts.
    Software,
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod imp {
    use cortex_m::register::primask;

    use super::IrqBackend;

    pub const BACKEND: IrqBackend = IrqBackend::Primask;

    #[inline]
    pub fn irqs_disabled() -> bool {
        primask::read().is_inactive()
    }

    #[inline]
    pub fn disable_irqs() {
        cortex_m::interrupt::disable();
    }

    #[inline]
    pub fn enable_irqs() {
        // SAFETY: only called to restore the state saved by the lock or
        // the bring-up code, never inside a critical section it didn't open.
        unsafe { cortex_m::interrupt::enable() };
    }

    /// Orders the boot signature store before the reset request.
    #[inline]
    pub fn memory_barrier() {
        cortex_m::asm::dmb();
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod imp {
    use aarch64_cpu::registers::{DAIF, ReadWriteable, Readable};

    use super::IrqBackend;

    pub const BACKEND: IrqBackend = IrqBackend::Daif;

    #[inline]
    pub fn irqs_disabled() -> bool {
        DAIF.is_set(DAIF::I)
    }

    #[inline]
    pub fn disable_irqs() {
        DAIF.modify(DAIF::I::Masked);
    }

    #[inline]
    pub fn enable_irqs() {
        DAIF.modify(DAIF::I::Unmasked);
    }

    /// Orders the boot signature store before the reset request.
    #[inline]
    pub fn memory_barrier() {
        aarch64_cpu::asm::barrier::dmb(aarch64_cpu::asm::barrier::SY);
    }
}

#[cfg(not(all(any(target_arch = "arm", target_arch = "aarch64"), target_os = "none")))]
mod imp {
    use core::sync::atomic::{Ordering, fence};

    use super::IrqBackend;

    pub const BACKEND: IrqBackend = IrqBackend::Software;

    #[cfg(not(test))]
    mod mask {
        use core::sync::atomic::{AtomicBool, Ordering};

        static MASKED: AtomicBool = AtomicBool::new(false);

        pub fn get() -> bool {
            MASKED.load(Ordering::Relaxed)
        }

        pub fn set(masked: bool) {
            MASKED.store(masked, Ordering::Relaxed);
        }
    }

    // Unit tests run on many threads; each one plays a separate core.
    #[cfg(test)]
    mod mask {
        use core::cell::Cell;

        std::thread_local! {
            static MASKED: Cell<bool> = const { Cell::new(false) };
        }

        pub fn get() -> bool {
            MASKED.with(Cell::get)
        }

        pub fn set(masked: bool) {
            MASKED.with(|cell| cell.set(masked));
        }
    }

    #[inline]
    pub fn irqs_disabled() -> bool {
        mask::get()
    }

    #[inline]
    pub fn disable_irqs() {
        mask::set(true);
    }

    #[inline]
    pub fn enable_irqs() {
        mask::set(false);
    }

    #[inline]
    pub fn memory_barrier() {
        fence(Ordering::SeqCst);
    }
}

pub use imp::{BACKEND, disable_irqs, enable_irqs, irqs_disabled, memory_barrier};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_builds_use_software_mask() {
        assert_eq!(BACKEND, IrqBackend::Software);
        enable_irqs();
        assert!(!irqs_disabled());
        disable_irqs();
        assert!(irqs_disabled());
        enable_irqs();
    }

    #[test]
    fn board_targets_select_hardware_mask() {
        let hardware = cfg!(all(target_arch = "arm", target_os = "none"))
            || cfg!(all(target_arch = "aarch64", target_os = "none"));
        assert_eq!(BACKEND != IrqBackend::Software, hardware);
    }
}
