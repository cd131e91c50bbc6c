// Idle sleep between interrupts
//
// The scheduler decides *whether* to sleep; the platform decides *how*.
// Sleep::sleep is entered with interrupts masked, after the scheduler has
// re-checked for pending ISR work under the same critical section. The
// implementation must return as soon as any interrupt is pending even
// though delivery is masked (wfi on riscv and cortex-m does exactly this).
// The interrupt is then taken when the critical section ends, so nothing
// that fires after the re-check can be missed.

use critical_section::CriticalSection;

pub trait Sleep {
    /// Platform specific low-power mode selector.
    type Mode: Copy;

    /// Arm `mode`, halt until an interrupt is pending, disarm.
    fn sleep(&mut self, cs: CriticalSection<'_>, mode: Self::Mode);
}

/// Plain wait-for-interrupt, no extra power mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct Wfi;

impl Sleep for Wfi {
    type Mode = ();

    #[inline]
    fn sleep(&mut self, _cs: CriticalSection<'_>, _mode: ()) {
        wait_for_interrupt();
    }
}

#[inline]
pub fn wait_for_interrupt() {
    #[cfg(target_arch = "riscv32")]
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack));
    }

    #[cfg(not(target_arch = "riscv32"))]
    {
        core::hint::spin_loop();
    }
}
