use bitfield_struct::bitfield;

/// Architectural EFLAGS model for 32-bit protected mode.
///
/// Only the interrupt flag is interesting to the memory manager; the other
/// bits are modelled so a raw value can be inspected in full.
#[bitfield(u32, order = Lsb)]
pub struct Eflags {
    /// Carry Flag
    pub cf_carry: bool, // 0

    /// Always 1.
    #[bits(default = true)]
    _always1: bool, // 1

    /// Parity Flag
    pub pf_parity: bool, // 2

    #[bits(default = false)]
    _rsvd3: bool, // 3

    /// Adjust Flag
    pub af_adjust: bool, // 4

    #[bits(default = false)]
    _rsvd5: bool, // 5

    /// Zero Flag
    pub zf_zero: bool, // 6

    /// Sign Flag
    pub sf_sign: bool, // 7

    /// Trap Flag
    pub tf_trap: bool, // 8

    /// Interrupt Enable Flag
    pub if_interrupt_enable: bool, // 9

    /// Direction Flag
    pub df_direction: bool, // 10

    /// Overflow Flag
    pub of_overflow: bool, // 11

    /// I/O Privilege Level (2 bits)
    #[bits(2)]
    pub iopl: u8, // 12–13

    /// Nested Task
    pub nt_nested: bool, // 14

    #[bits(default = false)]
    _rsvd15: bool, // 15

    /// Resume Flag
    pub rf_resume: bool, // 16

    /// Virtual 8086 mode
    pub vm_virtual_8086: bool, // 17

    /// Alignment Check
    pub ac_alignment_check: bool, // 18

    /// Virtual Interrupt Flag
    pub vif_virtual_interrupt: bool, // 19

    /// Virtual Interrupt Pending
    pub vip_virtual_interrupt_pending: bool, // 20

    /// ID Flag: allows toggling CPUID.
    pub id_cpuid: bool, // 21

    /// Reserved 22–31
    #[bits(10, default = 0)]
    _reserved_rest: u16,
}

impl Eflags {
    /// Reads the current EFLAGS value (`pushfd; pop`).
    #[cfg(all(feature = "asm", target_arch = "x86"))]
    #[inline]
    #[must_use]
    pub fn read() -> Self {
        let r: u32;
        unsafe { core::arch::asm!("pushfd; pop {}", out(reg) r, options(nomem, preserves_flags)) }
        Self::from_bits(r)
    }

    /// Without the `asm` feature there is no CPU state to read; report
    /// interrupts as disabled so guards never try to re-enable them.
    #[cfg(not(all(feature = "asm", target_arch = "x86")))]
    #[inline]
    #[must_use]
    pub const fn read() -> Self {
        Self::new()
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
#[inline]
fn cli() {
    unsafe { core::arch::asm!("cli", options(nomem, nostack)) }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
#[inline]
fn sti() {
    unsafe { core::arch::asm!("sti", options(nomem, nostack)) }
}

#[cfg(not(all(feature = "asm", target_arch = "x86")))]
#[inline]
const fn cli() {}

#[cfg(not(all(feature = "asm", target_arch = "x86")))]
#[inline]
const fn sti() {}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `InterruptGuard::new()` snapshots `EFLAGS.IF`. If interrupts were enabled,
/// it executes `cli`. On drop, it executes `sti` **only** if they were
/// previously enabled, so guards nest correctly.
///
/// Directory, table and bitmap edits happen under this guard so a nested
/// fault or a timer tick never observes a half-written structure.
///
/// # Platform / Privilege
///
/// With the `asm` feature this requires ring 0 on 32-bit x86. Without it the
/// guard is inert, which is what hosted tests use.
///
/// # Examples
///
/// ```
/// use kernel_registers::InterruptGuard;
///
/// {
///     let _g = InterruptGuard::new();
///     // critical section
/// }
/// ```
pub struct InterruptGuard {
    were_enabled: bool,
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = Eflags::read().if_interrupt_enable();
        if enabled {
            cli();
        }
        Self {
            were_enabled: enabled,
        }
    }

    /// Whether interrupts were on when the guard was taken.
    #[inline]
    #[must_use]
    pub const fn were_enabled(&self) -> bool {
        self.were_enabled
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            sti();
        }
    }
}
