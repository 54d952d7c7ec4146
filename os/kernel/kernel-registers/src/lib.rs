//! # Typed i386 Control Registers
//!
//! Bitfield models of the control registers the paging code touches:
//!
//! - [`Cr0`](cr0::Cr0): protection and paging enable (`PG`, bit 31).
//! - [`Cr2`](cr2::Cr2): faulting linear address after a `#PF`.
//! - [`Cr3`](cr3::Cr3): physical base of the active page directory.
//! - [`Eflags`](eflags::Eflags): interrupt-enable flag, used by
//!   [`InterruptGuard`](eflags::InterruptGuard).
//!
//! The register *layouts* are always available so they can be built and
//! inspected in hosted tests. The `mov crN` / `cli` / `sti` instructions are
//! only compiled with the `asm` feature on a 32-bit x86 target.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod cr0;
pub mod cr2;
pub mod cr3;
pub mod eflags;

pub use cr0::Cr0;
pub use cr2::Cr2;
pub use cr3::Cr3;
pub use eflags::{Eflags, InterruptGuard};

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Writing CR0/CR3 changes how every subsequent memory access is translated.
    unsafe fn store_unsafe(self);
}
