//! # Interrupt masking
//!
//! Kernel state that interrupt handlers may touch (the page allocator, for
//! one) must be locked with interrupts masked, or a handler that interrupts
//! the lock holder spins on the lock forever.
//!
//! On bare-metal x86 the guard uses `pushf`/`cli`/`sti`. Hosted builds
//! (unit tests) cannot execute those instructions; there the guard does
//! nothing and [`interrupts_enabled`] reports `false`.

use crate::{SpinLock, SpinLockGuard};
use core::fmt;
use core::ops::{Deref, DerefMut};

#[cfg(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64")))]
mod arch {
    /// Interrupt flag in `EFLAGS`/`RFLAGS`.
    const IF: usize = 1 << 9;

    #[inline]
    pub fn interrupts_enabled() -> bool {
        let flags: usize;
        // SAFETY: Reads the flags register through the stack; no other state changes.
        unsafe {
            #[cfg(target_arch = "x86")]
            core::arch::asm!("pushfd", "pop {}", out(reg) flags, options(preserves_flags));
            #[cfg(target_arch = "x86_64")]
            core::arch::asm!("pushfq", "pop {}", out(reg) flags, options(preserves_flags));
        }
        flags & IF != 0
    }

    #[inline]
    pub fn disable() {
        // SAFETY: Kernel code runs at CPL 0, where `cli` is permitted.
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn enable() {
        // SAFETY: As above; only called to restore a previously enabled state.
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}

#[cfg(not(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64"))))]
mod arch {
    #[inline]
    pub const fn interrupts_enabled() -> bool {
        false
    }

    #[inline]
    pub const fn disable() {}

    #[inline]
    pub const fn enable() {}
}

/// Whether maskable interrupts are currently enabled on this CPU.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    arch::interrupts_enabled()
}

/// Masks interrupts while alive; restores the previous state on drop.
///
/// Guards nest: only the outermost one that found interrupts enabled
/// re-enables them.
#[must_use = "interrupts are restored as soon as the guard is dropped"]
pub struct IrqGuard {
    were_enabled: bool,
}

impl IrqGuard {
    #[inline]
    pub fn new() -> Self {
        let were_enabled = arch::interrupts_enabled();
        if were_enabled {
            arch::disable();
        }
        Self { were_enabled }
    }

    /// Whether dropping this guard re-enables interrupts.
    #[inline]
    #[must_use]
    pub const fn restores(&self) -> bool {
        self.were_enabled
    }
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            arch::enable();
        }
    }
}

impl fmt::Debug for IrqGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqGuard")
            .field("restores", &self.were_enabled)
            .finish()
    }
}

/// A [`SpinLock`] guard taken with interrupts masked.
///
/// The lock is released before interrupts are restored.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct IrqSpinLockGuard<'a, T> {
    // Field order is drop order: unlock first, then unmask.
    guard: SpinLockGuard<'a, T>,
    _irq: IrqGuard,
}

impl<T> SpinLock<T> {
    /// Mask interrupts, then take the lock.
    ///
    /// Use this for any lock an interrupt handler may also take.
    #[inline]
    pub fn lock_irq(&self) -> IrqSpinLockGuard<'_, T> {
        let irq = IrqGuard::new();
        IrqSpinLockGuard {
            guard: self.lock(),
            _irq: irq,
        }
    }

    /// [`with_lock`](Self::with_lock) with interrupts masked.
    #[inline]
    pub fn with_lock_irq<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock_irq();
        f(&mut guard)
    }
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_guards_leave_interrupts_alone() {
        let outer = IrqGuard::new();
        let inner = IrqGuard::default();
        assert!(!outer.restores());
        assert!(!inner.restores());
        assert!(!interrupts_enabled());
    }

    #[test]
    fn irq_guard_holds_the_lock() {
        let lock = SpinLock::new(0_u32);
        {
            let mut guard = lock.lock_irq();
            *guard += 1;
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
        assert_eq!(lock.with_lock_irq(|v| *v), 1);
    }
}
