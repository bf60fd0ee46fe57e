//! # Kernel synchronization primitives
//!
//! A ticket lock, [`SpinLock`], guarding process-wide kernel state such as
//! the physical page allocator. Waiters are served strictly in arrival
//! order. State shared with interrupt handlers is locked through
//! [`SpinLock::lock_irq`], which masks interrupts first.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;

pub use irq::{IrqGuard, IrqSpinLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
