use kernel_sync::SpinLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use std::{panic, thread};

/// Shaped like the kernel's allocator slot: empty until boot fills it.
static SLOT: SpinLock<Option<u64>> = SpinLock::new(None);

#[test]
fn guard_releases_on_drop() {
    let lock = SpinLock::new([0_u8; 4]);
    {
        let mut frames = lock.lock();
        frames[2] = 7;
        assert!(lock.is_locked());
    }
    assert!(!lock.is_locked());
    assert_eq!(lock.lock()[2], 7);
}

#[test]
fn static_slot_fills_once() {
    assert!(SLOT.with_lock(|slot| slot.replace(0x40_0000)).is_none());
    assert_eq!(SLOT.lock().as_ref().copied(), Some(0x40_0000));
    assert!(!SLOT.is_locked());
}

#[test]
fn with_lock_returns_the_closure_result() {
    let lock = SpinLock::new(Vec::<u32>::new());
    let len = lock.with_lock(|frames| {
        frames.extend([1024, 2048]);
        frames.len()
    });
    assert_eq!(len, 2);
    assert!(!lock.is_locked());
}

#[test]
fn irq_locking_shares_the_ticket_queue() {
    let lock = Arc::new(SpinLock::new(Vec::new()));
    let held = lock.lock_irq();
    assert!(lock.is_locked());

    let lock2 = Arc::clone(&lock);
    let waiter = thread::spawn(move || lock2.with_lock(|order| order.push("plain")));
    thread::sleep(Duration::from_millis(100));
    drop(held);
    waiter.join().unwrap();

    lock.with_lock_irq(|order| order.push("masked"));
    assert_eq!(*lock.lock(), ["plain", "masked"]);
}

#[test]
fn contended_updates_are_serialized() {
    const THREADS: usize = 6;
    const ROUNDS: usize = 4_000;

    let lock = Arc::new(SpinLock::new((0_usize, 0_usize)));
    let inside = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..ROUNDS {
                    lock.with_lock(|(taken, returned)| {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        *taken += 1;
                        *returned += 1;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(*lock.lock(), (THREADS * ROUNDS, THREADS * ROUNDS));
}

#[test]
fn waiters_are_served_in_arrival_order() {
    let lock = Arc::new(SpinLock::new(Vec::new()));
    let held = lock.lock();

    let waiters: Vec<_> = (0..4)
        .map(|id| {
            let lock = Arc::clone(&lock);
            let waiter = thread::spawn(move || lock.with_lock(|order| order.push(id)));
            // let the waiter draw its ticket before the next one starts
            thread::sleep(Duration::from_millis(100));
            waiter
        })
        .collect();

    drop(held);
    for waiter in waiters {
        waiter.join().unwrap();
    }
    assert_eq!(*lock.lock(), [0, 1, 2, 3]);
}

#[test]
fn panicking_holder_unlocks() {
    let lock = SpinLock::new(None::<u8>);
    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        lock.with_lock(|value| {
            *value = Some(1);
            panic!("invariant violated");
        });
    }));
    assert!(result.is_err());
    assert_eq!(lock.with_lock(|value| *value), Some(1));
}
