//! Cross-thread properties of the lock family through the public API.

// Counters guarded by the locks under test need raw cells.
#![allow(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hydra_sync::{
    AdvanceMutex, Atomic, AtomicFloat, AtomicInt, Backoff, OsMutex, RawLock, ReentrantMutex,
    RwSpinLock, SpinMutex,
};

/// Shared counter guarded by any raw lock.
struct Guarded<L: RawLock> {
    lock: L,
    counter: std::cell::UnsafeCell<usize>,
}

// SAFETY: counter is only touched while the lock is held.
unsafe impl<L: RawLock + Send + Sync> Sync for Guarded<L> {}

fn hammer<L: RawLock + Send + Sync + 'static>(lock: L, threads: usize, rounds: usize) -> usize {
    let shared = Arc::new(Guarded {
        lock,
        counter: std::cell::UnsafeCell::new(0),
    });

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                for _ in 0..rounds {
                    let _guard = shared.lock.guard();
                    // SAFETY: the lock is held.
                    unsafe { *shared.counter.get() += 1 };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    // SAFETY: all writers have joined.
    unsafe { *shared.counter.get() }
}

#[test]
fn every_lock_flavor_provides_mutual_exclusion() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 5_000;
    const EXPECTED: usize = THREADS * ROUNDS;

    assert_eq!(hammer(SpinMutex::new(), THREADS, ROUNDS), EXPECTED);
    assert_eq!(hammer(OsMutex::new(), THREADS, ROUNDS), EXPECTED);
    assert_eq!(
        hammer(ReentrantMutex::<OsMutex>::default(), THREADS, ROUNDS),
        EXPECTED
    );
    assert_eq!(hammer(AdvanceMutex::new(), THREADS, ROUNDS), EXPECTED);
    assert_eq!(hammer(RwSpinLock::new(), THREADS, ROUNDS), EXPECTED);
}

#[test]
fn float_cell_cas_wins_exactly_once() {
    const RACERS: usize = 12;

    let cell: Arc<AtomicFloat> = Arc::new(Atomic::new(0.0));
    let wins = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let cell = Arc::clone(&cell);
            let wins = Arc::clone(&wins);
            std::thread::spawn(move || {
                if cell.compare_and_swap(0.0, 1.0) {
                    wins.fetch_add(1, Ordering::AcqRel);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(wins.load(Ordering::Acquire), 1);
    assert_eq!(cell.load(), 1.0);
}

#[test]
fn spin_lock_hands_a_token_around() {
    // Each thread waits for its own value, then advances the token. The
    // sequence 0 -> 1 -> 2 -> 3 proves spin_lock takes each transition once.
    const THREADS: u32 = 4;

    let token = Arc::new(AtomicInt::<u32>::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|turn| {
            let token = Arc::clone(&token);
            std::thread::spawn(move || token.spin_lock(turn, turn + 1))
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(token.load(), THREADS);
}

#[test]
fn backoff_loop_terminates_past_the_yield_threshold() {
    let flag = Arc::new(AtomicInt::<u8>::new(0));

    let waiter = {
        let flag = Arc::clone(&flag);
        std::thread::spawn(move || {
            let mut backoff = Backoff::new();
            while flag.load() == 0 {
                backoff.spin();
            }
            backoff.is_yielding()
        })
    };

    // Long enough that the waiter has crossed into the yielding regime.
    std::thread::sleep(std::time::Duration::from_millis(20));
    flag.store(1);
    assert!(waiter.join().unwrap());
}
