use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Reusable rendezvous for one process group.
///
/// Every round carries a generation number. An arrival waits until the
/// generation it arrived in has been released, so a caller that shows up
/// right after a release is counted into the next round rather than the one
/// that just completed.
#[derive(Debug, Default)]
pub struct Barrier {
    round: Mutex<Round>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct Round {
    reached: usize,
    generation: u64,
}

impl Barrier {
    /// Count one arrival and block until the round is released. `threshold`
    /// is evaluated under the barrier lock, after the arrival is counted.
    ///
    /// Returns the generation of the released round.
    pub fn arrive(&self, threshold: impl FnOnce() -> usize) -> u64 {
        let mut round = self.lock();
        let generation = round.generation;
        round.reached += 1;
        let threshold = threshold();
        if round.reached >= threshold {
            debug!(generation, reached = round.reached, "barrier released");
            round.reached = 0;
            round.generation = generation.wrapping_add(1);
            self.released.notify_all();
            return generation;
        }

        let _round = self
            .released
            .wait_while(round, |round| round.generation == generation)
            .unwrap_or_else(PoisonError::into_inner);
        generation
    }

    pub fn reached(&self) -> usize {
        self.lock().reached
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    // counters stay consistent even if a holder panicked
    fn lock(&self) -> MutexGuard<'_, Round> {
        self.round.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread::sleep,
        time::Duration,
    };

    #[test]
    fn single_party_never_blocks() {
        let barrier = Barrier::default();
        assert_eq!(barrier.arrive(|| 1), 0);
        assert_eq!(barrier.arrive(|| 1), 1);
        assert_eq!(barrier.reached(), 0);
        assert_eq!(barrier.generation(), 2);
    }

    #[test]
    fn release_wakes_every_waiter() {
        let barrier = Barrier::default();
        let passed = AtomicUsize::new(0);
        crossbeam::thread::scope(|scope| {
            for _ in 0..3 {
                scope.spawn(|_| {
                    barrier.arrive(|| 4);
                    passed.fetch_add(1, Ordering::SeqCst);
                });
            }
            while barrier.reached() < 3 {
                sleep(Duration::from_millis(1));
            }
            assert_eq!(passed.load(Ordering::SeqCst), 0);
            assert_eq!(barrier.arrive(|| 4), 0);
        })
        .unwrap();
        assert_eq!(passed.load(Ordering::SeqCst), 3);
        assert_eq!(barrier.reached(), 0);
        assert_eq!(barrier.generation(), 1);
    }
}
