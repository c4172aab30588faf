//! Busy-waiting mutual exclusion.
//!
//! Registry critical sections in this crate are a single hash map lookup or
//! insert, so the waiter spins instead of parking. The lock is neither fair
//! nor re-entrant: locking twice from the same thread never returns.

use std::{
    cell::UnsafeCell,
    fmt::{self, Debug, Formatter},
    hint,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// A bare test-and-set flag.
#[derive(Debug, Default)]
pub struct RawSpinlock {
    locked: AtomicBool,
}

impl RawSpinlock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) {
        while self.locked.swap(true, Ordering::Acquire) {
            // spin on plain loads so the cache line is not bounced by writes
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    pub fn try_lock(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Data guarded by a [`RawSpinlock`].
///
/// The data is only reachable through a [`SpinlockGuard`], which releases the
/// lock when it goes out of scope, including during unwinding.
pub struct Spinlock<T: ?Sized> {
    raw: RawSpinlock,
    data: UnsafeCell<T>,
}

// same bounds as std::sync::Mutex
unsafe impl<T: ?Sized + Send> Send for Spinlock<T> {}
unsafe impl<T: ?Sized + Send> Sync for Spinlock<T> {}

pub struct SpinlockGuard<'a, T: ?Sized> {
    lock: &'a Spinlock<T>,
    // released by the thread that acquired it
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for SpinlockGuard<'_, T> {}

impl<T> Spinlock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            raw: RawSpinlock::new(),
            data: UnsafeCell::new(data),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Spinlock<T> {
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        self.raw.lock();
        SpinlockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        if self.raw.try_lock() {
            Some(SpinlockGuard {
                lock: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for Spinlock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> Debug for Spinlock<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spinlock")
            .field("locked", &self.raw.is_locked())
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> Deref for SpinlockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        // the guard proves exclusive access
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinlockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn exclusive_increment() {
        let counter = Spinlock::new(0u64);
        crossbeam::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|_| {
                    for _ in 0..10_000 {
                        // non-atomic read-modify-write, only safe under the lock
                        let mut guard = counter.lock();
                        let value = *guard;
                        *guard = value + 1;
                    }
                });
            }
        })
        .unwrap();
        assert_eq!(counter.into_inner(), 80_000);
    }

    #[test]
    fn guard_releases_on_scope_exit() {
        let lock = Spinlock::new(());
        {
            let _guard = lock.lock();
            assert!(lock.try_lock().is_none());
        }
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn guard_releases_on_unwind() {
        let lock = Spinlock::new(1);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock();
            panic!("fail inside critical section");
        }));
        assert!(result.is_err());
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn raw_lock_unlock() {
        let raw = RawSpinlock::new();
        raw.lock();
        assert!(raw.is_locked());
        assert!(!raw.try_lock());
        raw.unlock();
        assert!(raw.try_lock());
        raw.unlock();
    }
}
