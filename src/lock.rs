//! Locking traits and implementations.
//!
//! Every [`Allocator`](crate::Allocator) method takes `&self`, so each
//! allocator keeps its mutable state behind a lock:
//! - the region cursor and tail of a stack or arena allocator,
//! - the destruction callback chain of every allocator,
//! - the live-block table of a system allocator in debug builds.
//!
//! There is no generic mutex in `no_std`, so the lock is a type parameter
//! implementing [`Lock`].
//!
//! # Default implementations
//! With the `std` feature, [`std::sync::Mutex<()>`] implements the trait, and
//! with the `spin` feature, so does [`spin::Mutex<()>`]. Prefer the std mutex
//! whenever libstd is available; [spinlocks are rarely the right
//! choice](https://matklad.github.io/2020/01/02/spinlocks-considered-harmful.html).

#[cfg(feature = "spin")]
use spin::Mutex;

/// A trait for types that can be used as locks.
///
/// The lock guards no data of its own. The allocator holds its state in an
/// `UnsafeCell` and only touches it while a guard is alive. A
/// [`clear`](crate::Allocator::clear) holds one guard while it runs the
/// destruction callbacks and resets the allocator, so callbacks must not call
/// back into the allocator being cleared.
///
/// # Safety
/// The type must provide unique access while a guard exists, like a mutex
/// would.
pub unsafe trait Lock: Default {
    /// The guard type returned by this lock.
    ///
    /// The allocator is unlocked when the guard is dropped.
    type Guard<'a>
    where
        Self: 'a;

    /// Locks the type, blocking until the lock is acquired.
    fn lock(&self) -> Self::Guard<'_>;
}

#[cfg(feature = "spin")]
unsafe impl Lock for Mutex<()> {
    type Guard<'a> = spin::MutexGuard<'a, ()>;

    fn lock(&self) -> Self::Guard<'_> {
        self.lock()
    }
}

#[cfg(any(test, feature = "std"))]
unsafe impl Lock for std::sync::Mutex<()> {
    type Guard<'a> = std::sync::MutexGuard<'a, ()>;

    fn lock(&self) -> Self::Guard<'_> {
        // The mutex guards no data, so poisoning carries no meaning.
        self.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
