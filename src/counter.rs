//! Counter block shared by every copy of a [`RefHandle`](crate::RefHandle).

use std::process::abort;
use std::sync::atomic;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicBool, AtomicUsize};


/// A soft limit on the amount of logical references to one block.
///
/// Going above it aborts the program, see [`CounterBlock::increment`].
const MAX_REFCOUNT: usize = (isize::MAX) as usize;


/// Outcome of a [`CounterBlock::decrement`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Decrement {
    /// The count was already zero, nothing changed.
    Refused,
    /// The count was decremented but other references remain.
    Remaining(usize),
    /// This decrement took the count from one to zero.
    Last,
}


/// The live count and the destroying flag of one logical object.
///
/// The block itself is kept alive by an [`Arc`](std::sync::Arc) held by each
/// handle copy; the logical `count` stored here is independent of it.
#[derive(Debug)]
pub(crate) struct CounterBlock {
    count: AtomicUsize,
    destroying: AtomicBool,
}


impl CounterBlock {
    /// Creates a block holding a single reference.
    pub(crate) fn new() -> Self {
        Self {
            count: AtomicUsize::new(1),
            destroying: AtomicBool::new(false),
        }
    }

    /// Current logical count.
    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.count.load(Acquire)
    }

    #[inline]
    pub(crate) fn is_destroying(&self) -> bool {
        self.destroying.load(Acquire)
    }

    /// Adds one reference.
    ///
    /// Returns `false` without touching the count when the block is
    /// destroying or the count already dropped to zero: a count that reached
    /// zero never grows again.
    pub(crate) fn increment(&self) -> bool {
        if self.is_destroying() {
            return false;
        }

        // Relaxed is enough for increments: a new reference can only be
        // made from an existing one, and handing that one to another thread
        // already synchronizes.
        let mut current = self.count.load(Relaxed);
        loop {
            if current == 0 {
                return false;
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Relaxed,
                Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        // Same guard as `Arc::clone`: only reachable by leaking handles
        // in a loop, and continuing would wrap the counter.
        if current > MAX_REFCOUNT {
            abort();
        }
        true
    }

    /// Removes one reference without ever going below zero.
    ///
    /// The decrement that returns [`Decrement::Last`] has synchronized with
    /// every earlier decrement, so whatever the other copies wrote before
    /// releasing is visible to the caller.
    pub(crate) fn decrement(&self) -> Decrement {
        let mut current = self.count.load(Relaxed);
        loop {
            if current == 0 {
                return Decrement::Refused;
            }
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Release,
                Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        if current != 1 {
            return Decrement::Remaining(current - 1);
        }

        // Pairs with the `Release` of every other decrement, same as the
        // fence in `Arc::drop`.
        atomic::fence(Acquire);
        Decrement::Last
    }

    /// Flags the block as destroying. Called once, by the owner of
    /// [`Decrement::Last`].
    pub(crate) fn mark_destroying(&self) {
        self.destroying.store(true, Release);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_block() {
        let block = CounterBlock::new();
        assert_eq!(block.count(), 1);
        assert!(!block.is_destroying());
    }

    #[test]
    fn test_increment_decrement() {
        let block = CounterBlock::new();
        assert!(block.increment());
        assert!(block.increment());
        assert_eq!(block.count(), 3);

        assert_eq!(block.decrement(), Decrement::Remaining(2));
        assert_eq!(block.decrement(), Decrement::Remaining(1));
        assert_eq!(block.decrement(), Decrement::Last);
        assert_eq!(block.count(), 0);
    }

    #[test]
    fn test_zero_is_final() {
        let block = CounterBlock::new();
        assert_eq!(block.decrement(), Decrement::Last);

        assert!(!block.increment());
        assert_eq!(block.decrement(), Decrement::Refused);
        assert_eq!(block.count(), 0);
    }

    #[test]
    fn test_destroying_blocks_increment() {
        let block = CounterBlock::new();
        assert!(block.increment());
        block.mark_destroying();

        assert!(block.is_destroying());
        assert!(!block.increment());
        assert_eq!(block.count(), 2);
    }
}
