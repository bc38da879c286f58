//! Identification of the owning thread

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

thread_local! {
    /// Thread-local byte whose address differentiates threads. Not
    /// zero-sized, zero-sized locals may share one address.
    static THREAD_MARKER: u8 = const { 0 };
}


/// A unique identifier for a running thread.
///
/// Uniqueness is guaranteed between running threads. However, the ids of dead
/// threads may be reused, so an id must be cleared before its thread exits.
///
/// **Note:** the implementation uses the address of a thread local static
/// variable, which makes it cheap enough to check on every drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct ThreadId(NonZeroUsize);

impl ThreadId {
    /// Gets the id for the thread that invokes it.
    ///
    /// Returns `None` while the thread's local data is being torn down.
    #[inline]
    pub(crate) fn current_thread() -> Option<Self> {
        THREAD_MARKER
            .try_with(|x| x as *const _ as usize)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Self)
    }
}


/// An [`Option`]`<`[`ThreadId`]`>` which can be safely shared between threads.
#[derive(Debug, Default)]
#[repr(transparent)]
pub(crate) struct AtomicOptionThreadId(AtomicUsize);

#[inline(always)]
fn wrap(value: usize) -> Option<ThreadId> {
    NonZeroUsize::new(value).map(ThreadId)
}

#[inline(always)]
fn unwrap(value: Option<ThreadId>) -> usize {
    value.map_or(0, |id| id.0.get())
}

impl AtomicOptionThreadId {
    #[inline]
    pub(crate) fn load(&self, order: Ordering) -> Option<ThreadId> {
        wrap(self.0.load(order))
    }

    #[inline]
    pub(crate) fn store(&self, val: Option<ThreadId>, order: Ordering) {
        self.0.store(unwrap(val), order);
    }

    /// `true` if the stored id is the one of the calling thread.
    #[inline]
    pub(crate) fn is_current(&self) -> bool {
        match (self.load(Ordering::Acquire), ThreadId::current_thread()) {
            (Some(stored), Some(current)) => stored == current,
            _ => false,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Tests if the thread id stays the same on the same thread.
    #[test]
    fn test_thread_ids_eq() {
        let a = ThreadId::current_thread();
        let b = ThreadId::current_thread();
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    /// Tests if the thread id of two different threads differ.
    #[test]
    fn test_thread_ids_ne() {
        let a = ThreadId::current_thread();
        let b = thread::spawn(ThreadId::current_thread).join().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_atomic() {
        let slot = AtomicOptionThreadId::default();
        assert_eq!(slot.load(Ordering::Relaxed), None);
        assert!(!slot.is_current());

        slot.store(ThreadId::current_thread(), Ordering::Release);
        assert!(slot.is_current());

        let other = thread::scope(|s| s.spawn(|| slot.is_current()).join().unwrap());
        assert!(!other);

        slot.store(None, Ordering::Release);
        assert!(!slot.is_current());
    }
}
