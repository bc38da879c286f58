//! Finalization hooks run when the last reference of a handle goes away.

use std::fmt;


/// Cleanup capability attached to a [`RefHandle`](crate::RefHandle).
///
/// [`on_all_references_released`] is called exactly once per logical
/// object, when its count reaches zero. When the last reference disappears
/// through `Drop`, the call happens on the owning context; an explicit
/// [`RefHandle::release`](crate::RefHandle::release) calls it on the
/// releasing thread. Implementations must not assume they hold any lock.
///
/// [`on_all_references_released`]: OnReleased::on_all_references_released
pub trait OnReleased: Send + Sync + 'static {
    /// Called once when the logical count reaches zero.
    fn on_all_references_released(&self) {
        log::info!("refcountable: all references released");
    }

    /// Extra validity condition checked by
    /// [`RefHandle::is_valid`](crate::RefHandle::is_valid) and before every
    /// release.
    #[inline]
    fn is_valid(&self) -> bool {
        true
    }
}


/// Hook that only logs the release.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogOnRelease;

impl OnReleased for LogOnRelease {}


/// Silent hook.
impl OnReleased for () {
    #[inline]
    fn on_all_references_released(&self) {}
}


/// Hook built from a closure.
///
/// ```
/// use refcountable::{FnHook, RefHandle};
///
/// let handle = RefHandle::with_hook(FnHook::new(|| println!("gone")));
/// handle.release(); // prints "gone"
/// assert!(handle.is_destroying());
/// ```
pub struct FnHook<F>(F);

impl<F> FnHook<F>
where
    F: Fn() + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> OnReleased for FnHook<F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn on_all_references_released(&self) {
        (self.0)()
    }
}

impl<F> fmt::Debug for FnHook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHook").finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_hook_is_valid() {
        assert!(LogOnRelease.is_valid());
        assert!(().is_valid());
        LogOnRelease.on_all_references_released();
    }

    #[test]
    fn test_fn_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = {
            let calls = calls.clone();
            FnHook::new(move || {
                calls.fetch_add(1, Ordering::Relaxed);
            })
        };
        hook.on_all_references_released();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(format!("{:?}", hook), "FnHook { .. }");
    }
}
