//! Copyable reference-counted handles.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{AcqRel, Acquire};
use std::sync::Arc;
use std::time::Instant;

use crate::context::{Completion, CompletionState, Dispatch, Task};
use crate::counter::{CounterBlock, Decrement};
use crate::global::owning_context;
use crate::hook::{LogOnRelease, OnReleased};
use crate::types::HandleOptions;



/// One reference: the shared block, the hook and this copy's release flag.
///
/// Kept apart from [`RefHandle`] so that `Drop` can move it, by value, into
/// the task it sends to the owning context.
struct Reference<H> {
    block: Option<Arc<CounterBlock>>,
    hook: Arc<H>,
    released: AtomicBool,
}

impl<H: OnReleased> Reference<H> {
    #[inline]
    fn is_valid(&self) -> bool {
        self.block.is_some() && self.hook.is_valid()
    }

    #[inline]
    fn is_destroying(&self) -> bool {
        self.block.as_ref().map_or(true, |block| block.is_destroying())
    }

    #[inline]
    fn is_released(&self) -> bool {
        self.released.load(Acquire)
    }

    /// Gives up this copy's reference, at most once.
    fn release(&self) {
        let Some(block) = self.block.as_deref() else {
            log::trace!("release on an invalid handle ignored");
            return;
        };
        if !self.hook.is_valid() || block.is_destroying() || self.is_released() {
            log::trace!("redundant release ignored");
            return;
        }
        // Two threads racing on the same copy: only one gets past this.
        if self.released.swap(true, AcqRel) {
            return;
        }

        match block.decrement() {
            Decrement::Last => {
                block.mark_destroying();
                self.hook.on_all_references_released();
            }
            Decrement::Remaining(count) => {
                log::trace!("reference released, {count} left");
            }
            // Copy made while the object was already going away.
            Decrement::Refused => {
                log::trace!("release of a dead copy ignored");
            }
        }
    }
}


/// A copyable handle to a reference-counted logical object.
///
/// Every clone shares the same counter and counts as one reference. Each
/// copy gives up its reference exactly once, either explicitly through
/// [`release`](RefHandle::release) or when it is dropped. The copy taking
/// the count to zero calls [`OnReleased::on_all_references_released`] on
/// the hook, once per logical object.
///
/// # Dropping
///
/// Dropping a copy that still holds its reference runs the release on the
/// handle's owning context ([`Dispatch`]). When dropped on another thread,
/// the drop blocks until the owning context ran the release. This wait has
/// no timeout and cannot be cancelled: if the owning context is stuck, so
/// is the dropping thread. [`HandleOptions::stall_warning`] can make such
/// stalls visible in the logs.
///
/// Calling [`release`](RefHandle::release) first makes the drop free, at
/// the price of running the hook on the releasing thread.
///
/// ```
/// use refcountable::{FnHook, RefHandle};
///
/// let handle = RefHandle::with_hook(FnHook::new(|| println!("released")));
/// let copy = handle.clone();
/// assert_eq!(copy.ref_count(), 2);
///
/// handle.release();
/// copy.release(); // prints "released"
/// assert!(copy.is_destroying());
/// ```
pub struct RefHandle<H: OnReleased = LogOnRelease> {
    reference: Reference<H>,
    context: Arc<dyn Dispatch>,
    options: HandleOptions,
}


impl<H: OnReleased + Default> RefHandle<H> {
    /// Creates a new logical object with a count of one, the default hook
    /// and the global owning context.
    pub fn new() -> Self {
        Self::with_hook(H::default())
    }
}

impl<H: OnReleased + Default> Default for RefHandle<H> {
    fn default() -> Self {
        Self::new()
    }
}


impl<H: OnReleased> RefHandle<H> {
    /// Creates a new logical object finalized by `hook` on the global
    /// owning context.
    pub fn with_hook(hook: H) -> Self {
        Self::with_context(hook, owning_context(), HandleOptions::default())
    }

    /// Creates a new logical object finalized by `hook` on `context`.
    pub fn with_context<D>(hook: H, context: D, options: HandleOptions) -> Self
    where
        D: Dispatch + 'static,
    {
        Self {
            reference: Reference {
                block: Some(Arc::new(CounterBlock::new())),
                hook: Arc::new(hook),
                released: AtomicBool::new(false),
            },
            context: Arc::new(context),
            options,
        }
    }

    /// Gives up this copy's reference.
    ///
    /// No-op if this copy already released, if the object is being
    /// destroyed or if the handle is not valid. The call that takes the
    /// count to zero runs the hook before returning, on the calling thread.
    pub fn release(&self) {
        self.reference.release()
    }

    /// Current count of the logical object, 0 if the handle is not backed
    /// by a counter.
    ///
    /// Other threads may change it at any time.
    pub fn ref_count(&self) -> usize {
        self.reference.block.as_ref().map_or(0, |block| block.count())
    }

    /// `true` once the count reached zero. A handle that is not backed by
    /// a counter reports `true` too.
    pub fn is_destroying(&self) -> bool {
        self.reference.is_destroying()
    }

    /// `true` if this copy already gave up its reference.
    pub fn is_released(&self) -> bool {
        self.reference.is_released()
    }

    /// `true` if the handle is backed by a counter and its hook considers
    /// itself valid.
    pub fn is_valid(&self) -> bool {
        self.reference.is_valid()
    }

    pub fn hook(&self) -> &H {
        &self.reference.hook
    }

    pub fn options(&self) -> &HandleOptions {
        &self.options
    }

    /// `true` if both handles are copies of the same logical object.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        match (&this.reference.block, &other.reference.block) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}


impl<H: OnReleased> Clone for RefHandle<H> {
    /// Makes a new copy sharing this handle's logical object.
    ///
    /// The count grows by one, unless the object is already being
    /// destroyed: the copy is then dead and releasing it does nothing.
    fn clone(&self) -> Self {
        let block = self.reference.block.clone();
        if !block.as_deref().map_or(false, CounterBlock::increment) {
            log::trace!("copy of a handle being destroyed, the copy is dead");
        }

        Self {
            reference: Reference {
                block,
                hook: self.reference.hook.clone(),
                released: AtomicBool::new(false),
            },
            context: self.context.clone(),
            options: self.options,
        }
    }

    /// Turns `self` into a copy of `source`.
    ///
    /// If `self` already holds a reference to the same object, nothing
    /// changes. Otherwise the reference held by `self` is dropped first,
    /// see [`RefHandle`].
    fn clone_from(&mut self, source: &Self) {
        if Self::ptr_eq(self, source) && !self.is_released() && !self.is_destroying() {
            return;
        }
        *self = source.clone();
    }
}


impl<H: OnReleased> Drop for RefHandle<H> {
    fn drop(&mut self) {
        // Nothing to give up. `is_destroying` also covers a missing block.
        if self.is_released() || self.is_destroying() {
            return;
        }

        let reference = Reference {
            block: self.reference.block.take(),
            hook: self.reference.hook.clone(),
            released: AtomicBool::new(false),
        };

        if self.context.is_current() {
            reference.release();
            return;
        }

        let task: Task = Box::new(move || reference.release());
        match self.context.dispatch(task) {
            Ok(completion) => wait_for_release(&completion, &self.options),
            Err(e) => {
                log::error!("{e}: handle dropped without releasing its reference");
            }
        }
    }
}


/// Blocks until the owning context settled the release task.
///
/// Loops on `wait_for(poll_interval)` with no upper bound.
fn wait_for_release(completion: &Completion, options: &HandleOptions) {
    let started = Instant::now();
    let mut warned = false;

    while !completion.wait_for(options.poll_interval) {
        if let Some(limit) = options.stall_warning {
            let waited = started.elapsed();
            if !warned && waited >= limit {
                log::warn!(
                    "dropping thread blocked for {waited:?} waiting on the owning context"
                );
                warned = true;
            }
        }
    }

    if completion.state() == CompletionState::Abandoned {
        log::error!("owning context dropped a release task, reference leaked");
    }
}


impl<H: OnReleased> fmt::Debug for RefHandle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefHandle")
            .field("ref_count", &self.ref_count())
            .field("released", &self.is_released())
            .field("destroying", &self.is_destroying())
            .finish_non_exhaustive()
    }
}
