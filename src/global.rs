use once_cell::sync::Lazy;

use crate::context::{ContextHandle, OwningContext};


/// Name of the thread backing [`owning_context`].
pub const GLOBAL_CONTEXT_NAME: &str = "refcountable-owner";


/// Process-wide owning context, started on first use and never stopped.
static GLOBAL_CONTEXT: Lazy<OwningContext> = Lazy::new(|| {
    OwningContext::spawn(GLOBAL_CONTEXT_NAME)
        .unwrap_or_else(|e| panic!("refcountable: {e}"))
});


/// Gets the owning context used by handles built without an explicit one.
///
/// # Panics
/// On first use, if the owning thread cannot be spawned (same condition
/// under which [`std::thread::spawn`] panics).
pub fn owning_context() -> ContextHandle {
    GLOBAL_CONTEXT.handle()
}
