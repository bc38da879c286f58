//! Copyable reference-counted handles with owner-context finalization.
//!
//! A [`RefHandle`] is a value that can be cloned freely and sent between
//! threads. All clones share one counter; each clone gives up its reference
//! once, explicitly with [`RefHandle::release`] or when dropped, and the
//! clone taking the count to zero runs the [`OnReleased`] hook exactly once.
//!
//! Releases triggered by `Drop` always run on the handle's owning context,
//! a single designated thread reached through the [`Dispatch`] trait. A
//! drop happening elsewhere blocks until the owning context ran it.
//!
//! Hooks are called from whichever thread finalizes, so they must be `Sync`:
//!
//! ```compile_fail
//! use std::cell::Cell;
//! use refcountable::OnReleased;
//!
//! struct Counter(Cell<u32>);
//! impl OnReleased for Counter {}
//! ```
//!
//! and a release task must own everything it touches:
//!
//! ```compile_fail
//! use std::rc::Rc;
//! use refcountable::{owning_context, Dispatch};
//!
//! let local = Rc::new(1);
//! owning_context().dispatch(Box::new(move || drop(local)));
//! ```

mod counter;
mod global;
mod handle;

pub mod context;
pub mod errors;
pub mod hook;
pub mod types;


pub use context::{ContextHandle, Dispatch, OwningContext};
pub use global::{owning_context, GLOBAL_CONTEXT_NAME};
pub use handle::RefHandle;
pub use hook::{FnHook, LogOnRelease, OnReleased};
pub use types::{HandleOptions, HandleOptionsBuilder};


static_assertions::assert_impl_all!(RefHandle: Send, Sync, Clone);
static_assertions::assert_impl_all!(ContextHandle: Send, Sync, Clone);
static_assertions::assert_impl_all!(OwningContext: Send, Sync);
