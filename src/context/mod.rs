//! The owning context: where disposal-driven finalization runs.
//!
//! A [`RefHandle`](crate::RefHandle) dropped away from its owning context
//! hands its release to a [`Dispatch`] implementation and blocks until the
//! returned [`Completion`] settles. [`OwningContext`] is the implementation
//! shipped with the crate: a dedicated thread running tasks one at a time,
//! in submission order.

pub mod completion;
mod thread_id;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

pub use completion::{Completion, CompletionState, Signal};
use thread_id::{AtomicOptionThreadId, ThreadId};

use crate::errors::{ContextError, DispatchError};


/// A unit of work for the owning context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;


/// A service able to run tasks on one designated execution context.
///
/// An implementation must either run the task and then complete the
/// [`Signal`] it created for it, or drop the signal, which settles the
/// completion as [`CompletionState::Abandoned`]. Tasks submitted from the
/// same thread should run in submission order.
pub trait Dispatch: Send + Sync {
    /// Schedules `task` on the designated context.
    fn dispatch(&self, task: Task) -> Result<Completion, DispatchError>;

    /// `true` when called from the designated context itself.
    ///
    /// Dispatching from the context and then waiting would never finish,
    /// callers use this to run the work inline instead.
    fn is_current(&self) -> bool {
        false
    }
}

impl<D: Dispatch + ?Sized> Dispatch for Arc<D> {
    fn dispatch(&self, task: Task) -> Result<Completion, DispatchError> {
        (**self).dispatch(task)
    }

    fn is_current(&self) -> bool {
        (**self).is_current()
    }
}


struct Job {
    task: Task,
    signal: Signal,
}


struct Shared {
    name: String,
    /// `None` once the context has been shut down.
    sender: Mutex<Option<Sender<Job>>>,
    owner: AtomicOptionThreadId,
}


/// Cloneable access to an [`OwningContext`].
#[derive(Clone)]
pub struct ContextHandle {
    shared: Arc<Shared>,
}

impl ContextHandle {
    /// Name of the owning thread.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// `true` once the context stopped accepting tasks.
    pub fn is_closed(&self) -> bool {
        self.shared
            .sender
            .lock()
            .map_or(true, |sender| sender.is_none())
    }

    /// Runs `f` on the owning context and waits for its result.
    ///
    /// Runs `f` directly when already on the owning context.
    pub fn run<F, R>(&self, f: F) -> Result<R, ContextError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Ok(f());
        }

        // A panic in `f` drops the signal, which abandons the result.
        let (signal, result) = completion::pair();
        self.dispatch(Box::new(move || signal.complete_with(f())))?;
        result.into_value().ok_or(ContextError::Abandoned)
    }

    /// Stops accepting tasks. Tasks already accepted still run.
    fn close(&self) {
        if let Ok(mut sender) = self.shared.sender.lock() {
            if sender.take().is_some() {
                log::debug!("owning context {:?} closed", self.shared.name);
            }
        }
    }
}

impl Dispatch for ContextHandle {
    fn dispatch(&self, task: Task) -> Result<Completion, DispatchError> {
        let guard = self
            .shared
            .sender
            .lock()
            .map_err(|_| DispatchError::Closed)?;
        let sender = guard.as_ref().ok_or(DispatchError::Closed)?;

        let (signal, completion) = completion::pair();
        sender
            .send(Job { task, signal })
            .map_err(|_| DispatchError::Closed)?;
        Ok(completion)
    }

    fn is_current(&self) -> bool {
        self.shared.owner.is_current()
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("name", &self.shared.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}


/// A dedicated thread acting as the owning context.
///
/// Dropping it is the same as calling [`shutdown`](OwningContext::shutdown)
/// and logging the error, if any.
pub struct OwningContext {
    handle: ContextHandle,
    thread: Option<JoinHandle<()>>,
}

impl OwningContext {
    /// Starts a new owning thread called `name`.
    pub fn spawn(name: impl Into<String>) -> Result<Self, ContextError> {
        let name = name.into();
        let (sender, receiver) = channel::unbounded();
        let shared = Arc::new(Shared {
            name: name.clone(),
            sender: Mutex::new(Some(sender)),
            owner: AtomicOptionThreadId::default(),
        });

        let thread = {
            let shared = shared.clone();
            thread::Builder::new()
                .name(name)
                .spawn(move || serve(&shared, receiver))?
        };

        Ok(Self {
            handle: ContextHandle { shared },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Stops accepting tasks, runs the ones already accepted and joins the
    /// owning thread.
    pub fn shutdown(mut self) -> Result<(), ContextError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), ContextError> {
        self.handle.close();

        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        // Joining from the owning thread itself would never return.
        if self.handle.is_current() {
            return Ok(());
        }
        thread.join().map_err(|_| ContextError::Join)
    }
}

impl Drop for OwningContext {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("owning context {:?}: {e}", self.handle.name());
        }
    }
}

impl fmt::Debug for OwningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwningContext")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}


/// Body of the owning thread.
fn serve(shared: &Shared, receiver: Receiver<Job>) {
    shared.owner.store(ThreadId::current_thread(), Ordering::Release);
    log::debug!("owning context {:?} started", shared.name);

    // Ends once the sender is taken out by `close` and the queue is empty.
    for Job { task, signal } in receiver.iter() {
        match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(()) => signal.complete(),
            Err(_) => {
                log::error!("owning context {:?}: task panicked", shared.name);
                drop(signal);
            }
        }
    }

    shared.owner.store(None, Ordering::Release);
    log::debug!("owning context {:?} stopped", shared.name);
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_run_on_owner_thread() {
        let context = OwningContext::spawn("test-run").unwrap();
        let name = context
            .handle()
            .run(|| thread::current().name().map(str::to_owned))
            .unwrap();
        assert_eq!(name.as_deref(), Some("test-run"));
        assert!(!context.handle().is_current());
    }

    #[test]
    fn test_is_current_inside() {
        let context = OwningContext::spawn("test-current").unwrap();
        let handle = context.handle();
        let inside = context.handle().run(move || handle.is_current()).unwrap();
        assert!(inside);
    }

    #[test]
    fn test_nested_run_is_inline() {
        let context = OwningContext::spawn("test-nested").unwrap();
        let handle = context.handle();
        let value = context
            .handle()
            .run(move || handle.run(|| 7).unwrap())
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_fifo_order() {
        let context = OwningContext::spawn("test-fifo").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let completions: Vec<_> = (0..32)
            .map(|i| {
                let seen = seen.clone();
                context
                    .handle()
                    .dispatch(Box::new(move || seen.lock().unwrap().push(i)))
                    .unwrap()
            })
            .collect();
        for completion in &completions {
            assert_eq!(completion.wait(), CompletionState::Done);
        }

        assert_eq!(*seen.lock().unwrap(), (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_task_is_isolated() {
        let context = OwningContext::spawn("test-panic").unwrap();
        let completion = context
            .handle()
            .dispatch(Box::new(|| panic!("boom")))
            .unwrap();
        assert_eq!(completion.wait(), CompletionState::Abandoned);
        assert!(matches!(
            context.handle().run(|| -> u32 { panic!("boom") }),
            Err(ContextError::Abandoned)
        ));

        assert_eq!(context.handle().run(|| 1 + 1).unwrap(), 2);
    }

    #[test]
    fn test_shutdown_drains_accepted_tasks() {
        let context = OwningContext::spawn("test-drain").unwrap();
        let handle = context.handle();
        let ran = Arc::new(AtomicUsize::new(0));

        let completions: Vec<_> = (0..8)
            .map(|_| {
                let ran = ran.clone();
                handle
                    .dispatch(Box::new(move || {
                        thread::sleep(Duration::from_millis(5));
                        ran.fetch_add(1, Ordering::Relaxed);
                    }))
                    .unwrap()
            })
            .collect();

        context.shutdown().unwrap();
        assert_eq!(ran.load(Ordering::Relaxed), 8);
        assert!(completions.iter().all(Completion::is_ready));

        assert!(handle.is_closed());
        assert_eq!(
            handle.dispatch(Box::new(|| ())).err(),
            Some(DispatchError::Closed)
        );
        assert!(matches!(
            handle.run(|| ()),
            Err(ContextError::Dispatch(DispatchError::Closed))
        ));
    }

    #[test]
    fn test_debug() {
        let context = OwningContext::spawn("test-debug").unwrap();
        let text = format!("{:?}", context.handle());
        assert!(text.contains("test-debug"));
        assert!(text.contains("closed: false"));
    }
}
