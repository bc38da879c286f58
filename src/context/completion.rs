//! Oneshot completion signal handed back by a dispatch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use once_cell::sync::OnceCell;


/// Settlement state of a dispatched task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionState {
    /// The task has not run yet.
    Pending,
    /// The task ran to completion.
    Done,
    /// The task was dropped without completing, it will never run.
    Abandoned,
}


/// Producer side, owned by whoever runs the task.
///
/// Dropping it without completing settles the completion as
/// [`CompletionState::Abandoned`].
pub struct Signal<T = ()> {
    // Set before the channel is used or disconnected, so a woken waiter
    // always finds the final state here.
    state: Arc<OnceCell<CompletionState>>,
    sender: Sender<T>,
}

impl<T> Signal<T> {
    /// Marks the task as done, hands `value` to the waiter and wakes it.
    pub fn complete_with(self, value: T) {
        let _ = self.state.set(CompletionState::Done);
        // The waiter may be gone already, nobody left to tell.
        let _ = self.sender.send(value);
    }
}

impl Signal {
    /// Marks the task as done and wakes the waiter.
    pub fn complete(self) {
        self.complete_with(())
    }
}

impl<T> Drop for Signal<T> {
    fn drop(&mut self) {
        // No-op after `complete_with`. The sender drops right after,
        // which wakes the waiter with a disconnection.
        let _ = self.state.set(CompletionState::Abandoned);
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").finish_non_exhaustive()
    }
}


/// Waiter side of a dispatched task.
pub struct Completion<T = ()> {
    state: Arc<OnceCell<CompletionState>>,
    receiver: Receiver<T>,
}

impl<T> Completion<T> {
    /// `true` once the task ran.
    pub fn is_ready(&self) -> bool {
        self.state() == CompletionState::Done
    }

    pub fn state(&self) -> CompletionState {
        self.state.get().copied().unwrap_or(CompletionState::Pending)
    }

    /// Blocks up to `timeout` or until the completion settles, whichever
    /// comes first. Returns `true` if it settled (done or abandoned).
    ///
    /// A timeout too large to be represented waits without a deadline.
    /// The completed value, if any, is discarded.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        if self.state() != CompletionState::Pending {
            return true;
        }
        !matches!(
            self.receiver.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        )
    }

    /// Blocks until the completion settles and returns the final state.
    pub fn wait(&self) -> CompletionState {
        if self.state() == CompletionState::Pending {
            let _ = self.receiver.recv();
        }
        self.state()
    }

    /// Blocks until the completion settles and takes the completed value.
    ///
    /// `None` if the task was abandoned, or if a clone of this completion
    /// already took the value.
    pub fn into_value(self) -> Option<T> {
        self.receiver.recv().ok()
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("state", &self.state())
            .finish()
    }
}


/// Creates a connected [`Signal`] / [`Completion`] pair.
pub fn pair<T>() -> (Signal<T>, Completion<T>) {
    let state = Arc::new(OnceCell::new());
    let (sender, receiver) = channel::bounded(1);
    (
        Signal {
            state: state.clone(),
            sender,
        },
        Completion { state, receiver },
    )
}
