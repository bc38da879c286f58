use std::time::Duration;

use derivative::Derivative;
use derive_builder::Builder;


/// Default pace of the disposal wait loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);


/// Options controlling how a [`RefHandle`](crate::RefHandle) waits for the
/// owning context when it is dropped on another thread.
///
/// The wait itself is never bounded: a drop only returns once the owning
/// context ran the release. If that context is blocked or never drains its
/// queue, the dropping thread stalls with it.
#[derive(Builder, Clone, Copy, Debug, Derivative, PartialEq, Eq)]
#[derivative(Default)]
#[builder(pattern = "owned", default, build_fn(validate = "Self::validate"))]
pub struct HandleOptions {
    /// How long each wait on the release completion lasts before the loop
    /// checks again. Completion wakes the waiter immediately regardless.
    #[derivative(Default(value = "DEFAULT_POLL_INTERVAL"))]
    pub poll_interval: Duration,

    /// Log a warning, once, when a drop has waited longer than this.
    #[builder(setter(strip_option))]
    pub stall_warning: Option<Duration>,
}

impl HandleOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.poll_interval {
            Some(interval) if interval.is_zero() => {
                Err("poll_interval must be greater than zero".to_owned())
            }
            _ => Ok(()),
        }
    }
}
