use crate::foundation::core::{FrameIndex, Millis};

/// One-shot callback run when a timer comes due.
pub type TimerCallback = Box<dyn FnOnce()>;

/// One-shot callback run on the next frame, receiving that frame's index.
pub type FrameCallback = Box<dyn FnOnce(FrameIndex)>;

/// Handle to a scheduled timer, returned by [`Timers::set_timeout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u64);

/// Monotonic time source.
pub trait Clock {
    /// Current time on this clock.
    fn now(&self) -> Millis;
}

/// Deferred one-shot callbacks on a [`Clock`].
///
/// Callbacks due at the same instant run in the order they were scheduled. A callback never runs
/// synchronously inside `set_timeout`, even with a zero delay.
pub trait Timers: Clock {
    /// Run `callback` once, `delay` after [`Clock::now`].
    fn set_timeout(&self, delay: Millis, callback: TimerCallback) -> TimerId;

    /// Cancel a scheduled timer. Returns `false` when it already ran or was cancelled.
    fn clear_timeout(&self, id: TimerId) -> bool;
}

/// Next-frame capability (the display refresh hook).
///
/// Every callback requested before a frame starts runs exactly once in that frame. Callbacks
/// requested while a frame is running are delivered on the following frame.
pub trait FrameTicker {
    /// Deliver `callback` on the next frame.
    fn request_frame(&self, callback: FrameCallback);
}
