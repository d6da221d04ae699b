//! framesched batches UI reads and writes into animation frames.
//!
//! Measuring layout right after mutating styles forces the UI layer to recompute layout on the
//! spot. When many independent widgets (marquees, reveal-on-scroll blocks, image galleries) each
//! measure and mutate on their own, those forced recomputations pile up. The [`Scheduler`]
//! queues reads and writes and runs them together on the next frame: all reads first, then all
//! writes.
//!
//! # Pieces
//!
//! - [`Scheduler`]: the frame-batched read/write queue. Create one per UI context and hand out
//!   clones of the handle.
//! - [`Debounce`] and [`Throttle`]: rate limiters for noisy event handlers.
//! - [`Clock`], [`Timers`], [`FrameTicker`]: the capabilities the above depend on.
//! - [`EventLoop`]: a single-threaded implementation of those capabilities, on a virtual clock
//!   (deterministic, for tests and replays) or the wall clock.
//! - [`replay()`]: run a recorded [`Trace`] of calls and report what ran in which frame.
//!
//! Everything is single-threaded (`Rc`-based, `!Send`). Tasks that fail, by returning an error or
//! panicking, are isolated and reported as [`TaskFailure`]s; they never stop other tasks.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;
mod rate;
mod replay;
mod runtime;
mod scheduler;

pub use crate::foundation::core::{Fps, FrameIndex, Millis};
pub use crate::foundation::error::{FrameschedError, FrameschedResult};
pub use crate::rate::{Debounce, Throttle};
pub use crate::replay::{
    ExecKind, Execution, ReplayReport, TaskOutcome, Trace, TraceCall, TraceEvent, replay,
};
pub use crate::runtime::caps::{Clock, FrameCallback, FrameTicker, TimerCallback, TimerId, Timers};
pub use crate::runtime::event_loop::{EventLoop, LoopOpts};
pub use crate::scheduler::{
    FlushReport, Phase, Scheduler, SchedulerOpts, SchedulerState, SchedulerStats, TaskFailure,
};
