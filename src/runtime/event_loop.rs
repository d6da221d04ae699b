use crate::foundation::core::{Fps, FrameIndex, Millis};
use crate::foundation::error::{FrameschedError, FrameschedResult};
use crate::runtime::caps::{Clock, FrameCallback, FrameTicker, TimerCallback, TimerId, Timers};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

/// Options controlling an [`EventLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LoopOpts {
    /// Display refresh rate. Frames land on multiples of [`Fps::frame_interval`].
    pub fps: Fps,
    /// Maximum number of timer firings and frames a single run call may process.
    pub max_events: u64,
}

impl Default for LoopOpts {
    fn default() -> Self {
        Self {
            fps: Fps::default(),
            max_events: 100_000,
        }
    }
}

impl LoopOpts {
    /// Validate option values.
    pub fn validate(&self) -> FrameschedResult<()> {
        self.fps.validate()?;
        if self.max_events == 0 {
            return Err(FrameschedError::config("LoopOpts max_events must be > 0"));
        }
        Ok(())
    }
}

enum TimeSource {
    Virtual(Cell<Millis>),
    Wall(std::time::Instant),
}

impl TimeSource {
    fn now(&self) -> Millis {
        match self {
            Self::Virtual(now) => now.get(),
            Self::Wall(start) => {
                Millis(u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX))
            }
        }
    }

    fn wait_until(&self, at: Millis) {
        match self {
            Self::Virtual(now) => {
                if at > now.get() {
                    now.set(at);
                }
            }
            Self::Wall(_) => {
                let now = self.now();
                if at > now {
                    std::thread::sleep(at.saturating_sub(now).as_duration());
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Due {
    Timer { at: Millis, seq: u64 },
    Frame { at: Millis },
}

impl Due {
    fn at(self) -> Millis {
        match self {
            Self::Timer { at, .. } | Self::Frame { at } => at,
        }
    }
}

#[derive(Default)]
struct LoopState {
    next_timer_seq: u64,
    // Keyed by (due, seq) so equal due times fire in scheduling order.
    timers: BTreeMap<(Millis, u64), TimerCallback>,
    due_by_seq: HashMap<u64, Millis>,
    frame_callbacks: Vec<FrameCallback>,
    frames_delivered: u64,
    last_frame_at: Option<Millis>,
}

/// Single-threaded event loop providing [`Clock`], [`Timers`] and [`FrameTicker`].
///
/// The loop does nothing on its own: callers drive it with [`EventLoop::advance_to`],
/// [`EventLoop::next_frame`] or [`EventLoop::run_until_idle`]. With a virtual clock, time jumps
/// straight to the next due event; with the wall clock the calling thread sleeps until then.
///
/// Ordering rules:
/// - timers fire in due order, ties in scheduling order;
/// - frames occur on multiples of the frame interval, at most one per boundary;
/// - at equal instants, due timers run before the frame.
pub struct EventLoop {
    opts: LoopOpts,
    interval: Millis,
    time: TimeSource,
    state: RefCell<LoopState>,
}

impl EventLoop {
    /// Create a loop on a virtual clock starting at time zero.
    pub fn virtual_clock(opts: LoopOpts) -> FrameschedResult<Self> {
        Self::with_time(opts, TimeSource::Virtual(Cell::new(Millis::ZERO)))
    }

    /// Create a loop on the wall clock, with time zero at this call.
    pub fn wall_clock(opts: LoopOpts) -> FrameschedResult<Self> {
        Self::with_time(opts, TimeSource::Wall(std::time::Instant::now()))
    }

    fn with_time(opts: LoopOpts, time: TimeSource) -> FrameschedResult<Self> {
        opts.validate()?;
        Ok(Self {
            interval: opts.fps.frame_interval(),
            opts,
            time,
            state: RefCell::new(LoopState::default()),
        })
    }

    /// Options this loop was created with.
    pub fn opts(&self) -> LoopOpts {
        self.opts
    }

    /// Distance between frame boundaries.
    pub fn frame_interval(&self) -> Millis {
        self.interval
    }

    /// Number of frames delivered so far. Boundaries with no requested callbacks are not counted.
    pub fn frames_delivered(&self) -> u64 {
        self.state.borrow().frames_delivered
    }

    /// Number of timers scheduled and not yet fired or cancelled.
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Return `true` when at least one frame callback is waiting for the next frame.
    pub fn has_pending_frame(&self) -> bool {
        !self.state.borrow().frame_callbacks.is_empty()
    }

    /// Return `true` when there is nothing left to run.
    pub fn is_idle(&self) -> bool {
        let st = self.state.borrow();
        st.timers.is_empty() && st.frame_callbacks.is_empty()
    }

    /// Run every event due at or before `target`, then move the clock to `target`.
    ///
    /// Returns the number of events (timer firings and frames) processed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn advance_to(&self, target: Millis) -> FrameschedResult<u64> {
        let mut ran = 0u64;
        while let Some(due) = self.next_due() {
            if due.at() > target {
                break;
            }
            self.check_budget(ran)?;
            self.run_due(due);
            ran += 1;
        }
        self.time.wait_until(target);
        Ok(ran)
    }

    /// [`EventLoop::advance_to`] relative to the current time.
    pub fn advance_by(&self, delta: Millis) -> FrameschedResult<u64> {
        self.advance_to(self.now().saturating_add(delta))
    }

    /// Advance to the next frame boundary, running due timers and that frame's callbacks.
    ///
    /// Returns the clock time of the boundary.
    pub fn next_frame(&self) -> FrameschedResult<Millis> {
        let at = {
            let st = self.state.borrow();
            self.next_frame_at(&st)
        };
        self.advance_to(at)?;
        Ok(at)
    }

    /// Run events until no timer or frame callback is pending.
    ///
    /// Fails with [`FrameschedError::Budget`] when more than `max_events` are needed, which usually
    /// means some task keeps re-submitting itself every frame.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn run_until_idle(&self) -> FrameschedResult<Millis> {
        let mut ran = 0u64;
        while let Some(due) = self.next_due() {
            self.check_budget(ran)?;
            self.run_due(due);
            ran += 1;
        }
        Ok(self.now())
    }

    fn check_budget(&self, ran: u64) -> FrameschedResult<()> {
        if ran >= self.opts.max_events {
            return Err(FrameschedError::budget(format!(
                "more than {} events without going idle (now={})",
                self.opts.max_events,
                self.now()
            )));
        }
        Ok(())
    }

    fn next_frame_at(&self, st: &LoopState) -> Millis {
        let step = self.interval.0;
        let now = self.time.now().0;
        let at = Millis(now.div_ceil(step).saturating_mul(step));
        if st.last_frame_at == Some(at) {
            at.saturating_add(self.interval)
        } else {
            at
        }
    }

    fn next_due(&self) -> Option<Due> {
        let st = self.state.borrow();
        let timer = st.timers.keys().next().copied();
        let frame = (!st.frame_callbacks.is_empty()).then(|| self.next_frame_at(&st));
        match (timer, frame) {
            (Some((at, seq)), Some(frame_at)) if at <= frame_at => Some(Due::Timer { at, seq }),
            (_, Some(at)) => Some(Due::Frame { at }),
            (Some((at, seq)), None) => Some(Due::Timer { at, seq }),
            (None, None) => None,
        }
    }

    fn run_due(&self, due: Due) {
        match due {
            Due::Timer { at, seq } => {
                self.time.wait_until(at);
                // The borrow must end before the callback runs: callbacks schedule more work.
                let callback = {
                    let mut st = self.state.borrow_mut();
                    st.due_by_seq.remove(&seq);
                    st.timers.remove(&(at, seq))
                };
                if let Some(callback) = callback {
                    tracing::trace!(timer = seq, at = at.0, "timer fired");
                    callback();
                }
            }
            Due::Frame { at } => {
                self.time.wait_until(at);
                let (frame, callbacks) = {
                    let mut st = self.state.borrow_mut();
                    let frame = FrameIndex(st.frames_delivered);
                    st.frames_delivered += 1;
                    st.last_frame_at = Some(at);
                    (frame, std::mem::take(&mut st.frame_callbacks))
                };
                tracing::trace!(
                    frame = frame.0,
                    at = at.0,
                    callbacks = callbacks.len(),
                    "frame"
                );
                for callback in callbacks {
                    callback(frame);
                }
            }
        }
    }
}

impl Clock for EventLoop {
    fn now(&self) -> Millis {
        self.time.now()
    }
}

impl Timers for EventLoop {
    fn set_timeout(&self, delay: Millis, callback: TimerCallback) -> TimerId {
        let at = self.now().saturating_add(delay);
        let mut st = self.state.borrow_mut();
        let seq = st.next_timer_seq;
        st.next_timer_seq += 1;
        st.timers.insert((at, seq), callback);
        st.due_by_seq.insert(seq, at);
        TimerId(seq)
    }

    fn clear_timeout(&self, id: TimerId) -> bool {
        let mut st = self.state.borrow_mut();
        match st.due_by_seq.remove(&id.0) {
            Some(at) => st.timers.remove(&(at, id.0)).is_some(),
            None => false,
        }
    }
}

impl FrameTicker for EventLoop {
    fn request_frame(&self, callback: FrameCallback) {
        self.state.borrow_mut().frame_callbacks.push(callback);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/runtime/event_loop.rs"]
mod tests;
