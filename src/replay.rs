//! Deterministic replay of recorded UI call traces.
//!
//! A [`Trace`] lists timestamped `read`/`write` submissions and debounced or throttled event
//! handler calls. [`replay`] feeds them into a [`Scheduler`] and rate limiters driven by a
//! virtual-clock [`EventLoop`] and reports what ran, when, and in which frame.

use crate::foundation::core::{FrameIndex, Millis};
use crate::foundation::error::{FrameschedError, FrameschedResult};
use crate::rate::{Debounce, Throttle};
use crate::runtime::caps::{Clock, Timers};
use crate::runtime::event_loop::{EventLoop, LoopOpts};
use crate::scheduler::{Scheduler, SchedulerOpts, SchedulerStats, TaskFailure};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A recorded sequence of calls to replay.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Trace {
    /// Event loop options (frame rate, event budget).
    #[serde(default, rename = "loop")]
    pub loop_opts: LoopOpts,
    /// Scheduler options.
    #[serde(default)]
    pub scheduler: SchedulerOpts,
    /// Stop at this time instead of running until idle.
    #[serde(default)]
    pub until: Option<Millis>,
    /// Calls, replayed at their `at` time. Calls with equal times keep file order.
    pub events: Vec<TraceEvent>,
}

/// One recorded call.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TraceEvent {
    /// When the call is made.
    pub at: Millis,
    /// Name reported when the resulting work runs.
    pub label: String,
    /// What is called.
    #[serde(flatten)]
    pub call: TraceCall,
}

/// Call kinds understood by [`replay`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceCall {
    /// `Scheduler::read`.
    Read {
        /// How the task ends.
        #[serde(default)]
        outcome: TaskOutcome,
        /// Label of a write the read submits while running.
        #[serde(default)]
        then_write: Option<String>,
    },
    /// `Scheduler::write`.
    Write {
        /// How the task ends.
        #[serde(default)]
        outcome: TaskOutcome,
    },
    /// Call a debounced handler shared by every event on `channel`.
    Debounce {
        /// Handler name.
        channel: String,
        /// Debounce delay.
        delay: Millis,
    },
    /// Call a throttled handler shared by every event on `channel`.
    Throttle {
        /// Handler name.
        channel: String,
        /// Throttle window.
        delay: Millis,
    },
}

/// Simulated result of a replayed task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Completes normally.
    #[default]
    Ok,
    /// Returns an error.
    Error,
    /// Panics.
    Panic,
}

impl TaskOutcome {
    fn finish(self, label: &str) -> anyhow::Result<()> {
        match self {
            Self::Ok => Ok(()),
            Self::Error => Err(anyhow::anyhow!("task '{label}' reported an error")),
            Self::Panic => panic!("task '{label}' panicked"),
        }
    }
}

/// Kind of work that ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecKind {
    /// A read task.
    Read,
    /// A write task.
    Write,
    /// A debounced handler firing.
    Debounce,
    /// A throttled handler firing.
    Throttle,
}

/// One unit of work that ran during replay.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Execution {
    /// Clock time when it ran.
    pub at: Millis,
    /// Frame it ran in, for scheduler tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<FrameIndex>,
    /// What ran.
    pub kind: ExecKind,
    /// Label from the trace.
    pub label: String,
}

/// Result of [`replay`].
#[derive(Clone, Debug, serde::Serialize)]
pub struct ReplayReport {
    /// Work in execution order.
    pub executions: Vec<Execution>,
    /// Failed scheduler tasks.
    pub failures: Vec<TaskFailure>,
    /// Scheduler counters at the end of the run.
    pub stats: SchedulerStats,
    /// Frames delivered by the loop.
    pub frames: u64,
    /// Clock time at the end of the run.
    pub end: Millis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LimiterKind {
    Debounce,
    Throttle,
}

impl Trace {
    /// Parse a trace from JSON.
    pub fn from_json(s: &str) -> FrameschedResult<Self> {
        let trace: Self = serde_json::from_str(s)?;
        trace.validate()?;
        Ok(trace)
    }

    /// Check options and that every rate-limited channel is declared consistently.
    pub fn validate(&self) -> FrameschedResult<()> {
        self.loop_opts.validate()?;
        self.channels().map(|_| ())
    }

    fn channels(&self) -> FrameschedResult<BTreeMap<String, (LimiterKind, Millis)>> {
        let mut out = BTreeMap::<String, (LimiterKind, Millis)>::new();
        for ev in &self.events {
            let (channel, kind, delay) = match &ev.call {
                TraceCall::Debounce { channel, delay } => (channel, LimiterKind::Debounce, *delay),
                TraceCall::Throttle { channel, delay } => (channel, LimiterKind::Throttle, *delay),
                TraceCall::Read { .. } | TraceCall::Write { .. } => continue,
            };
            match out.get(channel) {
                None => {
                    out.insert(channel.clone(), (kind, delay));
                }
                Some(&prev) if prev == (kind, delay) => {}
                Some(&(prev_kind, prev_delay)) => {
                    return Err(FrameschedError::trace(format!(
                        "channel '{channel}' used as {prev_kind:?}/{prev_delay} and {kind:?}/{delay}"
                    )));
                }
            }
        }
        Ok(out)
    }
}

struct Recorder {
    ev: Rc<EventLoop>,
    log: RefCell<Vec<Execution>>,
}

impl Recorder {
    fn record(&self, kind: ExecKind, label: &str) {
        let frame = match kind {
            // Scheduler tasks only run inside a frame callback, after the frame was counted.
            ExecKind::Read | ExecKind::Write => Some(FrameIndex(
                self.ev.frames_delivered().saturating_sub(1),
            )),
            ExecKind::Debounce | ExecKind::Throttle => None,
        };
        self.log.borrow_mut().push(Execution {
            at: self.ev.now(),
            frame,
            kind,
            label: label.to_owned(),
        });
    }
}

enum Limiter {
    Debounce(Debounce<String>),
    Throttle(Throttle<String>),
}

struct Replayer {
    sched: Scheduler,
    recorder: Rc<Recorder>,
    limiters: BTreeMap<String, Limiter>,
}

impl Replayer {
    fn apply(&self, event: &TraceEvent) {
        let label = event.label.clone();
        match &event.call {
            TraceCall::Read {
                outcome,
                then_write,
            } => {
                let rec = self.recorder.clone();
                let sched = self.sched.clone();
                let outcome = *outcome;
                let then_write = then_write.clone();
                self.sched.try_read(move || {
                    rec.record(ExecKind::Read, &label);
                    if let Some(write_label) = then_write {
                        let rec = rec.clone();
                        sched.write(move || rec.record(ExecKind::Write, &write_label));
                    }
                    outcome.finish(&label)
                });
            }
            TraceCall::Write { outcome } => {
                let rec = self.recorder.clone();
                let outcome = *outcome;
                self.sched.try_write(move || {
                    rec.record(ExecKind::Write, &label);
                    outcome.finish(&label)
                });
            }
            TraceCall::Debounce { channel, .. } | TraceCall::Throttle { channel, .. } => {
                match self.limiters.get(channel) {
                    Some(Limiter::Debounce(d)) => d.call(label),
                    Some(Limiter::Throttle(t)) => {
                        t.call(label);
                    }
                    None => tracing::warn!(%channel, "no limiter for channel"),
                }
            }
        }
    }
}

/// Replay `trace` on a fresh virtual-clock loop.
#[tracing::instrument(skip(trace), fields(events = trace.events.len()))]
pub fn replay(trace: &Trace) -> FrameschedResult<ReplayReport> {
    let channels = trace.channels()?;
    let ev = Rc::new(EventLoop::virtual_clock(trace.loop_opts)?);
    let sched = Scheduler::new(ev.clone(), trace.scheduler.clone());
    let recorder = Rc::new(Recorder {
        ev: ev.clone(),
        log: RefCell::new(Vec::new()),
    });

    let failures = Rc::new(RefCell::new(Vec::new()));
    let f = failures.clone();
    sched.on_failure(move |failure| f.borrow_mut().push(failure.clone()));

    let mut limiters = BTreeMap::new();
    for (channel, (kind, delay)) in channels {
        let rec = recorder.clone();
        let limiter = match kind {
            LimiterKind::Debounce => Limiter::Debounce(Debounce::new(
                ev.clone(),
                delay,
                move |label: String| rec.record(ExecKind::Debounce, &label),
            )),
            LimiterKind::Throttle => Limiter::Throttle(Throttle::new(
                ev.clone(),
                delay,
                move |label: String| rec.record(ExecKind::Throttle, &label),
            )),
        };
        limiters.insert(channel, limiter);
    }

    let replayer = Rc::new(Replayer {
        sched: sched.clone(),
        recorder: recorder.clone(),
        limiters,
    });
    for event in &trace.events {
        let r = replayer.clone();
        let event = event.clone();
        ev.set_timeout(event.at, Box::new(move || r.apply(&event)));
    }
    drop(replayer);

    let end = match trace.until {
        Some(until) => {
            ev.advance_to(until)?;
            until
        }
        None => ev.run_until_idle()?,
    };

    let executions = recorder.log.borrow().clone();
    let failures = failures.borrow().clone();
    tracing::debug!(
        executions = executions.len(),
        failures = failures.len(),
        "replay finished"
    );
    Ok(ReplayReport {
        executions,
        failures,
        stats: sched.stats(),
        frames: ev.frames_delivered(),
        end,
    })
}

#[cfg(test)]
#[path = "../tests/unit/replay/replay.rs"]
mod tests;
