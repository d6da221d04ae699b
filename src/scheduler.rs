//! Frame-batched read/write scheduling.
//!
//! Layout reads and style writes submitted between two frames are coalesced into one flush on
//! the next frame: every pending read runs, then every pending write. Interleaving a mutation
//! with a measurement forces the UI layer to recompute layout, so callers route both through a
//! shared [`Scheduler`] handle instead of touching the UI directly.

use crate::foundation::core::FrameIndex;
use crate::runtime::caps::FrameTicker;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

type Task = Box<dyn FnOnce() -> anyhow::Result<()>>;
type FailureHook = Rc<dyn Fn(&TaskFailure)>;

/// Stage of a flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Layout measurements.
    Read,
    /// UI mutations.
    Write,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Whether a flush has been requested for the upcoming frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing queued, no frame requested.
    Idle,
    /// A frame has been requested; the flush runs on it.
    Pending,
}

/// A task that returned an error or panicked during a flush.
///
/// The failed task is dropped. Other tasks of the same flush are unaffected.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TaskFailure {
    /// Frame whose flush ran the task.
    pub frame: FrameIndex,
    /// Phase the task was queued in.
    pub phase: Phase,
    /// 0-based position of the task within its phase.
    pub position: usize,
    /// Error chain or panic message.
    pub message: String,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} task #{} failed in frame {}: {}",
            self.phase, self.position, self.frame.0, self.message
        )
    }
}

/// Summary of one flush.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FlushReport {
    /// Frame the flush ran on.
    pub frame: FrameIndex,
    /// Read tasks executed (including failed ones).
    pub reads_run: usize,
    /// Write tasks executed (including failed ones).
    pub writes_run: usize,
    /// Failures in execution order.
    pub failures: Vec<TaskFailure>,
}

/// Cumulative scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchedulerStats {
    /// Frames requested from the ticker.
    pub frames_requested: u64,
    /// Flushes executed.
    pub flushes: u64,
    /// Read tasks executed.
    pub reads_run: u64,
    /// Write tasks executed.
    pub writes_run: u64,
    /// Tasks that failed.
    pub failures: u64,
}

/// Scheduler options.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SchedulerOpts {
    /// Name attached to the scheduler's log spans.
    pub label: String,
}

impl Default for SchedulerOpts {
    fn default() -> Self {
        Self {
            label: "main".to_owned(),
        }
    }
}

struct Inner {
    opts: SchedulerOpts,
    ticker: Rc<dyn FrameTicker>,
    reads: RefCell<Vec<Task>>,
    writes: RefCell<Vec<Task>>,
    pending: Cell<bool>,
    stats: Cell<SchedulerStats>,
    last_report: RefCell<Option<FlushReport>>,
    on_failure: RefCell<Option<FailureHook>>,
}

/// Handle to a frame-batched read/write scheduler.
///
/// Clones share the same queues. The scheduler is single-threaded: all calls, and the flush,
/// happen on the thread that drives the [`FrameTicker`].
///
/// Guarantees:
/// - any number of `read`/`write` calls between two frames produce exactly one frame request;
/// - within a flush, reads run in submission order, then writes in submission order;
/// - work submitted while a flush is running waits for the next flush;
/// - a failing task never prevents the others from running.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("label", &self.inner.opts.label)
            .field("state", &self.state())
            .field("pending_reads", &self.pending_reads())
            .field("pending_writes", &self.pending_writes())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler flushing on frames delivered by `ticker`.
    pub fn new(ticker: Rc<dyn FrameTicker>, opts: SchedulerOpts) -> Self {
        Self {
            inner: Rc::new(Inner {
                opts,
                ticker,
                reads: RefCell::new(Vec::new()),
                writes: RefCell::new(Vec::new()),
                pending: Cell::new(false),
                stats: Cell::new(SchedulerStats::default()),
                last_report: RefCell::new(None),
                on_failure: RefCell::new(None),
            }),
        }
    }

    /// Queue a layout read for the next flush.
    pub fn read<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.enqueue(
            Phase::Read,
            Box::new(move || -> anyhow::Result<()> {
                task();
                Ok(())
            }),
        );
    }

    /// Queue a UI write for the next flush.
    pub fn write<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.enqueue(
            Phase::Write,
            Box::new(move || -> anyhow::Result<()> {
                task();
                Ok(())
            }),
        );
    }

    /// Queue a fallible read. An `Err` is reported as a [`TaskFailure`].
    pub fn try_read<F>(&self, task: F)
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        self.enqueue(Phase::Read, Box::new(task));
    }

    /// Queue a fallible write. An `Err` is reported as a [`TaskFailure`].
    pub fn try_write<F>(&self, task: F)
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        self.enqueue(Phase::Write, Box::new(task));
    }

    /// Install a callback invoked once per failed task, replacing any previous one.
    pub fn on_failure<F>(&self, hook: F)
    where
        F: Fn(&TaskFailure) + 'static,
    {
        *self.inner.on_failure.borrow_mut() = Some(Rc::new(hook));
    }

    /// Options this scheduler was created with.
    pub fn opts(&self) -> &SchedulerOpts {
        &self.inner.opts
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        if self.inner.pending.get() {
            SchedulerState::Pending
        } else {
            SchedulerState::Idle
        }
    }

    /// Reads waiting for the next flush.
    pub fn pending_reads(&self) -> usize {
        self.inner.reads.borrow().len()
    }

    /// Writes waiting for the next flush.
    pub fn pending_writes(&self) -> usize {
        self.inner.writes.borrow().len()
    }

    /// Cumulative counters.
    pub fn stats(&self) -> SchedulerStats {
        self.inner.stats.get()
    }

    /// Report of the most recent flush, if any ran.
    pub fn last_report(&self) -> Option<FlushReport> {
        self.inner.last_report.borrow().clone()
    }

    fn enqueue(&self, phase: Phase, task: Task) {
        let queue = match phase {
            Phase::Read => &self.inner.reads,
            Phase::Write => &self.inner.writes,
        };
        queue.borrow_mut().push(task);
        self.request_flush();
    }

    fn request_flush(&self) {
        if self.inner.pending.replace(true) {
            return;
        }
        self.bump(|s| s.frames_requested += 1);
        tracing::trace!(scheduler = %self.inner.opts.label, "flush requested");

        // The ticker may outlive every handle; a dropped scheduler turns the frame into a no-op.
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        self.inner.ticker.request_frame(Box::new(move |frame| {
            if let Some(inner) = weak.upgrade() {
                Scheduler { inner }.flush(frame);
            }
        }));
    }

    pub(crate) fn flush(&self, frame: FrameIndex) -> FlushReport {
        let span = tracing::debug_span!("flush", scheduler = %self.inner.opts.label, frame = frame.0);
        let _enter = span.enter();

        // Back to Idle and both queues captured before any task runs, so anything submitted by a
        // task requests a fresh frame and lands in the next flush.
        self.inner.pending.set(false);
        let reads = std::mem::take(&mut *self.inner.reads.borrow_mut());
        let writes = std::mem::take(&mut *self.inner.writes.borrow_mut());

        let mut failures = Vec::new();
        let reads_run = self.run_phase(frame, Phase::Read, reads, &mut failures);
        let writes_run = self.run_phase(frame, Phase::Write, writes, &mut failures);

        self.bump(|s| {
            s.flushes += 1;
            s.reads_run += reads_run as u64;
            s.writes_run += writes_run as u64;
            s.failures += failures.len() as u64;
        });
        tracing::debug!(
            reads = reads_run,
            writes = writes_run,
            failures = failures.len(),
            "flushed"
        );

        let report = FlushReport {
            frame,
            reads_run,
            writes_run,
            failures,
        };
        *self.inner.last_report.borrow_mut() = Some(report.clone());
        report
    }

    fn run_phase(
        &self,
        frame: FrameIndex,
        phase: Phase,
        tasks: Vec<Task>,
        failures: &mut Vec<TaskFailure>,
    ) -> usize {
        let count = tasks.len();
        for (position, task) in tasks.into_iter().enumerate() {
            let Err(message) = run_isolated(task) else {
                continue;
            };
            let failure = TaskFailure {
                frame,
                phase,
                position,
                message,
            };
            tracing::warn!(%phase, position, error = %failure.message, "task failed");

            let hook = self.inner.on_failure.borrow().clone();
            if let Some(hook) = hook
                && let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook(&failure)))
            {
                tracing::warn!(
                    %phase,
                    position,
                    error = %panic_message(payload.as_ref()),
                    "failure hook panicked"
                );
            }
            failures.push(failure);
        }
        count
    }

    fn bump(&self, f: impl FnOnce(&mut SchedulerStats)) {
        let mut stats = self.inner.stats.get();
        f(&mut stats);
        self.inner.stats.set(stats);
    }
}

fn run_isolated(task: Task) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_owned()
    }
}

#[cfg(test)]
#[path = "../tests/unit/scheduler/scheduler.rs"]
mod tests;
