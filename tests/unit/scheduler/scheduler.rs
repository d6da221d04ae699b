use super::*;
use crate::foundation::core::Millis;
use crate::runtime::caps::FrameCallback;
use crate::runtime::event_loop::{EventLoop, LoopOpts};

/// Ticker that holds callbacks until the test delivers a frame by hand.
#[derive(Default)]
struct HandTicker {
    requests: Cell<usize>,
    queued: RefCell<Vec<FrameCallback>>,
    frame: Cell<u64>,
}

impl HandTicker {
    fn deliver(&self) {
        let callbacks = std::mem::take(&mut *self.queued.borrow_mut());
        let frame = FrameIndex(self.frame.get());
        self.frame.set(frame.0 + 1);
        for cb in callbacks {
            cb(frame);
        }
    }
}

impl FrameTicker for HandTicker {
    fn request_frame(&self, callback: FrameCallback) {
        self.requests.set(self.requests.get() + 1);
        self.queued.borrow_mut().push(callback);
    }
}

fn setup() -> (Rc<HandTicker>, Scheduler, Rc<RefCell<Vec<&'static str>>>) {
    let ticker = Rc::new(HandTicker::default());
    let sched = Scheduler::new(ticker.clone(), SchedulerOpts::default());
    (ticker, sched, Rc::new(RefCell::new(Vec::new())))
}

fn push(out: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Box<dyn FnOnce()> {
    let out = out.clone();
    Box::new(move || out.borrow_mut().push(name))
}

#[test]
fn many_calls_in_one_turn_request_one_frame() {
    let (ticker, sched, out) = setup();
    assert_eq!(sched.state(), SchedulerState::Idle);

    for _ in 0..5 {
        sched.read(push(&out, "r"));
        sched.write(push(&out, "w"));
    }
    assert_eq!(ticker.requests.get(), 1);
    assert_eq!(sched.state(), SchedulerState::Pending);
    assert_eq!(sched.pending_reads(), 5);
    assert_eq!(sched.pending_writes(), 5);
    assert!(out.borrow().is_empty());

    ticker.deliver();
    assert_eq!(out.borrow().len(), 10);
    assert_eq!(sched.state(), SchedulerState::Idle);
    assert_eq!(sched.stats().flushes, 1);
    assert_eq!(sched.stats().frames_requested, 1);
}

#[test]
fn reads_run_before_writes_in_submission_order() {
    let (ticker, sched, out) = setup();
    sched.write(push(&out, "w1"));
    sched.read(push(&out, "r1"));
    sched.write(push(&out, "w2"));
    sched.read(push(&out, "r2"));

    ticker.deliver();
    assert_eq!(*out.borrow(), vec!["r1", "r2", "w1", "w2"]);

    let report = sched.last_report().unwrap();
    assert_eq!(report.frame, FrameIndex(0));
    assert_eq!(report.reads_run, 2);
    assert_eq!(report.writes_run, 2);
    assert!(report.failures.is_empty());
}

#[test]
fn work_submitted_during_flush_waits_for_next_flush() {
    let (ticker, sched, out) = setup();

    let s = sched.clone();
    let o = out.clone();
    sched.read(move || {
        o.borrow_mut().push("r1");
        s.write(push(&o, "late-w"));
        s.read(push(&o, "late-r"));
    });
    sched.write(push(&out, "w1"));

    ticker.deliver();
    assert_eq!(*out.borrow(), vec!["r1", "w1"]);
    assert_eq!(sched.state(), SchedulerState::Pending);
    assert_eq!(ticker.requests.get(), 2);

    ticker.deliver();
    assert_eq!(*out.borrow(), vec!["r1", "w1", "late-r", "late-w"]);

    ticker.deliver();
    assert_eq!(out.borrow().len(), 4);
    assert_eq!(sched.stats().flushes, 2);
}

#[test]
fn failing_tasks_do_not_stop_the_flush() {
    let (ticker, sched, out) = setup();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    sched.on_failure(move |f| s.borrow_mut().push(f.clone()));

    sched.read(push(&out, "r1"));
    sched.try_read(|| anyhow::bail!("element detached"));
    sched.read(push(&out, "r2"));
    sched.write(|| panic!("style write exploded"));
    sched.write(push(&out, "w1"));

    ticker.deliver();
    assert_eq!(*out.borrow(), vec!["r1", "r2", "w1"]);

    let report = sched.last_report().unwrap();
    assert_eq!(report.reads_run, 3);
    assert_eq!(report.writes_run, 2);
    assert_eq!(report.failures.len(), 2);

    let read_fail = &report.failures[0];
    assert_eq!(read_fail.phase, Phase::Read);
    assert_eq!(read_fail.position, 1);
    assert!(read_fail.message.contains("element detached"));

    let write_fail = &report.failures[1];
    assert_eq!(write_fail.phase, Phase::Write);
    assert_eq!(write_fail.position, 0);
    assert!(write_fail.message.contains("style write exploded"));

    assert_eq!(*seen.borrow(), report.failures);
    assert_eq!(sched.stats().failures, 2);
}

#[test]
fn panicking_failure_hook_does_not_stop_the_flush() {
    let (ticker, sched, out) = setup();
    sched.on_failure(|_| panic!("hook blew up"));

    sched.try_read(|| anyhow::bail!("element detached"));
    sched.read(push(&out, "r2"));
    sched.write(push(&out, "w1"));

    ticker.deliver();
    assert_eq!(*out.borrow(), vec!["r2", "w1"]);
    assert_eq!(sched.state(), SchedulerState::Idle);

    let report = sched.last_report().unwrap();
    assert_eq!(report.reads_run, 2);
    assert_eq!(report.writes_run, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(sched.stats().flushes, 1);
    assert_eq!(sched.stats().failures, 1);
}

#[test]
fn failed_task_is_not_retried() {
    let (ticker, sched, _out) = setup();
    let attempts = Rc::new(Cell::new(0));
    let a = attempts.clone();
    sched.try_write(move || {
        a.set(a.get() + 1);
        Err(anyhow::anyhow!("nope"))
    });

    ticker.deliver();
    ticker.deliver();
    assert_eq!(attempts.get(), 1);
    assert_eq!(sched.state(), SchedulerState::Idle);
}

#[test]
fn noop_reads_have_no_effect_beyond_one_flush() {
    let (ticker, sched, _out) = setup();
    for _ in 0..100 {
        sched.read(|| {});
    }
    ticker.deliver();

    let stats = sched.stats();
    assert_eq!(stats.frames_requested, 1);
    assert_eq!(stats.flushes, 1);
    assert_eq!(stats.reads_run, 100);
    assert_eq!(stats.writes_run, 0);
    assert_eq!(stats.failures, 0);
}

#[test]
fn dropped_scheduler_turns_frame_into_noop() {
    let (ticker, sched, out) = setup();
    sched.write(push(&out, "w"));
    drop(sched);
    ticker.deliver();
    assert!(out.borrow().is_empty());
}

#[test]
fn flushes_ride_the_event_loop_frames() {
    let ev = Rc::new(EventLoop::virtual_clock(LoopOpts::default()).unwrap());
    let sched = Scheduler::new(ev.clone(), SchedulerOpts::default());
    let out = Rc::new(RefCell::new(Vec::new()));

    ev.advance_to(Millis(5)).unwrap();
    sched.write(push(&out, "w"));
    sched.read(push(&out, "r"));

    let at = ev.next_frame().unwrap();
    assert_eq!(at, ev.frame_interval());
    assert_eq!(*out.borrow(), vec!["r", "w"]);
    assert!(ev.is_idle());
}

#[test]
fn task_failure_display_names_phase_and_frame() {
    let f = TaskFailure {
        frame: FrameIndex(3),
        phase: Phase::Write,
        position: 2,
        message: "boom".to_owned(),
    };
    assert_eq!(f.to_string(), "write task #2 failed in frame 3: boom");
}
