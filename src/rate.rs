//! Rate limiters for UI event handlers (resize, scroll, pointer move).
//!
//! Both are independent of [`crate::Scheduler`]: they only need a clock, and debounce also needs
//! timers. A handler that touches layout typically debounces or throttles the event, then routes
//! the actual work through the scheduler.

use crate::foundation::core::Millis;
use crate::runtime::caps::{Clock, TimerId, Timers};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

struct DebounceInner<A> {
    timers: Rc<dyn Timers>,
    delay: Millis,
    f: RefCell<Box<dyn FnMut(A)>>,
    timer: Cell<Option<TimerId>>,
    args: RefCell<Option<A>>,
}

impl<A> DebounceInner<A> {
    fn fire(&self) {
        self.timer.set(None);
        let Some(args) = self.args.borrow_mut().take() else {
            return;
        };
        let Ok(mut f) = self.f.try_borrow_mut() else {
            tracing::warn!("debounced callback re-entered itself; call dropped");
            return;
        };
        (*f)(args);
    }
}

impl<A> Drop for DebounceInner<A> {
    fn drop(&mut self) {
        if let Some(id) = self.timer.take() {
            self.timers.clear_timeout(id);
        }
    }
}

/// Trailing-edge debouncer.
///
/// Every [`Debounce::call`] restarts the delay; `f` runs once the calls stop for `delay`, with the
/// arguments of the latest call. Clones share the same pending call. Dropping the last handle
/// cancels it.
pub struct Debounce<A> {
    inner: Rc<DebounceInner<A>>,
}

impl<A> Clone for Debounce<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: 'static> Debounce<A> {
    /// Wrap `f` so it runs `delay` after the last call.
    pub fn new<F>(timers: Rc<dyn Timers>, delay: Millis, f: F) -> Self
    where
        F: FnMut(A) + 'static,
    {
        Self {
            inner: Rc::new(DebounceInner {
                timers,
                delay,
                f: RefCell::new(Box::new(f)),
                timer: Cell::new(None),
                args: RefCell::new(None),
            }),
        }
    }

    /// Replace any pending call with one carrying `args`, due `delay` from now.
    pub fn call(&self, args: A) {
        let inner = &self.inner;
        if let Some(id) = inner.timer.take() {
            inner.timers.clear_timeout(id);
        }
        *inner.args.borrow_mut() = Some(args);

        let weak: Weak<DebounceInner<A>> = Rc::downgrade(inner);
        let id = inner.timers.set_timeout(
            inner.delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fire();
                }
            }),
        );
        inner.timer.set(Some(id));
    }

    /// Drop the pending call. Returns `false` when nothing was pending.
    pub fn cancel(&self) -> bool {
        let inner = &self.inner;
        inner.args.borrow_mut().take();
        match inner.timer.take() {
            Some(id) => inner.timers.clear_timeout(id),
            None => false,
        }
    }

    /// Return `true` while a call is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.inner.timer.get().is_some()
    }

    /// Configured delay.
    pub fn delay(&self) -> Millis {
        self.inner.delay
    }
}

/// Leading-edge throttle.
///
/// The first call runs `f` immediately. Later calls are dropped until `delay` has passed since the
/// last call that ran; the next call after that runs immediately again. Dropped calls are never
/// replayed.
pub struct Throttle<A> {
    clock: Rc<dyn Clock>,
    delay: Millis,
    last_fired: Cell<Option<Millis>>,
    f: RefCell<Box<dyn FnMut(A)>>,
}

impl<A> Throttle<A> {
    /// Wrap `f` so it runs at most once per `delay`.
    pub fn new<F>(clock: Rc<dyn Clock>, delay: Millis, f: F) -> Self
    where
        F: FnMut(A) + 'static,
    {
        Self {
            clock,
            delay,
            last_fired: Cell::new(None),
            f: RefCell::new(Box::new(f)),
        }
    }

    /// Run `f(args)` unless throttled. Returns whether `f` ran.
    pub fn call(&self, args: A) -> bool {
        let now = self.clock.now();
        let throttled = self
            .last_fired
            .get()
            .is_some_and(|last| now.saturating_sub(last) < self.delay);
        if throttled {
            return false;
        }
        let Ok(mut f) = self.f.try_borrow_mut() else {
            tracing::warn!("throttled callback re-entered itself; call dropped");
            return false;
        };
        self.last_fired.set(Some(now));
        (*f)(args);
        true
    }

    /// Forget the last invocation so the next call runs immediately.
    pub fn reset(&self) {
        self.last_fired.set(None);
    }

    /// Time of the last invocation that ran.
    pub fn last_fired(&self) -> Option<Millis> {
        self.last_fired.get()
    }

    /// Configured delay.
    pub fn delay(&self) -> Millis {
        self.delay
    }
}

#[cfg(test)]
#[path = "../tests/unit/rate/rate.rs"]
mod tests;
