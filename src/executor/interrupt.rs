//! Cooperative interruption.
//!
//! Threads are never killed. A worker binds the running task's
//! [`InterruptSignal`] to its thread; jobs observe it through
//! [`interrupted`](super::interrupted) or wake early from
//! [`sleep`](super::sleep).

use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct InterruptSignal {
    flag: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl InterruptSignal {
    pub fn raise(&self) {
        let _guard = self.lock.lock();
        self.flag.store(true, Ordering::SeqCst);
        self.wake.notify_all();
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless raised first; returns `false` when interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.lock.lock();
        while !self.is_raised() {
            if self.wake.wait_until(&mut guard, deadline).timed_out() {
                return !self.is_raised();
            }
        }
        false
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<InterruptSignal>>> = const { RefCell::new(None) };
}

/// Binds a signal to the current thread until dropped.
pub(crate) struct BoundSignal {
    previous: Option<Arc<InterruptSignal>>,
}

impl BoundSignal {
    pub(crate) fn bind(signal: Arc<InterruptSignal>) -> Self {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(signal));
        Self { previous }
    }
}

impl Drop for BoundSignal {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

pub(crate) fn current() -> Option<Arc<InterruptSignal>> {
    CURRENT.with(|current| current.borrow().as_ref().map(Arc::clone))
}
