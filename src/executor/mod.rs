//! # Executor Module
//!
//! Background execution of keyed tasks on a bounded or unbounded pool of
//! worker threads.
//!
//! ## Task lifecycle
//!
//! `QUEUED → RUNNING → DONE | FAILED | CANCELLED | INTERRUPTED`
//!
//! A task is resolvable by key through [`ExecutionService::get`] until the
//! retention window has passed since it finished.
//!
//! ## Interruption
//!
//! Interruption is cooperative. A running job checks [`interrupted`] or
//! blocks in [`sleep`], which returns early with [`TaskError::Interrupted`]
//! once the task is interrupted:
//!
//! ```rust,ignore
//! let key = service.submit(|| {
//!     for chunk in chunks {
//!         switchyard::executor::sleep(Duration::from_millis(10))?;
//!         process(chunk);
//!     }
//!     Ok(())
//! })?;
//! ```

mod config;
mod interrupt;
mod service;
mod task;

pub use config::ExecutorConfig;
pub use interrupt::InterruptSignal;
pub use service::{ExecutionService, ExecutorMetrics, MetricsSnapshot, TaskHandle};
pub use task::{Job, TaskError, TaskState};

use std::time::Duration;

/// Whether the task running on this thread has been interrupted.
///
/// Always `false` outside a task.
#[must_use]
pub fn interrupted() -> bool {
    interrupt::current().is_some_and(|signal| signal.is_raised())
}

/// Sleep that ends early when the current task is interrupted.
pub fn sleep(duration: Duration) -> Result<(), TaskError> {
    match interrupt::current() {
        Some(signal) => {
            if signal.sleep(duration) {
                Ok(())
            } else {
                Err(TaskError::Interrupted)
            }
        }
        None => {
            std::thread::sleep(duration);
            Ok(())
        }
    }
}
