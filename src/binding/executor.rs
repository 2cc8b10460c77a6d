//! Deferred command execution.
//!
//! Bindings flagged `async_execution` do not run their command when the
//! interaction stops; they submit a job to the context's
//! [`CommandExecutor`] instead. Where and when the job runs is up to the
//! host.

use std::cell::RefCell;
use std::collections::VecDeque;
use tracing::trace;

/// A deferred command execution.
pub type Job = Box<dyn FnOnce()>;

/// Contract point for asynchronous command execution.
pub trait CommandExecutor {
    fn submit(&self, command: &str, job: Job);
}

/// Queues jobs until the host drains them with [`DeferredExecutor::run_pending`].
#[derive(Default)]
pub struct DeferredExecutor {
    queue: RefCell<VecDeque<(String, Job)>>,
}

impl DeferredExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run every queued job, oldest first, including jobs queued while
    /// draining. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some((command, job)) = next else {
                break;
            };
            trace!(%command, "running deferred command");
            job();
            ran += 1;
        }
        ran
    }
}

impl CommandExecutor for DeferredExecutor {
    fn submit(&self, command: &str, job: Job) {
        trace!(%command, "command deferred");
        self.queue.borrow_mut().push_back((command.to_string(), job));
    }
}

impl std::fmt::Debug for DeferredExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}
