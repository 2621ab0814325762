//! FIFO admission control for executions.
//!
//! At most one job is in flight against the kernel at any time. `ready`
//! is true exactly when nothing is in flight: it flips false when a job
//! is released and comes back true when the queue drains. It also starts
//! false, so jobs submitted before the kernel resolves sit in the queue
//! until start-up advances it for the first time.

use std::collections::VecDeque;

use crate::kernel::EvalJob;

#[derive(Default)]
pub(crate) struct EvalQueue {
    jobs: VecDeque<EvalJob>,
    ready: bool,
}

impl EvalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job. Returns true when the caller should advance the
    /// queue immediately, i.e. nothing was in flight.
    pub fn push(&mut self, job: EvalJob) -> bool {
        self.jobs.push_back(job);
        self.ready
    }

    /// Take the head job, flipping `ready`: false when a job comes out
    /// (it is now in flight), true when the queue is empty.
    pub fn take_next(&mut self) -> Option<EvalJob> {
        match self.jobs.pop_front() {
            Some(job) => {
                self.ready = false;
                Some(job)
            }
            None => {
                self.ready = true;
                None
            }
        }
    }

    #[cfg(test)]
    fn is_ready(&self) -> bool {
        self.ready
    }
}
