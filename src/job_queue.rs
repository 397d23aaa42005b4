//! # Microtask job queue
//!
//! A FIFO of deferred zero-argument jobs. Promise reactions, promise adoption
//! and async continuations are all scheduled here; nothing in the engine runs
//! a reaction synchronously.
//!
//! Each runtime thread owns one queue (`thread_local!`), which plays the role
//! of the process-wide microtask queue for every promise and generator created
//! on that thread. Hosts drive it with [`run_jobs`] between re-entries into
//! the engine; tests call it explicitly between assertions.

use crate::core::{PromisePtr, PromiseReaction, Value};
use crate::error::JSError;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

pub enum Job {
    /// Run a promise reaction with the settled value.
    PromiseReaction { reaction: PromiseReaction, argument: Value },
    /// Make `promise` follow the settlement of `thenable`.
    ResolveThenable { promise: PromisePtr, thenable: PromisePtr },
    /// Host-defined work.
    Callback {
        label: &'static str,
        callback: Box<dyn FnOnce() -> Result<(), JSError>>,
    },
}

impl Job {
    pub fn callback<F>(label: &'static str, callback: F) -> Self
    where
        F: FnOnce() -> Result<(), JSError> + 'static,
    {
        Job::Callback {
            label,
            callback: Box::new(callback),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Job::PromiseReaction { reaction, .. } => format!(
                "PromiseReaction kind={:?} capability={:?}",
                reaction.kind,
                reaction.capability.as_ref().and_then(promise_id)
            ),
            Job::ResolveThenable { promise, thenable } => {
                format!("ResolveThenable promise={:?} thenable={:?}", promise_id(promise), promise_id(thenable))
            }
            Job::Callback { label, .. } => format!("Callback {label}"),
        }
    }

    fn run(self) -> Result<(), JSError> {
        match self {
            Job::PromiseReaction { reaction, argument } => {
                crate::js_promise::run_promise_reaction_job(reaction, argument);
                Ok(())
            }
            Job::ResolveThenable { promise, thenable } => {
                crate::js_promise::run_resolve_thenable_job(&promise, &thenable);
                Ok(())
            }
            Job::Callback { callback, .. } => callback(),
        }
    }
}

fn promise_id(promise: &PromisePtr) -> Option<usize> {
    promise.try_borrow().ok().map(|p| p.id)
}

/// FIFO of jobs with enqueue bookkeeping.
#[derive(Default)]
pub struct JobQueue {
    jobs: VecDeque<(usize, Job)>,
    next_id: usize,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job and return its sequence id.
    pub fn enqueue(&mut self, job: Job) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.push_back((id, job));
        id
    }

    pub fn pop_front(&mut self) -> Option<(usize, Job)> {
        self.jobs.pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Total number of jobs ever enqueued.
    pub fn total_enqueued(&self) -> usize {
        self.next_id
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}

thread_local! {
    static GLOBAL_JOB_QUEUE: RefCell<JobQueue> = RefCell::new(JobQueue::new());
    static DRAINING: Cell<bool> = const { Cell::new(false) };
    static MAX_JOBS_PER_DRAIN: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Limit the number of jobs a single [`run_jobs`] call may execute. `None`
/// (the default) drains to quiescence no matter how long that takes.
pub fn set_max_jobs_per_drain(limit: Option<usize>) {
    MAX_JOBS_PER_DRAIN.with(|m| m.set(limit));
}

pub fn max_jobs_per_drain() -> Option<usize> {
    MAX_JOBS_PER_DRAIN.with(|m| m.get())
}

/// Run `f` with exclusive access to this thread's job queue. `f` must not
/// enqueue jobs or drain the queue itself.
pub fn with_job_queue<R>(f: impl FnOnce(&mut JobQueue) -> R) -> R {
    GLOBAL_JOB_QUEUE.with(|q| f(&mut q.borrow_mut()))
}

/// Add a job to the end of the queue.
pub fn queue_job(job: Job) {
    let summary = job.describe();
    let (id, len) = with_job_queue(|q| {
        let id = q.enqueue(job);
        (id, q.len())
    });
    log::trace!("queue_job: id={} {} queue_len={}", id, summary, len);
}

pub fn pending_job_count() -> usize {
    with_job_queue(|q| q.len())
}

/// Drain the queue to quiescence, including jobs enqueued by jobs that ran
/// during this call. Returns the number of jobs executed.
///
/// A call made from inside a running job is a no-op returning `Ok(0)`; the
/// outer drain picks up whatever was enqueued. When the outermost drain
/// finishes, unhandled promise rejections are reported.
pub fn run_jobs() -> Result<usize, JSError> {
    if DRAINING.with(|d| d.replace(true)) {
        log::trace!("run_jobs: nested drain ignored");
        return Ok(0);
    }
    let guard = DrainGuard;
    let limit = max_jobs_per_drain();
    let mut executed = 0usize;
    let result = loop {
        if let Some(limit) = limit
            && executed >= limit
            && pending_job_count() > 0
        {
            break Err(JSError::InfiniteLoopError { iterations: executed });
        }
        let next = with_job_queue(|q| q.pop_front());
        let Some((id, job)) = next else {
            break Ok(executed);
        };
        log::trace!("run_jobs: executing id={} {}", id, job.describe());
        if let Err(e) = job.run() {
            log::warn!("run_jobs: job id={} failed: {}", id, e);
        }
        executed += 1;
    };
    drop(guard);
    if result.is_ok() {
        crate::js_promise::process_pending_unhandled();
    }
    log::debug!("run_jobs: executed {} jobs", executed);
    result
}

// Clears the draining flag even when a job panics.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAINING.with(|d| d.set(false));
    }
}

/// Drop every queued job without running it.
pub fn clear_job_queue() {
    with_job_queue(|q| q.clear());
}
