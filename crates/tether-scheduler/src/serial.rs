use std::sync::Arc;

use tether_core::panic_payload_to_str;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Worker {
    Thread(crossbeam_channel::Sender<Job>),
    Inline,
}

/// A single-worker, strictly-sequential task queue.
///
/// Tasks run in submission order, never in parallel, on one dedicated
/// thread. A panicking task is isolated (logged, worker keeps running).
/// This is the execution substrate for the refresh and lookup-completion
/// queues: "detach old, compute new, attach new" stays atomic with respect
/// to every other task on the same queue.
#[derive(Clone)]
pub struct SerialQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    name: &'static str,
    worker: Worker,
}

impl SerialQueue {
    /// Spawns the worker thread. Thread creation can fail in constrained
    /// CI/sandbox environments; we degrade to inline execution rather than
    /// failing startup, which preserves per-caller ordering at the cost of
    /// running tasks on the submitting thread.
    pub fn new(name: &'static str) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let spawned = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in rx.iter() {
                    run_isolated(name, job);
                }
            });

        let worker = match spawned {
            Ok(_) => Worker::Thread(tx),
            Err(err) => {
                tracing::error!(
                    target = "tether.scheduler",
                    queue = name,
                    error = %err,
                    "failed to spawn queue worker; falling back to inline execution"
                );
                Worker::Inline
            }
        };

        Self {
            inner: Arc::new(QueueInner { name, worker }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Enqueues `job` behind every previously-submitted task.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        match &self.inner.worker {
            Worker::Thread(tx) => {
                if tx.send(Box::new(job)).is_err() {
                    tracing::debug!(
                        target = "tether.scheduler",
                        queue = self.inner.name,
                        "queue worker is gone; dropping task"
                    );
                }
            }
            Worker::Inline => run_isolated(self.inner.name, Box::new(job)),
        }
    }

    /// Blocks until every task submitted before this call has finished.
    ///
    /// Must not be called from the queue's own worker thread.
    pub fn flush(&self) {
        match &self.inner.worker {
            Worker::Thread(_) => {
                let (tx, rx) = crossbeam_channel::bounded(1);
                self.enqueue(move || {
                    let _ = tx.send(());
                });
                let _ = rx.recv();
            }
            Worker::Inline => {}
        }
    }
}

fn run_isolated(name: &'static str, job: Job) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
        let message = panic_payload_to_str(&*panic);
        tracing::error!(
            target = "tether.scheduler",
            queue = name,
            panic = %message,
            "queued task panicked"
        );
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("name", &self.inner.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn runs_tasks_in_submission_order() {
        let queue = SerialQueue::new("test-order");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..32 {
            let seen = Arc::clone(&seen);
            queue.enqueue(move || seen.lock().push(i));
        }
        queue.flush();

        assert_eq!(seen.lock().as_slice(), (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn a_panicking_task_does_not_kill_the_worker() {
        let queue = SerialQueue::new("test-panic");
        let seen = Arc::new(Mutex::new(Vec::new()));

        queue.enqueue(|| panic!("boom"));
        let seen_for_task = Arc::clone(&seen);
        queue.enqueue(move || seen_for_task.lock().push("after"));
        queue.flush();

        assert_eq!(seen.lock().as_slice(), &["after"]);
    }

    #[test]
    fn flush_waits_for_prior_tasks() {
        let queue = SerialQueue::new("test-flush");
        let done = Arc::new(Mutex::new(false));

        let done_for_task = Arc::clone(&done);
        queue.enqueue(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            *done_for_task.lock() = true;
        });
        queue.flush();

        assert!(*done.lock());
    }
}
