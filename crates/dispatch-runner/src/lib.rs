//! `PriorityRunner`: a bounded pool of at most `size` active `ProcessTask`s.
//!
//! Admission is priority-preemptive: a full pool will evict its
//! lowest-priority running job to make room for a strictly higher-priority
//! newcomer, but never for an equal-or-lower one. Every non-evicted
//! completion fires a "slot freed" notification so a `SchedulerBin` can
//! promote the best pending task.
//!
//! The active set is a flat `Vec` scanned linearly for the eviction victim
//! -- `size` is small and operator-configured, so a heap buys nothing here
//! (SPEC_FULL.md §3 allows either).

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dispatch_common::TaskDescription;
use dispatch_process::{Outcome, ProcessTask, Workload};

type SlotFreedCallback = Box<dyn Fn() + Send + Sync>;

struct ActiveJob {
    id: u64,
    priority: i32,
    process: ProcessTask,
}

/// A bounded, priority-preemptive pool of running jobs.
pub struct PriorityRunner {
    size: usize,
    timeout: Option<Duration>,
    workload: Arc<dyn Workload>,
    active: Mutex<Vec<ActiveJob>>,
    callbacks: Mutex<Vec<SlotFreedCallback>>,
    self_ref: Weak<PriorityRunner>,
}

impl PriorityRunner {
    /// `size` is the pool's capacity (`N` in SPEC_FULL.md). `timeout`, if
    /// set, is applied uniformly to every job this runner starts --
    /// per-task timeouts received over the wire are not consulted (see
    /// SPEC_FULL.md §9's resolution of the CLI-vs-wire timeout ambiguity).
    pub fn new(size: usize, timeout: Option<Duration>, workload: Arc<dyn Workload>) -> Arc<Self> {
        assert!(size >= 1, "pool size must be at least 1");
        Arc::new_cyclic(|self_ref| Self {
            size,
            timeout,
            workload,
            active: Mutex::new(Vec::with_capacity(size)),
            callbacks: Mutex::new(Vec::new()),
            self_ref: self_ref.clone(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Current number of active jobs. Mostly useful for tests and metrics.
    pub fn active_len(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    /// Registers a slot-freed notifier. Multiple notifiers are supported;
    /// all are invoked, in registration order, on each non-evicted
    /// completion.
    pub fn add_done_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.callbacks.lock().unwrap().push(Box::new(callback));
    }

    /// Attempts to admit a task. Returns `true` iff a job was started.
    ///
    /// Non-suspending: spawning is fire-and-forget (`ProcessTask::start`
    /// never awaits), so this completes atomically with respect to the
    /// event loop, same as the eviction decision it makes.
    pub fn schedule(&self, desc: &TaskDescription) -> bool {
        let mut active = self.active.lock().unwrap();

        if active.len() < self.size {
            let job = self.start_job(desc);
            active.push(job);
            return true;
        }

        let victim_idx = active
            .iter()
            .enumerate()
            .max_by_key(|(_, job)| job.priority)
            .map(|(idx, _)| idx);

        let Some(idx) = victim_idx else {
            return false;
        };

        // Lower priority = larger numeric value. Ties never evict.
        if active[idx].priority <= desc.priority {
            return false;
        }

        let victim = active.remove(idx);
        tracing::debug!(
            victim = victim.id,
            victim_priority = victim.priority,
            newcomer_priority = desc.priority,
            "evicting lower-priority job"
        );
        // Remove from the active set *before* starting the newcomer, so the
        // pool's size is never observed overfull. The victim's own
        // TERMINATED callback, when it eventually fires, is a no-op.
        victim.process.terminate();

        let job = self.start_job(desc);
        active.push(job);
        true
    }

    fn start_job(&self, desc: &TaskDescription) -> ActiveJob {
        let command = self.workload.command(desc.runtime);
        let process = ProcessTask::new(command);
        let id = desc.sequence;
        let runner = self.self_ref.clone();
        process.add_done_callback(move |outcome| {
            if let Some(runner) = runner.upgrade() {
                runner.terminated_job(id, outcome);
            }
        });
        if let Err(err) = process.start(self.timeout) {
            tracing::error!(error = %err, job = id, "failed to start process task");
        }
        ActiveJob {
            id,
            priority: desc.priority,
            process,
        }
    }

    /// Invoked by a job's `ProcessTask` callback -- never by anything else.
    /// Runs inside the callback's own spawned task, so it is never
    /// reentrant with the `schedule` call that admitted this job.
    fn terminated_job(&self, id: u64, outcome: Outcome) {
        if matches!(outcome, Outcome::Terminated) {
            // Evicted: the evictor already removed this job and filled its
            // slot. Firing a slot-freed callback here would double-count a
            // slot that was never actually free.
            tracing::debug!(job = id, "eviction callback observed, nothing to do");
            return;
        }

        let removed = {
            let mut active = self.active.lock().unwrap();
            let pos = active.iter().position(|job| job.id == id);
            pos.map(|idx| active.remove(idx))
        };

        match (&removed, &outcome) {
            (Some(_), Outcome::Timeout) => tracing::warn!(job = id, "task timed out"),
            (Some(_), Outcome::Exited(code)) => {
                tracing::info!(job = id, exit_code = ?code, "task exited")
            }
            (None, _) => {
                // Safeguard, not an expected path: tolerate a job that's
                // already gone rather than panic on a race.
                tracing::warn!(job = id, "job was not in the active set any longer");
            }
            _ => unreachable!("Terminated outcome handled above"),
        }

        if removed.is_some() {
            for callback in self.callbacks.lock().unwrap().iter() {
                callback();
            }
        }
    }

    /// Terminates every active job and empties the active set. Idempotent:
    /// calling it again on an already-empty runner is a no-op.
    pub fn terminate_all(&self) {
        let mut active = self.active.lock().unwrap();
        for job in active.drain(..) {
            job.process.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;
    use tokio::process::Command;

    struct TrueWorkload;
    impl Workload for TrueWorkload {
        fn command(&self, _runtime: f64) -> Command {
            let mut c = Command::new("true");
            c.stdin(std::process::Stdio::null());
            c
        }
    }

    struct SleepWorkload;
    impl Workload for SleepWorkload {
        fn command(&self, runtime: f64) -> Command {
            let mut c = Command::new("sleep");
            c.arg(format!("{runtime}"));
            c.stdin(std::process::Stdio::null());
            c
        }
    }

    fn desc(priority: i32, runtime: f64, sequence: u64) -> TaskDescription {
        TaskDescription::new(priority, runtime, None, sequence)
    }

    #[tokio::test]
    async fn admits_up_to_capacity() {
        let runner = PriorityRunner::new(2, None, Arc::new(SleepWorkload));
        assert!(runner.schedule(&desc(5, 5.0, 0)));
        assert!(runner.schedule(&desc(5, 5.0, 1)));
        assert_eq!(runner.active_len(), 2);
    }

    #[tokio::test]
    async fn rejects_when_full_and_newcomer_is_not_strictly_better() {
        let runner = PriorityRunner::new(1, None, Arc::new(SleepWorkload));
        assert!(runner.schedule(&desc(5, 60.0, 0)));
        // Equal priority never evicts.
        assert!(!runner.schedule(&desc(5, 5.0, 1)));
        // Strictly worse priority never evicts either.
        assert!(!runner.schedule(&desc(8, 5.0, 2)));
        assert_eq!(runner.active_len(), 1);
    }

    #[tokio::test]
    async fn evicts_strictly_lower_priority_victim() {
        let runner = PriorityRunner::new(1, None, Arc::new(SleepWorkload));
        assert!(runner.schedule(&desc(8, 100.0, 0)));
        assert!(runner.schedule(&desc(3, 5.0, 1)));
        assert_eq!(runner.active_len(), 1);
    }

    #[tokio::test]
    async fn slot_freed_callback_fires_once_on_natural_exit() {
        let runner = PriorityRunner::new(1, None, Arc::new(TrueWorkload));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        runner.add_done_callback(move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(runner.schedule(&desc(5, 0.0, 0)));

        // Wait for the natural-exit completion to propagate.
        for _ in 0..50 {
            if fired.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(runner.active_len(), 0);
    }

    #[tokio::test]
    async fn eviction_does_not_fire_slot_freed_callback() {
        let runner = PriorityRunner::new(1, None, Arc::new(SleepWorkload));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        runner.add_done_callback(move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });

        assert!(runner.schedule(&desc(8, 100.0, 0)));
        assert!(runner.schedule(&desc(3, 0.0, 1)));

        // Give both the eviction reap and the natural-exit reap time to
        // settle; only job 1's natural exit should ever notify.
        for _ in 0..50 {
            if fired.load(Ordering::SeqCst) >= 1 {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminate_all_empties_active_set_and_is_idempotent() {
        let runner = PriorityRunner::new(2, None, Arc::new(SleepWorkload));
        assert!(runner.schedule(&desc(5, 60.0, 0)));
        assert!(runner.schedule(&desc(5, 60.0, 1)));
        runner.terminate_all();
        assert_eq!(runner.active_len(), 0);
        runner.terminate_all();
        assert_eq!(runner.active_len(), 0);
    }

    #[tokio::test]
    async fn timeout_frees_the_slot() {
        let runner = PriorityRunner::new(1, Some(StdDuration::from_millis(100)), Arc::new(SleepWorkload));
        assert!(runner.schedule(&desc(5, 60.0, 0)));

        let mut admitted_again = false;
        for _ in 0..50 {
            if runner.schedule(&desc(5, 0.0, 1)) {
                admitted_again = true;
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        assert!(admitted_again, "slot should free up after the timeout fires");
    }
}
