//! End-to-end scenarios against real child processes, one `SchedulerBin`
//! per scenario. These exercise the full `PriorityRunner` + `SchedulerBin`
//! stack through real OS processes (`sleep`/`true`), not mocks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::Command;

use dispatch_common::TaskDescription;
use dispatch_process::{SleepWorkload, Workload};
use dispatch_runner::PriorityRunner;
use dispatch_scheduler::SchedulerBin;

/// Records the order in which jobs are actually admitted into the runner
/// (`Workload::command` is called exactly once per admission, at the moment
/// `PriorityRunner::start_job` spawns the job -- see
/// `dispatch-runner/src/lib.rs`). Each task's `runtime` doubles as its
/// identifier here; the real sleep duration is fixed and short so the test
/// runs quickly regardless of which runtime value a scenario assigns.
struct RecordingWorkload {
    admitted: Arc<Mutex<Vec<u64>>>,
}

impl Workload for RecordingWorkload {
    fn command(&self, runtime: f64) -> Command {
        self.admitted.lock().unwrap().push(runtime.round() as u64);
        let mut command = Command::new("sleep");
        command.arg("0.05");
        command.stdin(std::process::Stdio::null());
        command.stdout(std::process::Stdio::null());
        command.stderr(std::process::Stdio::null());
        command
    }
}

fn desc(priority: i32, runtime: f64, sequence: u64) -> TaskDescription {
    TaskDescription::new(priority, runtime, None, sequence)
}

async fn poll_until(mut condition: impl FnMut() -> bool, attempts: u32) -> bool {
    for _ in 0..attempts {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Scenario 1: Fill then reject. Pool N=2. T1, T2 admitted; T3 pending.
/// After T1 completes, T3 starts and pending empties.
#[tokio::test]
async fn fill_then_reject_then_promote_on_completion() {
    let runner = PriorityRunner::new(2, None, Arc::new(SleepWorkload));
    let bin = SchedulerBin::new(runner);

    bin.schedule(desc(5, 0.2, 0));
    bin.schedule(desc(5, 0.2, 1));
    bin.schedule(desc(7, 0.0, 2));

    assert_eq!(bin.active_len(), 2);
    assert_eq!(bin.pending_len(), 1);

    let drained = poll_until(|| bin.pending_len() == 0, 50).await;
    assert!(drained, "T3 should be promoted once a slot frees");
}

/// Scenario 2: Evict lower priority. Pool N=1. T1(prio=8) is running when
/// T2(prio=3) arrives and evicts it; T2 runs to completion.
#[tokio::test]
async fn evict_lower_priority_then_run_to_completion() {
    let runner = PriorityRunner::new(1, None, Arc::new(SleepWorkload));
    let bin = SchedulerBin::new(runner);

    bin.schedule(desc(8, 5.0, 0));
    assert_eq!(bin.active_len(), 1);

    bin.schedule(desc(3, 0.1, 1));
    assert_eq!(bin.active_len(), 1, "the evicted slot is immediately reused");

    let completed = poll_until(|| bin.active_len() == 0, 50).await;
    assert!(completed, "T2 should run to completion and free its slot");
}

/// Scenario 3: Equal priority never evicts. T2 waits in pending until T1
/// finishes, regardless of how long T1 runs.
#[tokio::test]
async fn equal_priority_never_evicts() {
    let runner = PriorityRunner::new(1, None, Arc::new(SleepWorkload));
    let bin = SchedulerBin::new(runner);

    bin.schedule(desc(5, 0.3, 0));
    bin.schedule(desc(5, 0.0, 1));

    assert_eq!(bin.active_len(), 1);
    assert_eq!(bin.pending_len(), 1, "equal priority must queue, not evict");

    let promoted = poll_until(|| bin.pending_len() == 0, 50).await;
    assert!(promoted, "T2 should be promoted once T1 finishes naturally");
}

/// Scenario 4: Timeout. A job whose runtime exceeds the configured timeout
/// is terminated with TIMEOUT and its slot is freed for the next admission.
#[tokio::test]
async fn timeout_frees_slot_for_next_submission() {
    let runner = PriorityRunner::new(1, Some(Duration::from_millis(150)), Arc::new(SleepWorkload));
    let bin = SchedulerBin::new(runner);

    bin.schedule(desc(5, 60.0, 0));
    assert_eq!(bin.active_len(), 1);

    let freed = poll_until(|| bin.active_len() == 0, 50).await;
    assert!(freed, "the timed-out job should vacate its slot");

    bin.schedule(desc(5, 0.0, 1));
    let admitted = poll_until(|| bin.active_len() == 1, 50).await;
    assert!(admitted, "the freed slot should admit the next submission immediately");
}

/// Scenario 5: Pending ordering. With one slot occupied, the pending heap
/// promotes in `(priority, sequence)` order: T3 (prio 3), then T2 before T4
/// (both prio 7, T2 has the earlier sequence). Asserted as actual admission
/// order through the real `SchedulerBin`/`PriorityRunner` stack, not just
/// `TaskDescription`'s `Ord` impl.
#[tokio::test]
async fn pending_pops_in_priority_then_sequence_order() {
    let admitted = Arc::new(Mutex::new(Vec::new()));
    let workload = Arc::new(RecordingWorkload { admitted: Arc::clone(&admitted) });
    let runner = PriorityRunner::new(1, None, workload);
    let bin = SchedulerBin::new(runner);

    bin.schedule(desc(5, 0.0, 0)); // T1, admitted immediately
    bin.schedule(desc(7, 1.0, 1)); // T2 -> pending
    bin.schedule(desc(3, 2.0, 2)); // T3 -> pending
    bin.schedule(desc(7, 3.0, 3)); // T4 -> pending

    assert_eq!(bin.pending_len(), 3);

    let drained = poll_until(|| bin.pending_len() == 0 && bin.active_len() == 0, 100).await;
    assert!(drained, "all four jobs should run to completion");

    assert_eq!(
        *admitted.lock().unwrap(),
        vec![0, 2, 1, 3],
        "admission order should be T1, T3, T2, T4"
    );
}

/// Scenario 6: Shutdown discards pending. Both active and pending jobs are
/// gone after `shutdown`, and no further promotion occurs.
#[tokio::test]
async fn shutdown_discards_pending_and_ends_active_jobs() {
    let runner = PriorityRunner::new(1, None, Arc::new(SleepWorkload));
    let bin = SchedulerBin::new(runner);

    bin.schedule(desc(5, 30.0, 0));
    bin.schedule(desc(5, 30.0, 1));
    assert_eq!(bin.pending_len(), 1);

    bin.shutdown();

    assert_eq!(bin.pending_len(), 0);
    assert_eq!(bin.active_len(), 0);
    assert!(!bin.accepts(&desc(0, 0.0, 2)), "a shut-down bin accepts nothing further");

    // Give any stray promotion a moment to (not) happen.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bin.pending_len(), 0);
    assert_eq!(bin.active_len(), 0);
}
