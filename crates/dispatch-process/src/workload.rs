//! Turns a Job's `runtime` into the OS command `ProcessTask` actually runs.
//!
//! `PriorityRunner` and `SchedulerBin` never hardcode *what* a job does --
//! they only ever see a `&dyn Workload`. `SleepWorkload` is the one concrete
//! implementation shipped here, mirroring the original demo's
//! `sleep_for`/`Sleeper` target: a child that just sleeps for `runtime`
//! seconds and exits.

use tokio::process::Command;

/// Builds the command a `ProcessTask` spawns for a given `runtime` value.
pub trait Workload: Send + Sync {
    fn command(&self, runtime: f64) -> Command;
}

/// The demo workload: spawns the system `sleep <runtime>` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct SleepWorkload;

impl Workload for SleepWorkload {
    fn command(&self, runtime: f64) -> Command {
        let seconds = runtime.max(0.0);
        let mut command = Command::new("sleep");
        command.arg(format!("{seconds}"));
        command.stdin(std::process::Stdio::null());
        command.stdout(std::process::Stdio::null());
        command.stderr(std::process::Stdio::null());
        command
    }
}
