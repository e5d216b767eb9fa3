//! Supervises a single OS child process.
//!
//! `ProcessTask` wraps one spawned child: `start`/`terminate`/`wait`, an
//! optional wall-clock timeout, and a completion callback fired exactly
//! once after the terminal state is visible. States are
//! `FRESH -> RUNNING -> {EXITED, TIMEOUT, TERMINATED}`; terminal states are
//! sticky.
//!
//! The callback runs inside a dedicated `tokio::spawn`ed task, never on the
//! caller's stack -- this is what makes it safe for `PriorityRunner` to call
//! back into its own `schedule` logic from the callback without risking
//! reentrancy into a half-mutated active set (see SPEC_FULL.md §9).

pub mod workload;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

pub use workload::{SleepWorkload, Workload};

/// Terminal outcome of a supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The child exited on its own. Carries its exit code, if the platform
    /// reported one.
    Exited(Option<i32>),
    /// The wall-clock timeout fired before the child exited.
    Timeout,
    /// `terminate()` was called while the child was running.
    Terminated,
}

/// Errors raised by `ProcessTask` itself (not by the child process).
#[derive(Debug)]
pub enum ProcessError {
    /// `start` was called more than once.
    AlreadyStarted,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "process task was already started"),
        }
    }
}

impl std::error::Error for ProcessError {}

type DoneCallback = Box<dyn FnOnce(Outcome) + Send + 'static>;

struct Shared {
    started: AtomicBool,
    outcome: Mutex<Option<Outcome>>,
    callback: Mutex<Option<DoneCallback>>,
    terminal_tx: watch::Sender<bool>,
    terminal_rx: watch::Receiver<bool>,
    kill_tx: mpsc::UnboundedSender<()>,
}

/// A supervised OS child process.
pub struct ProcessTask {
    shared: Arc<Shared>,
    command: Mutex<Option<Command>>,
    kill_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

impl fmt::Debug for ProcessTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessTask")
            .field("started", &self.shared.started.load(Ordering::Relaxed))
            .field("outcome", &*self.shared.outcome.lock().unwrap())
            .finish()
    }
}

impl ProcessTask {
    /// Wraps a not-yet-spawned `Command`. Nothing runs until `start`.
    pub fn new(command: Command) -> Self {
        let (terminal_tx, terminal_rx) = watch::channel(false);
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                started: AtomicBool::new(false),
                outcome: Mutex::new(None),
                callback: Mutex::new(None),
                terminal_tx,
                terminal_rx,
                kill_tx,
            }),
            command: Mutex::new(Some(command)),
            kill_rx: Mutex::new(Some(kill_rx)),
        }
    }

    /// Registers the completion callback. Must be called before `start` to
    /// guarantee delivery; if the task has already reached a terminal state
    /// by the time this is called, it fires immediately instead, so a late
    /// registration never silently loses the notification.
    pub fn add_done_callback(&self, callback: impl FnOnce(Outcome) + Send + 'static) {
        {
            let mut slot = self.shared.callback.lock().unwrap();
            *slot = Some(Box::new(callback));
        }
        let already_done = self.shared.outcome.lock().unwrap().clone();
        if let Some(outcome) = already_done {
            if let Some(cb) = self.shared.callback.lock().unwrap().take() {
                cb(outcome);
            }
        }
    }

    /// Spawns the child and arms the optional timeout. Returns
    /// `Err(AlreadyStarted)` if called more than once.
    pub fn start(&self, timeout: Option<Duration>) -> Result<(), ProcessError> {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return Err(ProcessError::AlreadyStarted);
        }

        let mut command = self
            .command
            .lock()
            .unwrap()
            .take()
            .expect("command is only taken once, guarded by `started`");
        let mut kill_rx = self
            .kill_rx
            .lock()
            .unwrap()
            .take()
            .expect("kill_rx is only taken once, guarded by `started`");
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let outcome = match command.spawn() {
                Ok(mut child) => supervise(&mut child, timeout, &mut kill_rx).await,
                Err(err) => {
                    tracing::error!(error = %err, "failed to spawn child process");
                    Outcome::Exited(None)
                }
            };

            *shared.outcome.lock().unwrap() = Some(outcome.clone());
            let _ = shared.terminal_tx.send(true);
            if let Some(cb) = shared.callback.lock().unwrap().take() {
                cb(outcome);
            }
        });

        Ok(())
    }

    /// If running, signals the child to exit and marks the task
    /// `TERMINATED`. A no-op if the task never started or has already
    /// reached a terminal state -- idempotent by construction.
    pub fn terminate(&self) {
        if !self.shared.started.load(Ordering::Acquire) {
            return;
        }
        if self.shared.outcome.lock().unwrap().is_some() {
            return;
        }
        // Fire-and-forget: the supervising task picks this up and does the
        // actual signaling/reaping. `terminate` itself never suspends.
        let _ = self.shared.kill_tx.send(());
    }

    /// Suspends until the task reaches a terminal state, then returns it.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.shared.terminal_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.shared
            .outcome
            .lock()
            .unwrap()
            .clone()
            .expect("terminal flag implies outcome is set")
    }

    /// The current terminal outcome, if any.
    pub fn result(&self) -> Option<Outcome> {
        self.shared.outcome.lock().unwrap().clone()
    }
}

enum Race {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    KillRequested,
}

async fn supervise(
    child: &mut Child,
    timeout: Option<Duration>,
    kill_rx: &mut mpsc::UnboundedReceiver<()>,
) -> Outcome {
    let race = match timeout {
        Some(dur) => tokio::select! {
            status = child.wait() => Race::Exited(status),
            _ = tokio::time::sleep(dur) => Race::TimedOut,
            _ = kill_rx.recv() => Race::KillRequested,
        },
        None => tokio::select! {
            status = child.wait() => Race::Exited(status),
            _ = kill_rx.recv() => Race::KillRequested,
        },
    };

    match race {
        Race::Exited(Ok(status)) => Outcome::Exited(status.code()),
        Race::Exited(Err(err)) => {
            tracing::warn!(error = %err, "failed to reap child process");
            Outcome::Exited(None)
        }
        Race::TimedOut => {
            tracing::warn!("task timed out, terminating child");
            terminate_child(child).await;
            Outcome::Timeout
        }
        Race::KillRequested => {
            terminate_child(child).await;
            Outcome::Terminated
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: `pid` is a still-live child of this process (we hold the
        // `Child` handle), so signaling it cannot race with pid reuse.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) {}

/// Signals the child to exit, then reaps it -- force-killing if it ignores
/// the polite signal for too long. Always consumes the zombie: the caller
/// never blocks on the OS without this eventually resolving.
async fn terminate_child(child: &mut Child) {
    send_sigterm(child);
    if tokio::time::timeout(Duration::from_secs(5), child.wait())
        .await
        .is_err()
    {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}
