//! `SchedulerManager`: routes inbound tasks to the first accepting bin.

use std::sync::Arc;

use dispatch_common::{DispatchError, TaskDescription};

use crate::bin_::SchedulerBin;

/// Holds an ordered list of bins and routes each incoming task to the first
/// one that accepts it.
pub struct SchedulerManager {
    bins: Vec<Arc<SchedulerBin>>,
}

impl SchedulerManager {
    pub fn new(bins: Vec<Arc<SchedulerBin>>) -> Self {
        Self { bins }
    }

    /// Routes `task` to the first bin whose `accepts` returns true. Returns
    /// `false` (logged, task dropped) if no bin accepts it.
    pub fn handle(&self, task: TaskDescription) -> bool {
        for bin in &self.bins {
            if bin.accepts(&task) {
                bin.schedule(task);
                return true;
            }
        }
        let error = DispatchError::AdmissionRejected;
        tracing::warn!(
            %error,
            priority = task.priority,
            sequence = task.sequence,
            "dropping task"
        );
        false
    }

    pub fn shutdown_all(&self) {
        for bin in &self.bins {
            bin.shutdown();
        }
    }
}
