//! Job-id keyed lookup for cancellation delivery
//!
//! The registry only holds what a caller needs to reach a running job: its
//! cancellation flag and its task handle. All other job state lives in the
//! job's own task and in storage.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Cooperative cancellation flag shared between a caller and one job
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A live job's handles
#[derive(Debug)]
struct JobHandle {
    cancel: CancelFlag,
    task: Option<JoinHandle<()>>,
}

/// Concurrency-safe map from job id to its cancellation handle
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<i64, JobHandle>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job and spawns its task in one step
    ///
    /// `spawn` receives the job's cancellation flag and returns the task
    /// handle. The map entry stays locked until the handle is stored, so a
    /// concurrent [`JobRegistry::cancel_and_take`] always gets the handle.
    /// `spawn` must not call back into the registry.
    pub fn start<F>(&self, job_id: i64, spawn: F)
    where
        F: FnOnce(CancelFlag) -> JoinHandle<()>,
    {
        let cancel = CancelFlag::new();
        let mut entry = self.jobs.entry(job_id).insert(JobHandle {
            cancel: cancel.clone(),
            task: None,
        });
        entry.task = Some(spawn(cancel));
    }

    /// Sets the cancellation flag of a live job
    ///
    /// # Returns
    ///
    /// `false` if no live task is registered for the job
    pub fn request_cancel(&self, job_id: i64) -> bool {
        match self.jobs.get(&job_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels a live job and hands back its task so the caller can await it
    pub fn cancel_and_take(&self, job_id: i64) -> Option<JoinHandle<()>> {
        let (_, handle) = self.jobs.remove(&job_id)?;
        handle.cancel.cancel();
        handle.task
    }

    /// Forgets a job; called by the job itself when its loop ends
    pub fn remove(&self, job_id: i64) {
        self.jobs.remove(&job_id);
    }

    pub fn is_live(&self, job_id: i64) -> bool {
        self.jobs.contains_key(&job_id)
    }

    pub fn live_count(&self) -> usize {
        self.jobs.len()
    }
}
