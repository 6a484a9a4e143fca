//! Job status registry and background job runner.
//!
//! Each job runs the processing pipeline on tokio's blocking pool and reports
//! progress only through the registry, which pollers read concurrently.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, info, info_span};

use crate::pipeline::{self, JobRequest, JobResults};

/// Status strings written by the pipeline and the runner.
pub mod status {
    pub const PROCESSING: &str = "Processing";
    pub const READING: &str = "Reading data";
    pub const VALIDATING: &str = "Validating";
    pub const APPLYING_ONA: &str = "Applying ONA algorithm";
    pub const SYNCHRONIZING: &str = "Synchronizing";
    pub const PREPARING: &str = "Preparing visualization data";
    pub const COMPLETED: &str = "Completed";
    pub const ERROR: &str = "Error";

    /// Final message of a job that finished without a weather warning.
    pub const COMPLETED_MESSAGE: &str = "Processing completed successfully";
}

/// Write-only progress channel for one job.
pub trait StatusSink: Send + Sync {
    fn set_status(&self, status: &str);
    /// Values above 100 are clamped.
    fn set_progress(&self, progress: u8);
    fn set_message(&self, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobId(String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub status: String,
    pub progress: u8,
    pub message: String,
    #[serde(skip)]
    pub results: Option<Arc<JobResults>>,
}

impl JobStatus {
    fn new() -> Self {
        Self {
            status: status::PROCESSING.to_string(),
            progress: 0,
            message: String::new(),
            results: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == status::COMPLETED || self.status == status::ERROR
    }

    pub fn is_error(&self) -> bool {
        self.status == status::ERROR
    }
}

#[derive(Debug, Default)]
struct Jobs {
    statuses: HashMap<JobId, JobStatus>,
    next_seq: u64,
}

/// Shared, cloneable map from job id to its latest status.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<Jobs>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh `job_<YYYYMMDDHHMMSS>_<seq>` id in the `Processing` state.
    pub fn register(&self) -> JobId {
        let mut jobs = self.inner.write();
        jobs.next_seq += 1;
        let id = JobId(format!(
            "job_{}_{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            jobs.next_seq
        ));
        jobs.statuses.insert(id.clone(), JobStatus::new());
        id
    }

    pub fn get(&self, id: &JobId) -> Option<JobStatus> {
        self.inner.read().statuses.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops `id` from the registry and hands back its last status, releasing
    /// the registry's reference to the job's results.
    pub fn remove(&self, id: &JobId) -> Option<JobStatus> {
        self.inner.write().statuses.remove(id)
    }

    pub fn handle(&self, id: &JobId) -> JobHandle {
        JobHandle {
            registry: self.clone(),
            id: id.clone(),
        }
    }

    /// Updates of a removed job are ignored.
    fn update<F: FnOnce(&mut JobStatus)>(&self, id: &JobId, f: F) {
        if let Some(status) = self.inner.write().statuses.get_mut(id) {
            f(status);
        }
    }

    /// Polls `id` every `interval` until it reaches `Completed` or `Error`.
    ///
    /// Returns `None` if the id is unknown.
    pub async fn wait_for(&self, id: &JobId, interval: Duration) -> Option<JobStatus> {
        let mut last: Option<(String, u8, String)> = None;
        loop {
            let current = self.get(id)?;
            let seen = (current.status.clone(), current.progress, current.message.clone());
            if last.as_ref() != Some(&seen) {
                info!(
                    job_id = %id,
                    status = %current.status,
                    progress = current.progress,
                    message = %current.message,
                    "Job status"
                );
                last = Some(seen);
            }
            if current.is_finished() {
                return Some(current);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// [`StatusSink`] bound to one job id.
#[derive(Debug, Clone)]
pub struct JobHandle {
    registry: JobRegistry,
    id: JobId,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn complete(&self, results: JobResults) {
        self.registry.update(&self.id, |s| {
            s.status = status::COMPLETED.to_string();
            s.progress = 100;
            s.message = results
                .sync_warning
                .clone()
                .unwrap_or_else(|| status::COMPLETED_MESSAGE.to_string());
            s.results = Some(Arc::new(results));
        });
    }

    pub fn fail(&self, message: &str) {
        self.registry.update(&self.id, |s| {
            s.status = status::ERROR.to_string();
            s.progress = 0;
            s.message = message.to_string();
        });
    }
}

impl StatusSink for JobHandle {
    fn set_status(&self, status: &str) {
        debug!(job_id = %self.id, status, "Status");
        self.registry.update(&self.id, |s| s.status = status.to_string());
    }

    fn set_progress(&self, progress: u8) {
        self.registry.update(&self.id, |s| s.progress = progress.min(100));
    }

    fn set_message(&self, message: &str) {
        self.registry.update(&self.id, |s| s.message = message.to_string());
    }
}

/// Registers a job and runs `request` in the background.
///
/// Returns immediately; progress and the final outcome are visible through
/// `registry`.
pub fn spawn_job(registry: &JobRegistry, request: JobRequest) -> (JobId, JoinHandle<()>) {
    let id = registry.register();
    let handle = registry.handle(&id);
    let span = info_span!("job", job_id = %id);

    let task = tokio::spawn(
        async move {
            info!("Job started");
            let sink = handle.clone();
            let span = Span::current();
            let outcome = tokio::task::spawn_blocking(move || {
                let _entered = span.enter();
                pipeline::run(&request, &sink)
            })
            .await;

            match outcome {
                Ok(Ok(results)) => {
                    handle.complete(results);
                    info!("Job completed");
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Job failed");
                    handle.fail(&e.to_string());
                }
                Err(e) => {
                    error!(error = %e, "Job task did not finish");
                    handle.fail(&format!("processing task aborted: {e}"));
                }
            }
        }
        .instrument(span),
    );

    (id, task)
}
