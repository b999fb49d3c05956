//! Asynchronous job table over the render pipeline.
//!
//! Every job runs on its own named thread and is the only writer of its record; callers only
//! read. Each update (progress with message, terminal status with artifact or error) is applied
//! under a single write lock so pollers never see half of one. The encoder runs on the job's
//! thread with no lock held.

use std::collections::HashMap;
use std::ffi::OsString;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::encode::ffmpeg::{DEFAULT_ENCODER, ensure_parent_dir};
use crate::foundation::error::{ChronoError, ChronoResult};
use crate::history::repo::HistoryReader;
use crate::jobs::model::{Job, JobId, JobOptions, JobStatus, JobSummary, JobView};
use crate::pipeline::{Preview, TimelapseRequest, render_preview, render_timelapse};
use crate::redact::ContentRedactor;

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Where finished artifacts are written, as `timelapse_<id>.<ext>`.
    pub output_dir: PathBuf,
    /// Parent of each job's private frame directory.
    pub scratch_root: PathBuf,
    pub encoder_program: OsString,
    /// Artifacts of jobs finished longer ago than this are deleted by [`JobOrchestrator::prune_expired`].
    pub retention: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            output_dir: tmp.join("chronoscope"),
            scratch_root: tmp,
            encoder_program: OsString::from(DEFAULT_ENCODER),
            retention: None,
        }
    }
}

#[derive(Default)]
struct JobTable {
    jobs: HashMap<JobId, Job>,
    /// Submission order, for listing.
    order: Vec<JobId>,
}

struct Shared {
    config: OrchestratorConfig,
    redactor: ContentRedactor,
    table: RwLock<JobTable>,
    seq: AtomicU64,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, JobTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, JobTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(&self, id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.write().jobs.get_mut(id).map(f)
    }
}

/// Cheap to clone; clones share one job table.
#[derive(Clone)]
pub struct JobOrchestrator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("config", &self.shared.config)
            .field("jobs", &self.shared.read().order.len())
            .finish()
    }
}

impl JobOrchestrator {
    pub fn new(config: OrchestratorConfig) -> ChronoResult<Self> {
        Self::with_redactor(config, ContentRedactor::new())
    }

    pub fn with_redactor(config: OrchestratorConfig, redactor: ContentRedactor) -> ChronoResult<Self> {
        use anyhow::Context as _;
        std::fs::create_dir_all(&config.output_dir).with_context(|| {
            format!(
                "failed to create output directory '{}'",
                config.output_dir.display()
            )
        })?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                redactor,
                table: RwLock::new(JobTable::default()),
                seq: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// Validate, record a `pending` job and start it. Returns without waiting for any work.
    ///
    /// Bad options and unopenable repositories are reported here, before a job exists.
    pub fn submit(&self, repo_path: impl AsRef<Path>, options: JobOptions) -> ChronoResult<JobId> {
        options.validate()?;
        let repo_path = repo_path.as_ref().to_path_buf();
        HistoryReader::open(&repo_path)?;

        let id = self.next_id();
        {
            let mut table = self.shared.write();
            table
                .jobs
                .insert(id.clone(), Job::new(id.clone(), repo_path.clone(), options));
            table.order.push(id.clone());
        }
        tracing::info!(job = %id, repo = %repo_path.display(), "job submitted");

        let shared = Arc::clone(&self.shared);
        let job_id = id.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("chronoscope-job-{id}"))
            .spawn(move || run_job(&shared, &job_id));
        if let Err(e) = spawned {
            tracing::error!(job = %id, "failed to start job thread: {e}");
            self.shared
                .update(&id, |job| job.fail(format!("failed to start job: {e}")));
        }
        Ok(id)
    }

    pub fn query(&self, id: &str) -> ChronoResult<JobView> {
        self.shared
            .read()
            .jobs
            .get(id)
            .map(Job::view)
            .ok_or_else(|| job_not_found(id))
    }

    /// Artifact path of a completed job whose file still exists.
    pub fn fetch_result(&self, id: &str) -> ChronoResult<PathBuf> {
        let table = self.shared.read();
        let job = table.jobs.get(id).ok_or_else(|| job_not_found(id))?;
        match job.status {
            JobStatus::Pending | JobStatus::Running => Err(ChronoError::not_ready(format!(
                "job '{id}' is {} ({}%)",
                job.status.as_str(),
                job.progress
            ))),
            JobStatus::Failed => Err(ChronoError::not_found(format!(
                "job '{id}' failed and has no output"
            ))),
            JobStatus::Completed => match &job.output_path {
                Some(path) if path.exists() => Ok(path.clone()),
                _ => Err(ChronoError::not_found(format!(
                    "output of job '{id}' is no longer available"
                ))),
            },
        }
    }

    /// Every known job in submission order.
    pub fn list_jobs(&self) -> Vec<JobSummary> {
        let table = self.shared.read();
        table
            .order
            .iter()
            .filter_map(|id| table.jobs.get(id))
            .map(Job::summary)
            .collect()
    }

    pub fn list_branches(&self, repo_path: impl AsRef<Path>) -> ChronoResult<Vec<String>> {
        HistoryReader::open(repo_path)?.list_branches()
    }

    /// Render the newest commit on the requested branch with the job's appearance settings.
    pub fn preview(&self, repo_path: impl AsRef<Path>, options: &JobOptions) -> ChronoResult<Preview> {
        options.validate()?;
        render_preview(
            repo_path.as_ref(),
            options.branch.as_deref(),
            &options.composer_opts(),
            &self.shared.redactor,
        )
    }

    /// Delete artifacts of jobs that finished more than `retention` ago. Returns how many files
    /// were removed. Job records are kept so ids stay unique.
    pub fn prune_expired(&self) -> usize {
        let Some(retention) = self.shared.config.retention else {
            return 0;
        };
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;

        let expired: Vec<(JobId, PathBuf)> = {
            let table = self.shared.read();
            table
                .jobs
                .values()
                .filter(|job| job.status.is_terminal())
                .filter(|job| job.finished_at.is_some_and(|t| t <= cutoff))
                .filter_map(|job| {
                    let path = job.output_path.as_ref()?;
                    path.exists().then(|| (job.id.clone(), path.clone()))
                })
                .collect()
        };

        let mut removed = 0;
        for (id, path) in expired {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(job = %id, artifact = %path.display(), "expired artifact removed");
                    removed += 1;
                }
                Err(e) => tracing::warn!(job = %id, artifact = %path.display(), "failed to remove expired artifact: {e}"),
            }
        }
        removed
    }

    /// Poll until the job reaches a terminal state or `timeout` elapses.
    pub fn wait(&self, id: &str, timeout: Duration) -> ChronoResult<JobView> {
        let deadline = Instant::now() + timeout;
        loop {
            let view = self.query(id)?;
            if view.status.is_terminal() || Instant::now() >= deadline {
                return Ok(view);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn next_id(&self) -> JobId {
        let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}_{seq}", Utc::now().timestamp())
    }
}

fn job_not_found(id: &str) -> ChronoError {
    ChronoError::not_found(format!("job '{id}' not found"))
}

fn run_job(shared: &Shared, id: &str) {
    let Some((repo_path, options)) = shared.update(id, |job| {
        job.start();
        (job.repo_path.clone(), job.options.clone())
    }) else {
        return;
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        execute(shared, id, repo_path, options)
    }));
    let outcome = match outcome {
        Ok(result) => result,
        Err(payload) => Err(ChronoError::Other(anyhow::anyhow!(
            "job panicked: {}",
            panic_message(payload.as_ref())
        ))),
    };

    match outcome {
        Ok(path) => {
            tracing::info!(job = %id, artifact = %path.display(), "job completed");
            shared.update(id, |job| job.complete(path));
        }
        Err(e) => {
            tracing::warn!(job = %id, "job failed: {e}");
            shared.update(id, |job| job.fail(e.to_string()));
        }
    }
}

fn execute(shared: &Shared, id: &str, repo_path: PathBuf, options: JobOptions) -> ChronoResult<PathBuf> {
    use anyhow::Context as _;

    let config = &shared.config;
    let out_path = config
        .output_dir
        .join(format!("timelapse_{id}.{}", options.format.extension()));
    ensure_parent_dir(&out_path)?;

    let scratch = tempfile::Builder::new()
        .prefix(&format!("chronoscope_{id}_"))
        .tempdir_in(&config.scratch_root)
        .with_context(|| {
            format!(
                "failed to create frame directory in '{}'",
                config.scratch_root.display()
            )
        })?;

    let req = TimelapseRequest {
        repo_path,
        branch: options.branch.clone(),
        out_path,
        format: options.format,
        fps: options.fps,
        composer: options.composer_opts(),
        encoder_program: config.encoder_program.clone(),
    };
    let sink = |progress: u8, message: &str| {
        shared.update(id, |job| job.report(progress, message));
    };
    let result = render_timelapse(&req, &shared.redactor, scratch.path(), &sink);

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        tracing::warn!(job = %id, dir = %scratch_path.display(), "failed to remove frame directory: {e}");
    }
    match result {
        Ok(summary) => Ok(summary.out_path),
        Err(e) => {
            discard_partial_output(id, &req.out_path);
            Err(e)
        }
    }
}

/// A failed job owns no artifact, so whatever the encoder left behind is removed.
fn discard_partial_output(id: &str, path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(job = %id, artifact = %path.display(), "partial output removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(job = %id, artifact = %path.display(), "failed to remove partial output: {e}")
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jobs/orchestrator.rs"]
mod tests;
