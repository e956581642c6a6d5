//! Single-flight histogram pipeline.
//!
//! The pipeline owns its state machine (`Idle -> Queued -> Running -> Idle`)
//! and is driven by one owner task. Jobs run on the tokio runtime and report
//! back over a single completion channel; the owner drains that channel with
//! [`HistogramPipeline::next_completion`] or
//! [`HistogramPipeline::poll_completions`], which flips the state back to
//! `Idle` before the result is broadcast to subscribers.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use metrics::counter;
use storage::ArtifactCache;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};
use view_common::{HistogramParameters, HistogramResult};

use crate::codec::{decode_result, encode_result};
use crate::{compute_histogram, HistogramError, PipelineConfig};

/// Capacity of the subscriber broadcast channel.
const BROADCAST_CAPACITY: usize = 16;

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Queued,
    Running,
}

/// Identifier of a dispatched job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Outcome of [`HistogramPipeline::request_compute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeRequest {
    /// A background job was started.
    Dispatched(JobId),
    /// The parameters match the last successful job; its result is re-delivered.
    Reused,
    /// A job is already queued or running.
    Ignored,
    /// The parameters (or their source) cannot start a job.
    Invalid,
}

impl ComputeRequest {
    pub fn job(&self) -> Option<JobId> {
        match self {
            ComputeRequest::Dispatched(job) => Some(*job),
            _ => None,
        }
    }
}

/// What the owner sees when draining completions.
#[derive(Debug)]
pub enum PipelineEvent {
    /// A job finished and its result was published.
    Completed {
        job: JobId,
        result: Arc<HistogramResult>,
    },
    /// The previous result was re-delivered without recomputation.
    Reused(Arc<HistogramResult>),
    /// A job failed; nothing was published.
    Failed { job: JobId, error: HistogramError },
}

impl PipelineEvent {
    pub fn result(&self) -> Option<&Arc<HistogramResult>> {
        match self {
            PipelineEvent::Completed { result, .. } | PipelineEvent::Reused(result) => Some(result),
            PipelineEvent::Failed { .. } => None,
        }
    }
}

/// Message sent from a job (or a reuse) to the owner.
enum Completion {
    Finished {
        job: JobId,
        outcome: Result<Arc<HistogramResult>, HistogramError>,
    },
    Reused(Arc<HistogramResult>),
}

/// Deduplicating, single-flight histogram scheduler.
pub struct HistogramPipeline {
    state: PipelineState,
    next_job: u64,
    last_success: Option<Arc<HistogramResult>>,
    cache: Arc<ArtifactCache>,
    config: PipelineConfig,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    results: broadcast::Sender<Arc<HistogramResult>>,
}

impl HistogramPipeline {
    pub fn new(cache: Arc<ArtifactCache>, config: PipelineConfig) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (results, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            state: PipelineState::Idle,
            next_job: 1,
            last_success: None,
            cache,
            config,
            completion_tx,
            completion_rx,
            results,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Result of the last successful job.
    pub fn last_result(&self) -> Option<Arc<HistogramResult>> {
        self.last_success.clone()
    }

    /// Receive every result published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<HistogramResult>> {
        self.results.subscribe()
    }

    /// Ask for a histogram. Never blocks and never waits for the job.
    ///
    /// Must be called from within a tokio runtime; outside of one the
    /// request is reported as [`ComputeRequest::Invalid`].
    pub fn request_compute(&mut self, params: HistogramParameters) -> ComputeRequest {
        if self.state != PipelineState::Idle {
            counter!("cubeview_histogram_ignored_total").increment(1);
            debug!(state = ?self.state, "Histogram request ignored, job in flight");
            return ComputeRequest::Ignored;
        }

        if let Some(last) = &self.last_success {
            if *last.params() == params {
                debug!("Histogram parameters unchanged, re-delivering last result");
                let _ = self.completion_tx.send(Completion::Reused(last.clone()));
                return ComputeRequest::Reused;
            }
        }

        self.state = PipelineState::Queued;

        if let Err(e) = params.validate() {
            warn!(error = %e, "Histogram request rejected");
            self.state = PipelineState::Idle;
            return ComputeRequest::Invalid;
        }
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Histogram request outside of a tokio runtime");
                self.state = PipelineState::Idle;
                return ComputeRequest::Invalid;
            }
        };

        let job = JobId(self.next_job);
        self.next_job += 1;
        self.state = PipelineState::Running;
        counter!("cubeview_histogram_jobs_total").increment(1);
        info!(%job, source = params.source.id(), bins = params.bin_count, "Dispatching histogram job");

        handle.spawn(run_job(
            job,
            params,
            self.cache.clone(),
            self.config.cache_priority,
            self.completion_tx.clone(),
        ));

        ComputeRequest::Dispatched(job)
    }

    /// Wait for the next completion and apply it.
    pub async fn next_completion(&mut self) -> Option<PipelineEvent> {
        let completion = self.completion_rx.recv().await?;
        Some(self.apply(completion))
    }

    /// Apply every completion that has already arrived.
    pub fn poll_completions(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.completion_rx.try_recv() {
            events.push(self.apply(completion));
        }
        events
    }

    fn apply(&mut self, completion: Completion) -> PipelineEvent {
        match completion {
            Completion::Finished { job, outcome } => {
                self.state = PipelineState::Idle;
                match outcome {
                    Ok(result) => {
                        self.last_success = Some(result.clone());
                        let _ = self.results.send(result.clone());
                        info!(%job, total = result.total(), "Histogram published");
                        PipelineEvent::Completed { job, result }
                    }
                    Err(error) => {
                        error!(%job, error = %error, "Histogram job failed");
                        PipelineEvent::Failed { job, error }
                    }
                }
            }
            Completion::Reused(result) => {
                let _ = self.results.send(result.clone());
                PipelineEvent::Reused(result)
            }
        }
    }
}

#[instrument(skip_all, fields(job = %job))]
async fn run_job(
    job: JobId,
    params: HistogramParameters,
    cache: Arc<ArtifactCache>,
    priority: i64,
    tx: mpsc::UnboundedSender<Completion>,
) {
    let outcome = load_or_compute(params, &cache, priority).await;

    if let Ok(result) = &outcome {
        if let Some(path) = &result.params().output_file {
            write_table(path, result).await;
        }
    }

    // The owner may have been dropped; the result is then simply discarded.
    let _ = tx.send(Completion::Finished { job, outcome });
}

async fn load_or_compute(
    params: HistogramParameters,
    cache: &ArtifactCache,
    priority: i64,
) -> Result<Arc<HistogramResult>, HistogramError> {
    let key = params.cache_key();

    if let Some(values) = cache.get_f64s(&key).await {
        match decode_result(params.clone(), &values) {
            Ok(result) => {
                debug!("Histogram served from artifact cache");
                return Ok(Arc::new(result));
            }
            Err(e) => warn!(error = %e, "Ignoring cached histogram"),
        }
    }

    let result = tokio::task::spawn_blocking(move || compute_histogram(&params))
        .await
        .map_err(|e| HistogramError::JobFailed(e.to_string()))??;

    cache.put_f64s(&key, &encode_result(&result), priority).await;
    Ok(Arc::new(result))
}

async fn write_table(path: &Path, result: &HistogramResult) {
    match tokio::fs::write(path, result.to_table()).await {
        Ok(()) => debug!(path = %path.display(), "Wrote histogram table"),
        Err(e) => error!(path = %path.display(), error = %e, "Failed to write histogram table"),
    }
}
