// THEORY:
// The `parallel_pipeline` runs independent analyses concurrently. The engine
// itself is synchronous and CPU-bound, so the pool is a thin tokio layer around
// it: one dispatcher hands jobs round-robin to a fixed set of workers, and each
// worker runs its job on a blocking thread so the async runtime stays free.
//
// Key architectural principles:
// 1.  **Share Nothing**: A job owns its input bytes. Workers share only the
//     engine, whose models sit behind `Arc`s and are never mutated.
// 2.  **Answer on the Job**: Every job carries its own `oneshot` sender, so
//     results come back to the caller that submitted them, in any order.
// 3.  **Clean Shutdown**: Dropping the submission channel drains the dispatcher,
//     which closes every worker's queue; `shutdown` waits for all of them.

use crate::core_modules::activation::AnalysisMode;
use crate::core_modules::vegetation::DeforestationResult;
use crate::error::{AnalysisError, Result};
use crate::pipeline::{AnalysisEngine, FusionResult};
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One unit of work for the pool.
#[derive(Debug, Clone)]
pub enum AnalysisJob {
    Site { image: Vec<u8>, mode: AnalysisMode },
    Deforestation { before: Vec<u8>, after: Vec<u8> },
}

#[derive(Debug, Clone)]
pub enum JobOutcome {
    Site(FusionResult),
    Deforestation(DeforestationResult),
}

struct JobTask {
    job_id: u64,
    job: AnalysisJob,
    result_sender: oneshot::Sender<Result<JobOutcome>>,
}

fn run_job(engine: &AnalysisEngine, job: AnalysisJob) -> Result<JobOutcome> {
    match job {
        AnalysisJob::Site { image, mode } => engine.analyze_site_bytes(&image, mode).map(JobOutcome::Site),
        AnalysisJob::Deforestation { before, after } => engine
            .analyze_deforestation_bytes(&before, &after)
            .map(JobOutcome::Deforestation),
    }
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<JobTask>,
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the dispatcher and `worker_count` workers. Must be called from
    /// inside a tokio runtime.
    pub fn new(engine: AnalysisEngine, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<JobTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<JobTask>())
            .unzip();

        let dispatcher = tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(task)) = worker_senders[worker_idx].send(task) {
                    warn!(worker = worker_idx, job_id = task.job_id, "worker queue closed");
                    let _ = task
                        .result_sender
                        .send(Err(AnalysisError::Worker(format!("worker {worker_idx} is gone"))));
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let workers = worker_receivers
            .into_iter()
            .enumerate()
            .map(|(worker_idx, mut worker_receiver)| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    while let Some(task) = worker_receiver.recv().await {
                        debug!(worker = worker_idx, job_id = task.job_id, "job started");
                        let job_engine = engine.clone();
                        let job = task.job;
                        let outcome = tokio::task::spawn_blocking(move || run_job(&job_engine, job))
                            .await
                            .unwrap_or_else(|e| Err(AnalysisError::Worker(e.to_string())));
                        if task.result_sender.send(outcome).is_err() {
                            debug!(job_id = task.job_id, "caller dropped before result arrived");
                        }
                    }
                })
            })
            .collect();

        Self {
            task_sender,
            dispatcher,
            workers,
        }
    }

    async fn submit(&self, job_id: u64, job: AnalysisJob) -> Result<JobOutcome> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.task_sender
            .send(JobTask {
                job_id,
                job,
                result_sender,
            })
            .map_err(|_| AnalysisError::Worker("failed to send job to worker pool".into()))?;

        result_receiver
            .await
            .map_err(|_| AnalysisError::Worker("failed to receive result from worker".into()))?
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn shutdown(self) {
        drop(self.task_sender);
        let _ = self.dispatcher.await;
        for worker in join_all(self.workers).await {
            if let Err(e) = worker {
                warn!(error = %e, "worker ended abnormally");
            }
        }
    }
}

/// Concurrent front end over an `AnalysisEngine`.
pub struct ParallelPipeline {
    worker_pool: WorkerPool,
    job_counter: AtomicU64,
}

impl ParallelPipeline {
    /// Builds a pool sized by the engine's `worker_count`.
    pub fn new(engine: AnalysisEngine) -> Self {
        let worker_count = engine.config().worker_count;
        Self {
            worker_pool: WorkerPool::new(engine, worker_count),
            job_counter: AtomicU64::new(0),
        }
    }

    pub async fn submit(&self, job: AnalysisJob) -> Result<JobOutcome> {
        let job_id = self.job_counter.fetch_add(1, Ordering::Relaxed);
        self.worker_pool.submit(job_id, job).await
    }

    /// Runs every job concurrently; results come back in submission order.
    pub async fn submit_all(&self, jobs: Vec<AnalysisJob>) -> Vec<Result<JobOutcome>> {
        join_all(jobs.into_iter().map(|job| self.submit(job))).await
    }

    pub async fn analyze_site(&self, image: Vec<u8>, mode: AnalysisMode) -> Result<FusionResult> {
        match self.submit(AnalysisJob::Site { image, mode }).await? {
            JobOutcome::Site(result) => Ok(result),
            JobOutcome::Deforestation(_) => Err(AnalysisError::Worker("site job returned a deforestation result".into())),
        }
    }

    pub async fn analyze_deforestation(&self, before: Vec<u8>, after: Vec<u8>) -> Result<DeforestationResult> {
        match self.submit(AnalysisJob::Deforestation { before, after }).await? {
            JobOutcome::Deforestation(result) => Ok(result),
            JobOutcome::Site(_) => Err(AnalysisError::Worker("deforestation job returned a site result".into())),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    pub async fn shutdown(self) {
        self.worker_pool.shutdown().await;
    }
}
