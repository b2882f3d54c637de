// src/core/dispatch.rs

use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::models::ScanJob;
use crate::core::pipeline::{Outcome, Pipeline};

/// Dead letters kept for the console; the oldest are dropped first.
const MAX_DEAD_LETTERS: usize = 256;

type DeadLetters = Arc<Mutex<VecDeque<DeadLetter>>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("job queue is closed")]
    Closed,
}

/// A job whose pipeline run ended in an error, kept for the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub job: ScanJob,
    pub error: String,
}

/// Runs queued scan jobs on a fixed pool of workers.
///
/// Jobs are taken in FIFO order by whichever worker is free; distinct scans
/// run concurrently while each scan's stages stay sequential inside its
/// pipeline run.
pub struct JobDispatcher {
    tx: mpsc::Sender<ScanJob>,
    workers: Vec<Worker>,
    dead_letters: DeadLetters,
}

struct Worker {
    id: usize,
    handle: JoinHandle<()>,
}

impl JobDispatcher {
    pub fn start(pipeline: Arc<Pipeline>, worker_count: usize, queue_capacity: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let dead_letters = Arc::new(Mutex::new(VecDeque::new()));

        let workers = (0..worker_count)
            .map(|id| {
                let rx = rx.clone();
                let pipeline = pipeline.clone();
                let dead_letters = dead_letters.clone();
                let handle = tokio::spawn(async move {
                    Self::worker_loop(id, rx, pipeline, dead_letters).await;
                });
                Worker { id, handle }
            })
            .collect();

        info!(workers = worker_count, capacity = queue_capacity, "Job dispatcher started.");
        Self { tx, workers, dead_letters }
    }

    /// Queues a job. Waits for room when the queue is full.
    pub async fn enqueue(&self, job: ScanJob) -> Result<(), DispatchError> {
        let scan_id = job.scan_id;
        self.tx.send(job).await.map_err(|_| DispatchError::Closed)?;
        info!(scan_id = %scan_id, "Job queued.");
        Ok(())
    }

    /// Most recent dead letters, oldest first.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.iter().cloned().collect()
    }

    /// Stops accepting jobs, lets the workers drain what is already queued and
    /// waits for them to exit.
    pub async fn shutdown(self) {
        let Self { tx, workers, .. } = self;
        drop(tx);
        for worker in workers {
            if let Err(e) = worker.handle.await {
                error!(worker = worker.id, error = %e, "Worker exited abnormally.");
            }
        }
        info!("Job dispatcher stopped.");
    }

    async fn worker_loop(
        id: usize,
        rx: Arc<Mutex<mpsc::Receiver<ScanJob>>>,
        pipeline: Arc<Pipeline>,
        dead_letters: DeadLetters,
    ) {
        loop {
            // The lock is only held while waiting for the next job.
            let next = rx.lock().await.recv().await;
            let Some(job) = next else {
                break;
            };
            info!(worker = id, scan_id = %job.scan_id, "Worker picked up job.");

            // Run on its own task so a panic inside a stage is contained.
            let run = {
                let pipeline = pipeline.clone();
                let job = job.clone();
                tokio::spawn(async move { pipeline.submit(&job).await })
            };

            let error = match run.await {
                Ok(Ok(Outcome::Completed(_))) => None,
                Ok(Ok(Outcome::Skipped(status))) => {
                    warn!(worker = id, scan_id = %job.scan_id, status = %status, "Redelivered job ignored.");
                    None
                }
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => {
                    // The run never reached its terminal transition.
                    if let Err(store_error) = pipeline.mark_failed(job.scan_id).await {
                        warn!(worker = id, scan_id = %job.scan_id, error = %store_error, "Aborted scan not marked failed.");
                    }
                    Some(format!("pipeline task aborted: {e}"))
                }
            };

            if let Some(error) = error {
                warn!(worker = id, scan_id = %job.scan_id, error = %error, "Job moved to dead letters.");
                push_capped(&mut *dead_letters.lock().await, DeadLetter { job, error });
            }
        }
        info!(worker = id, "Worker shutting down.");
    }
}

fn push_capped(letters: &mut VecDeque<DeadLetter>, letter: DeadLetter) {
    if letters.len() == MAX_DEAD_LETTERS {
        letters.pop_front();
    }
    letters.push_back(letter);
}
