/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::consts::{MAX_JOB_ATTEMPTS, RETRY_BASE_DELAY};
use super::error::JobError;
use super::types::ServerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    ScreenshotDiff,
    BuildNotification,
}

impl Queue {
    pub const ALL: [Queue; 2] = [Queue::ScreenshotDiff, Queue::BuildNotification];
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Queue::ScreenshotDiff => write!(f, "screenshot-diff"),
            Queue::BuildNotification => write!(f, "build-notification"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobMessage {
    pub id: Uuid,
    pub attempt: u32,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue `{0}` is closed")]
    Closed(Queue),
}

/// In-process at-least-once queue. Durability comes from the `job_status`
/// of the rows, pending rows are pushed again on startup.
#[derive(Debug)]
pub struct JobQueue {
    senders: HashMap<Queue, mpsc::UnboundedSender<JobMessage>>,
    receivers: Mutex<HashMap<Queue, mpsc::UnboundedReceiver<JobMessage>>>,
}

impl JobQueue {
    pub fn new() -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();

        for queue in Queue::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(queue, tx);
            receivers.insert(queue, rx);
        }

        Self {
            senders,
            receivers: Mutex::new(receivers),
        }
    }

    pub fn push(&self, queue: Queue, id: Uuid) -> Result<(), QueueError> {
        self.send(queue, JobMessage { id, attempt: 1 })
    }

    pub fn retry(&self, queue: Queue, message: JobMessage) -> Result<(), QueueError> {
        self.send(queue, message)
    }

    fn send(&self, queue: Queue, message: JobMessage) -> Result<(), QueueError> {
        self.senders
            .get(&queue)
            .ok_or(QueueError::Closed(queue))?
            .send(message)
            .map_err(|_| QueueError::Closed(queue))
    }

    /// Hands out the consuming end of a queue. Only the first caller gets it.
    pub async fn take_receiver(&self, queue: Queue) -> Option<mpsc::UnboundedReceiver<JobMessage>> {
        self.receivers.lock().await.remove(&queue)
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_JOB_ATTEMPTS,
            base_delay: RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before the attempt following `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[async_trait]
pub trait Job: Send + Sync + 'static {
    const QUEUE: Queue;

    fn timeout(&self) -> Duration;

    async fn perform(&self, state: Arc<ServerState>, id: Uuid) -> Result<(), JobError>;

    /// Called once after the last attempt failed.
    async fn failed(&self, state: Arc<ServerState>, id: Uuid, error: &JobError);
}

pub async fn run_job_loop<J: Job>(
    state: Arc<ServerState>,
    job: Arc<J>,
    max_concurrent: usize,
    retry: RetryPolicy,
) {
    let mut receiver = match state.queue.take_receiver(J::QUEUE).await {
        Some(receiver) => receiver,
        None => {
            error!(queue = %J::QUEUE, "Queue already has a consumer");
            return;
        }
    };

    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    info!(queue = %J::QUEUE, max_concurrent, "Started job loop");

    while let Some(message) = receiver.recv().await {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(error = %e, queue = %J::QUEUE, "Job semaphore closed");
                break;
            }
        };

        tokio::spawn(run_job(
            Arc::clone(&state),
            Arc::clone(&job),
            message,
            retry,
            permit,
        ));
    }

    info!(queue = %J::QUEUE, "Job loop stopped");
}

#[instrument(skip(state, job, retry, _permit), fields(queue = %J::QUEUE, job_id = %message.id, attempt = message.attempt))]
async fn run_job<J: Job>(
    state: Arc<ServerState>,
    job: Arc<J>,
    message: JobMessage,
    retry: RetryPolicy,
    _permit: OwnedSemaphorePermit,
) {
    match execute_job(&state, job.as_ref(), message.id).await {
        Ok(()) => debug!("Job completed"),
        Err(e) if e.is_retryable() && message.attempt < retry.max_attempts => {
            let delay = retry.delay(message.attempt);
            warn!(error = %e, delay = ?delay, "Job failed, scheduling retry");

            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let next = JobMessage {
                    id: message.id,
                    attempt: message.attempt + 1,
                };

                if let Err(e) = state.queue.retry(J::QUEUE, next) {
                    error!(error = %e, job_id = %message.id, "Failed to requeue job");
                }
            });
        }
        Err(e) => {
            error!(error = %e, "Job failed permanently");
            sentry::capture_message(
                &format!("{} job {} failed: {}", J::QUEUE, message.id, e),
                sentry::Level::Error,
            );
            job.failed(Arc::clone(&state), message.id, &e).await;
        }
    }
}

/// Runs a single attempt under the per-job lock and wall-clock timeout, so
/// duplicate deliveries of one id never overlap.
pub async fn execute_job<J: Job>(
    state: &Arc<ServerState>,
    job: &J,
    id: Uuid,
) -> Result<(), JobError> {
    let timeout = job.timeout();
    let _guard = state
        .locks
        .acquire(&format!("job:{}:{}", J::QUEUE, id), timeout)
        .await?;

    tokio::time::timeout(timeout, job.perform(Arc::clone(state), id))
        .await
        .map_err(|_| JobError::Timeout(timeout))?
}
