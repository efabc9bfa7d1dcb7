//! Notification dispatcher — single-consumer work queue.
//!
//! One background worker drains a FIFO queue of dispatch jobs serially,
//! which bounds the outbound call rate against provider limits. Failed
//! sends are re-enqueued at the back until the retry ceiling; a fixed
//! pacing delay follows every dequeue regardless of outcome. Producers
//! never block; `drain_and_wait` is the opt-in flush point.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::channels::MessagingSender;
use crate::error::DispatchError;

/// Retry ceiling: a job is attempted at most `1 + MAX_RETRIES` times.
pub const MAX_RETRIES: u32 = 3;

/// Pacing delay enforced after every dequeue.
pub const CALL_DELAY: Duration = Duration::from_secs(2);

/// How many exhausted jobs to retain for observability.
const EXHAUSTED_KEEP: usize = 100;

/// A unit of outbound work. Owned by the dispatcher once enqueued;
/// destroyed on delivery or retry exhaustion.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub recipient: String,
    pub body: String,
    pub correlation_id: String,
    pub retry_count: u32,
}

enum QueueItem {
    Job(DispatchJob),
    /// Poison pill: stop the worker after the jobs ahead of it.
    Shutdown,
}

/// Dispatcher counters. Exhaustion is never persisted against the
/// transaction; this is the observable record that delivery gave up.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub delivered: u64,
    pub exhausted: u64,
    pub recent_exhausted: Vec<String>,
}

/// Single-consumer dispatch queue.
pub struct MessageQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
    pending_tx: watch::Sender<usize>,
    pending_rx: watch::Receiver<usize>,
    delivered: AtomicU64,
    exhausted_count: AtomicU64,
    exhausted: RwLock<Vec<DispatchJob>>,
    shut_down: AtomicBool,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
    max_retries: u32,
    pacing: Duration,
}

impl MessageQueue {
    /// Spawn the dispatcher with production retry/pacing settings.
    pub fn spawn(sender: Arc<dyn MessagingSender>) -> Arc<Self> {
        Self::spawn_with(sender, MAX_RETRIES, CALL_DELAY)
    }

    /// Spawn the dispatcher with explicit retry ceiling and pacing.
    pub fn spawn_with(
        sender: Arc<dyn MessagingSender>,
        max_retries: u32,
        pacing: Duration,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending_tx, pending_rx) = watch::channel(0usize);

        let queue = Arc::new(Self {
            tx,
            pending_tx,
            pending_rx,
            delivered: AtomicU64::new(0),
            exhausted_count: AtomicU64::new(0),
            exhausted: RwLock::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            worker: Mutex::new(None),
            max_retries,
            pacing,
        });

        let handle = tokio::spawn(Self::consume(Arc::clone(&queue), sender, rx));
        if let Ok(mut worker) = queue.worker.lock() {
            *worker = Some(handle);
        }
        queue
    }

    /// Enqueue a message for asynchronous delivery. Never blocks; success
    /// means "accepted into the queue", not "delivered".
    pub fn enqueue(
        &self,
        recipient: &str,
        message: &str,
        correlation_id: &str,
    ) -> Result<(), DispatchError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(DispatchError::AlreadyShutDown);
        }

        self.pending_tx.send_modify(|n| *n += 1);
        let job = DispatchJob {
            recipient: recipient.to_string(),
            body: message.to_string(),
            correlation_id: correlation_id.to_string(),
            retry_count: 0,
        };
        if self.tx.send(QueueItem::Job(job)).is_err() {
            self.pending_tx.send_modify(|n| *n = n.saturating_sub(1));
            return Err(DispatchError::QueueClosed);
        }
        debug!(recipient, correlation_id, "Message queued for dispatch");
        Ok(())
    }

    /// Block until every queued job (including pending retries) reaches a
    /// terminal outcome.
    pub async fn drain_and_wait(&self) {
        let mut rx = self.pending_rx.clone();
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }

    /// Stop the worker after it has drained the jobs already queued.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.tx.send(QueueItem::Shutdown).is_err() {
            return;
        }
        let handle = self.worker.lock().ok().and_then(|mut worker| worker.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Current dispatcher counters.
    pub async fn stats(&self) -> QueueStats {
        let pending = *self.pending_rx.borrow();
        QueueStats {
            pending,
            delivered: self.delivered.load(Ordering::Relaxed),
            exhausted: self.exhausted_count.load(Ordering::Relaxed),
            recent_exhausted: self
                .exhausted
                .read()
                .await
                .iter()
                .map(|job| job.correlation_id.clone())
                .collect(),
        }
    }

    fn job_done(&self) {
        self.pending_tx.send_modify(|n| *n = n.saturating_sub(1));
    }

    async fn remember_exhausted(&self, job: DispatchJob) {
        let mut exhausted = self.exhausted.write().await;
        if exhausted.len() >= EXHAUSTED_KEEP {
            exhausted.remove(0);
        }
        exhausted.push(job);
    }

    async fn consume(
        queue: Arc<Self>,
        sender: Arc<dyn MessagingSender>,
        mut rx: mpsc::UnboundedReceiver<QueueItem>,
    ) {
        info!("Dispatch worker started");

        while let Some(item) = rx.recv().await {
            let job = match item {
                QueueItem::Shutdown => break,
                QueueItem::Job(job) => job,
            };

            let sent = match sender.send(&job.recipient, &job.body).await {
                Ok(ok) => ok,
                Err(e) => {
                    warn!(
                        recipient = %job.recipient,
                        correlation_id = %job.correlation_id,
                        attempt = job.retry_count + 1,
                        error = %e,
                        "Send attempt failed"
                    );
                    false
                }
            };

            if sent {
                info!(
                    recipient = %job.recipient,
                    correlation_id = %job.correlation_id,
                    "Message delivered"
                );
                queue.delivered.fetch_add(1, Ordering::Relaxed);
                queue.job_done();
            } else if job.retry_count < queue.max_retries {
                let retry = DispatchJob {
                    retry_count: job.retry_count + 1,
                    ..job
                };
                debug!(
                    correlation_id = %retry.correlation_id,
                    retry = retry.retry_count,
                    "Re-enqueueing job"
                );
                // The job is still the same unit of pending work; only a
                // closed channel ends it here.
                if queue.tx.send(QueueItem::Job(retry)).is_err() {
                    queue.job_done();
                }
            } else {
                error!(
                    recipient = %job.recipient,
                    correlation_id = %job.correlation_id,
                    attempts = job.retry_count + 1,
                    "Retry ceiling reached; dropping job"
                );
                queue.exhausted_count.fetch_add(1, Ordering::Relaxed);
                queue.remember_exhausted(job).await;
                queue.job_done();
            }

            tokio::time::sleep(queue.pacing).await;
        }

        info!("Dispatch worker stopped");
    }
}
