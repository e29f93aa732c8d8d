//! UserWorker - drives one identity's queue to exhaustion
//!
//! Attempts within one identity are strictly sequential, with a fixed pause
//! between consecutive attempts. The worker owns its transport for the whole
//! run and never returns an error: every attempt ends in an outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::queue::{ObligationQueue, Transition};
use crate::config::AmbiguousPolicy;
use crate::domain::{Identity, ObligationReport};
use crate::executor::AttemptExecutor;
use crate::transport::Transport;

/// Result of one worker's run
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub label: String,
    pub obligations: Vec<ObligationReport>,
    /// Requests sent (including one abandoned by cancellation)
    pub attempts: u64,
    pub cancelled: bool,
}

pub struct UserWorker {
    identity: Arc<Identity>,
    queue: ObligationQueue,
    transport: Box<dyn Transport>,
    executor: Arc<AttemptExecutor>,
    delay: Duration,
    progress: Option<mpsc::UnboundedSender<ObligationReport>>,
}

impl UserWorker {
    /// Build the worker and its round-robin initial queue
    pub fn new(
        identity: Arc<Identity>,
        transport: Box<dyn Transport>,
        executor: Arc<AttemptExecutor>,
        delay: Duration,
        ambiguous_policy: AmbiguousPolicy,
    ) -> Self {
        debug!(label = %identity.label, ?delay, "UserWorker::new: called");
        let queue = ObligationQueue::new(identity.label.clone(), identity.obligations(), ambiguous_policy);
        Self {
            identity,
            queue,
            transport,
            executor,
            delay,
            progress: None,
        }
    }

    /// Publish each terminal report as soon as it is settled
    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<ObligationReport>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn label(&self) -> &str {
        &self.identity.label
    }

    pub fn queue(&self) -> &ObligationQueue {
        &self.queue
    }

    /// Run until the queue is empty or `cancel` turns true
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> WorkerReport {
        let label = self.identity.label.clone();
        info!(%label, count = self.queue.len(), "Starting selection for {} course(s)", self.queue.len());

        let mut attempts: u64 = 0;
        let mut cancelled = false;

        loop {
            if *cancel.borrow() {
                debug!(%label, "UserWorker::run: cancelled before next attempt");
                cancelled = true;
                break;
            }

            let Some(obligation) = self.queue.pop_front() else {
                break;
            };
            attempts += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancelled_signal(&mut cancel) => None,
                outcome = self.executor.execute(&obligation, &self.identity, self.transport.as_ref()) => Some(outcome),
            };

            let Some(outcome) = outcome else {
                debug!(%label, key = %obligation.key(), "UserWorker::run: in-flight attempt abandoned");
                self.queue.abandon(obligation);
                cancelled = true;
                break;
            };

            let key = obligation.key().clone();
            match self.queue.settle(obligation, &outcome) {
                Transition::Removed(disposition) => {
                    info!(%label, %key, %disposition, remaining = self.queue.len(), "Obligation finished");
                    if let (Some(progress), Some(report)) = (&self.progress, self.queue.settled().last()) {
                        let _ = progress.send(report.clone());
                    }
                }
                Transition::Requeued => {
                    debug!(%label, %key, "UserWorker::run: requeued");
                }
            }

            if self.queue.is_empty() {
                break;
            }

            let interrupted = tokio::select! {
                biased;
                _ = cancelled_signal(&mut cancel) => true,
                _ = tokio::time::sleep(self.delay) => false,
            };
            if interrupted {
                debug!(%label, "UserWorker::run: cancelled during delay");
                cancelled = true;
                break;
            }
        }

        if cancelled {
            info!(%label, pending = self.queue.len(), "Selection cancelled");
        } else {
            info!(%label, "Course selection has concluded");
        }

        WorkerReport {
            label,
            obligations: self.queue.into_reports(),
            attempts,
            cancelled,
        }
    }
}

/// Resolves once the run is cancelled; never resolves if the sender is gone
async fn cancelled_signal(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}
