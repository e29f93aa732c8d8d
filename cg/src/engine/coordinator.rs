//! RunCoordinator - fans identities out to concurrent workers
//!
//! Inert identities are reported and skipped. Every transport is built before
//! any worker starts, so a bad proxy fails the run without sending a request.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::worker::{UserWorker, WorkerReport};
use crate::config::{AmbiguousPolicy, Config};
use crate::domain::{Disposition, Identity, ObligationReport};
use crate::executor::AttemptExecutor;
use crate::report::{RunSummary, SkippedIdentity};
use crate::transport::{Connector, ProxySettings, TransportError};

/// Errors that stop a run before any request is sent
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to build transport for {label}: {source}")]
    Transport {
        label: String,
        #[source]
        source: TransportError,
    },
}

/// Cancellation channel shared by every worker of a run
pub fn cancel_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

pub struct RunCoordinator {
    executor: Arc<AttemptExecutor>,
    connector: Arc<dyn Connector>,
    proxy: ProxySettings,
    delay: Duration,
    ambiguous_policy: AmbiguousPolicy,
}

impl RunCoordinator {
    pub fn new(
        executor: Arc<AttemptExecutor>,
        connector: Arc<dyn Connector>,
        proxy: ProxySettings,
        delay: Duration,
        ambiguous_policy: AmbiguousPolicy,
    ) -> Self {
        Self {
            executor,
            connector,
            proxy,
            delay,
            ambiguous_policy,
        }
    }

    pub fn from_config(config: &Config, connector: Arc<dyn Connector>) -> Self {
        Self::new(
            Arc::new(AttemptExecutor::from_config(config)),
            connector,
            ProxySettings::from_config(&config.proxy),
            config.engine.inter_attempt_delay(),
            config.engine.ambiguous_policy,
        )
    }

    /// Split identities into runnable ones and skipped ones
    pub fn plan(identities: Vec<Identity>) -> (Vec<Identity>, Vec<SkippedIdentity>) {
        let mut runnable = Vec::new();
        let mut skipped = Vec::new();
        for identity in identities {
            match identity.inert_reason() {
                Some(reason) => {
                    warn!(label = %identity.label, %reason, "Skipping identity");
                    skipped.push(SkippedIdentity::new(identity.label, reason));
                }
                None => runnable.push(identity),
            }
        }
        (runnable, skipped)
    }

    /// Drive every identity to completion or cancellation
    pub async fn run(&self, identities: Vec<Identity>, cancel: watch::Receiver<bool>) -> Result<RunSummary, EngineError> {
        debug!(count = identities.len(), proxy = %self.proxy, "RunCoordinator::run: called");
        let started_at = Utc::now();
        let (runnable, skipped) = Self::plan(identities);

        let mut workers = Vec::with_capacity(runnable.len());
        for identity in runnable {
            let transport = self
                .connector
                .connect(&self.proxy)
                .map_err(|source| EngineError::Transport {
                    label: identity.label.clone(),
                    source,
                })?;
            workers.push(UserWorker::new(
                Arc::new(identity),
                transport,
                self.executor.clone(),
                self.delay,
                self.ambiguous_policy,
            ));
        }

        info!(workers = workers.len(), skipped = skipped.len(), proxy = %self.proxy, "Starting run");

        let mut fallbacks = Vec::with_capacity(workers.len());
        let mut handles = Vec::with_capacity(workers.len());
        for worker in workers {
            let (progress, settled) = mpsc::unbounded_channel();
            fallbacks.push((pending_reports(&worker), settled));
            handles.push(tokio::spawn(worker.with_progress(progress).run(cancel.clone())));
        }

        let mut obligations = Vec::new();
        let mut attempts = 0;
        let mut cancelled = *cancel.borrow();
        for (joined, fallback) in join_all(handles).await.into_iter().zip(fallbacks) {
            match joined {
                Ok(WorkerReport {
                    label,
                    obligations: reports,
                    attempts: sent,
                    cancelled: worker_cancelled,
                }) => {
                    debug!(%label, sent, worker_cancelled, "RunCoordinator::run: worker joined");
                    attempts += sent;
                    cancelled |= worker_cancelled;
                    obligations.extend(reports);
                }
                Err(e) => {
                    error!(error = %e, "Worker task failed, its unfinished obligations stay pending");
                    let (initial, settled) = fallback;
                    obligations.extend(recover_reports(initial, settled));
                }
            }
        }

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            cancelled,
            attempts,
            skipped,
            obligations,
        };
        info!(
            total = summary.total(),
            succeeded = summary.succeeded(),
            fatal = summary.fatal(),
            pending = summary.pending(),
            "Run finished"
        );
        Ok(summary)
    }
}

/// Reports settled before a worker died, then its other obligations as pending
///
/// Attempt counts of the unsettled obligations are lost with the worker.
fn recover_reports(
    initial: Vec<ObligationReport>,
    mut settled: mpsc::UnboundedReceiver<ObligationReport>,
) -> Vec<ObligationReport> {
    let mut reports = Vec::new();
    while let Ok(report) = settled.try_recv() {
        reports.push(report);
    }
    let unsettled: Vec<ObligationReport> = initial
        .into_iter()
        .filter(|p| {
            !reports
                .iter()
                .any(|r| r.routing_key == p.routing_key && r.course == p.course)
        })
        .collect();
    reports.extend(unsettled);
    reports
}

fn pending_reports(worker: &UserWorker) -> Vec<ObligationReport> {
    worker
        .queue()
        .pending_keys()
        .into_iter()
        .map(|key| ObligationReport {
            identity: worker.label().to_string(),
            routing_key: key.routing_key,
            course: key.course,
            attempts: 0,
            disposition: Disposition::Pending,
        })
        .collect()
}
