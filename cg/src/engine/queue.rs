//! Obligation queue and retry policy
//!
//! Per-obligation state machine:
//!
//! ```text
//! Pending --pop_front--> Attempting --settle--> Pending (requeued)
//!                                           \-> Removed (succeeded | fatal)
//! ```
//!
//! Failed obligations go back through the fairness swap: the next pending
//! obligation stays ahead of the failed one, so two obligations alternate
//! instead of one hot-looping.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::config::AmbiguousPolicy;
use crate::domain::{Disposition, Obligation, ObligationKey, ObligationReport, Outcome};

/// What `settle` did with an obligation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Back in the queue for another attempt
    Requeued,
    /// Removed for good
    Removed(Disposition),
}

/// Reorderable queue of one identity's pending obligations
#[derive(Debug)]
pub struct ObligationQueue {
    label: String,
    pending: VecDeque<Obligation>,
    settled: Vec<ObligationReport>,
    ambiguous_policy: AmbiguousPolicy,
}

impl ObligationQueue {
    /// Build in the given order; repeated keys keep their first position
    pub fn new(label: impl Into<String>, obligations: Vec<Obligation>, ambiguous_policy: AmbiguousPolicy) -> Self {
        let label = label.into();
        debug!(%label, count = obligations.len(), ?ambiguous_policy, "ObligationQueue::new: called");
        let mut queue = Self {
            label,
            pending: VecDeque::with_capacity(obligations.len()),
            settled: Vec::new(),
            ambiguous_policy,
        };
        for obligation in obligations {
            if queue.contains(obligation.key()) {
                warn!(label = %queue.label, key = %obligation.key(), "Duplicate obligation, ignoring");
                continue;
            }
            queue.pending.push_back(obligation);
        }
        queue
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, key: &ObligationKey) -> bool {
        self.pending.iter().any(|o| o.key() == key)
    }

    /// Pending keys, front first
    pub fn pending_keys(&self) -> Vec<ObligationKey> {
        self.pending.iter().map(|o| o.key().clone()).collect()
    }

    /// Obligations that reached a terminal state so far
    pub fn settled(&self) -> &[ObligationReport] {
        &self.settled
    }

    /// Take the front obligation and count the attempt about to be made
    pub fn pop_front(&mut self) -> Option<Obligation> {
        let mut obligation = self.pending.pop_front()?;
        let attempt = obligation.begin_attempt();
        debug!(label = %self.label, key = %obligation.key(), attempt, "ObligationQueue::pop_front: attempting");
        Some(obligation)
    }

    /// Apply the retry policy to an attempted obligation
    pub fn settle(&mut self, obligation: Obligation, outcome: &Outcome) -> Transition {
        debug!(label = %self.label, key = %obligation.key(), outcome = outcome.tag(), "ObligationQueue::settle: called");
        let disposition = match outcome {
            Outcome::Success | Outcome::AlreadyDone => Some(Disposition::Succeeded),
            Outcome::FatalFailure(reason) => Some(Disposition::Fatal { reason: *reason }),
            Outcome::Ambiguous => match self.ambiguous_policy {
                AmbiguousPolicy::Accept => Some(Disposition::Succeeded),
                AmbiguousPolicy::Retry => None,
            },
            Outcome::RetryableFailure(_) | Outcome::NetworkError(_) => None,
        };

        match disposition {
            Some(disposition) => {
                debug!(key = %obligation.key(), %disposition, "ObligationQueue::settle: removing");
                self.settled
                    .push(ObligationReport::new(&self.label, &obligation, disposition));
                Transition::Removed(disposition)
            }
            None => {
                self.requeue(obligation);
                Transition::Requeued
            }
        }
    }

    /// Fairness swap: defer the failed obligation by exactly one position
    fn requeue(&mut self, obligation: Obligation) {
        if self.contains(obligation.key()) {
            warn!(label = %self.label, key = %obligation.key(), "Obligation already queued, dropping duplicate");
            return;
        }
        match self.pending.pop_front() {
            Some(next) => {
                debug!(failed = %obligation.key(), next = %next.key(), "ObligationQueue::requeue: swapping");
                self.pending.push_front(obligation);
                self.pending.push_front(next);
            }
            None => {
                debug!(key = %obligation.key(), "ObligationQueue::requeue: queue empty, appending");
                self.pending.push_back(obligation);
            }
        }
    }

    /// Put back an obligation whose attempt was abandoned (cancellation)
    pub fn abandon(&mut self, obligation: Obligation) {
        debug!(key = %obligation.key(), "ObligationQueue::abandon: called");
        if !self.contains(obligation.key()) {
            self.pending.push_front(obligation);
        }
    }

    /// Final reports: settled obligations first, then anything still pending
    pub fn into_reports(self) -> Vec<ObligationReport> {
        let label = self.label;
        let mut reports = self.settled;
        reports.extend(
            self.pending
                .iter()
                .map(|o| ObligationReport::new(&label, o, Disposition::Pending)),
        );
        reports
    }
}
