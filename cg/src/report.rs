//! Run summary
//!
//! Every obligation's final disposition, so nothing fails silently.

use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};

use crate::domain::{Disposition, InertReason, ObligationReport};

/// An identity that got no worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedIdentity {
    pub label: String,
    pub reason: String,
}

impl SkippedIdentity {
    pub fn new(label: impl Into<String>, reason: InertReason) -> Self {
        Self {
            label: label.into(),
            reason: reason.to_string(),
        }
    }
}

/// Aggregate result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    /// Requests sent across all identities
    pub attempts: u64,
    pub skipped: Vec<SkippedIdentity>,
    pub obligations: Vec<ObligationReport>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.obligations.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Succeeded))
    }

    pub fn fatal(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Fatal { .. }))
    }

    pub fn pending(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Pending))
    }

    /// True when every obligation reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.obligations.iter().all(|o| o.disposition.is_terminal())
    }

    fn count(&self, pred: impl Fn(&Disposition) -> bool) -> usize {
        self.obligations.iter().filter(|o| pred(&o.disposition)).count()
    }

    /// Human-readable summary
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("\n--- Course Selection Summary ---\n");
        out.push_str(&format!("Total obligations: {}\n", self.total()));
        out.push_str(&format!("Succeeded: {}\n", self.succeeded().to_string().green()));
        out.push_str(&format!("Fatally failed: {}\n", self.fatal().to_string().red()));
        out.push_str(&format!("Still pending: {}\n", self.pending().to_string().yellow()));
        out.push_str(&format!("Requests sent: {}\n", self.attempts));
        let elapsed = self.finished_at - self.started_at;
        out.push_str(&format!("Elapsed: {:.1}s\n", elapsed.num_milliseconds() as f64 / 1000.0));
        if self.cancelled {
            out.push_str(&format!("{}\n", "Run was interrupted".yellow()));
        }

        if !self.skipped.is_empty() {
            out.push_str("\n--- Skipped Identities ---\n");
            for skipped in &self.skipped {
                out.push_str(&format!("[SKIPPED] User: {} ({})\n", skipped.label, skipped.reason));
            }
        }

        if !self.obligations.is_empty() {
            out.push_str("\n--- Details ---\n");
            for o in &self.obligations {
                let tag = match o.disposition {
                    Disposition::Succeeded => "[OK]".green(),
                    Disposition::Fatal { .. } => "[FATAL]".red(),
                    Disposition::Pending => "[PENDING]".yellow(),
                };
                out.push_str(&format!(
                    "{} User: {} Profile: {} Course: {} Attempts: {} ({})\n",
                    tag, o.identity, o.routing_key, o.course, o.attempts, o.disposition
                ));
            }
        }
        out
    }
}
