//! Response classifier
//!
//! Maps a raw portal response (status, body) to an [`Outcome`]. Body handling
//! is a marker table walked in order; the first marker found in the body
//! decides. New portal strings are added to the table, not to the control flow.

use tracing::debug;

use crate::config::MarkerConfig;
use crate::domain::{FatalReason, Outcome, RetryReason};

/// What a matched marker means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    AlreadyDone,
    Fatal,
    Full,
    RateLimited,
    WindowClosed,
    Rejected,
    Success,
}

impl Verdict {
    pub fn outcome(self) -> Outcome {
        match self {
            Self::AlreadyDone => Outcome::AlreadyDone,
            Self::Fatal => Outcome::FatalFailure(FatalReason::PolicyRejected),
            Self::Full => Outcome::RetryableFailure(RetryReason::Full),
            Self::RateLimited => Outcome::RetryableFailure(RetryReason::RateLimited),
            Self::WindowClosed => Outcome::RetryableFailure(RetryReason::WindowClosed),
            Self::Rejected => Outcome::RetryableFailure(RetryReason::Rejected),
            Self::Success => Outcome::Success,
        }
    }
}

/// One row of the marker table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerRule {
    pub marker: String,
    pub verdict: Verdict,
}

impl MarkerRule {
    pub fn new(marker: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            marker: marker.into(),
            verdict,
        }
    }
}

/// Redirects mean the portal bounced us to its login page
pub fn is_redirect(status: u16) -> bool {
    (300..400).contains(&status)
}

/// Pure, total classifier over (status, body)
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<MarkerRule>,
}

impl Classifier {
    /// Build from an ordered rule list; empty markers are discarded
    pub fn new(rules: Vec<MarkerRule>) -> Self {
        let rules = rules.into_iter().filter(|r| !r.marker.is_empty()).collect();
        Self { rules }
    }

    /// Build the table in precedence order: already-selected, fatal, full,
    /// rate-limited, window-closed, error, success
    pub fn from_config(markers: &MarkerConfig) -> Self {
        debug!("Classifier::from_config: called");
        let groups: [(&[String], Verdict); 7] = [
            (markers.already_selected.as_slice(), Verdict::AlreadyDone),
            (markers.fatal.as_slice(), Verdict::Fatal),
            (markers.full.as_slice(), Verdict::Full),
            (markers.rate_limited.as_slice(), Verdict::RateLimited),
            (markers.window_closed.as_slice(), Verdict::WindowClosed),
            (markers.error.as_slice(), Verdict::Rejected),
            (markers.success.as_slice(), Verdict::Success),
        ];

        let rules = groups
            .iter()
            .flat_map(|(list, verdict)| list.iter().map(|m| MarkerRule::new(m.clone(), *verdict)))
            .collect();
        Self::new(rules)
    }

    pub fn rules(&self) -> &[MarkerRule] {
        &self.rules
    }

    /// First rule whose marker occurs in `body`
    pub fn matched_rule(&self, body: &str) -> Option<&MarkerRule> {
        self.rules.iter().find(|rule| body.contains(rule.marker.as_str()))
    }

    /// Classify one response. Never fails.
    pub fn classify(&self, status: u16, body: &str) -> Outcome {
        if status != 200 {
            if is_redirect(status) {
                debug!(status, "Classifier::classify: redirect, session invalid");
                return Outcome::FatalFailure(FatalReason::SessionInvalid { status });
            }
            debug!(status, "Classifier::classify: unexpected status");
            return Outcome::NetworkError(format!("unexpected HTTP status {status}"));
        }

        match self.matched_rule(body) {
            Some(rule) => {
                debug!(marker = %rule.marker, verdict = ?rule.verdict, "Classifier::classify: marker matched");
                rule.verdict.outcome()
            }
            None => {
                debug!("Classifier::classify: no marker matched");
                Outcome::Ambiguous
            }
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_config(&MarkerConfig::default())
    }
}
