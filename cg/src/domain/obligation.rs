//! Obligation domain type
//!
//! One (routing key, course) pairing that needs a confirmed selection.

use serde::{Deserialize, Serialize};

use super::FatalReason;

/// Identity of an obligation within one identity's queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObligationKey {
    pub routing_key: String,
    pub course: String,
}

impl ObligationKey {
    pub fn new(routing_key: impl Into<String>, course: impl Into<String>) -> Self {
        Self {
            routing_key: routing_key.into(),
            course: course.into(),
        }
    }
}

impl std::fmt::Display for ObligationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.routing_key, self.course)
    }
}

/// A pending unit of work
///
/// The only mutation over its lifetime is the attempt counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obligation {
    key: ObligationKey,
    attempts: u32,
}

impl Obligation {
    pub fn new(routing_key: impl Into<String>, course: impl Into<String>) -> Self {
        Self {
            key: ObligationKey::new(routing_key, course),
            attempts: 0,
        }
    }

    pub fn key(&self) -> &ObligationKey {
        &self.key
    }

    pub fn course(&self) -> &str {
        &self.key.course
    }

    pub fn routing_key(&self) -> &str {
        &self.key.routing_key
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Count a new attempt and return its 1-based number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }
}

/// Final disposition of an obligation at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Disposition {
    /// Selected (or found already selected)
    Succeeded,
    /// Dropped after a fatal outcome
    Fatal { reason: FatalReason },
    /// Still waiting when the run ended (cancellation)
    Pending,
}

impl Disposition {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Fatal { reason } => write!(f, "fatal: {reason}"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

/// What happened to one obligation, for the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationReport {
    pub identity: String,
    pub routing_key: String,
    pub course: String,
    pub attempts: u32,
    pub disposition: Disposition,
}

impl ObligationReport {
    pub fn new(identity: &str, obligation: &Obligation, disposition: Disposition) -> Self {
        Self {
            identity: identity.to_string(),
            routing_key: obligation.routing_key().to_string(),
            course: obligation.course().to_string(),
            attempts: obligation.attempts(),
            disposition,
        }
    }
}
