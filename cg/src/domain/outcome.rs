//! Outcome of a single selection attempt

use serde::{Deserialize, Serialize};

/// Why a failed attempt is worth repeating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryReason {
    /// Course is full or the request conflicts right now
    Full,
    /// Portal asked us to slow down
    RateLimited,
    /// Selection window is not open (yet)
    WindowClosed,
    /// Some other recognised error text
    Rejected,
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::RateLimited => write!(f, "rate-limited"),
            Self::WindowClosed => write!(f, "window-closed"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Why an attempt can never succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum FatalReason {
    /// Portal redirected to login: the identity's cookies are stale
    SessionInvalid { status: u16 },
    /// Portal refused the request for a reason that will not change
    PolicyRejected,
}

impl std::fmt::Display for FatalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionInvalid { status } => write!(f, "auth/session invalid (HTTP {status})"),
            Self::PolicyRejected => write!(f, "policy rejected"),
        }
    }
}

/// Classification of one attempt
///
/// Every attempt yields exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Portal confirmed the selection
    Success,
    /// Portal says the course was already selected
    AlreadyDone,
    /// Try again later
    RetryableFailure(RetryReason),
    /// Stop trying this obligation
    FatalFailure(FatalReason),
    /// 200 with a body matching no known marker
    Ambiguous,
    /// Timeout, connection failure or unexpected status
    NetworkError(String),
}

impl Outcome {
    /// Success or AlreadyDone
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::AlreadyDone)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalFailure(_))
    }

    /// Short tag for log lines
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::AlreadyDone => "already-done",
            Self::RetryableFailure(_) => "retryable",
            Self::FatalFailure(_) => "fatal",
            Self::Ambiguous => "ambiguous",
            Self::NetworkError(_) => "network-error",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "selection succeeded"),
            Self::AlreadyDone => write!(f, "already selected"),
            Self::RetryableFailure(reason) => write!(f, "failed ({reason})"),
            Self::FatalFailure(reason) => write!(f, "fatal ({reason})"),
            Self::Ambiguous => write!(f, "200 OK, outcome unclear"),
            Self::NetworkError(detail) => write!(f, "network error: {detail}"),
        }
    }
}
