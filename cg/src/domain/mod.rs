//! Domain types for coursegrab
//!
//! Core domain types: Identity, Obligation, Outcome.
//! Identities are immutable for a run; obligations only ever change by
//! counting attempts; outcomes are the closed set of attempt results.

mod identity;
mod obligation;
mod outcome;

pub use identity::{CredentialBundle, Identity, InertReason, RoutingTable};
pub use obligation::{Disposition, Obligation, ObligationKey, ObligationReport};
pub use outcome::{FatalReason, Outcome, RetryReason};
