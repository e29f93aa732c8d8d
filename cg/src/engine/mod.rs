//! Retry engine
//!
//! Turns a static list of identities into one sequential worker per identity,
//! all running concurrently until every obligation reaches a terminal state
//! or the run is cancelled.

mod coordinator;
mod queue;
mod worker;

pub use coordinator::{EngineError, RunCoordinator, cancel_channel};
pub use queue::{ObligationQueue, Transition};
pub use worker::{UserWorker, WorkerReport};
