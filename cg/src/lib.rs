//! coursegrab - concurrent, rate-polite course selection retry engine
//!
//! Each identity (a cookie set plus routing tables) gets one sequential worker
//! that keeps retrying its course obligations until each one succeeds, fails
//! for good, or the run is cancelled. Workers for different identities run
//! concurrently and share nothing but the cancellation signal.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod executor;
pub mod report;
pub mod store;
pub mod transport;
pub mod verify;

pub use classifier::Classifier;
pub use config::{AmbiguousPolicy, Config};
pub use domain::{Disposition, Identity, Obligation, ObligationReport, Outcome};
pub use engine::{EngineError, RunCoordinator, cancel_channel};
pub use executor::AttemptExecutor;
pub use report::RunSummary;
pub use store::{ConfigFileStore, ObligationStore};
pub use transport::{Connector, HttpConnector, PortalRequest, ProxySettings, RawResponse, Transport, TransportError};
pub use verify::{SessionVerifier, VerifyReport};
