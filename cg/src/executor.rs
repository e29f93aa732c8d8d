//! Attempt executor
//!
//! Issues exactly one selection request for one obligation and classifies
//! the answer. Every transport failure becomes `Outcome::NetworkError`; the
//! caller never sees an error.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::classifier::Classifier;
use crate::config::{Config, PortalConfig};
use crate::domain::{Identity, Obligation, Outcome};
use crate::transport::{PortalRequest, Transport};

/// Longest body excerpt written to the log
const BODY_EXCERPT_CHARS: usize = 120;

pub struct AttemptExecutor {
    portal: PortalConfig,
    classifier: Classifier,
    timeout: Duration,
}

impl AttemptExecutor {
    pub fn new(portal: PortalConfig, classifier: Classifier, timeout: Duration) -> Self {
        Self {
            portal,
            classifier,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.portal.clone(),
            Classifier::from_config(&config.markers),
            config.engine.attempt_timeout(),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Render the selection request for one obligation
    pub fn build_request(&self, obligation: &Obligation, identity: &Identity) -> PortalRequest {
        let mut form: Vec<(String, String)> = self
            .portal
            .form
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        form.push((
            self.portal.course_param.clone(),
            self.portal.course_value(obligation.course()),
        ));

        PortalRequest {
            url: self.portal.select_url(),
            query: vec![(self.portal.routing_param.clone(), obligation.routing_key().to_string())],
            cookie: identity.credentials.cookie_header(),
            form,
            timeout: self.timeout,
        }
    }

    /// One round trip, one outcome
    pub async fn execute(&self, obligation: &Obligation, identity: &Identity, transport: &dyn Transport) -> Outcome {
        debug!(label = %identity.label, key = %obligation.key(), "AttemptExecutor::execute: called");
        let request = self.build_request(obligation, identity);

        let (status, body, outcome) = match tokio::time::timeout(self.timeout, transport.post_form(&request)).await {
            Ok(Ok(response)) => {
                let outcome = self.classifier.classify(response.status, &response.body);
                (Some(response.status), response.body, outcome)
            }
            Ok(Err(e)) => {
                debug!(error = %e, "AttemptExecutor::execute: transport error");
                (None, String::new(), Outcome::NetworkError(e.to_string()))
            }
            Err(_) => {
                debug!("AttemptExecutor::execute: timed out");
                (
                    None,
                    String::new(),
                    Outcome::NetworkError(format!("request timed out after {:?}", self.timeout)),
                )
            }
        };

        log_attempt(identity, obligation, status, &body, &outcome);
        outcome
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
        format!("{head}...")
    }
}

/// The per-attempt status line
fn log_attempt(identity: &Identity, obligation: &Obligation, status: Option<u16>, body: &str, outcome: &Outcome) {
    let status = status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
    let label = identity.label.as_str();
    let routing_key = obligation.routing_key();
    let course = obligation.course();
    let attempt = obligation.attempts();

    match outcome {
        Outcome::Success | Outcome::AlreadyDone => {
            info!(%label, %routing_key, %course, attempt, %status, outcome = outcome.tag(), "{outcome}");
        }
        Outcome::FatalFailure(_) => {
            error!(
                %label, %routing_key, %course, attempt, %status, outcome = outcome.tag(),
                body = %excerpt(body), "{outcome}, check this identity's cookies"
            );
        }
        Outcome::Ambiguous => {
            warn!(
                %label, %routing_key, %course, attempt, %status, outcome = outcome.tag(),
                body = %excerpt(body), "{outcome}, needs manual review"
            );
        }
        Outcome::RetryableFailure(_) => {
            info!(
                %label, %routing_key, %course, attempt, %status, outcome = outcome.tag(),
                body = %excerpt(body), "{outcome}"
            );
        }
        Outcome::NetworkError(_) => {
            info!(%label, %routing_key, %course, attempt, %status, outcome = outcome.tag(), "{outcome}");
        }
    }
}
