//! Session check for every configured identity
//!
//! One GET per identity against the verify endpoint with redirects disabled.
//! Only a 200 means the cookies are still logged in; an expired session is
//! answered with a redirect to the login page.

use std::sync::Arc;
use std::time::Duration;

use colored::*;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::Identity;
use crate::transport::{Connector, PortalRequest, ProxySettings};

/// Session check result for one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyResult {
    pub label: String,
    pub valid: bool,
    pub status: Option<u16>,
    /// Transport failure, when there was no response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub results: Vec<VerifyResult>,
}

impl VerifyReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn valid(&self) -> usize {
        self.results.iter().filter(|r| r.valid).count()
    }

    pub fn invalid(&self) -> impl Iterator<Item = &VerifyResult> {
        self.results.iter().filter(|r| !r.valid)
    }

    pub fn all_valid(&self) -> bool {
        self.results.iter().all(|r| r.valid)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("\n--- Cookie Verification Summary ---\n");
        out.push_str(&format!("Total verified: {}\n", self.total()));
        out.push_str(&format!("Valid cookies: {}\n", self.valid().to_string().green()));
        out.push_str(&format!(
            "Invalid cookies: {}\n",
            (self.total() - self.valid()).to_string().red()
        ));

        if !self.all_valid() {
            out.push_str("\n--- Invalid Cookies Details ---\n");
            for result in self.invalid() {
                let why = match (&result.error, result.status) {
                    (Some(error), _) => error.clone(),
                    (None, Some(status)) => format!("status {status}"),
                    (None, None) => "no response".to_string(),
                };
                out.push_str(&format!("{} User: {} ({})\n", "[INVALID]".red(), result.label, why));
            }
        }
        out
    }
}

pub struct SessionVerifier {
    url: String,
    connector: Arc<dyn Connector>,
    proxy: ProxySettings,
    timeout: Duration,
}

impl SessionVerifier {
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>, proxy: ProxySettings, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connector,
            proxy,
            timeout,
        }
    }

    pub fn from_config(config: &Config, connector: Arc<dyn Connector>) -> Self {
        Self::new(
            config.portal.verify_url(),
            connector,
            ProxySettings::from_config(&config.proxy),
            config.engine.verify_timeout(),
        )
    }

    /// Check every identity concurrently
    pub async fn verify_all(&self, identities: &[Identity]) -> VerifyReport {
        info!(count = identities.len(), "Starting verification of all cookies");
        let results = join_all(identities.iter().map(|identity| self.verify(identity))).await;
        VerifyReport { results }
    }

    pub async fn verify(&self, identity: &Identity) -> VerifyResult {
        debug!(label = %identity.label, "SessionVerifier::verify: called");
        let invalid = |status: Option<u16>, error: Option<String>| VerifyResult {
            label: identity.label.clone(),
            valid: false,
            status,
            error,
        };

        let transport = match self.connector.connect(&self.proxy) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(label = %identity.label, error = %e, "Failed to build transport");
                return invalid(None, Some(e.to_string()));
            }
        };

        let request = PortalRequest {
            url: self.url.clone(),
            query: Vec::new(),
            cookie: identity.credentials.cookie_header(),
            form: Vec::new(),
            timeout: self.timeout,
        };

        match tokio::time::timeout(self.timeout, transport.get(&request)).await {
            Ok(Ok(response)) if response.status == 200 => {
                info!(label = %identity.label, "Cookies valid");
                VerifyResult {
                    label: identity.label.clone(),
                    valid: true,
                    status: Some(200),
                    error: None,
                }
            }
            Ok(Ok(response)) => {
                warn!(label = %identity.label, status = response.status, "Cookies invalid");
                invalid(Some(response.status), None)
            }
            Ok(Err(e)) => {
                warn!(label = %identity.label, error = %e, "Cookie check failed");
                invalid(None, Some(e.to_string()))
            }
            Err(_) => {
                warn!(label = %identity.label, timeout = ?self.timeout, "Cookie check timed out");
                invalid(None, Some(format!("timed out after {:?}", self.timeout)))
            }
        }
    }
}
