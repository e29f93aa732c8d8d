//! Identity domain type
//!
//! An authenticated actor: a cookie set plus one or more routing tables.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use super::Obligation;
use crate::config::IdentityConfig;

/// Opaque session credentials sent as request cookies
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialBundle {
    cookies: BTreeMap<String, String>,
}

impl CredentialBundle {
    pub fn new(cookies: BTreeMap<String, String>) -> Self {
        Self { cookies }
    }

    /// True when no usable cookie is present
    pub fn is_empty(&self) -> bool {
        self.cookies.values().all(|v| v.trim().is_empty())
    }

    /// Render as a `Cookie` header value
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// Cookie values are secrets; only names are printed
impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Courses reachable through one routing key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    pub routing_key: String,
    pub courses: Vec<String>,
}

/// Why an identity will not get a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InertReason {
    MissingCredentials,
    NoObligations,
}

impl std::fmt::Display for InertReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredentials => write!(f, "missing cookies"),
            Self::NoObligations => write!(f, "no routing key with courses"),
        }
    }
}

/// One authenticated actor, immutable for the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub label: String,
    pub credentials: CredentialBundle,
    pub tables: Vec<RoutingTable>,
}

impl Identity {
    pub fn new(label: impl Into<String>, credentials: CredentialBundle, tables: Vec<RoutingTable>) -> Self {
        Self {
            label: label.into(),
            credentials,
            tables,
        }
    }

    /// Build from configuration; incomplete tables are dropped with a warning
    pub fn from_config(config: &IdentityConfig) -> Self {
        debug!(label = %config.label, "Identity::from_config: called");
        let tables = config
            .all_tables()
            .into_iter()
            .filter_map(|table| {
                let routing_key = table.profile_id.trim().to_string();
                if routing_key.is_empty() || table.courses.is_empty() {
                    warn!(
                        label = %config.label,
                        profile_id = %table.profile_id,
                        courses = table.courses.len(),
                        "Missing parameter in routing table, skipping it"
                    );
                    return None;
                }
                Some(RoutingTable {
                    routing_key,
                    courses: table.courses,
                })
            })
            .collect();

        Self::new(
            config.label.clone(),
            CredentialBundle::new(config.cookies.clone()),
            tables,
        )
    }

    /// `Some` when this identity cannot do any work
    pub fn inert_reason(&self) -> Option<InertReason> {
        if self.credentials.is_empty() {
            Some(InertReason::MissingCredentials)
        } else if self.tables.iter().all(|t| t.courses.is_empty()) {
            Some(InertReason::NoObligations)
        } else {
            None
        }
    }

    /// Obligations in round-robin order across tables
    ///
    /// Position i of every table comes before position i+1 of any table.
    /// Repeated (routing key, course) pairs keep their first position only.
    pub fn obligations(&self) -> Vec<Obligation> {
        debug!(label = %self.label, tables = self.tables.len(), "Identity::obligations: called");
        let depth = self.tables.iter().map(|t| t.courses.len()).max().unwrap_or(0);
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for i in 0..depth {
            for table in &self.tables {
                let Some(course) = table.courses.get(i) else {
                    continue;
                };
                let course = course.trim();
                if course.is_empty() {
                    continue;
                }
                if !seen.insert((table.routing_key.as_str(), course)) {
                    warn!(label = %self.label, routing_key = %table.routing_key, %course, "Duplicate course target, ignoring");
                    continue;
                }
                out.push(Obligation::new(table.routing_key.as_str(), course));
            }
        }
        out
    }
}
