//! Obligation store
//!
//! Adds (identity, routing key, course) targets to persistent configuration.
//! The retry engine never writes here; the store only feeds future runs.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Config, IdentityConfig, TableConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("Obligation store at {path}: {message}")]
    Backend { path: PathBuf, message: String },
}

/// Anything that can record a new obligation
pub trait ObligationStore {
    /// Returns `false` when the target is already present
    fn add(&mut self, label: &str, routing_key: &str, course: &str) -> Result<bool, StoreError>;
}

fn require(field: &'static str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::EmptyField { field });
    }
    Ok(())
}

/// In-memory store over a loaded configuration
impl ObligationStore for Config {
    fn add(&mut self, label: &str, routing_key: &str, course: &str) -> Result<bool, StoreError> {
        debug!(%label, %routing_key, %course, "Config::add: called");
        require("label", label)?;
        require("profile id", routing_key)?;
        require("course", course)?;
        let (label, routing_key, course) = (label.trim(), routing_key.trim(), course.trim());

        let Some(identity) = self.identities.iter_mut().find(|i| i.label == label) else {
            debug!(%label, "Config::add: new identity");
            self.identities.push(IdentityConfig {
                label: label.to_string(),
                tables: vec![TableConfig {
                    profile_id: routing_key.to_string(),
                    courses: vec![course.to_string()],
                }],
                ..Default::default()
            });
            return Ok(true);
        };

        if identity.profile_id.as_deref().map(str::trim) == Some(routing_key) {
            if identity.courses.iter().any(|c| c.trim() == course) {
                return Ok(false);
            }
            identity.courses.push(course.to_string());
            return Ok(true);
        }

        match identity.tables.iter_mut().find(|t| t.profile_id.trim() == routing_key) {
            Some(table) if table.courses.iter().any(|c| c.trim() == course) => Ok(false),
            Some(table) => {
                table.courses.push(course.to_string());
                Ok(true)
            }
            None => {
                identity.tables.push(TableConfig {
                    profile_id: routing_key.to_string(),
                    courses: vec![course.to_string()],
                });
                Ok(true)
            }
        }
    }
}

/// Store backed by the YAML configuration file
///
/// Each add rewrites the whole file. Comments do not survive and sections
/// left at their defaults are not written out.
pub struct ConfigFileStore {
    path: PathBuf,
}

impl ConfigFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backend_error(&self, err: eyre::Report) -> StoreError {
        StoreError::Backend {
            path: self.path.clone(),
            message: format!("{err:#}"),
        }
    }
}

impl ObligationStore for ConfigFileStore {
    fn add(&mut self, label: &str, routing_key: &str, course: &str) -> Result<bool, StoreError> {
        debug!(path = %self.path.display(), "ConfigFileStore::add: called");
        let mut config = if self.path.exists() {
            Config::load_from_file(&self.path).map_err(|e| self.backend_error(e))?
        } else {
            Config::default()
        };

        if !config.add(label, routing_key, course)? {
            info!(%label, %routing_key, %course, "Course already present");
            return Ok(false);
        }

        config.save(&self.path).map_err(|e| self.backend_error(e))?;
        info!(%label, %routing_key, %course, path = %self.path.display(), "Added course");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_creates_identity() {
        let mut config = Config::default();
        assert!(config.add("alice", "1234", "1001").unwrap());

        let alice = &config.identities[0];
        assert_eq!(alice.label, "alice");
        assert!(alice.cookies.is_empty());
        assert_eq!(alice.all_tables()[0].profile_id, "1234");
        assert_eq!(alice.all_tables()[0].courses, vec!["1001".to_string()]);
    }

    #[test]
    fn test_add_appends_once() {
        let mut config = Config::default();
        config.identities.push(IdentityConfig {
            label: "alice".to_string(),
            profile_id: Some("1234".to_string()),
            courses: vec!["1001".to_string()],
            ..Default::default()
        });

        assert!(!config.add("alice", "1234", "1001").unwrap());
        assert!(config.add("alice", "1234", "1002").unwrap());
        assert!(config.add("alice", "5678", "2001").unwrap());
        assert!(!config.add("alice", "5678", "2001").unwrap());

        let tables = config.identities[0].all_tables();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].courses, vec!["1001".to_string(), "1002".to_string()]);
        assert_eq!(tables[1].profile_id, "5678");
    }

    #[test]
    fn test_add_rejects_empty_fields() {
        let mut config = Config::default();
        assert!(matches!(
            config.add("alice", " ", "1001"),
            Err(StoreError::EmptyField { field: "profile id" })
        ));
        assert!(config.identities.is_empty());
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("coursegrab.yml");
        let mut store = ConfigFileStore::new(&path);

        assert!(store.add("alice", "1234", "1001").unwrap());
        assert!(!store.add("alice", "1234", "1001").unwrap());
        assert!(store.add("bob", "1234", "2001").unwrap());

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.identities.len(), 2);
        assert_eq!(config.identities[1].label, "bob");
    }

    #[test]
    fn test_file_store_keeps_user_sections_compact() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("coursegrab.yml");
        std::fs::write(&path, "engine:\n  inter-attempt-delay-ms: 500\nidentities: []\n").unwrap();

        let mut store = ConfigFileStore::new(&path);
        assert!(store.add("alice", "1234", "1001").unwrap());

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("alice"));
        assert!(saved.contains("inter-attempt-delay-ms: 500"));
        assert!(!saved.contains("portal:"));
        assert!(!saved.contains("markers:"));

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.engine.inter_attempt_delay_ms, 500);
        assert_eq!(config.portal, crate::config::PortalConfig::default());
    }

    #[test]
    fn test_file_store_reports_parse_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("coursegrab.yml");
        std::fs::write(&path, "identities: [[[").unwrap();

        let mut store = ConfigFileStore::new(&path);
        assert!(matches!(
            store.add("alice", "1234", "1001"),
            Err(StoreError::Backend { .. })
        ));
    }
}
