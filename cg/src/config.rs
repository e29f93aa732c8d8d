//! coursegrab configuration types and loading

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder substituted with the course identifier in the course form value
pub const COURSE_PLACEHOLDER: &str = "{course}";

/// Errors found while validating a loaded configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid portal base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Course value template '{0}' does not contain {{course}}")]
    MissingCoursePlaceholder(String),

    #[error("Attempt timeout must be greater than zero")]
    ZeroTimeout,

    #[error("Identity #{index} has an empty label")]
    EmptyLabel { index: usize },

    #[error("Duplicate identity label '{0}'")]
    DuplicateLabel(String),

    #[error("Identity '{label}' has an unusable cookie '{name}': {reason}")]
    InvalidCookie { label: String, name: String, reason: String },
}

/// Main coursegrab configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Portal endpoints and wire format
    #[serde(skip_serializing_if = "is_default")]
    pub portal: PortalConfig,

    /// Retry engine tuning
    #[serde(skip_serializing_if = "is_default")]
    pub engine: EngineConfig,

    /// Outbound proxy
    #[serde(skip_serializing_if = "is_default")]
    pub proxy: ProxyConfig,

    /// Response body markers used by the classifier
    #[serde(skip_serializing_if = "is_default")]
    pub markers: MarkerConfig,

    /// Logging configuration
    #[serde(skip_serializing_if = "is_default")]
    pub logging: LoggingConfig,

    /// Identities and their course targets
    pub identities: Vec<IdentityConfig>,
}

/// Sections left at their defaults are not written back by `save`
fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.portal.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.portal.base_url.clone(),
            reason: e.to_string(),
        })?;

        if !self.portal.course_value_template.contains(COURSE_PLACEHOLDER) {
            return Err(ConfigError::MissingCoursePlaceholder(
                self.portal.course_value_template.clone(),
            ));
        }

        if self.engine.attempt_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let mut seen = std::collections::HashSet::new();
        for (index, identity) in self.identities.iter().enumerate() {
            if identity.label.trim().is_empty() {
                return Err(ConfigError::EmptyLabel { index });
            }
            if !seen.insert(identity.label.as_str()) {
                return Err(ConfigError::DuplicateLabel(identity.label.clone()));
            }
            identity.validate_cookies()?;
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: ./coursegrab.yml
        let local_config = PathBuf::from("coursegrab.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/coursegrab/coursegrab.yml
        if let Some(user_config) = Self::user_config_path().filter(|p| p.exists()) {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Resolve which file `load` would read, without reading it
    pub fn resolve_path(config_path: Option<&PathBuf>) -> Option<PathBuf> {
        if let Some(path) = config_path {
            return Some(path.clone());
        }
        let local_config = PathBuf::from("coursegrab.yml");
        if local_config.exists() {
            return Some(local_config);
        }
        Self::user_config_path().filter(|p| p.exists())
    }

    /// Read only the logging section, so logging can be set up before the full load
    pub fn load_logging(config_path: Option<&PathBuf>) -> LoggingConfig {
        Self::resolve_path(config_path)
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .map(|config| config.logging)
            .unwrap_or_default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Save config to file
    ///
    /// The file is rewritten from the parsed config: comments are lost and
    /// sections equal to their defaults are omitted.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(path, content).context(format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("coursegrab").join("coursegrab.yml"))
    }
}

/// Portal endpoints and the fixed parts of every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Base URL of the registration portal
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the selection (commit) endpoint
    #[serde(rename = "select-path")]
    pub select_path: String,

    /// Path used to check whether a cookie set is still logged in
    #[serde(rename = "verify-path")]
    pub verify_path: String,

    /// Query parameter carrying the routing key
    #[serde(rename = "routing-param")]
    pub routing_param: String,

    /// Form field carrying the course
    #[serde(rename = "course-param")]
    pub course_param: String,

    /// Value of the course field; `{course}` is replaced by the course id
    #[serde(rename = "course-value-template")]
    pub course_value_template: String,

    /// Extra fixed form fields
    pub form: BTreeMap<String, String>,

    /// Fixed request headers
    pub headers: BTreeMap<String, String>,

    /// Skip TLS certificate verification (the portal uses a self-signed chain)
    #[serde(rename = "accept-invalid-certs")]
    pub accept_invalid_certs: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "User-Agent".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
        );
        headers.insert("X-Requested-With".to_string(), "XMLHttpRequest".to_string());
        headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded; charset=UTF-8".to_string(),
        );

        let mut form = BTreeMap::new();
        form.insert("optype".to_string(), "true".to_string());

        Self {
            base_url: "https://jw.shiep.edu.cn/eams".to_string(),
            select_path: "/stdElectCourse!batchOperator.action".to_string(),
            verify_path: "/stdElectCourse.action".to_string(),
            routing_param: "profileId".to_string(),
            course_param: "operator0".to_string(),
            course_value_template: "{course}:true:0".to_string(),
            form,
            headers,
            accept_invalid_certs: true,
        }
    }
}

impl PortalConfig {
    /// Full URL of the selection endpoint
    pub fn select_url(&self) -> String {
        join_url(&self.base_url, &self.select_path)
    }

    /// Full URL of the session check endpoint
    pub fn verify_url(&self) -> String {
        join_url(&self.base_url, &self.verify_path)
    }

    /// Render the course form value for one course
    pub fn course_value(&self, course: &str) -> String {
        self.course_value_template.replace(COURSE_PLACEHOLDER, course)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// What to do with a 200 response that matches no known marker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguousPolicy {
    /// Keep retrying; a later "already selected" answer confirms success
    #[default]
    Retry,
    /// Treat the attempt as a success
    Accept,
}

/// Retry engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-attempt timeout in milliseconds
    #[serde(rename = "attempt-timeout-ms")]
    pub attempt_timeout_ms: u64,

    /// Pause between two attempts of the same identity in milliseconds
    #[serde(rename = "inter-attempt-delay-ms")]
    pub inter_attempt_delay_ms: u64,

    /// Timeout for session checks in milliseconds
    #[serde(rename = "verify-timeout-ms")]
    pub verify_timeout_ms: u64,

    /// Handling of unrecognised 200 responses
    #[serde(rename = "ambiguous-policy")]
    pub ambiguous_policy: AmbiguousPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 1000,
            inter_attempt_delay_ms: 200,
            verify_timeout_ms: 5000,
            ambiguous_policy: AmbiguousPolicy::Retry,
        }
    }
}

impl EngineConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn inter_attempt_delay(&self) -> Duration {
        Duration::from_millis(self.inter_attempt_delay_ms)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

/// Outbound proxy configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Route portal traffic through the proxy
    pub enabled: bool,

    /// Proxy URL, e.g. socks5h://127.0.0.1:1080
    pub url: Option<String>,
}

/// Marker strings searched for in 200 response bodies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    #[serde(rename = "already-selected")]
    pub already_selected: Vec<String>,

    pub fatal: Vec<String>,

    pub full: Vec<String>,

    #[serde(rename = "rate-limited")]
    pub rate_limited: Vec<String>,

    #[serde(rename = "window-closed")]
    pub window_closed: Vec<String>,

    pub error: Vec<String>,

    pub success: Vec<String>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        fn strings(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            already_selected: strings(&["已经选过"]),
            fatal: Vec::new(),
            full: strings(&["人数已满", "已满", "冲突", "不满足"]),
            rate_limited: strings(&["请不要过快点击"]),
            window_closed: strings(&["当前选课不开放"]),
            error: strings(&["失败", "错误", "异常"]),
            success: strings(&["选课成功", "成功"]),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: Option<String>,

    /// Write logs to this file instead of stderr
    pub file: Option<PathBuf>,
}

/// One credential holder and its course targets
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdentityConfig {
    pub label: String,

    /// Session cookies, name to value
    pub cookies: BTreeMap<String, String>,

    /// Shorthand for a single table: routing key
    #[serde(rename = "profile-id", skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,

    /// Shorthand for a single table: courses
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub courses: Vec<String>,

    /// Routing tables, each with its own routing key
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableConfig>,
}

impl IdentityConfig {
    /// Every cookie must survive as one pair of a `Cookie` header
    pub fn validate_cookies(&self) -> Result<(), ConfigError> {
        for (name, value) in &self.cookies {
            let invalid = |reason: String| ConfigError::InvalidCookie {
                label: self.label.clone(),
                name: name.clone(),
                reason,
            };
            if name.trim().is_empty() || name.contains(['=', ';']) || name.chars().any(char::is_whitespace) {
                return Err(invalid("bad cookie name".to_string()));
            }
            if value.contains(';') {
                return Err(invalid("value contains ';'".to_string()));
            }
            reqwest::header::HeaderValue::from_str(&format!("{name}={value}")).map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// All tables, with the shorthand form first when present
    pub fn all_tables(&self) -> Vec<TableConfig> {
        let mut tables = Vec::with_capacity(self.tables.len() + 1);
        if self.profile_id.is_some() || !self.courses.is_empty() {
            tables.push(TableConfig {
                profile_id: self.profile_id.clone().unwrap_or_default(),
                courses: self.courses.clone(),
            });
        }
        tables.extend(self.tables.iter().cloned());
        tables
    }
}

/// Courses reachable through one routing key
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TableConfig {
    #[serde(rename = "profile-id")]
    pub profile_id: String,

    pub courses: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.engine.attempt_timeout_ms, 1000);
        assert_eq!(config.engine.inter_attempt_delay_ms, 200);
        assert_eq!(config.engine.ambiguous_policy, AmbiguousPolicy::Retry);
        assert_eq!(config.portal.routing_param, "profileId");
        assert!(!config.proxy.enabled);
        assert!(config.identities.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_portal_urls() {
        let portal = PortalConfig {
            base_url: "https://portal.example/eams/".to_string(),
            select_path: "select.action".to_string(),
            ..Default::default()
        };
        assert_eq!(portal.select_url(), "https://portal.example/eams/select.action");
        assert_eq!(portal.course_value("1001"), "1001:true:0");
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
portal:
  base-url: https://portal.example/eams
  routing-param: pid
engine:
  attempt-timeout-ms: 1500
  inter-attempt-delay-ms: 300
  ambiguous-policy: accept
proxy:
  enabled: true
  url: socks5h://127.0.0.1:1080
markers:
  fatal: ["forbidden"]
logging:
  level: debug
identities:
  - label: alice
    cookies:
      JSESSIONID: abc
    profile-id: "1234"
    courses: ["1001", "1002"]
  - label: bob
    cookies:
      JSESSIONID: def
    tables:
      - profile-id: "1234"
        courses: ["2001"]
      - profile-id: "5678"
        courses: ["3001", "3002"]
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.portal.base_url, "https://portal.example/eams");
        assert_eq!(config.portal.routing_param, "pid");
        // Unspecified portal fields keep their defaults
        assert_eq!(config.portal.course_param, "operator0");
        assert_eq!(config.engine.attempt_timeout(), Duration::from_millis(1500));
        assert_eq!(config.engine.ambiguous_policy, AmbiguousPolicy::Accept);
        assert!(config.proxy.enabled);
        assert_eq!(config.markers.fatal, vec!["forbidden".to_string()]);
        assert_eq!(config.markers.already_selected, vec!["已经选过".to_string()]);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));

        let alice = &config.identities[0];
        assert_eq!(alice.all_tables().len(), 1);
        assert_eq!(alice.all_tables()[0].profile_id, "1234");

        let bob = &config.identities[1];
        assert_eq!(bob.all_tables().len(), 2);
        assert_eq!(bob.all_tables()[1].courses, vec!["3001".to_string(), "3002".to_string()]);
    }

    #[test]
    fn test_save_keeps_customised_sections() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("coursegrab.yml");

        let mut config = Config::default();
        config.engine.inter_attempt_delay_ms = 500;
        config.save(&path).unwrap();

        let saved = fs::read_to_string(&path).unwrap();
        assert!(saved.contains("inter-attempt-delay-ms: 500"));
        assert!(!saved.contains("portal"));
        assert_eq!(Config::load_from_file(&path).unwrap().engine.inter_attempt_delay_ms, 500);
    }

    #[test]
    fn test_validate_rejects_bad_template() {
        let mut config = Config::default();
        config.portal.course_value_template = "true:0".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingCoursePlaceholder("true:0".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_labels() {
        let mut config = Config::default();
        config.identities = vec![
            IdentityConfig {
                label: "alice".to_string(),
                ..Default::default()
            },
            IdentityConfig {
                label: "alice".to_string(),
                ..Default::default()
            },
        ];
        assert_eq!(config.validate(), Err(ConfigError::DuplicateLabel("alice".to_string())));
    }

    #[test]
    fn test_validate_rejects_unsendable_cookies() {
        let identity = |name: &str, value: &str| IdentityConfig {
            label: "alice".to_string(),
            cookies: BTreeMap::from([(name.to_string(), value.to_string())]),
            ..Default::default()
        };

        let mut config = Config::default();
        config.identities = vec![identity("JSESSIONID", "abc\r\nX-Injected: 1")];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCookie { ref label, ref name, .. }) if label == "alice" && name == "JSESSIONID"
        ));

        config.identities = vec![identity("JSESSIONID", "a;b")];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCookie { .. })));

        config.identities = vec![identity("bad name", "abc")];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCookie { .. })));

        // Empty values are allowed; the identity is reported as missing cookies instead
        config.identities = vec![identity("JSESSIONID", "")];
        assert!(config.validate().is_ok());

        config.identities = vec![identity("JSESSIONID", "0A1B2C3D4E5F.node1")];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.portal.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("coursegrab.yml");

        let mut config = Config::default();
        config.identities.push(IdentityConfig {
            label: "alice".to_string(),
            profile_id: Some("1234".to_string()),
            courses: vec!["1001".to_string()],
            ..Default::default()
        });
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.identities, config.identities);
        assert_eq!(loaded.portal, config.portal);

        // Default sections stay out of the file
        let saved = fs::read_to_string(&path).unwrap();
        assert!(!saved.contains("portal"));
        assert!(!saved.contains("markers"));
        assert!(!saved.contains("engine"));
        assert_eq!(Config::load_logging(Some(&path)).level, None);
    }
}
