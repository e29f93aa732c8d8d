//! Transport layer for talking to the portal
//!
//! A [`Connector`] turns proxy settings into a [`Transport`]; each identity's
//! worker owns exactly one transport for the whole run so connections are
//! reused. The engine only sees the trait, so tests drive it with scripted
//! transports.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

mod error;
mod http;

pub use error::TransportError;
pub use http::{HttpConnector, HttpTransport};

use crate::config::ProxyConfig;

/// One portal request, fully rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    /// `Cookie` header value; omitted when empty
    pub cookie: String,
    /// Form body fields (POST only)
    pub form: Vec<(String, String)>,
    pub timeout: Duration,
}

/// Status and body text of a portal response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// One network round trip per call; no retries inside
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `request.form` as an urlencoded body
    async fn post_form(&self, request: &PortalRequest) -> Result<RawResponse, TransportError>;

    /// GET without a body
    async fn get(&self, request: &PortalRequest) -> Result<RawResponse, TransportError>;
}

/// How a transport reaches the portal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxySettings {
    Direct,
    Socks { url: String },
}

impl ProxySettings {
    /// Enabled-but-empty proxy configuration degrades to a direct connection
    pub fn from_config(config: &ProxyConfig) -> Self {
        debug!(?config, "ProxySettings::from_config: called");
        if !config.enabled {
            return Self::Direct;
        }
        match config.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Self::Socks { url: url.to_string() },
            _ => {
                warn!("Proxy is enabled but its URL is empty. No proxy.");
                Self::Direct
            }
        }
    }
}

impl std::fmt::Display for ProxySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Socks { url } => write!(f, "proxy {url}"),
        }
    }
}

/// Factory for per-identity transports
pub trait Connector: Send + Sync {
    fn connect(&self, proxy: &ProxySettings) -> Result<Box<dyn Transport>, TransportError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_disabled_is_direct() {
        let config = ProxyConfig {
            enabled: false,
            url: Some("socks5h://127.0.0.1:1080".to_string()),
        };
        assert_eq!(ProxySettings::from_config(&config), ProxySettings::Direct);
    }

    #[test]
    fn test_proxy_enabled_without_url_is_direct() {
        let config = ProxyConfig {
            enabled: true,
            url: Some("  ".to_string()),
        };
        assert_eq!(ProxySettings::from_config(&config), ProxySettings::Direct);

        let config = ProxyConfig { enabled: true, url: None };
        assert_eq!(ProxySettings::from_config(&config), ProxySettings::Direct);
    }

    #[test]
    fn test_proxy_enabled_with_url() {
        let config = ProxyConfig {
            enabled: true,
            url: Some("socks5h://127.0.0.1:1080".to_string()),
        };
        assert_eq!(
            ProxySettings::from_config(&config),
            ProxySettings::Socks {
                url: "socks5h://127.0.0.1:1080".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_mock_transport_counts_per_course() {
        use std::sync::Arc;

        let state = Arc::new(mock::MockState::new(|course, nth| {
            Ok(RawResponse::new(200, format!("{course}#{nth}")))
        }));
        let transport = mock::MockTransport::new(state.clone());
        let request = |course: &str| PortalRequest {
            url: "http://portal".to_string(),
            query: vec![],
            cookie: String::new(),
            form: vec![("operator0".to_string(), format!("{course}:true:0"))],
            timeout: Duration::from_secs(1),
        };

        assert_eq!(transport.post_form(&request("1001")).await.unwrap().body, "1001#1");
        assert_eq!(transport.post_form(&request("1002")).await.unwrap().body, "1002#1");
        assert_eq!(transport.post_form(&request("1001")).await.unwrap().body, "1001#2");
        assert_eq!(state.calls(), vec!["1001", "1002", "1001"]);
        assert_eq!(state.attempts_on("1001"), 2);
    }
}
