//! reqwest-backed transport
//!
//! Redirects are never followed: a redirect from the portal means the session
//! expired, and the classifier needs to see the 3xx status itself.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Proxy, redirect};
use tracing::debug;

use super::{Connector, PortalRequest, ProxySettings, RawResponse, Transport, TransportError};
use crate::config::PortalConfig;

/// Pooled HTTP client bound to one proxy configuration
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    async fn finish(
        &self,
        builder: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let response = builder
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;
        debug!(status, body_len = body.len(), "HttpTransport: response received");
        Ok(RawResponse { status, body })
    }

    fn with_cookie(builder: reqwest::RequestBuilder, cookie: &str) -> reqwest::RequestBuilder {
        if cookie.is_empty() {
            builder
        } else {
            builder.header(COOKIE, cookie)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_form(&self, request: &PortalRequest) -> Result<RawResponse, TransportError> {
        debug!(url = %request.url, "HttpTransport::post_form: called");
        let builder = self.http.post(&request.url).query(&request.query).form(&request.form);
        self.finish(Self::with_cookie(builder, &request.cookie), request.timeout)
            .await
    }

    async fn get(&self, request: &PortalRequest) -> Result<RawResponse, TransportError> {
        debug!(url = %request.url, "HttpTransport::get: called");
        let builder = self.http.get(&request.url).query(&request.query);
        self.finish(Self::with_cookie(builder, &request.cookie), request.timeout)
            .await
    }
}

/// Builds one [`HttpTransport`] per identity with the portal's fixed headers
#[derive(Debug, Clone)]
pub struct HttpConnector {
    headers: BTreeMap<String, String>,
    accept_invalid_certs: bool,
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(portal: &PortalConfig, timeout: Duration) -> Self {
        Self {
            headers: portal.headers.clone(),
            accept_invalid_certs: portal.accept_invalid_certs,
            timeout,
        }
    }

    fn header_map(&self) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| TransportError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

impl Connector for HttpConnector {
    fn connect(&self, proxy: &ProxySettings) -> Result<Box<dyn Transport>, TransportError> {
        debug!(%proxy, "HttpConnector::connect: called");
        let mut builder = Client::builder()
            .default_headers(self.header_map()?)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .redirect(redirect::Policy::none())
            .timeout(self.timeout);

        if let ProxySettings::Socks { url } = proxy {
            let proxy = Proxy::all(url).map_err(|e| TransportError::InvalidProxy {
                url: url.clone(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        let http = builder.build().map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Box::new(HttpTransport { http }))
    }
}
