//! Connection setup for the vSphere VI/JSON API

use super::session::Session;
use super::types::{LoginRequest, ServiceContent};
use crate::error::{CoreError, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{debug, info, trace};
use url::Url;

/// Header carrying the session token on every authenticated call
pub const SESSION_HEADER: &str = "vmware-api-session-id";

/// vim25 release used in request paths
pub const DEFAULT_API_RELEASE: &str = "8.0.1.0";

pub const DEFAULT_PORT: u16 = 443;

/// Per-request timeout when the builder is not given one
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_USER_AGENT: &str = concat!("dvsctl-core/", env!("CARGO_PKG_VERSION"));

/// Unauthenticated client; call [`VsphereClient::login`] to get a [`Session`]
#[derive(Clone)]
pub struct VsphereClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
    datacenter: Option<String>,
}

impl std::fmt::Debug for VsphereClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsphereClient")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("datacenter", &self.datacenter)
            .finish()
    }
}

impl VsphereClient {
    pub fn builder() -> VsphereClientBuilder {
        VsphereClientBuilder::default()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Open an authenticated session.
    ///
    /// Any failure on the way (unreachable host, TLS, HTTP error, rejected
    /// credentials, a response without a session token) is reported as
    /// [`CoreError::Connection`].
    pub async fn login(&self) -> Result<Session> {
        info!("Connecting to vSphere endpoint {}", self.base_url);

        let content = self
            .fetch_service_content()
            .await
            .map_err(|e| CoreError::Connection(format!("could not reach {}: {}", self.base_url, e)))?;
        if let Some(about) = &content.about {
            debug!(
                "Endpoint is {} (API {})",
                about.full_name.as_deref().unwrap_or("unknown"),
                about.api_version.as_deref().unwrap_or("unknown")
            );
        }

        let url = format!(
            "{}/SessionManager/{}/Login",
            self.root(),
            urlencoding::encode(&content.session_manager.value)
        );
        trace!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .json(&LoginRequest {
                user_name: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| CoreError::Connection(format!("login request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .map(|v| super::types::fault_from_value(v).to_string())
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(CoreError::Connection(format!(
                "could not log in as '{}': {}",
                self.username, reason
            )));
        }

        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| {
                CoreError::Connection(format!("login response carried no {} header", SESSION_HEADER))
            })?;

        info!("Logged in as {}", self.username);
        Ok(Session::new(
            self.http.clone(),
            self.root().to_string(),
            session_id,
            content,
            self.datacenter.clone(),
        ))
    }

    async fn fetch_service_content(&self) -> Result<ServiceContent> {
        let url = format!("{}/ServiceInstance/ServiceInstance/content", self.root());
        trace!("GET {}", url);
        let content = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<ServiceContent>()
            .await?;
        Ok(content)
    }

    fn root(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }
}

/// Builder for [`VsphereClient`]
///
/// # Example
///
/// ```rust
/// use dvsctl_core::vsphere::VsphereClient;
///
/// let client = VsphereClient::builder()
///     .host("vcenter.lab.local")
///     .username("administrator@vsphere.local")
///     .password("secret")
///     .insecure(true)
///     .build()
///     .unwrap();
///
/// assert_eq!(
///     client.base_url().as_str(),
///     "https://vcenter.lab.local/sdk/vim25/8.0.1.0"
/// );
/// ```
#[derive(Default)]
pub struct VsphereClientBuilder {
    host: Option<String>,
    port: Option<u16>,
    base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    insecure: bool,
    api_release: Option<String>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
    datacenter: Option<String>,
}

impl VsphereClientBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Full API root, overriding host/port/release (useful behind proxies and in tests)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Accept self-signed certificates
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn api_release(mut self, release: impl Into<String>) -> Self {
        self.api_release = Some(release.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Per-request timeout, [`DEFAULT_REQUEST_TIMEOUT`] when unset
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Datacenter to work in; the first one in the inventory when unset
    pub fn datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    pub fn build(self) -> Result<VsphereClient> {
        let username = self
            .username
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CoreError::Config("username is required".to_string()))?;
        let password = self
            .password
            .ok_or_else(|| CoreError::Config("password is required".to_string()))?;

        let raw_url = match self.base_url {
            Some(url) => url,
            None => {
                let host = self
                    .host
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| CoreError::Config("host is required".to_string()))?;
                let port = self.port.unwrap_or(DEFAULT_PORT);
                let release = self
                    .api_release
                    .unwrap_or_else(|| DEFAULT_API_RELEASE.to_string());
                if port == DEFAULT_PORT {
                    format!("https://{}/sdk/vim25/{}", host, release)
                } else {
                    format!("https://{}:{}/sdk/vim25/{}", host, port, release)
                }
            }
        };
        let base_url = Url::parse(&raw_url)
            .map_err(|e| CoreError::Config(format!("invalid endpoint URL '{}': {}", raw_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("application/json"));

        let builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()))
            .danger_accept_invalid_certs(self.insecure)
            .timeout(self.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT));
        let http = builder
            .build()
            .map_err(|e| CoreError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(VsphereClient {
            http,
            base_url,
            username,
            password,
            datacenter: self.datacenter,
        })
    }
}
