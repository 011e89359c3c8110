//! REST client for the DC/OS cluster APIs.
//!
//! [`DcosClient`] builds requests against the cluster URL and hands them to a
//! [`Transport`]. Production uses [`HttpTransport`] (reqwest); tests plug in
//! [`crate::testing::FakeCluster`].
//!
//! Each sub-API borrows the client:
//!
//! ```ignore
//! let user = client.iam().get_user("alice").await?;
//! let job = client.jobs().get_job("nightly-backup").await?;
//! ```

pub mod iam;
pub mod jobs;
pub mod marathon;
pub mod metadata;
pub mod packages;
pub mod secrets;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{ClusterConfig, TlsMode};

pub use iam::IamApi;
pub use jobs::JobsApi;
pub use marathon::MarathonApi;
pub use metadata::MetadataApi;
pub use packages::PackagesApi;
pub use secrets::SecretsApi;

/// Errors returned by the REST client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The cluster answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Api {
        /// Response status.
        status: StatusCode,
        /// Message extracted from the response body.
        message: String,
    },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The cluster URL or a path segment could not form a valid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A TLS setting could not be applied.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// The response body did not have the expected shape.
    #[error("unable to decode response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ClientError {
    /// Status of the failed response, if there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The entity does not exist (404).
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// The entity does not exist, accepting the 400 some DC/OS services
    /// return for unknown identifiers.
    pub fn is_absent(&self) -> bool {
        matches!(
            self.status(),
            Some(StatusCode::NOT_FOUND) | Some(StatusCode::BAD_REQUEST)
        )
    }

    /// The entity already exists (409).
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(StatusCode::CONFLICT)
    }
}

/// A request ready to be sent to the cluster.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: Url,
    /// Extra headers, including authorization.
    pub headers: Vec<(String, String)>,
    /// Encoded request body.
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decode the body as JSON, `Null` when there is none.
    pub fn json_body(&self) -> serde_json::Value {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

/// A raw response from the cluster.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Response status.
    pub status: StatusCode,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Build a response carrying a JSON body.
    pub fn json(status: StatusCode, body: &serde_json::Value) -> Self {
        Self {
            status,
            body: serde_json::to_vec(body).unwrap_or_default(),
        }
    }

    /// Build a response with no body.
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    /// Build a response with a plain text body.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into().into_bytes(),
        }
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(ClientError::Decode)
    }

    fn into_text(self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends a single request and returns the raw response.
///
/// Implementations must not interpret the status code; [`DcosClient`] does.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Execute the request.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError>;
}

/// [`Transport`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport honoring the cluster's TLS mode.
    pub fn new(tls: &TlsMode) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));

        match tls {
            TlsMode::Verify => {},
            TlsMode::Insecure => {
                builder = builder.danger_accept_invalid_certs(true);
            },
            TlsMode::CaFile(path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    ClientError::Tls(format!("unable to read {}: {}", path.display(), e))
                })?;
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| ClientError::Tls(format!("invalid CA certificate: {}", e)))?;
                builder = builder.add_root_certificate(cert);
            },
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok(ApiResponse { status, body })
    }
}

/// Content negotiation for versioned DC/OS media types.
#[derive(Debug, Clone)]
pub(crate) struct MediaType {
    content_type: String,
    accept: String,
}

impl MediaType {
    const JSON: &'static str = "application/json";

    fn json() -> Self {
        Self {
            content_type: Self::JSON.to_string(),
            accept: Self::JSON.to_string(),
        }
    }

    /// `application/vnd.dcos.<family>.<action>-{request,response}+json`.
    pub(crate) fn cosmos(
        family: &str,
        action: &str,
        request_version: &str,
        response_version: &str,
    ) -> Self {
        Self {
            content_type: format!(
                "application/vnd.dcos.{}.{}-request+json;charset=utf-8;version={}",
                family, action, request_version
            ),
            accept: format!(
                "application/vnd.dcos.{}.{}-response+json;charset=utf-8;version={}",
                family, action, response_version
            ),
        }
    }
}

/// Client handle shared by every resource and data source handler.
#[derive(Clone)]
pub struct DcosClient {
    transport: Arc<dyn Transport>,
    config: ClusterConfig,
    base_url: Url,
}

impl std::fmt::Debug for DcosClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcosClient")
            .field("url", &self.config.url)
            .field("name", &self.config.name)
            .field("tls", &self.config.tls)
            .finish_non_exhaustive()
    }
}

impl DcosClient {
    /// Build a client talking HTTPS to the configured cluster.
    pub fn new(config: ClusterConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config.tls)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a client over an arbitrary transport.
    pub fn with_transport(
        config: ClusterConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(config.url.clone()));
        }
        Ok(Self {
            transport,
            config,
            base_url,
        })
    }

    /// The cluster configuration this client was built from.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Replace the ACS token used for subsequent requests.
    pub fn set_acs_token(&mut self, token: impl Into<String>) {
        self.config.acs_token = Some(token.into());
    }

    /// IAM: users, groups, permissions, SAML providers.
    pub fn iam(&self) -> IamApi<'_> {
        IamApi::new(self)
    }

    /// Secret store.
    pub fn secrets(&self) -> SecretsApi<'_> {
        SecretsApi::new(self)
    }

    /// Metronome jobs and schedules.
    pub fn jobs(&self) -> JobsApi<'_> {
        JobsApi::new(self)
    }

    /// Cosmos packages, services and repositories.
    pub fn packages(&self) -> PackagesApi<'_> {
        PackagesApi::new(self)
    }

    /// Marathon applications.
    pub fn marathon(&self) -> MarathonApi<'_> {
        MarathonApi::new(self)
    }

    /// Cluster metadata.
    pub fn metadata(&self) -> MetadataApi<'_> {
        MetadataApi::new(self)
    }

    /// Join path segments onto the cluster URL, escaping each segment.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.config.url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and turn non-success statuses into [`ClientError::Api`].
    pub(crate) async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        media: Option<MediaType>,
    ) -> Result<ApiResponse, ClientError> {
        let media = media.unwrap_or_else(MediaType::json);
        let mut headers = vec![("Accept".to_string(), media.accept)];
        if let Some(token) = &self.config.acs_token {
            headers.push(("Authorization".to_string(), format!("token={}", token)));
        }

        let body = match body {
            Some(b) => {
                headers.push(("Content-Type".to_string(), media.content_type));
                Some(serde_json::to_vec(b).map_err(ClientError::Decode)?)
            },
            None => None,
        };

        let path = url.path().to_string();
        let request = ApiRequest {
            method: method.clone(),
            url,
            headers,
            body,
        };

        let response = self.transport.execute(request).await?;
        debug!(method = %method, path = %path, status = response.status.as_u16(), "DC/OS API call");

        if response.status.is_success() {
            Ok(response)
        } else {
            Err(ClientError::Api {
                status: response.status,
                message: error_message(response.status, &response.body),
            })
        }
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        self.send::<()>(Method::GET, url, None, None)
            .await?
            .decode()
    }

    pub(crate) async fn get_text(&self, url: Url) -> Result<String, ClientError> {
        Ok(self
            .send::<()>(Method::GET, url, None, None)
            .await?
            .into_text())
    }

    pub(crate) async fn send_json<B, T>(
        &self,
        method: Method,
        url: Url,
        body: &B,
        media: Option<MediaType>,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(method, url, Some(body), media).await?.decode()
    }
}

/// Pull a human readable message out of a DC/OS error body.
///
/// IAM answers with `description`/`title`, Cosmos and Metronome with
/// `message`; anything else falls back to the raw body or the reason phrase.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["description", "message", "title"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    } else {
        text.chars().take(512).collect()
    }
}
