//! `RemoteDataProvider` backed by the OSM API `map` call.
//!
//! The API answers `GET /api/0.6/map?bbox=...` with an OSM XML document
//! containing every node, way and relation in the area. Areas holding more
//! objects than the server allows, or larger than its maximum area, are
//! refused with `400 Bad Request`; the provider reports those as
//! [`FetchError::ObjectLimitExceeded`] so the pipeline can shrink and retry.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use osm_sync_core::{BoundingBox, FetchError, RawPayload, RemoteDataProvider};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

/// Error type for [`HttpOsmProvider`] construction failures.
#[derive(Debug)]
pub enum ProviderBuildError {
    /// Failed to build the HTTP client.
    HttpClient(reqwest::Error),
    /// Failed to build the Tokio runtime.
    Runtime(std::io::Error),
}

impl fmt::Display for ProviderBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpClient(err) => write!(f, "failed to build HTTP client: {err}"),
            Self::Runtime(err) => write!(f, "failed to build Tokio runtime: {err}"),
        }
    }
}

impl std::error::Error for ProviderBuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::HttpClient(err) => Some(err),
            Self::Runtime(err) => Some(err),
        }
    }
}

/// Default user agent for OSM API requests.
pub const DEFAULT_USER_AGENT: &str = "osm-sync/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Path of the bounding-box download call, relative to the server root.
const MAP_CALL: &str = "api/0.6/map";

/// Which OSM API deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsmServer {
    /// The live database at `api.openstreetmap.org`.
    #[default]
    Production,
    /// The sandbox used for testing editors.
    Development,
}

impl OsmServer {
    /// Root URL of the deployment.
    #[must_use]
    pub const fn base_url(self) -> &'static str {
        match self {
            Self::Production => "https://api.openstreetmap.org",
            Self::Development => "https://master.apis.dev.openstreetmap.org",
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

impl fmt::Display for OsmServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a server name is neither `production` nor `development`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown OSM server {name:?}; expected `production` or `development`")]
pub struct ParseServerError {
    name: String,
}

impl FromStr for OsmServer {
    type Err = ParseServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            _ => Err(ParseServerError { name: s.to_owned() }),
        }
    }
}

/// Configuration for [`HttpOsmProvider`].
#[derive(Debug, Clone)]
pub struct OsmApiConfig {
    /// Root URL of the API (e.g., `"https://api.openstreetmap.org"`).
    pub base_url: String,
    /// Request timeout duration.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for OsmApiConfig {
    fn default() -> Self {
        Self::for_server(OsmServer::default())
    }
}

impl OsmApiConfig {
    /// Create a configuration for an arbitrary API root.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    /// Create a configuration for one of the public deployments.
    #[must_use]
    pub fn for_server(server: OsmServer) -> Self {
        Self::new(server.base_url())
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Provider downloading raw OSM XML over HTTP.
///
/// # Runtime behaviour
///
/// Outside any Tokio runtime the provider blocks on its own current-thread
/// runtime, which is reused across calls. Inside a multi-threaded runtime
/// (detected via [`Handle::try_current()`] and [`RuntimeFlavor::MultiThread`])
/// it uses that runtime's handle with [`tokio::task::block_in_place`].
/// Inside a `current_thread` runtime it falls back to its own runtime, which
/// may deadlock if the caller's runtime drives IO this request depends on.
pub struct HttpOsmProvider {
    client: Client,
    config: OsmApiConfig,
    runtime: Runtime,
}

impl fmt::Debug for HttpOsmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpOsmProvider")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl HttpOsmProvider {
    /// Create a provider for one of the public deployments.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn new(server: OsmServer) -> Result<Self, ProviderBuildError> {
        Self::with_config(OsmApiConfig::for_server(server))
    }

    /// Create a provider with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn with_config(config: OsmApiConfig) -> Result<Self, ProviderBuildError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(ProviderBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ProviderBuildError::Runtime)?;
        Ok(Self {
            client,
            config,
            runtime,
        })
    }

    /// The configuration the provider was built with.
    #[must_use]
    pub const fn config(&self) -> &OsmApiConfig {
        &self.config
    }

    /// Build the `map` call URL for `bbox`.
    ///
    /// The URL format is `{base_url}/api/0.6/map?bbox=lonMin,latMin,lonMax,latMax`.
    fn build_map_url(&self, bbox: &BoundingBox) -> String {
        format!(
            "{}/{MAP_CALL}?bbox={}",
            self.config.base_url.trim_end_matches('/'),
            bbox.to_query_param()
        )
    }

    async fn fetch_async(&self, url: &str) -> Result<RawPayload, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?;
        debug!("GET {url} -> {status} ({} bytes)", body.len());
        classify_response(url, status, body.to_vec())
    }

    /// Convert a reqwest error to a [`FetchError`].
    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &str) -> FetchError {
        if error.is_timeout() {
            return FetchError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }

        if let Some(status) = error.status() {
            return FetchError::Http {
                url: url.to_owned(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }

        FetchError::Network {
            url: url.to_owned(),
            message: error.to_string(),
        }
    }
}

/// Map a completed response onto the provider contract.
///
/// `400 Bad Request` is how the API refuses an area that is too large or too
/// dense; the body carries the server's explanation.
fn classify_response(
    url: &str,
    status: StatusCode,
    body: Vec<u8>,
) -> Result<RawPayload, FetchError> {
    if status.is_success() {
        return Ok(RawPayload(body));
    }
    let message = String::from_utf8_lossy(&body).trim().to_owned();
    if status == StatusCode::BAD_REQUEST {
        return Err(FetchError::ObjectLimitExceeded { message });
    }
    Err(FetchError::Http {
        url: url.to_owned(),
        status: status.as_u16(),
        message,
    })
}

impl RemoteDataProvider for HttpOsmProvider {
    /// Download the raw OSM XML for `bbox`.
    ///
    /// # Runtime requirements
    ///
    /// When called from within an existing Tokio runtime, the runtime must be
    /// multi-threaded. A `current_thread` caller runtime is blocked while the
    /// provider's own runtime drives the request.
    fn fetch(&self, bbox: &BoundingBox) -> Result<RawPayload, FetchError> {
        let url = self.build_map_url(bbox);
        let future = self.fetch_async(&url);
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;
    use rstest::{fixture, rstest};

    #[fixture]
    fn bbox() -> BoundingBox {
        BoundingBox::around(Coord { x: 10.0, y: 50.0 }, 0.5)
    }

    #[rstest]
    fn build_map_url_formats_bbox(bbox: BoundingBox) {
        let provider = HttpOsmProvider::with_config(OsmApiConfig::new("http://osm.example.com"))
            .expect("provider should build");

        let url = provider.build_map_url(&bbox);

        assert_eq!(
            url,
            "http://osm.example.com/api/0.6/map?bbox=9.5,49.5,10.5,50.5"
        );
    }

    #[rstest]
    fn build_map_url_strips_trailing_slash(bbox: BoundingBox) {
        let provider = HttpOsmProvider::with_config(OsmApiConfig::new("http://osm.example.com/"))
            .expect("provider should build");

        let url = provider.build_map_url(&bbox);

        assert!(url.starts_with("http://osm.example.com/api/"));
        assert!(!url.contains("//api"));
    }

    #[rstest]
    fn success_returns_body_unchanged() {
        let payload = classify_response("http://x", StatusCode::OK, b"<osm/>".to_vec())
            .expect("success should yield payload");
        assert_eq!(payload.as_bytes(), b"<osm/>");
    }

    #[rstest]
    fn bad_request_is_an_object_limit() {
        let body = b"You requested too many nodes (limit is 50000). \n".to_vec();
        let err = classify_response("http://x", StatusCode::BAD_REQUEST, body)
            .expect_err("400 should fail");
        assert_eq!(
            err,
            FetchError::ObjectLimitExceeded {
                message: "You requested too many nodes (limit is 50000).".to_owned(),
            }
        );
    }

    #[rstest]
    #[case(StatusCode::from_u16(509).expect("509 is a valid status code"))]
    #[case(StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(StatusCode::NOT_FOUND)]
    fn other_failures_are_http_errors(#[case] status: StatusCode) {
        let err = classify_response("http://x/map", status, b"nope".to_vec())
            .expect_err("error status should fail");
        match err {
            FetchError::Http {
                url,
                status: code,
                message,
            } => {
                assert_eq!(url, "http://x/map");
                assert_eq!(code, status.as_u16());
                assert_eq!(message, "nope");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[rstest]
    #[case("production", OsmServer::Production)]
    #[case("Development", OsmServer::Development)]
    #[case(" dev ", OsmServer::Development)]
    fn parses_server_names(#[case] input: &str, #[case] expected: OsmServer) {
        assert_eq!(input.parse::<OsmServer>(), Ok(expected));
    }

    #[rstest]
    fn rejects_unknown_server_names() {
        assert!("staging".parse::<OsmServer>().is_err());
    }

    #[rstest]
    fn servers_point_at_public_deployments() {
        assert_eq!(
            OsmApiConfig::default().base_url,
            "https://api.openstreetmap.org"
        );
        assert_eq!(
            OsmApiConfig::for_server(OsmServer::Development).base_url,
            "https://master.apis.dev.openstreetmap.org"
        );
    }

    #[rstest]
    fn config_builder_pattern() {
        let config = OsmApiConfig::new("http://example.com")
            .with_timeout(Duration::from_secs(60))
            .with_user_agent("test-agent/1.0");

        assert_eq!(config.base_url, "http://example.com");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.user_agent, "test-agent/1.0");
    }
}
