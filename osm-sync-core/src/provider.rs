//! Remote source of raw OSM data for a bounding box.

use thiserror::Error;

use crate::BoundingBox;

/// Raw payload returned by the OSM API (OSM XML).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawPayload(pub Vec<u8>);

impl RawPayload {
    /// Payload bytes as received.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for RawPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for RawPayload {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

/// Errors from [`RemoteDataProvider::fetch`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server refused the area because it holds too many objects.
    ///
    /// The pipeline recovers by shrinking the area and retrying.
    #[error("the server rejected the area as too large: {message}")]
    ObjectLimitExceeded {
        /// Explanation supplied by the server.
        message: String,
    },
    /// The server answered with an error status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, trimmed.
        message: String,
    },
    /// The request did not complete.
    #[error("network error contacting {url}: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport error text.
        message: String,
    },
    /// The request exceeded its deadline.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Configured deadline in seconds.
        timeout_secs: u64,
    },
}

impl FetchError {
    /// Whether the error asks for a smaller area rather than reporting a failure.
    #[must_use]
    pub const fn is_object_limit(&self) -> bool {
        matches!(self, Self::ObjectLimitExceeded { .. })
    }
}

/// Fetch raw OSM data covering a bounding box.
///
/// The trait is synchronous so the core stays embeddable; implementations
/// that talk to the network block the calling worker, never the interactive
/// thread.
///
/// # Examples
///
/// ```rust
/// use geo::Coord;
/// use osm_sync_core::{BoundingBox, FetchError, RawPayload, RemoteDataProvider};
///
/// struct Empty;
///
/// impl RemoteDataProvider for Empty {
///     fn fetch(&self, _bbox: &BoundingBox) -> Result<RawPayload, FetchError> {
///         Ok(RawPayload::from("<osm version=\"0.6\"/>"))
///     }
/// }
///
/// let bbox = BoundingBox::around(Coord { x: 0.0, y: 0.0 }, 0.002);
/// assert!(!Empty.fetch(&bbox)?.is_empty());
/// # Ok::<(), FetchError>(())
/// ```
pub trait RemoteDataProvider: Send + Sync {
    /// Return the raw payload for `bbox`, or a structured rejection.
    fn fetch(&self, bbox: &BoundingBox) -> Result<RawPayload, FetchError>;
}
