use camino::Utf8PathBuf;
use thiserror::Error;

use crate::{BoundingBox, ConversionError, DecodeError, FetchError};

/// Terminal failures of a synchronisation session.
///
/// Object-limit rejections are retried inside the pipeline and never appear
/// here; supersession is reported as a
/// [`SessionOutcome`](crate::SessionOutcome), not as an error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The server or the network failed.
    #[error("download of {bbox} failed: {source}")]
    Transport {
        /// Area being downloaded.
        bbox: BoundingBox,
        /// Provider error.
        #[source]
        source: FetchError,
    },
    /// The staging slot could not be written or read back.
    #[error("staging file {path} is unusable: {source}")]
    Staging {
        /// Staged file.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The format converter failed.
    #[error("format conversion failed: {source}")]
    Conversion {
        /// Converter error.
        #[source]
        source: ConversionError,
    },
    /// A payload could not be decoded.
    #[error("payload decoding failed: {source}")]
    Decode {
        /// Decoder error.
        #[source]
        source: DecodeError,
    },
    /// The server kept rejecting the area after it reached the minimum size.
    #[error("object limit still exceeded at the minimum half-extent {half_extent}")]
    HalfExtentExhausted {
        /// Half-extent of the last rejected request.
        half_extent: f64,
    },
    /// A background worker could not be started.
    #[error("failed to start {worker} worker: {source}")]
    WorkerSpawn {
        /// Worker role.
        worker: &'static str,
        /// Spawn error.
        #[source]
        source: std::io::Error,
    },
    /// A background worker panicked.
    #[error("{worker} worker panicked")]
    WorkerPanicked {
        /// Worker role.
        worker: &'static str,
    },
}
