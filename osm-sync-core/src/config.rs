//! Tunables of the synchronisation pipeline.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Half-extent used for the first download of a cold start, in degrees.
pub const DEFAULT_HALF_EXTENT: f64 = 0.002;
/// Factor applied to the half-extent after each object-limit rejection.
pub const DEFAULT_SHRINK_FACTOR: f64 = 0.75;
/// Smallest half-extent the pipeline will request, in degrees.
pub const DEFAULT_MIN_HALF_EXTENT: f64 = 0.000_05;

/// Name of the staged raw payload inside the staging directory.
pub const STAGED_INPUT_NAME: &str = "input.osm";
/// Name of the converted payload inside the staging directory.
pub const STAGED_OUTPUT_NAME: &str = "output.geojson";

/// Reasons a [`SyncConfig`] is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A half-extent is zero, negative or not finite.
    #[error("{field} must be a finite positive number of degrees, got {value}")]
    InvalidHalfExtent {
        /// Offending setting.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// The shrink factor would not make the area strictly smaller.
    #[error("shrink_factor must lie strictly between 0 and 1, got {value}")]
    InvalidShrinkFactor {
        /// Rejected value.
        value: f64,
    },
    /// The floor lies above the starting half-extent.
    #[error("min_half_extent {floor} exceeds initial_half_extent {initial}")]
    FloorAboveInitial {
        /// Configured floor.
        floor: f64,
        /// Configured starting half-extent.
        initial: f64,
    },
}

/// Configuration injected into the pipeline at construction.
///
/// Every instance satisfies `0 < shrink_factor < 1` and has finite positive
/// half-extents with the floor at or below the starting value, so each
/// retry requests a strictly smaller area. Deserialisation applies the same
/// checks.
///
/// # Examples
/// ```
/// use osm_sync_core::SyncConfig;
///
/// let config = SyncConfig::default();
/// let next = config.shrunk(0.002).expect("above the floor");
/// assert!((next - 0.0015).abs() < 1e-12);
/// assert_eq!(config.shrunk(0.000_06), None);
/// assert!(config.staged_input().ends_with("input.osm"));
/// assert!(SyncConfig::default().with_shrink_factor(1.0).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSyncConfig", into = "RawSyncConfig")]
pub struct SyncConfig {
    initial_half_extent: f64,
    shrink_factor: f64,
    min_half_extent: Option<f64>,
    staging_dir: Utf8PathBuf,
}

/// Unchecked serde form of [`SyncConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RawSyncConfig {
    initial_half_extent: f64,
    shrink_factor: f64,
    min_half_extent: Option<f64>,
    staging_dir: Utf8PathBuf,
}

impl Default for RawSyncConfig {
    fn default() -> Self {
        Self {
            initial_half_extent: DEFAULT_HALF_EXTENT,
            shrink_factor: DEFAULT_SHRINK_FACTOR,
            min_half_extent: Some(DEFAULT_MIN_HALF_EXTENT),
            staging_dir: std::env::temp_dir()
                .join("osm-sync")
                .try_into()
                .unwrap_or_else(|_| Utf8PathBuf::from("osm-sync-staging")),
        }
    }
}

impl TryFrom<RawSyncConfig> for SyncConfig {
    type Error = ConfigError;

    fn try_from(raw: RawSyncConfig) -> Result<Self, Self::Error> {
        Self::new(
            raw.initial_half_extent,
            raw.shrink_factor,
            raw.min_half_extent,
            raw.staging_dir,
        )
    }
}

impl From<SyncConfig> for RawSyncConfig {
    fn from(config: SyncConfig) -> Self {
        Self {
            initial_half_extent: config.initial_half_extent,
            shrink_factor: config.shrink_factor,
            min_half_extent: config.min_half_extent,
            staging_dir: config.staging_dir,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        let raw = RawSyncConfig::default();
        Self {
            initial_half_extent: raw.initial_half_extent,
            shrink_factor: raw.shrink_factor,
            min_half_extent: raw.min_half_extent,
            staging_dir: raw.staging_dir,
        }
    }
}

fn check_half_extent(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidHalfExtent { field, value })
    }
}

impl SyncConfig {
    /// Validate and assemble a configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a half-extent is not finite and
    /// positive, when `shrink_factor` is outside `(0, 1)`, or when the floor
    /// exceeds `initial_half_extent`.
    pub fn new(
        initial_half_extent: f64,
        shrink_factor: f64,
        min_half_extent: Option<f64>,
        staging_dir: impl Into<Utf8PathBuf>,
    ) -> Result<Self, ConfigError> {
        let initial = check_half_extent("initial_half_extent", initial_half_extent)?;
        let shrinks = shrink_factor > 0.0 && shrink_factor < 1.0;
        if !shrinks {
            return Err(ConfigError::InvalidShrinkFactor {
                value: shrink_factor,
            });
        }
        let floor = min_half_extent
            .map(|floor| check_half_extent("min_half_extent", floor))
            .transpose()?;
        if let Some(floor) = floor
            && floor > initial
        {
            return Err(ConfigError::FloorAboveInitial { floor, initial });
        }
        Ok(Self {
            initial_half_extent: initial,
            shrink_factor,
            min_half_extent: floor,
            staging_dir: staging_dir.into(),
        })
    }

    /// Default configuration staging payloads in `staging_dir`.
    #[must_use]
    pub fn with_staging_dir(staging_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            ..Self::default()
        }
    }

    /// Replace the starting half-extent.
    ///
    /// # Errors
    ///
    /// See [`SyncConfig::new`].
    pub fn with_initial_half_extent(self, value: f64) -> Result<Self, ConfigError> {
        Self::new(value, self.shrink_factor, self.min_half_extent, self.staging_dir)
    }

    /// Replace the shrink factor.
    ///
    /// # Errors
    ///
    /// See [`SyncConfig::new`].
    pub fn with_shrink_factor(self, value: f64) -> Result<Self, ConfigError> {
        Self::new(self.initial_half_extent, value, self.min_half_extent, self.staging_dir)
    }

    /// Replace the floor; `None` shrinks without limit.
    ///
    /// # Errors
    ///
    /// See [`SyncConfig::new`].
    pub fn with_min_half_extent(self, value: Option<f64>) -> Result<Self, ConfigError> {
        Self::new(self.initial_half_extent, self.shrink_factor, value, self.staging_dir)
    }

    /// Half-extent of the first session, in degrees.
    #[must_use]
    pub const fn initial_half_extent(&self) -> f64 {
        self.initial_half_extent
    }

    /// Multiplier applied on every object-limit rejection.
    #[must_use]
    pub const fn shrink_factor(&self) -> f64 {
        self.shrink_factor
    }

    /// Floor below which shrinking aborts the session.
    #[must_use]
    pub const fn min_half_extent(&self) -> Option<f64> {
        self.min_half_extent
    }

    /// Path of the staged raw payload.
    #[must_use]
    pub fn staged_input(&self) -> Utf8PathBuf {
        self.staging_dir.join(STAGED_INPUT_NAME)
    }

    /// Path of the converted payload.
    #[must_use]
    pub fn staged_output(&self) -> Utf8PathBuf {
        self.staging_dir.join(STAGED_OUTPUT_NAME)
    }

    /// Staging directory.
    #[must_use]
    pub fn staging_dir(&self) -> &Utf8Path {
        &self.staging_dir
    }

    /// Half-extent after one more shrink, or `None` when it would drop below
    /// the floor.
    #[must_use]
    pub fn shrunk(&self, half_extent: f64) -> Option<f64> {
        let next = half_extent * self.shrink_factor;
        match self.min_half_extent {
            Some(floor) if next < floor => None,
            _ => Some(next),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn two_shrinks_from_default_reach_expected_extent() {
        let config = SyncConfig::default();
        let once = config.shrunk(config.initial_half_extent()).expect("above floor");
        let twice = config.shrunk(once).expect("above floor");
        assert!((twice - 0.001_125).abs() < 1e-12);
    }

    #[rstest]
    #[case(Some(0.001), 0.0012, None)]
    #[case(Some(0.001), 0.002, Some(0.0015))]
    #[case(None, 1e-9, Some(0.75e-9))]
    fn floor_limits_shrinking(
        #[case] floor: Option<f64>,
        #[case] current: f64,
        #[case] expected: Option<f64>,
    ) {
        let config = SyncConfig::default()
            .with_min_half_extent(floor)
            .expect("valid floor");
        match (config.shrunk(current), expected) {
            (Some(actual), Some(wanted)) => assert!((actual - wanted).abs() < 1e-15),
            (actual, wanted) => assert_eq!(actual, wanted),
        }
    }

    #[rstest]
    fn partial_config_fills_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"staging_dir":"/tmp/stage","min_half_extent":null}"#)
                .expect("parse config");
        assert_eq!(config.staging_dir(), Utf8Path::new("/tmp/stage"));
        assert_eq!(config.min_half_extent(), None);
        assert!((config.initial_half_extent() - DEFAULT_HALF_EXTENT).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(1.0)]
    #[case(1.25)]
    #[case(0.0)]
    #[case(-0.5)]
    #[case(f64::NAN)]
    fn shrink_factors_that_do_not_shrink_are_rejected(#[case] factor: f64) {
        let err = SyncConfig::default()
            .with_shrink_factor(factor)
            .expect_err("factor should be rejected");
        assert!(matches!(err, ConfigError::InvalidShrinkFactor { .. }));
    }

    #[rstest]
    #[case(0.0)]
    #[case(-1.0)]
    #[case(f64::INFINITY)]
    #[case(f64::NAN)]
    fn unusable_half_extents_are_rejected(#[case] value: f64) {
        let initial = SyncConfig::default()
            .with_initial_half_extent(value)
            .expect_err("initial half-extent should be rejected");
        assert!(matches!(
            initial,
            ConfigError::InvalidHalfExtent { field: "initial_half_extent", .. }
        ));
        let floor = SyncConfig::default()
            .with_min_half_extent(Some(value))
            .expect_err("floor should be rejected");
        assert!(matches!(
            floor,
            ConfigError::InvalidHalfExtent { field: "min_half_extent", .. }
        ));
    }

    #[rstest]
    fn floor_above_initial_extent_is_rejected() {
        let err = SyncConfig::default()
            .with_min_half_extent(Some(0.01))
            .expect_err("floor above start should be rejected");
        assert!(matches!(err, ConfigError::FloorAboveInitial { .. }));
    }

    #[rstest]
    #[case(r#"{"shrink_factor":2.0}"#)]
    #[case(r#"{"shrink_factor":1.0,"min_half_extent":null}"#)]
    #[case(r#"{"initial_half_extent":-1.0}"#)]
    #[case(r#"{"min_half_extent":0.0}"#)]
    fn deserialising_applies_the_same_checks(#[case] json: &str) {
        let result: Result<SyncConfig, _> = serde_json::from_str(json);
        assert!(result.is_err(), "{json} should be rejected");
    }

    #[rstest]
    fn serialised_config_reads_back() {
        let config = SyncConfig::with_staging_dir("/tmp/stage")
            .with_shrink_factor(0.5)
            .expect("valid factor");
        let json = serde_json::to_string(&config).expect("serialise config");
        let back: SyncConfig = serde_json::from_str(&json).expect("parse config");
        assert_eq!(back, config);
    }
}
