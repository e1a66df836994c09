//! Batch configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default pause between consecutive calls of one batch.
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(1500);

/// Default upper bound for either side of a source image, in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 2048;

/// Default relative path of the bundled "generation failed" image.
pub const DEFAULT_PLACEHOLDER_PATH: &str = "assets/generation-failed.png";

/// Settings for a [`BatchGenerator`](crate::BatchGenerator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pause inserted between calls (not after the last one).
    #[serde(with = "duration_millis")]
    pub pacing_delay: Duration,
    /// Source images larger than this on either side are downscaled.
    pub max_dimension: u32,
    /// Placeholder asset used for failed variants.
    pub placeholder_path: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pacing_delay: DEFAULT_PACING_DELAY,
            max_dimension: DEFAULT_MAX_DIMENSION,
            placeholder_path: PathBuf::from(DEFAULT_PLACEHOLDER_PATH),
        }
    }
}

impl BatchConfig {
    /// Builds a config from defaults overlaid with `GENBATCH_*` variables.
    ///
    /// Recognized: `GENBATCH_PACING_MS`, `GENBATCH_MAX_DIMENSION`,
    /// `GENBATCH_PLACEHOLDER`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("GENBATCH_PACING_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.pacing_delay = Duration::from_millis(ms),
                Err(e) => tracing::warn!(value = %raw, "ignoring GENBATCH_PACING_MS: {e}"),
            }
        }
        if let Some(raw) = lookup("GENBATCH_MAX_DIMENSION") {
            match raw.trim().parse::<u32>() {
                Ok(px) if px > 0 => self.max_dimension = px,
                _ => tracing::warn!(value = %raw, "ignoring GENBATCH_MAX_DIMENSION"),
            }
        }
        if let Some(path) = lookup("GENBATCH_PLACEHOLDER") {
            if !path.trim().is_empty() {
                self.placeholder_path = PathBuf::from(path);
            }
        }
        self
    }

    /// Sets the pause between calls.
    pub fn with_pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay = delay;
        self
    }

    /// Sets the maximum source image dimension.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension.max(1);
        self
    }

    /// Sets the placeholder asset path.
    pub fn with_placeholder_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.placeholder_path = path.into();
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
