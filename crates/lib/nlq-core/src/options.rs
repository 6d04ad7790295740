use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::extract::ExtractionOptions;

pub const DEFAULT_DISCOVERY_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DISCOVERY_RETRY: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.1;
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SAMPLE_SIZE: usize = 3;

/// Tunables for the resolution pipeline. Every field has a working default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Maximum catalog age before rediscovery; `None` never expires.
    #[serde(with = "optional_secs")]
    pub discovery_ttl: Option<Duration>,
    #[serde(with = "secs")]
    pub discovery_timeout: Duration,
    /// Quiet period after a failed discovery during which the stale catalog is served.
    #[serde(with = "secs")]
    pub discovery_retry: Duration,
    pub max_attempts: usize,
    pub min_confidence: f64,
    #[serde(with = "secs")]
    pub invoke_timeout: Duration,
    pub sample_size: usize,
    pub extraction: ExtractionOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            discovery_ttl: Some(DEFAULT_DISCOVERY_TTL),
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            discovery_retry: DEFAULT_DISCOVERY_RETRY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            sample_size: DEFAULT_SAMPLE_SIZE,
            extraction: ExtractionOptions::default(),
        }
    }
}

impl PipelineOptions {
    #[must_use]
    pub const fn with_discovery_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.discovery_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_discovery_timeout(mut self, discovery_timeout: Duration) -> Self {
        self.discovery_timeout = discovery_timeout;
        self
    }

    #[must_use]
    pub const fn with_discovery_retry(mut self, discovery_retry: Duration) -> Self {
        self.discovery_retry = discovery_retry;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub const fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    #[must_use]
    pub const fn with_invoke_timeout(mut self, invoke_timeout: Duration) -> Self {
        self.invoke_timeout = invoke_timeout;
        self
    }

    #[must_use]
    pub const fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    #[must_use]
    pub fn with_extraction(mut self, extraction: ExtractionOptions) -> Self {
        self.extraction = extraction;
        self
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.map_or(0, |ttl| ttl.as_secs()))
    }

    /// Zero disables expiry.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok((secs > 0).then(|| Duration::from_secs(secs)))
    }
}
