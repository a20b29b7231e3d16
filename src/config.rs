//! Engine configuration.
//!
//! Every section derives `Deserialize` with `#[serde(default)]`, so a host
//! can ship a partial JSON document and inherit the defaults for the rest:
//!
//! ```
//! use facet_engine::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{ "cache": { "capacity": 64 } }"#).unwrap();
//! assert_eq!(config.cache.capacity, 64);
//! assert_eq!(config.batch_size, 5_000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Result cache bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached results (default: 500). Zero disables caching.
    pub capacity: usize,
    /// Entries older than this are recomputed on access (default: 300 s).
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            ttl_secs: 300,
        }
    }
}

/// When a numeric column switches to bucketed facet options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketPolicy {
    pub enabled: bool,
    /// Minimum indexed rows before bucketing is considered (default: 1000).
    pub min_rows: usize,
    /// Minimum distinct/indexed ratio (default: 0.9).
    pub min_unique_ratio: f64,
    pub min_buckets: usize,
    pub max_buckets: usize,
}

impl BucketPolicy {
    /// Bucket count for a column with `rows` indexed rows.
    ///
    /// `round(sqrt(rows) / 4)` clamped to `[min_buckets, max_buckets]`.
    pub fn bucket_count(&self, rows: usize) -> usize {
        let raw = ((rows as f64).sqrt() / 4.0).round() as usize;
        raw.clamp(self.min_buckets, self.max_buckets)
    }
}

impl Default for BucketPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_rows: 1000,
            min_unique_ratio: 0.9,
            min_buckets: 10,
            max_buckets: 30,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub bucketing: BucketPolicy,
    /// Rows per progressive indexing step (default: 5000).
    pub batch_size: usize,
    /// Row prefix sampled for column kind inference (default: 100).
    pub kind_sample_size: usize,
    /// Keep a selected value visible with count 0 once other filters make it impossible.
    pub keep_unavailable_selections: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            bucketing: BucketPolicy::default(),
            batch_size: 5_000,
            kind_sample_size: 100,
            keep_unavailable_selections: true,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EngineError::Config("batch_size must be positive".into()));
        }
        if self.kind_sample_size == 0 {
            return Err(EngineError::Config("kind_sample_size must be positive".into()));
        }
        let b = &self.bucketing;
        if b.min_buckets == 0 || b.min_buckets > b.max_buckets {
            return Err(EngineError::Config(format!(
                "bucket bounds must satisfy 0 < min <= max (got {}..{})",
                b.min_buckets, b.max_buckets
            )));
        }
        if !(b.min_unique_ratio > 0.0 && b.min_unique_ratio <= 1.0) {
            return Err(EngineError::Config(format!(
                "min_unique_ratio must be in (0, 1] (got {})",
                b.min_unique_ratio
            )));
        }
        Ok(())
    }
}
