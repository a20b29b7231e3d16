//! In-memory faceted filter engine for tabular data.
//!
//! Builds one inverted index per column over an immutable row snapshot,
//! answers multi-column filters by ordered set intersection, and derives the
//! options still available in each column under the other active filters.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod job;
pub mod metrics;
pub mod query;
pub mod store;

pub use cache::{CacheKey, CacheStats};
pub use config::{BucketPolicy, CacheConfig, EngineConfig};
pub use engine::FilterEngine;
pub use error::{EngineError, Result};
pub use index::{BucketLayout, ColumnIndex, MergeStats};
pub use job::{AbortSignal, IndexJob, JobStatus};
pub use metrics::{EngineMetrics, MetricsSnapshot, Operation};
pub use query::{FacetOption, FilterState};
pub use store::{ColumnKind, Record, RowRef, Scalar, Schema, MISSING_VALUE};
