//! MedLens Types
//!
//! Shared models and traits for the MedLens aggregator: the validated query,
//! the closed set of sources, normalized records, per-source results and the
//! source adapter contract.

pub mod adapters;
pub mod models;
pub mod query;
pub mod records;
pub mod results;
pub mod sources;
pub mod summary;

// Re-export chrono and serde_json for convenience
pub use chrono;
pub use serde_json;

pub use adapters::{
	AdapterError, AdapterFactoryError, AdapterFactoryResult, AdapterInfo, AdapterResult,
	FetchOptions, SourceAdapter, SourceRuntimeConfig,
};
pub use models::SecretString;
pub use query::{Query, QueryKind, QueryValidationError, QueryValidationResult};
pub use records::{FieldValue, Record};
pub use results::{AggregatedResponse, SourceResult};
pub use sources::{SourceKey, SourceKeyError, SourceSelection};
pub use summary::{Summary, SUMMARY_ERROR_OVERVIEW};
