//! Per-source outcomes and the aggregated response

use crate::records::Record;
use crate::sources::SourceKey;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of one source for one query.
///
/// Exactly one variant is ever present: a failure never carries records.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResult {
	Success(Vec<Record>),
	Failure(String),
}

impl SourceResult {
	pub fn failure(message: impl Into<String>) -> Self {
		SourceResult::Failure(message.into())
	}

	pub fn is_success(&self) -> bool {
		matches!(self, SourceResult::Success(_))
	}

	pub fn is_failure(&self) -> bool {
		matches!(self, SourceResult::Failure(_))
	}

	/// Records of a success, `None` for a failure
	pub fn records(&self) -> Option<&[Record]> {
		match self {
			SourceResult::Success(records) => Some(records),
			SourceResult::Failure(_) => None,
		}
	}

	pub fn error(&self) -> Option<&str> {
		match self {
			SourceResult::Success(_) => None,
			SourceResult::Failure(message) => Some(message),
		}
	}
}

impl<E: std::fmt::Display> From<Result<Vec<Record>, E>> for SourceResult {
	fn from(result: Result<Vec<Record>, E>) -> Self {
		match result {
			Ok(records) => SourceResult::Success(records),
			Err(e) => SourceResult::Failure(e.to_string()),
		}
	}
}

// Success is a bare array of records, failure is `{"error": "..."}`.
impl Serialize for SourceResult {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match self {
			SourceResult::Success(records) => records.serialize(serializer),
			SourceResult::Failure(message) => {
				let mut map = serializer.serialize_map(Some(1))?;
				map.serialize_entry("error", message)?;
				map.end()
			},
		}
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireSourceResult {
	Records(Vec<Record>),
	Error { error: String },
}

impl<'de> Deserialize<'de> for SourceResult {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Ok(match WireSourceResult::deserialize(deserializer)? {
			WireSourceResult::Records(records) => SourceResult::Success(records),
			WireSourceResult::Error { error } => SourceResult::Failure(error),
		})
	}
}

/// One entry per requested source, nothing more.
///
/// Built once by the aggregator and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatedResponse {
	entries: BTreeMap<SourceKey, SourceResult>,
}

impl AggregatedResponse {
	/// Build from `(key, result)` pairs; a repeated key keeps the last result
	pub fn from_entries(entries: impl IntoIterator<Item = (SourceKey, SourceResult)>) -> Self {
		Self {
			entries: entries.into_iter().collect(),
		}
	}

	pub fn get(&self, key: SourceKey) -> Option<&SourceResult> {
		self.entries.get(&key)
	}

	pub fn contains(&self, key: SourceKey) -> bool {
		self.entries.contains_key(&key)
	}

	pub fn keys(&self) -> impl Iterator<Item = SourceKey> + '_ {
		self.entries.keys().copied()
	}

	pub fn iter(&self) -> impl Iterator<Item = (SourceKey, &SourceResult)> {
		self.entries.iter().map(|(k, v)| (*k, v))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Records for a source, empty when the source failed or was not requested
	pub fn records(&self, key: SourceKey) -> &[Record] {
		self.get(key).and_then(SourceResult::records).unwrap_or(&[])
	}

	pub fn success_count(&self) -> usize {
		self.entries.values().filter(|r| r.is_success()).count()
	}

	pub fn failure_count(&self) -> usize {
		self.entries.values().filter(|r| r.is_failure()).count()
	}
}
