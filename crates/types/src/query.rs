//! Validated search query
//!
//! A [`Query`] is the pair of free text and [`QueryKind`] that every source
//! adapter receives. It is validated once at construction and never mutated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Interpretation of the query text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
	#[default]
	Drug,
	Disease,
}

impl QueryKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			QueryKind::Drug => "drug",
			QueryKind::Disease => "disease",
		}
	}
}

impl fmt::Display for QueryKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for QueryKind {
	type Err = QueryValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"drug" => Ok(QueryKind::Drug),
			"disease" => Ok(QueryKind::Disease),
			other => Err(QueryValidationError::UnknownKind {
				kind: other.to_string(),
			}),
		}
	}
}

/// Request-level validation failures, raised before any adapter runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryValidationError {
	#[error("Query parameter is required")]
	EmptyQuery,

	#[error("Unknown query type: {kind} (expected 'drug' or 'disease')")]
	UnknownKind { kind: String },
}

pub type QueryValidationResult<T> = Result<T, QueryValidationError>;

/// Immutable, validated query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Query {
	text: String,
	kind: QueryKind,
}

impl Query {
	/// Build a query, rejecting blank text
	///
	/// The text is stored exactly as given; only whitespace-only input is refused.
	pub fn new(text: impl Into<String>, kind: QueryKind) -> QueryValidationResult<Self> {
		let text = text.into();
		if text.trim().is_empty() {
			return Err(QueryValidationError::EmptyQuery);
		}
		Ok(Self { text, kind })
	}

	/// Build a query from raw request fields; a missing kind defaults to drug
	pub fn parse(text: &str, kind: Option<&str>) -> QueryValidationResult<Self> {
		let kind = match kind {
			Some(raw) => raw.parse()?,
			None => QueryKind::default(),
		};
		Self::new(text, kind)
	}

	pub fn drug(text: impl Into<String>) -> QueryValidationResult<Self> {
		Self::new(text, QueryKind::Drug)
	}

	pub fn disease(text: impl Into<String>) -> QueryValidationResult<Self> {
		Self::new(text, QueryKind::Disease)
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn kind(&self) -> QueryKind {
		self.kind
	}
}

impl fmt::Display for Query {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.text, self.kind)
	}
}
