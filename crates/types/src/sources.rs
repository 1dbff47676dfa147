//! The closed set of data sources

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of one of the six supported sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum SourceKey {
	LabelData,
	Trials,
	Filings,
	Literature,
	News,
	Terminology,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceKeyError {
	#[error("Unknown source: {name}")]
	Unknown { name: String },
}

impl SourceKey {
	/// Every source, in canonical order
	pub const ALL: [SourceKey; 6] = [
		SourceKey::LabelData,
		SourceKey::Trials,
		SourceKey::Filings,
		SourceKey::Literature,
		SourceKey::News,
		SourceKey::Terminology,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			SourceKey::LabelData => "label_data",
			SourceKey::Trials => "trials",
			SourceKey::Filings => "filings",
			SourceKey::Literature => "literature",
			SourceKey::News => "news",
			SourceKey::Terminology => "terminology",
		}
	}

	/// Human-readable label shown by the sources listing
	pub fn label(&self) -> &'static str {
		match self {
			SourceKey::LabelData => "FDA Drug Information",
			SourceKey::Trials => "Clinical Trials",
			SourceKey::Filings => "SEC Company Information",
			SourceKey::Literature => "NCBI Publications",
			SourceKey::News => "Latest News",
			SourceKey::Terminology => "SNOMED-CT Medical Terminology",
		}
	}

	/// Match caller-supplied names against the known sources.
	///
	/// Known keys keep first-seen order without duplicates; names matching no
	/// source are collected separately. An empty list selects every source.
	pub fn select<S: AsRef<str>>(names: &[S]) -> SourceSelection {
		if names.is_empty() {
			return SourceSelection {
				keys: Self::ALL.to_vec(),
				unknown: Vec::new(),
			};
		}
		let mut selection = SourceSelection::default();
		for name in names {
			match name.as_ref().parse::<SourceKey>() {
				Ok(key) if !selection.keys.contains(&key) => selection.keys.push(key),
				Ok(_) => {},
				Err(_) => selection.unknown.push(name.as_ref().to_string()),
			}
		}
		selection
	}
}

/// Result of [`SourceKey::select`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSelection {
	pub keys: Vec<SourceKey>,
	pub unknown: Vec<String>,
}

impl fmt::Display for SourceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for SourceKey {
	type Err = SourceKeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"label_data" | "fda" => Ok(SourceKey::LabelData),
			"trials" | "clinical_trials" => Ok(SourceKey::Trials),
			"filings" | "sec" => Ok(SourceKey::Filings),
			"literature" | "ncbi" => Ok(SourceKey::Literature),
			"news" => Ok(SourceKey::News),
			"terminology" | "snomed" => Ok(SourceKey::Terminology),
			_ => Err(SourceKeyError::Unknown {
				name: s.to_string(),
			}),
		}
	}
}

impl Serialize for SourceKey {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for SourceKey {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}
