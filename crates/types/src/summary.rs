//! Summaries produced from an aggregated response

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;

/// Overview text attached to every summarization error
pub const SUMMARY_ERROR_OVERVIEW: &str = "Unable to generate summary due to an error.";

/// Named sections of generated text, or the reason summarization failed
#[derive(Debug, Clone, PartialEq)]
pub enum Summary {
	Sections(BTreeMap<String, String>),
	Error { message: String },
}

impl Summary {
	pub fn error(message: impl Into<String>) -> Self {
		Summary::Error {
			message: message.into(),
		}
	}

	pub fn is_error(&self) -> bool {
		matches!(self, Summary::Error { .. })
	}

	pub fn section(&self, name: &str) -> Option<&str> {
		match self {
			Summary::Sections(sections) => sections.get(name).map(String::as_str),
			Summary::Error { .. } => None,
		}
	}
}

impl Serialize for Summary {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match self {
			Summary::Sections(sections) => sections.serialize(serializer),
			Summary::Error { message } => {
				let mut map = serializer.serialize_map(Some(2))?;
				map.serialize_entry("error", message)?;
				map.serialize_entry("overview", SUMMARY_ERROR_OVERVIEW)?;
				map.end()
			},
		}
	}
}
