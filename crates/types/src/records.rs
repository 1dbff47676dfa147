//! Flat records produced by source adapters
//!
//! External payloads are deeply nested and loosely typed. Adapters normalize
//! them into a [`Record`], an ordered map from field name to a scalar
//! [`FieldValue`], so downstream consumers never see raw payload shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Scalar value of a record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(untagged)]
pub enum FieldValue {
	Null,
	Bool(bool),
	Integer(i64),
	Float(f64),
	Text(String),
}

/// A single normalized entity from a source
pub type Record = BTreeMap<String, FieldValue>;

impl FieldValue {
	/// Borrow the text content, if this is a text value
	pub fn as_text(&self) -> Option<&str> {
		match self {
			FieldValue::Text(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			FieldValue::Integer(i) => Some(*i),
			_ => None,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, FieldValue::Null)
	}

	/// True for null and for blank text
	pub fn is_blank(&self) -> bool {
		match self {
			FieldValue::Null => true,
			FieldValue::Text(s) => s.trim().is_empty(),
			_ => false,
		}
	}

	/// Flatten an arbitrary JSON value into a scalar.
	///
	/// Arrays of scalars are joined with `", "`; nested objects are kept as
	/// compact JSON text.
	pub fn from_json(value: &Value) -> FieldValue {
		match value {
			Value::Null => FieldValue::Null,
			Value::Bool(b) => FieldValue::Bool(*b),
			Value::Number(n) => match n.as_i64() {
				Some(i) => FieldValue::Integer(i),
				None => n.as_f64().map(FieldValue::Float).unwrap_or(FieldValue::Null),
			},
			Value::String(s) => FieldValue::Text(s.clone()),
			Value::Array(items) => {
				let parts: Vec<String> = items
					.iter()
					.map(FieldValue::from_json)
					.filter(|v| !v.is_null())
					.map(|v| v.to_string())
					.collect();
				FieldValue::Text(parts.join(", "))
			},
			Value::Object(_) => FieldValue::Text(value.to_string()),
		}
	}
}

impl fmt::Display for FieldValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FieldValue::Null => Ok(()),
			FieldValue::Bool(b) => write!(f, "{}", b),
			FieldValue::Integer(i) => write!(f, "{}", i),
			FieldValue::Float(x) => write!(f, "{}", x),
			FieldValue::Text(s) => f.write_str(s),
		}
	}
}

impl From<&str> for FieldValue {
	fn from(value: &str) -> Self {
		FieldValue::Text(value.to_string())
	}
}

impl From<String> for FieldValue {
	fn from(value: String) -> Self {
		FieldValue::Text(value)
	}
}

impl From<i64> for FieldValue {
	fn from(value: i64) -> Self {
		FieldValue::Integer(value)
	}
}

impl From<f64> for FieldValue {
	fn from(value: f64) -> Self {
		FieldValue::Float(value)
	}
}

impl From<bool> for FieldValue {
	fn from(value: bool) -> Self {
		FieldValue::Bool(value)
	}
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
	fn from(value: Option<T>) -> Self {
		value.map(Into::into).unwrap_or(FieldValue::Null)
	}
}

/// Small helpers for reading nested JSON during normalization
pub mod json {
	use serde_json::Value;

	/// Walk a dotted path such as `protocolSection.statusModule.overallStatus`
	pub fn path<'a>(value: &'a Value, dotted: &str) -> Option<&'a Value> {
		dotted
			.split('.')
			.try_fold(value, |current, segment| current.get(segment))
	}

	/// String at a dotted path, empty when absent or not a string
	pub fn str_at(value: &Value, dotted: &str) -> String {
		path(value, dotted)
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string()
	}

	/// Array at a dotted path, empty slice when absent
	pub fn array_at<'a>(value: &'a Value, dotted: &str) -> &'a [Value] {
		path(value, dotted)
			.and_then(Value::as_array)
			.map(Vec::as_slice)
			.unwrap_or(&[])
	}

	/// Join the string elements of an array at a dotted path
	pub fn joined_at(value: &Value, dotted: &str, sep: &str) -> String {
		array_at(value, dotted)
			.iter()
			.filter_map(Value::as_str)
			.collect::<Vec<_>>()
			.join(sep)
	}
}
