//! Drug label adapter backed by the openFDA `drug/label` endpoint
//!
//! A drug query matches on exact brand or generic name, a disease query on the
//! indications section. The adapter first asks for the match count, then
//! fetches up to 1000 labels in one page and reduces each one to a fixed set
//! of label and `openfda` fields.

use crate::client_cache::global_client_cache;
use crate::http::{send_json, with_retry, RetryConfig};
use async_trait::async_trait;
use medlens_types::{
	AdapterError, AdapterInfo, AdapterResult, FetchOptions, FieldValue, Query, QueryKind, Record,
	SourceAdapter, SourceKey, SourceRuntimeConfig,
};
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};
use url::{form_urlencoded, Url};

pub const DEFAULT_BASE_URL: &str = "https://api.fda.gov";

/// openFDA refuses larger pages
const MAX_LIMIT: usize = 1000;

/// Label fields kept from both the top level and the `openfda` block
pub const LABEL_FIELDS: &[&str] = &[
	"adverse_reactions",
	"application_number",
	"brand_name",
	"clinical_pharmacology",
	"clinical_studies",
	"contraindications",
	"description",
	"dosage_and_administration",
	"drug_interactions",
	"generic_name",
	"how_supplied",
	"indications_and_usage",
	"information_for_patients",
	"is_original_packager",
	"laboratory_tests",
	"manufacturer_name",
	"mechanism_of_action",
	"pharm_class_cs",
	"pharm_class_epc",
	"pharm_class_moa",
	"pharmacodynamics",
	"pharmacokinetics",
	"precautions",
	"product_type",
	"route",
	"substance_name",
	"upc",
	"warnings",
	"warnings_and_cautions",
];

/// Section headings that labels repeat at the start of their own text
const SECTION_HEADERS: &[(&str, &str)] = &[
	("description", "Description"),
	("clinical_pharmacology", "Clinical Pharmacology"),
	("indications_and_usage", "Indications and Usage"),
	("contraindications", "Contraindications"),
	("information_for_patients", "Information for Patients"),
	("drug_interactions", "Drug Interactions"),
	("adverse_reactions", "Adverse Reactions"),
	("dosage_and_administration", "Dosage and Administration"),
	("how_supplied", "How Supplied"),
	("pharmacokinetics", "Pharmacokinetics"),
	("warnings_and_cautions", "Warnings and Cautions"),
	("clinical_studies", "Clinical Studies"),
	("pharmacodynamics", "Pharmacodynamic Drug Interaction Studies"),
	("precautions", "Precautions"),
	("warnings", "Warnings"),
];

lazy_static::lazy_static! {
	// Up to two leading words (section numbers, "1", "5.2 ...") may precede the heading
	static ref HEADER_PATTERNS: Vec<(&'static str, Regex)> = SECTION_HEADERS
		.iter()
		.filter_map(|(field, header)| {
			Regex::new(&format!(r"(?i)^((?:\S+\s+){{0,2}}){}\s*:?\s*", regex::escape(header)))
				.ok()
				.map(|re| (*field, re))
		})
		.collect();
}

#[derive(Debug)]
pub struct LabelDataAdapter {
	info: AdapterInfo,
	client: Client,
	config: SourceRuntimeConfig,
	retry: RetryConfig,
}

impl LabelDataAdapter {
	pub fn new(config: SourceRuntimeConfig) -> AdapterResult<Self> {
		let client = global_client_cache().client_for(&config)?;
		Ok(Self::with_client(config, client))
	}

	pub fn with_client(config: SourceRuntimeConfig, client: Client) -> Self {
		let info = AdapterInfo::new(
			SourceKey::LabelData,
			"openFDA Drug Labels",
			config.base_url_or(DEFAULT_BASE_URL),
		)
		.with_description("Structured product labels from the FDA");
		Self {
			info,
			client,
			retry: RetryConfig::with_max_retries(config.max_retries),
			config,
		}
	}

	fn search_url(&self, query: &Query, limit: usize) -> AdapterResult<Url> {
		let term: String = form_urlencoded::byte_serialize(query.text().as_bytes()).collect();
		let search = match query.kind() {
			QueryKind::Drug => format!(
				"brand_name.exact:%22{term}%22+generic_name.exact:%22{term}%22"
			),
			QueryKind::Disease => format!("indications_and_usage:%22{term}%22"),
		};
		let mut raw = format!(
			"{}/drug/label.json?search={}&limit={}",
			self.config.base_url_or(DEFAULT_BASE_URL),
			search,
			limit
		);
		if let Some(key) = &self.config.api_key {
			raw.push_str("&api_key=");
			raw.extend(form_urlencoded::byte_serialize(key.expose_secret().as_bytes()));
		}
		Url::parse(&raw).map_err(|e| AdapterError::ConfigError {
			reason: format!("invalid openFDA URL: {}", e),
		})
	}

	/// GET with retries; openFDA answers 404 when nothing matches
	async fn get(&self, url: Url) -> AdapterResult<Option<Value>> {
		let result = with_retry(&self.retry, "openFDA request", || {
			let request = self.client.get(url.clone());
			send_json(request, SourceKey::LabelData, self.config.timeout_ms)
		})
		.await;
		match result {
			Ok(value) => Ok(Some(value)),
			Err(e) if e.status_code() == Some(404) => Ok(None),
			Err(e) => Err(e),
		}
	}

	async fn total_matches(&self, query: &Query) -> AdapterResult<usize> {
		let Some(body) = self.get(self.search_url(query, 1)?).await? else {
			return Ok(0);
		};
		body.pointer("/meta/results/total")
			.and_then(Value::as_u64)
			.map(|total| total as usize)
			.ok_or_else(|| AdapterError::invalid_response("openFDA response missing meta.results.total"))
	}
}

#[async_trait]
impl SourceAdapter for LabelDataAdapter {
	fn adapter_info(&self) -> &AdapterInfo {
		&self.info
	}

	async fn fetch(&self, query: &Query, options: &FetchOptions) -> AdapterResult<Vec<Record>> {
		let total = self.total_matches(query).await?;
		debug!("openFDA reports {} labels for {}", total, query);
		if total == 0 {
			return Ok(Vec::new());
		}

		let limit = total.min(options.max_results_or(MAX_LIMIT)).min(MAX_LIMIT);
		let Some(body) = self.get(self.search_url(query, limit)?).await? else {
			return Ok(Vec::new());
		};
		let results = body
			.get("results")
			.and_then(Value::as_array)
			.ok_or_else(|| AdapterError::invalid_response("openFDA response missing results"))?;

		let records = filter_labels(results.iter().map(normalize_label).collect(), query);
		info!(
			"openFDA returned {} labels for {} ({} after filtering)",
			results.len(),
			query,
			records.len()
		);
		Ok(records)
	}
}

/// Reduce one raw label to the whitelisted fields, lists joined with `", "`
pub fn normalize_label(raw: &Value) -> Record {
	let mut record = Record::new();
	let Some(object) = raw.as_object() else {
		return record;
	};
	for (key, value) in object {
		if key == "openfda" {
			if let Some(openfda) = value.as_object() {
				for (inner_key, inner_value) in openfda {
					if LABEL_FIELDS.contains(&inner_key.as_str()) {
						record.insert(inner_key.clone(), FieldValue::from_json(inner_value));
					}
				}
			}
		} else if LABEL_FIELDS.contains(&key.as_str()) {
			record.insert(key.clone(), FieldValue::from_json(value));
		}
	}
	strip_section_headers(&mut record);
	record
}

/// Drop a repeated section heading at the start of long text fields
pub fn strip_section_headers(record: &mut Record) {
	for (field, pattern) in HEADER_PATTERNS.iter() {
		if let Some(FieldValue::Text(text)) = record.get_mut(*field) {
			if let Some(found) = pattern.find(text) {
				*text = text[found.end()..].trim().to_string();
			}
		}
	}
}

fn contains_term(record: &Record, field: &str, term: &str) -> bool {
	record
		.get(field)
		.and_then(FieldValue::as_text)
		.map(|value| value.to_lowercase().contains(term))
		.unwrap_or(false)
}

/// Keep labels that carry a name, and for drug queries only those naming the drug
pub fn filter_labels(records: Vec<Record>, query: &Query) -> Vec<Record> {
	let term = query.text().to_lowercase();
	records
		.into_iter()
		.filter(|record| {
			let named = ["brand_name", "generic_name"]
				.iter()
				.any(|field| record.get(*field).map(|v| !v.is_blank()).unwrap_or(false));
			if !named {
				return false;
			}
			match query.kind() {
				QueryKind::Drug => {
					contains_term(record, "brand_name", &term)
						|| contains_term(record, "generic_name", &term)
				},
				QueryKind::Disease => true,
			}
		})
		.collect()
}
