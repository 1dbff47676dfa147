//! Literature adapter backed by NCBI E-utilities (PubMed)
//!
//! `esearch` finds PubMed ids whose title or abstract mentions the query
//! within a publication-date window; `esummary` then returns the citation
//! metadata for those ids in a single request. NCBI caps clients at three
//! requests per second, ten with an API key, so every request waits for a
//! slot on the adapter's [`RateLimiter`].

use crate::client_cache::global_client_cache;
use crate::http::{send_json, with_retry, RateLimiter, RetryConfig};
use async_trait::async_trait;
use chrono::{Duration as DateDuration, NaiveDate, Utc};
use medlens_types::records::json;
use medlens_types::{
	AdapterInfo, AdapterResult, FetchOptions, Query, Record, SecretString, SourceAdapter, SourceKey,
	SourceRuntimeConfig,
};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const DEFAULT_EMAIL: &str = "admin@example.com";
pub const TOOL_NAME: &str = "medlens_aggregator";

pub const DEFAULT_DAYS_BACK: u32 = 90;
pub const DEFAULT_MAX_RESULTS: usize = 100;

const KEYED_REQUESTS_PER_SECOND: u32 = 10;
const ANONYMOUS_REQUESTS_PER_SECOND: u32 = 3;

#[derive(Debug)]
pub struct LiteratureAdapter {
	info: AdapterInfo,
	client: Client,
	base_url: String,
	timeout_ms: u64,
	api_key: Option<SecretString>,
	email: String,
	retry: RetryConfig,
	limiter: RateLimiter,
}

impl LiteratureAdapter {
	pub fn new(config: SourceRuntimeConfig) -> AdapterResult<Self> {
		let client = global_client_cache().client_for(&config)?;
		Ok(Self::with_client(config, client))
	}

	pub fn with_client(config: SourceRuntimeConfig, client: Client) -> Self {
		let base_url = config.base_url_or(DEFAULT_BASE_URL).to_string();
		let limiter = RateLimiter::per_second(requests_per_second(config.api_key.is_some()));
		Self {
			info: AdapterInfo::new(SourceKey::Literature, "NCBI PubMed", base_url.clone())
				.with_description("Recent publications indexed in PubMed"),
			client,
			base_url,
			timeout_ms: config.timeout_ms,
			email: config.contact.clone().unwrap_or_else(|| DEFAULT_EMAIL.to_string()),
			api_key: config.api_key,
			retry: RetryConfig::with_max_retries(config.max_retries),
			limiter,
		}
	}

	pub fn min_request_interval(&self) -> std::time::Duration {
		self.limiter.min_interval()
	}

	fn common_params(&self) -> Vec<(&'static str, String)> {
		let mut params = vec![
			("db", "pubmed".to_string()),
			("retmode", "json".to_string()),
			("tool", TOOL_NAME.to_string()),
			("email", self.email.clone()),
		];
		if let Some(key) = &self.api_key {
			params.push(("api_key", key.expose_secret().to_string()));
		}
		params
	}

	async fn get(&self, endpoint: &str, params: Vec<(&'static str, String)>) -> AdapterResult<Value> {
		let url = format!("{}/{}", self.base_url, endpoint);
		with_retry(&self.retry, endpoint, || {
			let request = self.client.get(&url).query(&params);
			async move {
				self.limiter.wait_for_slot().await;
				send_json(request, SourceKey::Literature, self.timeout_ms).await
			}
		})
		.await
	}

	/// PubMed ids for the query, most relevant first
	pub async fn search_ids(
		&self,
		query: &Query,
		max_results: usize,
		days_back: u32,
	) -> AdapterResult<Vec<String>> {
		let (from, to) = date_window(Utc::now().date_naive(), days_back);
		let mut params = self.common_params();
		params.extend([
			("term", format!("{}[Title/Abstract]", query.text())),
			("mindate", from),
			("maxdate", to),
			("datetype", "pdat".to_string()),
			("retmax", max_results.to_string()),
			("sort", "relevance".to_string()),
		]);
		let body = self.get("esearch.fcgi", params).await?;
		Ok(json::array_at(&body, "esearchresult.idlist")
			.iter()
			.filter_map(|id| id.as_str().map(str::to_string))
			.collect())
	}

	pub async fn summaries(&self, ids: &[String]) -> AdapterResult<Vec<Record>> {
		let mut params = self.common_params();
		params.push(("id", ids.join(",")));
		let body = self.get("esummary.fcgi", params).await?;
		Ok(parse_summaries(&body))
	}
}

#[async_trait]
impl SourceAdapter for LiteratureAdapter {
	fn adapter_info(&self) -> &AdapterInfo {
		&self.info
	}

	async fn fetch(&self, query: &Query, options: &FetchOptions) -> AdapterResult<Vec<Record>> {
		let days_back = options.days_back_or(DEFAULT_DAYS_BACK);
		let ids = self
			.search_ids(query, options.max_results_or(DEFAULT_MAX_RESULTS), days_back)
			.await?;
		if ids.is_empty() {
			debug!("No publications for {} in the last {} days", query, days_back);
			return Ok(Vec::new());
		}

		let records = self.summaries(&ids).await?;
		info!("PubMed returned {} publications for {}", records.len(), query);
		Ok(records)
	}
}

pub fn requests_per_second(has_api_key: bool) -> u32 {
	if has_api_key {
		KEYED_REQUESTS_PER_SECOND
	} else {
		ANONYMOUS_REQUESTS_PER_SECOND
	}
}

/// `(mindate, maxdate)` in the `YYYY/MM/DD` form E-utilities expects
pub fn date_window(today: NaiveDate, days_back: u32) -> (String, String) {
	let from = today - DateDuration::days(i64::from(days_back));
	(
		from.format("%Y/%m/%d").to_string(),
		today.format("%Y/%m/%d").to_string(),
	)
}

/// Citation records from an `esummary` body, in the order of `result.uids`
pub fn parse_summaries(body: &Value) -> Vec<Record> {
	let Some(result) = body.get("result") else {
		return Vec::new();
	};
	json::array_at(result, "uids")
		.iter()
		.filter_map(Value::as_str)
		.filter_map(|uid| result.get(uid).map(|doc| (uid, doc)))
		.map(|(uid, doc)| {
			let mut record = Record::new();
			record.insert("pmid".to_string(), uid.into());
			record.insert("title".to_string(), json::str_at(doc, "title").into());
			let journal = match json::str_at(doc, "fulljournalname") {
				name if name.is_empty() => json::str_at(doc, "source"),
				name => name,
			};
			record.insert("journal".to_string(), journal.into());
			record.insert("publication_date".to_string(), json::str_at(doc, "pubdate").into());
			let authors: Vec<String> = json::array_at(doc, "authors")
				.iter()
				.map(|author| json::str_at(author, "name"))
				.filter(|name| !name.is_empty())
				.collect();
			record.insert("authors".to_string(), authors.join(", ").into());
			let doi = json::array_at(doc, "articleids")
				.iter()
				.find(|id| json::str_at(id, "idtype") == "doi")
				.map(|id| json::str_at(id, "value"))
				.unwrap_or_default();
			record.insert("doi".to_string(), doi.into());
			record
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use medlens_types::FieldValue;
	use serde_json::json as value;

	#[test]
	fn test_rate_depends_on_api_key() {
		let anonymous = LiteratureAdapter::with_client(
			SourceRuntimeConfig::new(SourceKey::Literature),
			Client::new(),
		);
		assert_eq!(anonymous.min_request_interval().as_millis(), 333);

		let keyed = LiteratureAdapter::with_client(
			SourceRuntimeConfig::new(SourceKey::Literature).with_api_key(SecretString::new("k")),
			Client::new(),
		);
		assert_eq!(keyed.min_request_interval().as_millis(), 100);
	}

	#[test]
	fn test_date_window() {
		let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
		let (from, to) = date_window(today, 90);
		assert_eq!(from, "2023/12/02");
		assert_eq!(to, "2024/03/01");
	}

	#[test]
	fn test_parse_summaries() {
		let body = value!({
			"result": {
				"uids": ["222", "111", "999"],
				"111": {"title": "Second", "source": "BMJ", "pubdate": "2024 Jan", "authors": []},
				"222": {
					"title": "First",
					"fulljournalname": "The Lancet",
					"source": "Lancet",
					"pubdate": "2024 Feb 3",
					"authors": [{"name": "Smith J"}, {"name": "Doe A"}],
					"articleids": [{"idtype": "pubmed", "value": "222"}, {"idtype": "doi", "value": "10.1/x"}]
				}
			}
		});
		let records = parse_summaries(&body);
		assert_eq!(records.len(), 2);
		assert_eq!(records[0]["pmid"], FieldValue::from("222"));
		assert_eq!(records[0]["journal"], FieldValue::from("The Lancet"));
		assert_eq!(records[0]["authors"], FieldValue::from("Smith J, Doe A"));
		assert_eq!(records[0]["doi"], FieldValue::from("10.1/x"));
		assert_eq!(records[1]["journal"], FieldValue::from("BMJ"));
		assert_eq!(records[1]["authors"], FieldValue::from(""));
	}

	#[test]
	fn test_parse_summaries_without_result() {
		assert!(parse_summaries(&value!({"error": "bad"})).is_empty());
	}
}
