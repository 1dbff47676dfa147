//! News adapter backed by the Serper news search API
//!
//! Articles are normalized into flat records, relative dates ("3 days ago")
//! are pinned to calendar dates, and each article is tagged with a category
//! by keyword scoring so the summarizer can build per-category digests.

use crate::client_cache::global_client_cache;
use crate::http::{send_json, with_retry, RetryConfig};
use async_trait::async_trait;
use chrono::{Duration as DateDuration, Local, NaiveDate, NaiveDateTime};
use medlens_types::records::json;
use medlens_types::{
	AdapterError, AdapterInfo, AdapterResult, FetchOptions, FieldValue, Query, Record,
	SecretString, SourceAdapter, SourceKey, SourceRuntimeConfig,
};
use reqwest::Client;
use serde_json::{json, Value};
use std::fmt;
use tracing::info;

pub const DEFAULT_BASE_URL: &str = "https://google.serper.dev";
pub const DEFAULT_MAX_RESULTS: usize = 20;
pub const DEFAULT_DAYS_BACK: u32 = 30;

/// Titles per category digest
const DIGEST_SIZE: usize = 5;

const REGULATORY_KEYWORDS: &[&str] = &[
	"fda", "ema", "approval", "regulation", "patent", "clinical trial", "phase", "regulatory",
	"safety", "recall", "warning", "compliance", "guidance", "legal", "lawsuit", "settlement",
	"legislation", "law", "investigation", "inspection", "license", "clearance", "authorized",
	"rejected", "delay", "advisory committee", "protocol", "guideline",
];

const COMMERCIAL_KEYWORDS: &[&str] = &[
	"market", "sales", "revenue", "profit", "launch", "commercial", "distribution",
	"partnership", "deal", "agreement", "acquisition", "merger", "investment", "stock", "shares",
	"financial", "price", "cost", "reimbursement", "insurance", "discount", "wholesale", "retail",
	"prescriptions", "marketing", "advertising", "promotion", "competition", "competitor",
	"market share", "growth", "forecast",
];

const CLINICAL_KEYWORDS: &[&str] = &[
	"clinical", "trial", "study", "research", "patient", "treatment", "efficacy", "outcome",
	"endpoint", "data", "results", "adverse", "effect", "response", "therapy", "therapeutic",
	"dosage", "dose", "regimen", "indication", "contraindication", "protocol", "cohort",
	"placebo", "randomized", "blind", "publication", "journal", "paper", "conference",
	"presentation", "abstract", "poster", "scientific",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NewsCategory {
	Regulatory,
	Commercial,
	Clinical,
	Other,
}

impl NewsCategory {
	/// Tie-break order when scores are equal
	pub const ALL: [NewsCategory; 4] = [
		NewsCategory::Regulatory,
		NewsCategory::Commercial,
		NewsCategory::Clinical,
		NewsCategory::Other,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			NewsCategory::Regulatory => "regulatory",
			NewsCategory::Commercial => "commercial",
			NewsCategory::Clinical => "clinical",
			NewsCategory::Other => "other",
		}
	}
}

impl fmt::Display for NewsCategory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

fn keyword_score(text: &str, keywords: &[&str]) -> usize {
	keywords.iter().filter(|kw| text.contains(*kw)).count()
}

/// Category with the highest keyword score; `Other` when nothing matches
pub fn categorize(text: &str) -> NewsCategory {
	let text = text.to_lowercase();
	let scores = [
		(NewsCategory::Regulatory, keyword_score(&text, REGULATORY_KEYWORDS)),
		(NewsCategory::Commercial, keyword_score(&text, COMMERCIAL_KEYWORDS)),
		(NewsCategory::Clinical, keyword_score(&text, CLINICAL_KEYWORDS)),
	];
	let best = scores.iter().map(|(_, score)| *score).max().unwrap_or(0);
	if best == 0 {
		return NewsCategory::Other;
	}
	scores
		.iter()
		.find(|(_, score)| *score == best)
		.map(|(category, _)| *category)
		.unwrap_or(NewsCategory::Other)
}

/// Pin "N hours/days/weeks ago" and ISO dates to `YYYY-MM-DD`; anything
/// else is returned unchanged
pub fn normalize_date(raw: &str, now: NaiveDateTime) -> String {
	let lower = raw.trim().to_lowercase();
	if lower.contains("ago") {
		let parts: Vec<&str> = lower.split_whitespace().collect();
		if parts.len() >= 3 {
			if let Ok(amount) = parts[0].parse::<i64>() {
				let offset = match parts[1].trim_end_matches('s') {
					"minute" => Some(DateDuration::minutes(amount)),
					"hour" => Some(DateDuration::hours(amount)),
					"day" => Some(DateDuration::days(amount)),
					"week" => Some(DateDuration::weeks(amount)),
					_ => None,
				};
				if let Some(offset) = offset {
					return (now - offset).format("%Y-%m-%d").to_string();
				}
			}
		}
		return raw.to_string();
	}
	match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
		Ok(date) => date.format("%Y-%m-%d").to_string(),
		Err(_) => raw.to_string(),
	}
}

/// Flatten one Serper news item
pub fn normalize_article(item: &Value, position: usize, now: NaiveDateTime) -> Record {
	let title = json::str_at(item, "title");
	let snippet = json::str_at(item, "snippet");
	let category = categorize(&format!("{} {}", title, snippet));

	let mut record = Record::new();
	record.insert("position".to_string(), FieldValue::Integer(position as i64));
	record.insert("link".to_string(), json::str_at(item, "link").into());
	record.insert("source".to_string(), json::str_at(item, "source").into());
	record.insert("date".to_string(), normalize_date(&json::str_at(item, "date"), now).into());
	record.insert("thumbnail".to_string(), json::str_at(item, "imageUrl").into());
	record.insert("category".to_string(), category.as_str().into());
	record.insert("title".to_string(), title.into());
	record.insert("snippet".to_string(), snippet.into());
	record
}

/// One-line digest per category: the newest titles, or a "no news" line
pub fn category_summaries(records: &[Record]) -> Vec<(NewsCategory, String)> {
	NewsCategory::ALL
		.iter()
		.map(|category| {
			let mut articles: Vec<&Record> = records
				.iter()
				.filter(|r| r.get("category").and_then(FieldValue::as_text) == Some(category.as_str()))
				.collect();
			if articles.is_empty() {
				return (*category, format!("No {} news available.", category));
			}
			let date_of = |r: &Record| {
				r.get("date")
					.and_then(FieldValue::as_text)
					.unwrap_or_default()
					.to_string()
			};
			articles.sort_by(|a, b| date_of(b).cmp(&date_of(a)));

			let topics: Vec<String> = articles
				.iter()
				.take(DIGEST_SIZE)
				.filter_map(|r| r.get("title").and_then(FieldValue::as_text))
				.map(|title| title.split_whitespace().collect::<Vec<_>>().join(" "))
				.filter(|title| !title.is_empty())
				.collect();
			let line = if topics.is_empty() {
				format!("No significant {} news available.", category)
			} else {
				format!("Recent {} news includes: {}.", category, topics.join("; "))
			};
			(*category, line)
		})
		.collect()
}

#[derive(Debug)]
pub struct NewsAdapter {
	info: AdapterInfo,
	client: Client,
	base_url: String,
	timeout_ms: u64,
	api_key: Option<SecretString>,
	retry: RetryConfig,
}

impl NewsAdapter {
	pub fn new(config: SourceRuntimeConfig) -> AdapterResult<Self> {
		let client = global_client_cache().client_for(&config)?;
		Ok(Self::with_client(config, client))
	}

	pub fn with_client(config: SourceRuntimeConfig, client: Client) -> Self {
		let base_url = config.base_url_or(DEFAULT_BASE_URL).to_string();
		Self {
			info: AdapterInfo::new(SourceKey::News, "Serper News", base_url.clone())
				.with_description("Recent news coverage via Google News search"),
			client,
			base_url,
			timeout_ms: config.timeout_ms,
			retry: RetryConfig::with_max_retries(config.max_retries),
			api_key: config.api_key.filter(|key| !key.is_empty()),
		}
	}
}

#[async_trait]
impl SourceAdapter for NewsAdapter {
	fn adapter_info(&self) -> &AdapterInfo {
		&self.info
	}

	async fn fetch(&self, query: &Query, options: &FetchOptions) -> AdapterResult<Vec<Record>> {
		let Some(api_key) = &self.api_key else {
			return Err(AdapterError::MissingCredential {
				source_name: SourceKey::News.to_string(),
			});
		};

		let payload = json!({
			"q": format!("{} after:{} days ago", query.text(), options.days_back_or(DEFAULT_DAYS_BACK)),
			"num": options.max_results_or(DEFAULT_MAX_RESULTS),
			"gl": "us",
			"hl": "en",
		});
		let url = format!("{}/news", self.base_url);
		let body = with_retry(&self.retry, "Serper news search", || {
			let request = self
				.client
				.post(&url)
				.header("X-API-KEY", api_key.expose_secret())
				.json(&payload);
			send_json(request, SourceKey::News, self.timeout_ms)
		})
		.await?;

		let now = Local::now().naive_local();
		let records: Vec<Record> = json::array_at(&body, "news")
			.iter()
			.enumerate()
			.map(|(i, item)| normalize_article(item, i, now))
			.collect();
		info!("Serper returned {} news articles for {}", records.len(), query);
		Ok(records)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json as value;

	fn now() -> NaiveDateTime {
		NaiveDate::from_ymd_opt(2024, 5, 10)
			.unwrap()
			.and_hms_opt(12, 0, 0)
			.unwrap()
	}

	fn article(title: &str, date: &str, category: NewsCategory) -> Record {
		let mut record = Record::new();
		record.insert("title".to_string(), title.into());
		record.insert("date".to_string(), date.into());
		record.insert("category".to_string(), category.as_str().into());
		record
	}

	#[test]
	fn test_relative_dates() {
		assert_eq!(normalize_date("2 hours ago", now()), "2024-05-10");
		assert_eq!(normalize_date("3 days ago", now()), "2024-05-07");
		assert_eq!(normalize_date("1 week ago", now()), "2024-05-03");
		assert_eq!(normalize_date("2024-01-02", now()), "2024-01-02");
		assert_eq!(normalize_date("Mar 3, 2024", now()), "Mar 3, 2024");
		assert_eq!(normalize_date("a while ago", now()), "a while ago");
		assert_eq!(normalize_date("", now()), "");
	}

	#[test]
	fn test_categorize() {
		assert_eq!(categorize("FDA approval granted after advisory committee"), NewsCategory::Regulatory);
		assert_eq!(categorize("Quarterly sales and revenue beat forecast"), NewsCategory::Commercial);
		assert_eq!(categorize("Randomized placebo cohort shows efficacy"), NewsCategory::Clinical);
		assert_eq!(categorize("Local bakery opens"), NewsCategory::Other);
	}

	#[test]
	fn test_categorize_tie_prefers_regulatory() {
		// one regulatory hit ("recall") and one commercial hit ("stock")
		assert_eq!(categorize("recall stock"), NewsCategory::Regulatory);
	}

	#[test]
	fn test_normalize_article() {
		let item = value!({
			"title": "Aspirin recall announced",
			"link": "https://news.example/a",
			"snippet": "FDA warning",
			"source": "Example News",
			"date": "3 days ago",
			"imageUrl": "https://img.example/a.png"
		});
		let record = normalize_article(&item, 4, now());
		assert_eq!(record["position"], FieldValue::Integer(4));
		assert_eq!(record["date"], FieldValue::from("2024-05-07"));
		assert_eq!(record["category"], FieldValue::from("regulatory"));
		assert_eq!(record["thumbnail"], FieldValue::from("https://img.example/a.png"));
	}

	#[test]
	fn test_category_summaries() {
		let records = vec![
			article("Old  approval", "2024-01-01", NewsCategory::Regulatory),
			article("New recall", "2024-05-01", NewsCategory::Regulatory),
			article("Trial readout", "2024-04-01", NewsCategory::Clinical),
		];
		let summaries = category_summaries(&records);
		assert_eq!(summaries.len(), 4);
		assert_eq!(
			summaries[0],
			(
				NewsCategory::Regulatory,
				"Recent regulatory news includes: New recall; Old approval.".to_string()
			)
		);
		assert_eq!(summaries[1].1, "No commercial news available.");
		assert_eq!(summaries[2].1, "Recent clinical news includes: Trial readout.");
		assert_eq!(summaries[3].1, "No other news available.");
	}

	#[tokio::test]
	async fn test_missing_key_is_an_error() {
		let adapter = NewsAdapter::with_client(SourceRuntimeConfig::new(SourceKey::News), Client::new());
		let err = adapter
			.fetch(&Query::drug("aspirin").unwrap(), &FetchOptions::default())
			.await
			.unwrap_err();
		assert_eq!(err.to_string(), "news API key is not configured");
	}
}
