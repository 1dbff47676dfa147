//! Company filings adapter (SEC EDGAR)
//!
//! The query is first resolved to a ticker through a tiered resolver: exact
//! match against a curated table of pharmaceutical companies, then partial
//! match against the same table, then a search of the SEC ticker index. When
//! the query does not name a company it is treated as a drug and mapped to
//! companies whose name mentions it, falling back to the first few table
//! entries. Each company is enriched with XBRL facts and recent filings.

use crate::client_cache::global_client_cache;
use crate::http::{send_json, with_retry, RetryConfig};
use crate::resolver::{ResolverStrategy, TieredResolver};
use async_trait::async_trait;
use medlens_types::records::json;
use medlens_types::{
	AdapterError, AdapterInfo, AdapterResult, FetchOptions, FieldValue, Query, Record,
	SourceAdapter, SourceKey, SourceRuntimeConfig,
};
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://data.sec.gov/api";
pub const DEFAULT_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";
pub const DEFAULT_USER_AGENT: &str = "MedLens Aggregator admin@example.com";

/// Spacing between per-company requests
const COMPANY_SPACING: Duration = Duration::from_millis(100);
const FALLBACK_COMPANIES: usize = 3;
const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Curated table of major pharmaceutical companies, in lookup order
pub const PHARMA_COMPANIES: &[(&str, &str)] = &[
	("JNJ", "Johnson & Johnson"),
	("PFE", "Pfizer Inc."),
	("NVS", "Novartis AG"),
	("MRK", "Merck & Co., Inc."),
	("ABBV", "AbbVie Inc."),
	("AMGN", "Amgen Inc."),
	("BMY", "Bristol-Myers Squibb Company"),
	("GSK", "GlaxoSmithKline plc"),
	("AZN", "AstraZeneca PLC"),
	("SNY", "Sanofi"),
	("LLY", "Eli Lilly and Company"),
	("GILD", "Gilead Sciences, Inc."),
	("BIIB", "Biogen Inc."),
	("REGN", "Regeneron Pharmaceuticals, Inc."),
	("VRTX", "Vertex Pharmaceuticals Incorporated"),
	("MRNA", "Moderna, Inc."),
	("BHC", "Bausch Health Companies Inc."),
	("TEVA", "Teva Pharmaceutical Industries Limited"),
	("ALXN", "Alexion Pharmaceuticals, Inc."),
	("ZTS", "Zoetis Inc."),
	("RHHBY", "Roche Holding AG"),
	("RPRX", "Royalty Pharma plc"),
	("HZNP", "Horizon Therapeutics Public Limited Company"),
	("JAZZ", "Jazz Pharmaceuticals plc"),
	("INCY", "Incyte Corporation"),
	("ALNY", "Alnylam Pharmaceuticals, Inc."),
	("SGEN", "Seagen Inc."),
	("UTHR", "United Therapeutics Corporation"),
	("NBIX", "Neurocrine Biosciences, Inc."),
	("IONS", "Ionis Pharmaceuticals, Inc."),
];

lazy_static::lazy_static! {
	static ref CORPORATE_SUFFIX: Option<Regex> =
		Regex::new(r"(?i)\s+(Inc\.?|Ltd\.?|plc|LLC|Corporation|Company|AG|Co\.|&\s+Co\.)$").ok();
	static ref INDUSTRY_TAIL: Option<Regex> =
		Regex::new(r"(?i)\s+(Pharmaceuticals|Therapeutics|Biosciences|Biotechnology).*$").ok();
}

/// How a company was associated with the query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
	DirectCompanyLookup,
	CompanyName,
	Fallback,
}

impl MatchType {
	pub fn as_str(&self) -> &'static str {
		match self {
			MatchType::DirectCompanyLookup => "direct_company_lookup",
			MatchType::CompanyName => "company_name",
			MatchType::Fallback => "fallback",
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyCandidate {
	pub ticker: String,
	pub name: String,
	pub match_type: MatchType,
}

impl CompanyCandidate {
	fn new(ticker: &str, name: &str, match_type: MatchType) -> Self {
		Self {
			ticker: ticker.to_string(),
			name: name.to_string(),
			match_type,
		}
	}
}

/// Lower-cased names and aliases of the curated companies
#[derive(Debug)]
pub struct CompanyDirectory {
	aliases: Vec<(String, &'static str, &'static str)>,
}

impl CompanyDirectory {
	pub fn new() -> Self {
		let mut aliases = Vec::new();
		for (ticker, name) in PHARMA_COMPANIES {
			let full = name.to_lowercase();
			let simplified = strip(&CORPORATE_SUFFIX, name).to_lowercase();
			let short = strip(&INDUSTRY_TAIL, name).to_lowercase();
			aliases.push((full.clone(), *ticker, *name));
			if simplified != full {
				aliases.push((simplified.clone(), *ticker, *name));
			}
			if short != full && short != simplified {
				aliases.push((short, *ticker, *name));
			}
		}
		Self { aliases }
	}

	pub fn name_for_ticker(&self, ticker: &str) -> Option<&'static str> {
		PHARMA_COMPANIES
			.iter()
			.find(|(t, _)| t.eq_ignore_ascii_case(ticker))
			.map(|(_, name)| *name)
	}

	/// Ticker symbol or exact (alias) name
	pub fn exact(&self, input: &str) -> Option<CompanyCandidate> {
		let needle = input.trim().to_lowercase();
		if let Some((ticker, name)) = PHARMA_COMPANIES
			.iter()
			.find(|(t, _)| t.eq_ignore_ascii_case(&needle))
		{
			return Some(CompanyCandidate::new(ticker, name, MatchType::DirectCompanyLookup));
		}
		self.aliases
			.iter()
			.find(|(alias, _, _)| *alias == needle)
			.map(|(_, ticker, name)| CompanyCandidate::new(ticker, name, MatchType::DirectCompanyLookup))
	}

	/// Either string contains the other
	pub fn partial(&self, input: &str) -> Option<CompanyCandidate> {
		let needle = input.trim().to_lowercase();
		if needle.is_empty() {
			return None;
		}
		self.aliases
			.iter()
			.find(|(alias, _, _)| alias.contains(&needle) || needle.contains(alias.as_str()))
			.map(|(_, ticker, name)| CompanyCandidate::new(ticker, name, MatchType::DirectCompanyLookup))
	}

	/// Companies whose name mentions the drug, or the first few as a fallback
	pub fn companies_for_drug(&self, drug: &str) -> Vec<CompanyCandidate> {
		let needle = drug.trim().to_lowercase();
		let matches: Vec<CompanyCandidate> = PHARMA_COMPANIES
			.iter()
			.filter(|(_, name)| name.to_lowercase().contains(&needle))
			.map(|(ticker, name)| CompanyCandidate::new(ticker, name, MatchType::CompanyName))
			.collect();
		if !matches.is_empty() {
			return matches;
		}
		debug!("No company names mention '{}', using fallback companies", drug);
		PHARMA_COMPANIES
			.iter()
			.take(FALLBACK_COMPANIES)
			.map(|(ticker, name)| CompanyCandidate::new(ticker, name, MatchType::Fallback))
			.collect()
	}
}

impl Default for CompanyDirectory {
	fn default() -> Self {
		Self::new()
	}
}

fn strip(pattern: &Option<Regex>, name: &str) -> String {
	match pattern {
		Some(re) => re.replace(name, "").into_owned(),
		None => name.to_string(),
	}
}

/// Jaccard similarity over lower-cased word sets
pub fn word_similarity(a: &str, b: &str) -> f64 {
	let left: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
	let right: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
	let intersection = left.intersection(&right).count();
	let union = left.len() + right.len() - intersection;
	if union == 0 {
		return 0.0;
	}
	intersection as f64 / union as f64
}

/// One row of the SEC ticker index
#[derive(Debug, Clone, PartialEq)]
pub struct TickerEntry {
	pub cik: u64,
	pub ticker: String,
	pub title: String,
}

impl TickerEntry {
	/// CIK zero-padded to the ten digits EDGAR paths expect
	pub fn padded_cik(&self) -> String {
		format!("{:010}", self.cik)
	}
}

/// Parse `company_tickers.json`, an object of `{"0": {cik_str, ticker, title}, ...}`
pub fn parse_ticker_index(body: &Value) -> AdapterResult<Vec<TickerEntry>> {
	let object = body
		.as_object()
		.ok_or_else(|| AdapterError::invalid_response("SEC ticker index is not an object"))?;
	let mut entries: Vec<(u64, TickerEntry)> = object
		.iter()
		.filter_map(|(position, row)| {
			let cik = row.get("cik_str").and_then(|v| {
				v.as_u64()
					.or_else(|| v.as_str().and_then(|s| s.parse().ok()))
			})?;
			Some((
				position.parse().unwrap_or(u64::MAX),
				TickerEntry {
					cik,
					ticker: json::str_at(row, "ticker"),
					title: json::str_at(row, "title"),
				},
			))
		})
		.collect();
	entries.sort_by_key(|(position, _)| *position);
	Ok(entries.into_iter().map(|(_, entry)| entry).collect())
}

/// Lazily loaded SEC ticker index, fetched at most once per adapter
#[derive(Debug)]
pub struct TickerIndex {
	client: Client,
	url: String,
	timeout_ms: u64,
	retry: RetryConfig,
	entries: OnceCell<Vec<TickerEntry>>,
}

impl TickerIndex {
	pub fn new(client: Client, url: impl Into<String>, timeout_ms: u64, retry: RetryConfig) -> Self {
		Self {
			client,
			url: url.into(),
			timeout_ms,
			retry,
			entries: OnceCell::new(),
		}
	}

	/// Index with preloaded rows, never touching the network
	pub fn preloaded(entries: Vec<TickerEntry>) -> Self {
		Self {
			client: Client::new(),
			url: String::new(),
			timeout_ms: 0,
			retry: RetryConfig::none(),
			entries: OnceCell::new_with(Some(entries)),
		}
	}

	pub async fn entries(&self) -> AdapterResult<&[TickerEntry]> {
		let entries = self
			.entries
			.get_or_try_init(|| async {
				debug!("Loading SEC ticker index from {}", self.url);
				let body = with_retry(&self.retry, "SEC ticker index", || {
					send_json(self.client.get(&self.url), SourceKey::Filings, self.timeout_ms)
				})
				.await?;
				parse_ticker_index(&body)
			})
			.await?;
		Ok(entries.as_slice())
	}

	pub async fn find_ticker(&self, ticker: &str) -> AdapterResult<Option<TickerEntry>> {
		Ok(self
			.entries()
			.await?
			.iter()
			.find(|entry| entry.ticker.eq_ignore_ascii_case(ticker))
			.cloned())
	}

	/// First entry whose title contains, is contained in, or closely resembles the name
	pub async fn search_title(&self, name: &str) -> AdapterResult<Option<TickerEntry>> {
		let needle = name.trim().to_lowercase();
		Ok(self
			.entries()
			.await?
			.iter()
			.find(|entry| {
				let title = entry.title.to_lowercase();
				(!title.is_empty() && (title.contains(&needle) || needle.contains(&title)))
					|| word_similarity(&needle, &title) > SIMILARITY_THRESHOLD
			})
			.cloned())
	}
}

struct ExactNameStrategy(Arc<CompanyDirectory>);

#[async_trait]
impl ResolverStrategy<CompanyCandidate> for ExactNameStrategy {
	fn name(&self) -> &str {
		"exact_name"
	}

	async fn attempt(&self, query: &str, _limit: usize) -> AdapterResult<Vec<CompanyCandidate>> {
		Ok(self.0.exact(query).into_iter().collect())
	}
}

struct PartialNameStrategy(Arc<CompanyDirectory>);

#[async_trait]
impl ResolverStrategy<CompanyCandidate> for PartialNameStrategy {
	fn name(&self) -> &str {
		"partial_name"
	}

	async fn attempt(&self, query: &str, _limit: usize) -> AdapterResult<Vec<CompanyCandidate>> {
		Ok(self.0.partial(query).into_iter().collect())
	}
}

struct SecIndexStrategy {
	index: Arc<TickerIndex>,
	directory: Arc<CompanyDirectory>,
}

#[async_trait]
impl ResolverStrategy<CompanyCandidate> for SecIndexStrategy {
	fn name(&self) -> &str {
		"sec_ticker_index"
	}

	async fn attempt(&self, query: &str, _limit: usize) -> AdapterResult<Vec<CompanyCandidate>> {
		let found = self.index.search_title(query).await?;
		Ok(found
			.map(|entry| {
				let name = self
					.directory
					.name_for_ticker(&entry.ticker)
					.unwrap_or(query);
				CompanyCandidate::new(&entry.ticker, name, MatchType::DirectCompanyLookup)
			})
			.into_iter()
			.collect())
	}
}

#[derive(Debug)]
pub struct FilingsAdapter {
	info: AdapterInfo,
	client: Client,
	base_url: String,
	timeout_ms: u64,
	retry: RetryConfig,
	directory: Arc<CompanyDirectory>,
	index: Arc<TickerIndex>,
	resolver: TieredResolver<CompanyCandidate>,
	company_spacing: Duration,
}

impl FilingsAdapter {
	pub fn new(config: SourceRuntimeConfig) -> AdapterResult<Self> {
		let config = if config.contact.is_none() {
			config.with_contact(DEFAULT_USER_AGENT)
		} else {
			config
		};
		let client = global_client_cache().client_for(&config)?;
		let retry = RetryConfig::with_max_retries(config.max_retries);
		let index = Arc::new(TickerIndex::new(
			client.clone(),
			DEFAULT_TICKERS_URL,
			config.timeout_ms,
			retry.clone(),
		));
		Ok(Self::with_index(config, client, index))
	}

	pub fn with_index(config: SourceRuntimeConfig, client: Client, index: Arc<TickerIndex>) -> Self {
		let directory = Arc::new(CompanyDirectory::new());
		let resolver = TieredResolver::new("company")
			.with_strategy(Box::new(ExactNameStrategy(Arc::clone(&directory))))
			.with_strategy(Box::new(PartialNameStrategy(Arc::clone(&directory))))
			.with_strategy(Box::new(SecIndexStrategy {
				index: Arc::clone(&index),
				directory: Arc::clone(&directory),
			}));
		let base_url = config.base_url_or(DEFAULT_BASE_URL).to_string();
		Self {
			info: AdapterInfo::new(SourceKey::Filings, "SEC EDGAR", base_url.clone())
				.with_description("Company financials and filings from SEC EDGAR"),
			client,
			base_url,
			timeout_ms: config.timeout_ms,
			retry: RetryConfig::with_max_retries(config.max_retries),
			directory,
			index,
			resolver,
			company_spacing: COMPANY_SPACING,
		}
	}

	/// Companies relevant to the query text
	pub async fn candidates(&self, input: &str) -> AdapterResult<Vec<CompanyCandidate>> {
		match self.resolver.resolve(input, 1).await {
			Ok(resolution) => Ok(resolution.items),
			Err(AdapterError::Exhausted { .. }) => Ok(self.directory.companies_for_drug(input)),
			Err(e) => Err(e),
		}
	}

	async fn get(&self, url: String, label: &str) -> AdapterResult<Value> {
		with_retry(&self.retry, label, || {
			send_json(self.client.get(&url), SourceKey::Filings, self.timeout_ms)
		})
		.await
	}

	async fn company_record(&self, candidate: &CompanyCandidate) -> AdapterResult<Record> {
		let mut record = Record::new();
		record.insert("ticker".to_string(), candidate.ticker.as_str().into());
		record.insert("name".to_string(), candidate.name.as_str().into());
		record.insert("match_type".to_string(), candidate.match_type.as_str().into());

		let Some(entry) = self.index.find_ticker(&candidate.ticker).await? else {
			warn!("No CIK found for ticker {}", candidate.ticker);
			return Ok(record);
		};
		let cik = entry.padded_cik();

		match self
			.get(format!("{}/xbrl/companyfacts/CIK{}.json", self.base_url, cik), "SEC company facts")
			.await
		{
			Ok(facts) => record.extend(extract_financial_metrics(&facts)),
			Err(e) => warn!("Company facts unavailable for {}: {}", candidate.ticker, e),
		}
		match self
			.get(format!("{}/submissions/CIK{}.json", self.base_url, cik), "SEC submissions")
			.await
		{
			Ok(submissions) => record.extend(extract_submission_details(&submissions)),
			Err(e) => warn!("Submissions unavailable for {}: {}", candidate.ticker, e),
		}
		Ok(record)
	}
}

#[async_trait]
impl SourceAdapter for FilingsAdapter {
	fn adapter_info(&self) -> &AdapterInfo {
		&self.info
	}

	async fn fetch(&self, query: &Query, options: &FetchOptions) -> AdapterResult<Vec<Record>> {
		let mut candidates = self.candidates(query.text()).await?;
		if let Some(max) = options.max_results {
			candidates.truncate(max);
		}
		info!(
			"Resolved {} companies for {}: {}",
			candidates.len(),
			query,
			candidates
				.iter()
				.map(|c| c.ticker.as_str())
				.collect::<Vec<_>>()
				.join(", ")
		);

		let mut records = Vec::with_capacity(candidates.len());
		for (i, candidate) in candidates.iter().enumerate() {
			if i > 0 {
				tokio::time::sleep(self.company_spacing).await;
			}
			records.push(self.company_record(candidate).await?);
		}
		Ok(records)
	}
}

/// Most recent USD value of a us-gaap concept, preferring the first on equal fiscal years
fn latest_usd<'a>(facts: &'a Value, concept: &str) -> Option<&'a Value> {
	let units = facts.pointer(&format!("/facts/us-gaap/{}/units/USD", concept))?;
	let mut best: Option<&Value> = None;
	for item in units.as_array()? {
		let fy = item.get("fy").and_then(Value::as_i64).unwrap_or(0);
		let best_fy = best
			.and_then(|b| b.get("fy"))
			.and_then(Value::as_i64)
			.unwrap_or(i64::MIN);
		if best.is_none() || fy > best_fy {
			best = Some(item);
		}
	}
	best
}

/// Revenue, net income and R&D expense with their fiscal year and period
pub fn extract_financial_metrics(facts: &Value) -> Record {
	let mut metrics = Record::new();
	metrics.insert("companyName".to_string(), json::str_at(facts, "entityName").into());
	metrics.insert(
		"tradingSymbol".to_string(),
		json::array_at(facts, "tickers")
			.first()
			.and_then(Value::as_str)
			.unwrap_or_default()
			.into(),
	);
	for (concept, prefix) in [
		("Revenues", "revenue"),
		("NetIncomeLoss", "netIncome"),
		("ResearchAndDevelopmentExpense", "rdExpense"),
	] {
		if let Some(item) = latest_usd(facts, concept) {
			let field = |key: &str| item.get(key).map(FieldValue::from_json).unwrap_or(FieldValue::Null);
			metrics.insert(prefix.to_string(), field("val"));
			metrics.insert(format!("{}FiscalYear", prefix), field("fy"));
			metrics.insert(format!("{}FiscalPeriod", prefix), field("fp"));
		}
	}
	metrics
}

/// Business address and the latest 10-K / 10-Q filings
pub fn extract_submission_details(submissions: &Value) -> Record {
	let mut details = Record::new();
	if let Some(address) = submissions.pointer("/addresses/business") {
		for key in ["street1", "street2", "city", "stateOrCountry", "zipCode"] {
			details.insert(key.to_string(), json::str_at(address, key).into());
		}
	}

	let forms = json::array_at(submissions, "filings.recent.form");
	let dates = json::array_at(submissions, "filings.recent.filingDate");
	let accessions = json::array_at(submissions, "filings.recent.accessionNumber");
	for (form, label) in [("10-K", "recent10K"), ("10-Q", "recent10Q")] {
		if let Some(idx) = forms.iter().position(|f| f.as_str() == Some(form)) {
			let text_at = |values: &[Value]| {
				values
					.get(idx)
					.and_then(Value::as_str)
					.unwrap_or_default()
					.to_string()
			};
			details.insert(label.to_string(), text_at(dates).into());
			details.insert(format!("{}AccessionNumber", label), text_at(accessions).into());
		}
	}
	details
}
