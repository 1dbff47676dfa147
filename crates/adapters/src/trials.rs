//! Clinical trial registry adapter (ClinicalTrials.gov v2)
//!
//! Studies are paged with continuation tokens. The adapter follows at most
//! [`DEFAULT_MAX_PAGES`] pages, stops early on an empty page or a missing
//! token, waits [`PAGE_DELAY`] between requests, and keeps pages in the order
//! they were fetched.

use crate::client_cache::global_client_cache;
use crate::http::{send_json, with_retry, RetryConfig};
use async_trait::async_trait;
use medlens_types::records::json;
use medlens_types::{
	AdapterError, AdapterInfo, AdapterResult, FetchOptions, FieldValue, Query, Record,
	SourceAdapter, SourceKey, SourceRuntimeConfig,
};
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://clinicaltrials.gov/api/v2";
pub const DEFAULT_MAX_PAGES: usize = 5;
pub const PAGE_SIZE: usize = 100;
pub const PAGE_DELAY: Duration = Duration::from_millis(500);

/// One page of raw studies plus the token for the next page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyPage {
	pub studies: Vec<Value>,
	pub next_page_token: Option<String>,
}

/// Fetches a single page of studies
#[async_trait]
pub trait StudyPageSource: Send + Sync + std::fmt::Debug {
	async fn fetch_page(&self, term: &str, page_token: Option<&str>) -> AdapterResult<StudyPage>;
}

/// Live page source over HTTP
#[derive(Debug)]
pub struct HttpStudyPageSource {
	client: Client,
	base_url: String,
	timeout_ms: u64,
	retry: RetryConfig,
}

impl HttpStudyPageSource {
	pub fn new(config: &SourceRuntimeConfig, client: Client) -> Self {
		Self {
			client,
			base_url: config.base_url_or(DEFAULT_BASE_URL).to_string(),
			timeout_ms: config.timeout_ms,
			retry: RetryConfig::with_max_retries(config.max_retries),
		}
	}
}

#[async_trait]
impl StudyPageSource for HttpStudyPageSource {
	async fn fetch_page(&self, term: &str, page_token: Option<&str>) -> AdapterResult<StudyPage> {
		let url = format!("{}/studies", self.base_url);
		let page_size = PAGE_SIZE.to_string();
		let body = with_retry(&self.retry, "ClinicalTrials.gov page", || {
			let mut params = vec![("query.term", term), ("pageSize", page_size.as_str())];
			if let Some(token) = page_token {
				params.push(("pageToken", token));
			}
			let request = self.client.get(&url).query(&params);
			send_json(request, SourceKey::Trials, self.timeout_ms)
		})
		.await?;

		let studies = match body.get("studies") {
			Some(Value::Array(studies)) => studies.clone(),
			Some(_) => {
				return Err(AdapterError::invalid_response(
					"ClinicalTrials.gov 'studies' is not an array",
				))
			},
			None => Vec::new(),
		};
		let next_page_token = body
			.get("nextPageToken")
			.and_then(Value::as_str)
			.filter(|token| !token.is_empty())
			.map(str::to_string);
		Ok(StudyPage {
			studies,
			next_page_token,
		})
	}
}

#[derive(Debug)]
pub struct TrialsAdapter {
	info: AdapterInfo,
	pages: Arc<dyn StudyPageSource>,
	max_pages: usize,
	page_delay: Duration,
}

impl TrialsAdapter {
	pub fn new(config: SourceRuntimeConfig) -> AdapterResult<Self> {
		let client = global_client_cache().client_for(&config)?;
		let pages = Arc::new(HttpStudyPageSource::new(&config, client));
		Ok(Self::with_page_source(&config, pages))
	}

	pub fn with_page_source(config: &SourceRuntimeConfig, pages: Arc<dyn StudyPageSource>) -> Self {
		Self {
			info: AdapterInfo::new(
				SourceKey::Trials,
				"ClinicalTrials.gov",
				config.base_url_or(DEFAULT_BASE_URL),
			)
			.with_description("Registered clinical studies"),
			pages,
			max_pages: DEFAULT_MAX_PAGES,
			page_delay: PAGE_DELAY,
		}
	}

	pub fn with_max_pages(mut self, max_pages: usize) -> Self {
		self.max_pages = max_pages;
		self
	}

	/// Collect raw studies across pages
	pub async fn collect_studies(&self, term: &str) -> AdapterResult<Vec<Value>> {
		let mut studies = Vec::new();
		let mut token: Option<String> = None;

		for page_index in 0..self.max_pages {
			if page_index > 0 {
				tokio::time::sleep(self.page_delay).await;
			}
			let page = match self.pages.fetch_page(term, token.as_deref()).await {
				Ok(page) => page,
				// Keep what we have once at least one page succeeded
				Err(e) if page_index > 0 => {
					warn!(
						"Stopping trial pagination at page {} for '{}': {}",
						page_index + 1,
						term,
						e
					);
					break;
				},
				Err(e) => return Err(e),
			};

			if page.studies.is_empty() {
				debug!("No more studies after page {}", page_index);
				break;
			}
			studies.extend(page.studies);
			debug!("Trial page {} processed for '{}'", page_index + 1, term);

			match page.next_page_token {
				Some(next) => token = Some(next),
				None => break,
			}
		}
		Ok(studies)
	}
}

#[async_trait]
impl SourceAdapter for TrialsAdapter {
	fn adapter_info(&self) -> &AdapterInfo {
		&self.info
	}

	async fn fetch(&self, query: &Query, _options: &FetchOptions) -> AdapterResult<Vec<Record>> {
		let studies = self.collect_studies(query.text()).await?;
		let records: Vec<Record> = studies.iter().map(normalize_study).collect();
		info!("Found {} clinical trials for {}", records.len(), query);
		Ok(records)
	}
}

fn names(items: &[Value], field: &str) -> Vec<String> {
	items
		.iter()
		.filter_map(|item| item.get(field).and_then(Value::as_str))
		.filter(|name| !name.is_empty())
		.map(str::to_string)
		.collect()
}

fn numbered_outcomes(outcomes: &[Value], label: &str) -> String {
	outcomes
		.iter()
		.enumerate()
		.map(|(i, outcome)| {
			let measure = outcome
				.get("measure")
				.and_then(Value::as_str)
				.unwrap_or("None");
			format!("{} Outcome {}: {}", label, i + 1, measure)
		})
		.collect::<Vec<_>>()
		.join("\n")
}

fn at(study: &Value, dotted: &str) -> FieldValue {
	json::path(study, dotted)
		.map(FieldValue::from_json)
		.unwrap_or(FieldValue::Null)
}

/// Flatten one study into a record
pub fn normalize_study(study: &Value) -> Record {
	const P: &str = "protocolSection";
	let mut record = Record::new();
	let mut put = |key: &str, value: FieldValue| {
		record.insert(key.to_string(), value);
	};

	put("nctId", at(study, &format!("{P}.identificationModule.nctId")));
	put("organization", at(study, &format!("{P}.identificationModule.organization.fullName")));
	put("organizationType", at(study, &format!("{P}.identificationModule.organization.class")));
	put("briefTitle", at(study, &format!("{P}.identificationModule.briefTitle")));
	put("officialTitle", at(study, &format!("{P}.identificationModule.officialTitle")));

	let status = format!("{P}.statusModule");
	put("statusVerifiedDate", at(study, &format!("{status}.statusVerifiedDate")));
	put("overallStatus", at(study, &format!("{status}.overallStatus")));
	put("hasExpandedAccess", at(study, &format!("{status}.expandedAccessInfo.hasExpandedAccess")));
	put("startDate", at(study, &format!("{status}.startDateStruct.date")));
	put("completionDate", at(study, &format!("{status}.completionDateStruct.date")));
	put("completionDateType", at(study, &format!("{status}.completionDateStruct.type")));
	put("studyFirstSubmitDate", at(study, &format!("{status}.studyFirstSubmitDate")));
	put("studyFirstPostDate", at(study, &format!("{status}.studyFirstPostDateStruct.date")));
	put("lastUpdatePostDate", at(study, &format!("{status}.lastUpdatePostDateStruct.date")));
	put("hasResults", at(study, "hasResults"));

	let sponsor = format!("{P}.sponsorCollaboratorsModule");
	put("leadSponsor", at(study, &format!("{sponsor}.leadSponsor.name")));
	put("leadSponsorType", at(study, &format!("{sponsor}.leadSponsor.class")));
	let collaborators = json::array_at(study, &format!("{sponsor}.collaborators"));
	put("collaborators", names(collaborators, "name").join(", ").into());
	put("collaboratorsType", names(collaborators, "class").join(", ").into());

	put("briefSummary", at(study, &format!("{P}.descriptionModule.briefSummary")));
	put("detailedDescription", at(study, &format!("{P}.descriptionModule.detailedDescription")));
	put("conditions", json::joined_at(study, &format!("{P}.conditionsModule.conditions"), ", ").into());

	let design = format!("{P}.designModule");
	put("studyType", at(study, &format!("{design}.studyType")));
	put("phases", json::joined_at(study, &format!("{design}.phases"), ", ").into());
	put("allocation", at(study, &format!("{design}.designInfo.allocation")));
	put("interventionModel", at(study, &format!("{design}.designInfo.interventionModel")));
	put("primaryPurpose", at(study, &format!("{design}.designInfo.primaryPurpose")));
	put("masking", at(study, &format!("{design}.designInfo.maskingInfo.masking")));
	put("whoMasked", json::joined_at(study, &format!("{design}.designInfo.maskingInfo.whoMasked"), ", ").into());
	put("enrollmentCount", at(study, &format!("{design}.enrollmentInfo.count")));
	put("enrollmentType", at(study, &format!("{design}.enrollmentInfo.type")));

	let arms_module = format!("{P}.armsInterventionsModule");
	let arms = json::array_at(study, &format!("{arms_module}.armGroups"));
	put("arms", names(arms, "label").join(", ").into());
	let arm_interventions: BTreeSet<&str> = arms
		.iter()
		.flat_map(|arm| json::array_at(arm, "interventionNames"))
		.filter_map(Value::as_str)
		.collect();
	put("interventions", arm_interventions.into_iter().collect::<Vec<_>>().join(", ").into());

	let interventions = json::array_at(study, &format!("{arms_module}.interventions"));
	let of_type = |wanted: Option<&str>| -> String {
		interventions
			.iter()
			.filter(|item| {
				let kind = json::str_at(item, "type").to_lowercase();
				match wanted {
					Some(wanted) => kind == wanted,
					None => kind != "drug" && kind != "biological",
				}
			})
			.filter_map(|item| item.get("name").and_then(Value::as_str))
			.filter(|name| !name.is_empty())
			.collect::<Vec<_>>()
			.join(", ")
	};
	put("interventionDrug", of_type(Some("drug")).into());
	put("interventionBiological", of_type(Some("biological")).into());
	put("interventionOthers", of_type(None).into());
	let descriptions: Vec<String> = interventions
		.iter()
		.filter_map(|item| {
			let name = json::str_at(item, "name");
			let description = json::str_at(item, "description");
			(!name.is_empty() && !description.is_empty())
				.then(|| format!("{}: {}", name, description))
		})
		.collect();
	put("interventionDescription", descriptions.join("\n").into());

	let outcomes = format!("{P}.outcomesModule");
	put(
		"primaryOutcomes",
		numbered_outcomes(json::array_at(study, &format!("{outcomes}.primaryOutcomes")), "Primary").into(),
	);
	put(
		"secondaryOutcomes",
		numbered_outcomes(json::array_at(study, &format!("{outcomes}.secondaryOutcomes")), "Secondary").into(),
	);

	let eligibility = format!("{P}.eligibilityModule");
	put("eligibilityCriteria", at(study, &format!("{eligibility}.eligibilityCriteria")));
	put("healthyVolunteers", at(study, &format!("{eligibility}.healthyVolunteers")));
	put("eligibilityGender", at(study, &format!("{eligibility}.sex")));
	put("eligibilityMinimumAge", at(study, &format!("{eligibility}.minimumAge")));
	put("eligibilityMaximumAge", at(study, &format!("{eligibility}.maximumAge")));
	put("eligibilityStandardAges", json::joined_at(study, &format!("{eligibility}.stdAges"), ", ").into());

	record
}
