//! LLM-backed summaries of an aggregated response
//!
//! The summarizer turns the most informative parts of an
//! [`AggregatedResponse`] into a prompt, asks an OpenAI-compatible chat
//! completion endpoint (Groq by default) for an analysis, and splits the
//! answer into named sections. Any failure along the way is reported as a
//! [`Summary::Error`] rather than an error return.

use async_trait::async_trait;
use medlens_adapters::http::classify_send_error;
use medlens_adapters::{category_summaries, with_retry, RetryConfig};
use medlens_types::{
	AdapterError, AggregatedResponse, FieldValue, Query, QueryKind, Record, SecretString,
	SourceKey, Summary,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_LLM_MODEL: &str = "llama3-70b-8192";

const LONG_FIELD_CHARS: usize = 500;
const SHORT_FIELD_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum SummarizerError {
	#[error("LLM API key is not configured")]
	MissingApiKey,

	#[error("LLM request failed: {0}")]
	Request(#[from] AdapterError),

	#[error("LLM response contained no completion")]
	EmptyCompletion,
}

/// Settings for the chat completion endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
	pub base_url: String,
	pub model: String,
	pub max_tokens: u32,
	pub temperature: f32,
	pub max_retries: u32,
	pub timeout_ms: u64,
	pub api_key: Option<SecretString>,
}

impl Default for LlmConfig {
	fn default() -> Self {
		Self {
			base_url: DEFAULT_LLM_BASE_URL.to_string(),
			model: DEFAULT_LLM_MODEL.to_string(),
			max_tokens: 1024,
			temperature: 0.7,
			max_retries: 2,
			timeout_ms: 60_000,
			api_key: None,
		}
	}
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
	async fn summarize(&self, data: &AggregatedResponse, query: &Query) -> Summary;
}

/// Produces free text for a prompt
#[async_trait]
pub trait TextGenerator: Send + Sync {
	async fn generate_text(&self, prompt: &str) -> Result<String, SummarizerError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
	role: &'a str,
	content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
	model: &'a str,
	messages: Vec<ChatMessage<'a>>,
	max_tokens: u32,
	temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
	#[serde(default)]
	choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
	message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
	#[serde(default)]
	content: String,
}

/// OpenAI-compatible chat completion client
#[derive(Debug)]
pub struct ChatCompletionClient {
	client: Client,
	config: LlmConfig,
	retry: RetryConfig,
}

impl ChatCompletionClient {
	pub fn new(config: LlmConfig) -> Result<Self, SummarizerError> {
		let client = Client::builder()
			.timeout(Duration::from_millis(config.timeout_ms))
			.build()
			.map_err(|e| SummarizerError::Request(AdapterError::HttpError(e)))?;
		Ok(Self {
			client,
			retry: RetryConfig::with_max_retries(config.max_retries),
			config,
		})
	}

	async fn complete(&self, api_key: &SecretString, prompt: &str) -> Result<String, AdapterError> {
		let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
		let payload = ChatCompletionRequest {
			model: &self.config.model,
			messages: vec![ChatMessage {
				role: "user",
				content: prompt,
			}],
			max_tokens: self.config.max_tokens,
			temperature: self.config.temperature,
		};

		let response = self
			.client
			.post(&url)
			.bearer_auth(api_key.expose_secret())
			.json(&payload)
			.send()
			.await
			.map_err(|e| classify_send_error(e, self.config.timeout_ms))?;
		let status = response.status();
		if status == StatusCode::TOO_MANY_REQUESTS {
			return Err(AdapterError::RateLimitExceeded {
				source_name: "LLM".to_string(),
			});
		}
		if !status.is_success() {
			return Err(AdapterError::from_http_failure(status.as_u16()));
		}

		let body: ChatCompletionResponse = response
			.json()
			.await
			.map_err(|e| AdapterError::invalid_response(format!("malformed completion: {}", e)))?;
		Ok(body
			.choices
			.into_iter()
			.next()
			.map(|choice| choice.message.content)
			.unwrap_or_default())
	}
}

#[async_trait]
impl TextGenerator for ChatCompletionClient {
	async fn generate_text(&self, prompt: &str) -> Result<String, SummarizerError> {
		let api_key = self
			.config
			.api_key
			.as_ref()
			.filter(|key| !key.is_empty())
			.ok_or(SummarizerError::MissingApiKey)?;
		debug!("Sending prompt of {} chars to {}", prompt.len(), self.config.model);

		let text = with_retry(&self.retry, "LLM completion", || self.complete(api_key, prompt)).await?;
		if text.trim().is_empty() {
			return Err(SummarizerError::EmptyCompletion);
		}
		Ok(text)
	}
}

/// Summarizer that prompts a [`TextGenerator`] and sections its answer
pub struct LlmSummarizer {
	generator: Arc<dyn TextGenerator>,
}

impl LlmSummarizer {
	pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
		Self { generator }
	}

	pub fn from_config(config: LlmConfig) -> Result<Self, SummarizerError> {
		Ok(Self::new(Arc::new(ChatCompletionClient::new(config)?)))
	}
}

#[async_trait]
impl Summarizer for LlmSummarizer {
	async fn summarize(&self, data: &AggregatedResponse, query: &Query) -> Summary {
		info!("Summarizing {} sources for {}", data.len(), query);
		let prompt = build_prompt(data, query);
		match self.generator.generate_text(&prompt).await {
			Ok(text) => Summary::Sections(split_sections(&text, query.kind())),
			Err(e) => {
				warn!("Summary generation failed for {}: {}", query, e);
				Summary::error(format!("Error summarizing data: {}", e))
			},
		}
	}
}

fn truncate(text: &str, max_chars: usize) -> String {
	match text.char_indices().nth(max_chars) {
		Some((cut, _)) => format!("{}...", &text[..cut]),
		None => text.to_string(),
	}
}

fn text_field<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
	record
		.get(field)
		.and_then(FieldValue::as_text)
		.filter(|s| !s.trim().is_empty())
}

/// "indications_and_usage" → "Indications And Usage"
fn title_case(field: &str) -> String {
	field
		.split('_')
		.map(|word| {
			let mut chars = word.chars();
			match chars.next() {
				Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
				None => String::new(),
			}
		})
		.collect::<Vec<_>>()
		.join(" ")
}

fn write_trials(prompt: &mut String, heading: &str, trials: &[Record]) {
	if trials.is_empty() {
		return;
	}
	let _ = write!(prompt, "\n\n{}:\n", heading);
	for (i, trial) in trials.iter().take(3).enumerate() {
		let _ = writeln!(
			prompt,
			"- Trial {}: {}",
			i + 1,
			text_field(trial, "briefTitle").unwrap_or("Untitled")
		);
		let _ = writeln!(
			prompt,
			"  Status: {}",
			text_field(trial, "overallStatus").unwrap_or("Unknown")
		);
		if let Some(phases) = text_field(trial, "phases") {
			let _ = writeln!(prompt, "  Phase: {}", phases);
		}
	}
}

fn write_news(prompt: &mut String, articles: &[Record]) {
	if articles.is_empty() {
		return;
	}
	let lines: Vec<String> = category_summaries(articles)
		.into_iter()
		.filter(|(_, summary)| !summary.starts_with("No"))
		.map(|(category, summary)| format!("- {}: {}", title_case(category.as_str()), summary))
		.collect();
	if !lines.is_empty() {
		let _ = write!(prompt, "\n\nRecent News:\n{}\n", lines.join("\n"));
	}
}

/// Prompt asking for the five analysis sections of the query kind
pub fn build_prompt(data: &AggregatedResponse, query: &Query) -> String {
	let name = query.text();
	let labels = data.records(SourceKey::LabelData);
	let trials = data.records(SourceKey::Trials);
	let mut prompt = String::new();

	match query.kind() {
		QueryKind::Drug => {
			let _ = write!(
				prompt,
				"Please analyze the following information about the drug {name} and provide:\n\
				 1. A concise summary of the drug's indications and mechanism of action (2-3 sentences)\n\
				 2. Key clinical information including common dosage forms and administration routes\n\
				 3. Notable regulatory information (approval status, recent regulatory changes)\n\
				 4. Important safety considerations including major adverse effects and contraindications\n\
				 5. A brief overview of recent research or clinical trials\n\n\
				 Here's the information I have about {name}:"
			);
			if let Some(label) = labels.first() {
				prompt.push_str("\n\nFDA Information:\n");
				for field in [
					"indications_and_usage",
					"description",
					"clinical_pharmacology",
					"mechanism_of_action",
				] {
					if let Some(text) = text_field(label, field) {
						let _ = writeln!(
							prompt,
							"- {}: {}",
							title_case(field),
							truncate(text, LONG_FIELD_CHARS)
						);
					}
				}
			}
			write_trials(&mut prompt, "Recent Clinical Trials", trials);
		},
		QueryKind::Disease => {
			let _ = write!(
				prompt,
				"Please analyze the following information about {name} and provide:\n\
				 1. A concise overview of the disease including definition, prevalence, and key characteristics (2-3 sentences)\n\
				 2. Main symptoms and clinical presentation\n\
				 3. Current treatment approaches and standard of care\n\
				 4. Recent research developments or clinical trials\n\
				 5. Major unmet needs and future directions for treatment\n\n\
				 Here's the information I have about {name}:"
			);
			if !labels.is_empty() {
				prompt.push_str("\n\nFDA Approved Treatments:\n");
				for label in labels.iter().take(5) {
					let drug = text_field(label, "brand_name")
						.or_else(|| text_field(label, "generic_name"))
						.unwrap_or("Unknown");
					let _ = writeln!(prompt, "- {}", drug);
					if let Some(indications) = text_field(label, "indications_and_usage") {
						let _ = writeln!(
							prompt,
							"  Indications: {}",
							truncate(indications, SHORT_FIELD_CHARS)
						);
					}
				}
			}
			write_trials(&mut prompt, "Ongoing Clinical Trials", trials);

			let publications = data.records(SourceKey::Literature);
			if !publications.is_empty() {
				prompt.push_str("\n\nRecent Research Publications:\n");
				for (i, publication) in publications.iter().take(3).enumerate() {
					let _ = writeln!(
						prompt,
						"- Publication {}: {}",
						i + 1,
						text_field(publication, "title").unwrap_or("Untitled")
					);
				}
			}
		},
	}

	write_news(&mut prompt, data.records(SourceKey::News));
	prompt
}

fn section_for(paragraph: &str, kind: QueryKind) -> Option<&'static str> {
	let head = paragraph
		.trim_start_matches(|c: char| c.is_whitespace() || c == '#' || c == '*')
		.to_lowercase();
	let sections: [(&str, &str, &str); 5] = match kind {
		QueryKind::Drug => [
			("summary", "1.", "summary"),
			("clinical", "2.", "clinical"),
			("regulatory", "3.", "regulatory"),
			("safety", "4.", "safety"),
			("research", "5.", "research"),
		],
		QueryKind::Disease => [
			("overview", "1.", "overview"),
			("symptoms", "2.", "symptoms"),
			("treatment", "3.", "treatment"),
			("research", "4.", "research"),
			("unmet", "5.", "unmet_needs"),
		],
	};
	sections
		.iter()
		.find(|(keyword, number, _)| head.starts_with(keyword) || head.starts_with(number))
		.map(|(_, _, name)| *name)
}

/// Split generated text on blank lines into named sections.
///
/// A paragraph opening with a section keyword or its number starts that
/// section; other paragraphs are appended to the current one. Text before
/// any heading is dropped unless no heading is found at all, in which case
/// the whole answer becomes the `overview`.
pub fn split_sections(text: &str, kind: QueryKind) -> BTreeMap<String, String> {
	let mut sections: BTreeMap<String, String> = BTreeMap::new();
	let mut current: Option<&str> = None;

	for paragraph in text.split("\n\n") {
		if let Some(name) = section_for(paragraph, kind) {
			sections.insert(name.to_string(), paragraph.to_string());
			current = Some(name);
		} else if !paragraph.trim().is_empty() {
			if let Some(body) = current.and_then(|name| sections.get_mut(name)) {
				body.push_str("\n\n");
				body.push_str(paragraph);
			}
		}
	}

	if sections.is_empty() && !text.trim().is_empty() {
		sections.insert("overview".to_string(), text.trim().to_string());
	}
	sections
}

#[cfg(test)]
mod tests {
	use super::*;
	use medlens_types::SourceResult;
	use std::sync::Mutex;

	struct CannedGenerator {
		reply: Result<String, ()>,
		prompts: Mutex<Vec<String>>,
	}

	impl CannedGenerator {
		fn replying(text: &str) -> Arc<Self> {
			Arc::new(Self {
				reply: Ok(text.to_string()),
				prompts: Mutex::new(Vec::new()),
			})
		}

		fn failing() -> Arc<Self> {
			Arc::new(Self {
				reply: Err(()),
				prompts: Mutex::new(Vec::new()),
			})
		}
	}

	#[async_trait]
	impl TextGenerator for CannedGenerator {
		async fn generate_text(&self, prompt: &str) -> Result<String, SummarizerError> {
			self.prompts.lock().unwrap().push(prompt.to_string());
			self.reply
				.clone()
				.map_err(|_| SummarizerError::Request(AdapterError::from_http_failure(503)))
		}
	}

	fn record(fields: &[(&str, &str)]) -> Record {
		fields
			.iter()
			.map(|(k, v)| (k.to_string(), FieldValue::from(*v)))
			.collect()
	}

	fn drug_response() -> AggregatedResponse {
		let label = record(&[
			("brand_name", "Bayer Aspirin"),
			("indications_and_usage", &"a".repeat(600)),
			("description", "Acetylsalicylic acid"),
		]);
		let trials: Vec<Record> = (1..=4)
			.map(|i| {
				record(&[
					("briefTitle", &format!("Trial number {}", i)),
					("overallStatus", "RECRUITING"),
					("phases", "PHASE3"),
				])
			})
			.collect();
		let news = vec![record(&[
			("title", "FDA approval expands label"),
			("date", "2024-05-01"),
			("category", "regulatory"),
		])];
		AggregatedResponse::from_entries([
			(SourceKey::LabelData, SourceResult::Success(vec![label])),
			(SourceKey::Trials, SourceResult::Success(trials)),
			(SourceKey::News, SourceResult::Success(news)),
			(SourceKey::Filings, SourceResult::failure("timed out after 100ms")),
		])
	}

	#[test]
	fn test_drug_prompt_contents() {
		let prompt = build_prompt(&drug_response(), &Query::drug("aspirin").unwrap());
		assert!(prompt.contains("information about the drug aspirin"));
		assert!(prompt.contains(&format!("- Indications And Usage: {}...", "a".repeat(500))));
		assert!(prompt.contains("- Description: Acetylsalicylic acid"));
		assert!(prompt.contains("- Trial 3: Trial number 3"));
		assert!(!prompt.contains("Trial number 4"));
		assert!(prompt.contains("- Regulatory: Recent regulatory news includes: FDA approval expands label."));
		assert!(!prompt.contains("No commercial news"));
	}

	#[test]
	fn test_disease_prompt_lists_treatments_and_publications() {
		let labels: Vec<Record> = (0..7)
			.map(|i| record(&[("generic_name", &format!("drug-{}", i))]))
			.collect();
		let publications = vec![record(&[("title", "Asthma biologics review")])];
		let data = AggregatedResponse::from_entries([
			(SourceKey::LabelData, SourceResult::Success(labels)),
			(SourceKey::Literature, SourceResult::Success(publications)),
		]);
		let prompt = build_prompt(&data, &Query::disease("asthma").unwrap());
		assert!(prompt.contains("FDA Approved Treatments:"));
		assert!(prompt.contains("- drug-4"));
		assert!(!prompt.contains("- drug-5"));
		assert!(prompt.contains("- Publication 1: Asthma biologics review"));
		assert!(!prompt.contains("Recent News"));
	}

	#[test]
	fn test_split_drug_sections() {
		let text = "Intro line\n\n1. Summary: pain reliever\n\nMore summary\n\n**Clinical** oral tablets\n\n3. Regulatory: OTC\n\nSafety: bleeding risk\n\n5. Research: ongoing";
		let sections = split_sections(text, QueryKind::Drug);
		assert_eq!(sections["summary"], "1. Summary: pain reliever\n\nMore summary");
		assert_eq!(sections["clinical"], "**Clinical** oral tablets");
		assert_eq!(sections["regulatory"], "3. Regulatory: OTC");
		assert_eq!(sections["safety"], "Safety: bleeding risk");
		assert_eq!(sections["research"], "5. Research: ongoing");
		assert_eq!(sections.len(), 5);
	}

	#[test]
	fn test_split_disease_sections() {
		let text = "Overview: chronic airway disease\n\n2. Wheezing\n\nTreatment: inhalers\n\n4. New biologics\n\nUnmet needs: severe asthma";
		let sections = split_sections(text, QueryKind::Disease);
		assert_eq!(sections["overview"], "Overview: chronic airway disease");
		assert_eq!(sections["symptoms"], "2. Wheezing");
		assert_eq!(sections["unmet_needs"], "Unmet needs: severe asthma");
	}

	#[test]
	fn test_unsectioned_text_becomes_overview() {
		let sections = split_sections("Just one paragraph.", QueryKind::Drug);
		assert_eq!(sections["overview"], "Just one paragraph.");
		assert!(split_sections("   ", QueryKind::Drug).is_empty());
	}

	#[tokio::test]
	async fn test_summarize_uses_generated_sections() {
		let generator = CannedGenerator::replying("1. Summary: fine\n\n4. Safety: careful");
		let summarizer = LlmSummarizer::new(generator.clone());
		let summary = summarizer
			.summarize(&drug_response(), &Query::drug("aspirin").unwrap())
			.await;
		assert_eq!(summary.section("summary"), Some("1. Summary: fine"));
		assert_eq!(summary.section("safety"), Some("4. Safety: careful"));
		assert_eq!(generator.prompts.lock().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_generator_failure_is_error_summary() {
		let summarizer = LlmSummarizer::new(CannedGenerator::failing());
		let summary = summarizer
			.summarize(&AggregatedResponse::default(), &Query::drug("aspirin").unwrap())
			.await;
		assert!(summary.is_error());
	}

	#[tokio::test]
	async fn test_missing_api_key() {
		let client = ChatCompletionClient::new(LlmConfig::default()).unwrap();
		let err = client.generate_text("hello").await.unwrap_err();
		assert!(matches!(err, SummarizerError::MissingApiKey));

		let summarizer = LlmSummarizer::from_config(LlmConfig::default()).unwrap();
		let summary = summarizer
			.summarize(&AggregatedResponse::default(), &Query::drug("aspirin").unwrap())
			.await;
		assert_eq!(
			summary,
			Summary::error("Error summarizing data: LLM API key is not configured")
		);
	}

	#[tokio::test]
	async fn test_mock_summarizer() {
		let mut mock = MockSummarizer::new();
		mock.expect_summarize()
			.returning(|_, _| Summary::error("offline"));
		let summarizer: Arc<dyn Summarizer> = Arc::new(mock);
		let summary = summarizer
			.summarize(&AggregatedResponse::default(), &Query::drug("aspirin").unwrap())
			.await;
		assert!(summary.is_error());
	}
}
