//! Clinical terminology adapter (SNOMED CT)
//!
//! Term search tries, in order, a FHIR terminology server (`ValueSet/$expand`
//! with a regex term filter), the public Snowstorm browser API and, when a
//! UMLS key is configured, the UMLS search API restricted to `SNOMEDCT_US`.
//! Concept details go through a second resolver: FHIR `CodeSystem/$lookup`,
//! then the Snowstorm concept endpoint. Both resolvers share one injected
//! [`TermCache`].

use crate::cache::TermCache;
use crate::client_cache::global_client_cache;
use crate::http::{send_json, with_retry, RetryConfig};
use crate::resolver::{ResolverStrategy, TieredResolver};
use async_trait::async_trait;
use medlens_types::records::json;
use medlens_types::{
	AdapterError, AdapterInfo, AdapterResult, FetchOptions, FieldValue, Query, Record,
	SecretString, SourceAdapter, SourceKey, SourceRuntimeConfig,
};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_FHIR_URL: &str = "https://snowstorm-fhir.ontoserver.csiro.au/fhir";
pub const DEFAULT_SNOWSTORM_URL: &str = "https://snowstorm.ihtsdotools.org/snowstorm/snomed-ct";
pub const DEFAULT_UMLS_URL: &str = "https://uts-ws.nlm.nih.gov/rest/search/current";
pub const SNOMED_SYSTEM: &str = "http://snomed.info/sct";
pub const DEFAULT_EDITION: &str = "en-us";
pub const DEFAULT_VERSION: &str = "current";
pub const DEFAULT_MAX_RESULTS: usize = 20;

const CONCEPT_NAMESPACE: &str = "concept_";

/// Semantic tag from a fully specified name, e.g. `"Asthma (disorder)"` → `"disorder"`
pub fn semantic_tag(full_name: &str) -> Option<String> {
	if !full_name.contains('(') || !full_name.ends_with(')') {
		return None;
	}
	full_name
		.rsplit('(')
		.next()
		.map(|tag| tag.trim_end_matches(')').to_string())
}

/// Connection details shared by every strategy
#[derive(Debug)]
pub struct SnomedEndpoints {
	client: Client,
	fhir_url: String,
	snowstorm_url: String,
	umls_url: String,
	edition: String,
	version: String,
	timeout_ms: u64,
	retry: RetryConfig,
	api_key: Option<SecretString>,
	umls_key: Option<SecretString>,
}

impl SnomedEndpoints {
	pub fn new(config: &SourceRuntimeConfig, client: Client) -> Self {
		Self {
			client,
			fhir_url: config.base_url_or(DEFAULT_FHIR_URL).to_string(),
			snowstorm_url: DEFAULT_SNOWSTORM_URL.to_string(),
			umls_url: DEFAULT_UMLS_URL.to_string(),
			edition: DEFAULT_EDITION.to_string(),
			version: DEFAULT_VERSION.to_string(),
			timeout_ms: config.timeout_ms,
			retry: RetryConfig::with_max_retries(config.max_retries),
			api_key: config.api_key.clone().filter(|k| !k.is_empty()),
			umls_key: config.secondary_key.clone().filter(|k| !k.is_empty()),
		}
	}

	pub fn has_umls_key(&self) -> bool {
		self.umls_key.is_some()
	}

	fn browser_url(&self) -> String {
		format!("{}/browser/{}/{}", self.snowstorm_url, self.edition, self.version)
	}

	fn fhir_post(&self, url: &str, payload: &Value) -> RequestBuilder {
		let request = self
			.client
			.post(url)
			.header("Accept", "application/json")
			.json(payload);
		match &self.api_key {
			Some(key) => request.bearer_auth(key.expose_secret()),
			None => request,
		}
	}

	async fn send<F>(&self, label: &str, build: F) -> AdapterResult<Value>
	where
		F: Fn() -> RequestBuilder + Send + Sync,
	{
		with_retry(&self.retry, label, || {
			send_json(build(), SourceKey::Terminology, self.timeout_ms)
		})
		.await
	}
}

struct FhirExpandStrategy(Arc<SnomedEndpoints>);

#[async_trait]
impl ResolverStrategy<Record> for FhirExpandStrategy {
	fn name(&self) -> &str {
		"fhir_expand"
	}

	async fn attempt(&self, query: &str, limit: usize) -> AdapterResult<Vec<Record>> {
		let endpoints = &self.0;
		let url = format!("{}/ValueSet/$expand", endpoints.fhir_url);
		let payload = json!({
			"resourceType": "Parameters",
			"parameter": [
				{
					"name": "valueSet",
					"resource": {
						"resourceType": "ValueSet",
						"compose": {"include": [{
							"system": SNOMED_SYSTEM,
							"filter": [{"property": "term", "op": "regex", "value": query}]
						}]}
					}
				},
				{"name": "count", "valueInteger": limit}
			]
		});
		let body = endpoints
			.send("FHIR ValueSet expand", || endpoints.fhir_post(&url, &payload))
			.await?;
		Ok(parse_fhir_expansion(&body))
	}
}

struct SnowstormSearchStrategy(Arc<SnomedEndpoints>);

#[async_trait]
impl ResolverStrategy<Record> for SnowstormSearchStrategy {
	fn name(&self) -> &str {
		"snowstorm_search"
	}

	async fn attempt(&self, query: &str, limit: usize) -> AdapterResult<Vec<Record>> {
		let endpoints = &self.0;
		let url = format!("{}/concepts", endpoints.browser_url());
		let limit = limit.to_string();
		let body = endpoints
			.send("Snowstorm concept search", || {
				endpoints
					.client
					.get(&url)
					.header("Accept", "application/json")
					.query(&[
						("term", query),
						("activeFilter", "true"),
						("offset", "0"),
						("limit", limit.as_str()),
					])
			})
			.await?;
		Ok(json::array_at(&body, "items")
			.iter()
			.map(|item| snowstorm_concept(item, &endpoints.version))
			.collect())
	}
}

struct UmlsSearchStrategy(Arc<SnomedEndpoints>);

#[async_trait]
impl ResolverStrategy<Record> for UmlsSearchStrategy {
	fn name(&self) -> &str {
		"umls_search"
	}

	async fn attempt(&self, query: &str, limit: usize) -> AdapterResult<Vec<Record>> {
		let endpoints = &self.0;
		let Some(key) = &endpoints.umls_key else {
			return Err(AdapterError::MissingCredential {
				source_name: "UMLS".to_string(),
			});
		};
		let limit = limit.to_string();
		let body = endpoints
			.send("UMLS search", || {
				endpoints
					.client
					.get(&endpoints.umls_url)
					.header("Accept", "application/json")
					.query(&[
						("string", query),
						("sabs", "SNOMEDCT_US"),
						("returnIdType", "code"),
						("apiKey", key.expose_secret()),
						("pageSize", limit.as_str()),
					])
			})
			.await?;
		Ok(parse_umls_results(&body))
	}
}

struct FhirLookupStrategy(Arc<SnomedEndpoints>);

#[async_trait]
impl ResolverStrategy<Record> for FhirLookupStrategy {
	fn name(&self) -> &str {
		"fhir_lookup"
	}

	async fn attempt(&self, concept_id: &str, _limit: usize) -> AdapterResult<Vec<Record>> {
		let endpoints = &self.0;
		let url = format!("{}/CodeSystem/$lookup", endpoints.fhir_url);
		let payload = json!({
			"resourceType": "Parameters",
			"parameter": [
				{"name": "code", "valueString": concept_id},
				{"name": "system", "valueString": SNOMED_SYSTEM},
				{"name": "property", "valueString": "*"}
			]
		});
		let body = endpoints
			.send("FHIR CodeSystem lookup", || endpoints.fhir_post(&url, &payload))
			.await?;
		Ok(parse_fhir_lookup(concept_id, &body).into_iter().collect())
	}
}

struct SnowstormConceptStrategy(Arc<SnomedEndpoints>);

#[async_trait]
impl ResolverStrategy<Record> for SnowstormConceptStrategy {
	fn name(&self) -> &str {
		"snowstorm_concept"
	}

	async fn attempt(&self, concept_id: &str, _limit: usize) -> AdapterResult<Vec<Record>> {
		let endpoints = &self.0;
		let url = format!("{}/concepts/{}", endpoints.browser_url(), concept_id);
		let body = endpoints
			.send("Snowstorm concept details", || {
				endpoints.client.get(&url).header("Accept", "application/json")
			})
			.await?;
		Ok(parse_snowstorm_details(&body, &endpoints.version)
			.into_iter()
			.collect())
	}
}

pub fn parse_fhir_expansion(body: &Value) -> Vec<Record> {
	json::array_at(body, "expansion.contains")
		.iter()
		.map(|item| {
			let mut record = Record::new();
			for key in ["code", "display", "system", "version"] {
				record.insert(key.to_string(), json::str_at(item, key).into());
			}
			record.insert("api_source".to_string(), "FHIR".into());
			record
		})
		.collect()
}

/// Flatten one Snowstorm browser concept
pub fn snowstorm_concept(item: &Value, version: &str) -> Record {
	let mut record = Record::new();
	record.insert("code".to_string(), json::str_at(item, "conceptId").into());
	record.insert("display".to_string(), json::str_at(item, "pt.term").into());
	record.insert("system".to_string(), SNOMED_SYSTEM.into());
	record.insert("version".to_string(), version.into());
	record.insert("module".to_string(), json::str_at(item, "moduleId").into());
	record.insert(
		"active".to_string(),
		FieldValue::Bool(item.get("active").and_then(Value::as_bool).unwrap_or(true)),
	);
	record.insert("api_source".to_string(), "Snowstorm".into());

	let definition_status = json::str_at(item, "definitionStatus.term");
	if !definition_status.is_empty() {
		record.insert("definition_status".to_string(), definition_status.into());
	}
	let full_name = json::str_at(item, "fsn.term");
	if !full_name.is_empty() {
		if let Some(tag) = semantic_tag(&full_name) {
			record.insert("semantic_tag".to_string(), tag.into());
		}
		record.insert("full_name".to_string(), full_name.into());
	}
	record
}

/// UMLS rows, keeping only those sourced from `SNOMEDCT_US`
pub fn parse_umls_results(body: &Value) -> Vec<Record> {
	json::array_at(body, "result.results")
		.iter()
		.filter(|item| json::str_at(item, "rootSource").contains("SNOMEDCT_US"))
		.map(|item| {
			let mut record = Record::new();
			record.insert("code".to_string(), json::str_at(item, "ui").into());
			record.insert("display".to_string(), json::str_at(item, "name").into());
			record.insert("system".to_string(), SNOMED_SYSTEM.into());
			record.insert("semantic_type".to_string(), json::str_at(item, "rootSource").into());
			record.insert("uri".to_string(), json::str_at(item, "uri").into());
			record.insert("api_source".to_string(), "UMLS".into());
			record
		})
		.collect()
}

/// Concept details from a `$lookup` response; properties become `property.<name>` fields
pub fn parse_fhir_lookup(concept_id: &str, body: &Value) -> Option<Record> {
	let parameters = json::array_at(body, "parameter");
	if parameters.is_empty() {
		return None;
	}
	let mut record = Record::new();
	record.insert("code".to_string(), concept_id.into());
	record.insert("system".to_string(), SNOMED_SYSTEM.into());
	record.insert("api_source".to_string(), "FHIR".into());
	for param in parameters {
		match json::str_at(param, "name").as_str() {
			"display" => {
				record.insert("display".to_string(), json::str_at(param, "valueString").into());
			},
			"property" => {
				let parts = json::array_at(param, "part");
				let (Some(name_part), Some(value_part)) = (parts.first(), parts.get(1)) else {
					continue;
				};
				let name = match json::str_at(name_part, "valueString") {
					name if name.is_empty() => json::str_at(name_part, "valueCode"),
					name => name,
				};
				let value = ["valueString", "valueCode", "valueBoolean"]
					.iter()
					.find_map(|key| value_part.get(*key));
				if let Some(value) = value.filter(|_| !name.is_empty()) {
					record.insert(format!("property.{}", name), FieldValue::from_json(value));
				}
			},
			_ => {},
		}
	}
	Some(record)
}

/// Concept details from the Snowstorm concept endpoint
pub fn parse_snowstorm_details(body: &Value, version: &str) -> Option<Record> {
	body.get("conceptId")?;
	let mut record = snowstorm_concept(body, version);
	if let Some(FieldValue::Text(status)) = record.remove("definition_status") {
		record.insert("property.definitionStatus".to_string(), status.into());
	}
	if let Some(FieldValue::Text(tag)) = record.remove("semantic_tag") {
		record.insert("property.semanticTag".to_string(), tag.into());
	}

	let descriptions: Vec<String> = json::array_at(body, "descriptions")
		.iter()
		.map(|d| json::str_at(d, "term"))
		.filter(|t| !t.is_empty())
		.collect();
	if !descriptions.is_empty() {
		record.insert("descriptions".to_string(), descriptions.join("; ").into());
	}
	let relationships: Vec<String> = json::array_at(body, "relationships")
		.iter()
		.map(|r| format!("{} -> {}", json::str_at(r, "type.term"), json::str_at(r, "target.term")))
		.collect();
	if !relationships.is_empty() {
		record.insert("relationships".to_string(), relationships.join("; ").into());
	}
	Some(record)
}

#[derive(Debug)]
pub struct TerminologyAdapter {
	info: AdapterInfo,
	search: TieredResolver<Record>,
	concepts: TieredResolver<Record>,
}

impl TerminologyAdapter {
	pub fn new(config: SourceRuntimeConfig, cache: Option<Arc<TermCache>>) -> AdapterResult<Self> {
		let client = global_client_cache().client_for(&config)?;
		let endpoints = Arc::new(SnomedEndpoints::new(&config, client));

		let mut search = TieredResolver::new("SNOMED term")
			.with_strategy(Box::new(FhirExpandStrategy(Arc::clone(&endpoints))))
			.with_strategy(Box::new(SnowstormSearchStrategy(Arc::clone(&endpoints))));
		if endpoints.has_umls_key() {
			search = search.with_strategy(Box::new(UmlsSearchStrategy(Arc::clone(&endpoints))));
		}
		let concepts = TieredResolver::new("SNOMED concept")
			.with_strategy(Box::new(FhirLookupStrategy(Arc::clone(&endpoints))))
			.with_strategy(Box::new(SnowstormConceptStrategy(Arc::clone(&endpoints))));

		let info = AdapterInfo::new(SourceKey::Terminology, "SNOMED CT", endpoints.fhir_url.clone())
			.with_description("SNOMED CT concepts via FHIR, Snowstorm and UMLS");
		Ok(Self::with_resolvers(info, search, concepts, cache))
	}

	/// Assemble from prebuilt resolvers; both are attached to `cache` when given
	pub fn with_resolvers(
		info: AdapterInfo,
		search: TieredResolver<Record>,
		concepts: TieredResolver<Record>,
		cache: Option<Arc<TermCache>>,
	) -> Self {
		let (search, concepts) = match cache {
			Some(cache) => (
				search.with_cache(Arc::clone(&cache)),
				concepts
					.with_cache(cache)
					.with_cache_namespace(CONCEPT_NAMESPACE),
			),
			None => (search, concepts),
		};
		Self {
			info,
			search,
			concepts,
		}
	}

	pub fn search_strategies(&self) -> Vec<&str> {
		self.search.strategy_names()
	}

	pub async fn search_terms(&self, query: &str, max_results: usize) -> AdapterResult<Vec<Record>> {
		let resolution = self.search.resolve(query, max_results).await?;
		debug!(
			"{} SNOMED terms for '{}' via {}",
			resolution.items.len(),
			query,
			resolution.strategy
		);
		Ok(resolution.items)
	}

	pub async fn lookup_concept(&self, concept_id: &str) -> AdapterResult<Record> {
		let resolution = self.concepts.resolve(concept_id, 1).await?;
		resolution
			.items
			.into_iter()
			.next()
			.ok_or_else(|| AdapterError::NotFound(format!("SNOMED concept {}", concept_id)))
	}
}

#[async_trait]
impl SourceAdapter for TerminologyAdapter {
	fn adapter_info(&self) -> &AdapterInfo {
		&self.info
	}

	async fn fetch(&self, query: &Query, options: &FetchOptions) -> AdapterResult<Vec<Record>> {
		self.search_terms(query.text(), options.max_results_or(DEFAULT_MAX_RESULTS))
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json as value;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct FixedStrategy {
		name: &'static str,
		records: Vec<Record>,
		calls: Arc<AtomicUsize>,
	}

	impl FixedStrategy {
		fn boxed(name: &'static str, codes: &[&str]) -> (Box<Self>, Arc<AtomicUsize>) {
			let calls = Arc::new(AtomicUsize::new(0));
			let records = codes
				.iter()
				.map(|code| Record::from([("code".to_string(), FieldValue::from(*code))]))
				.collect();
			(
				Box::new(Self {
					name,
					records,
					calls: Arc::clone(&calls),
				}),
				calls,
			)
		}
	}

	#[async_trait]
	impl ResolverStrategy<Record> for FixedStrategy {
		fn name(&self) -> &str {
			self.name
		}

		async fn attempt(&self, _query: &str, _limit: usize) -> AdapterResult<Vec<Record>> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Ok(self.records.clone())
		}
	}

	fn info() -> AdapterInfo {
		AdapterInfo::new(SourceKey::Terminology, "SNOMED CT", "http://localhost")
	}

	#[test]
	fn test_semantic_tag() {
		assert_eq!(semantic_tag("Asthma (disorder)").as_deref(), Some("disorder"));
		assert_eq!(
			semantic_tag("Aspirin (product) (medicinal product)").as_deref(),
			Some("medicinal product")
		);
		assert_eq!(semantic_tag("Asthma"), None);
		assert_eq!(semantic_tag("(broken"), None);
	}

	#[tokio::test]
	async fn test_second_search_served_from_cache() {
		let (fhir, fhir_calls) = FixedStrategy::boxed("fhir", &[]);
		let (snowstorm, snowstorm_calls) = FixedStrategy::boxed("snowstorm", &["195967001"]);
		let cache = Arc::new(TermCache::new(16, None));
		let adapter = TerminologyAdapter::with_resolvers(
			info(),
			TieredResolver::new("term").with_strategy(fhir).with_strategy(snowstorm),
			TieredResolver::new("concept"),
			Some(Arc::clone(&cache)),
		);

		let first = adapter.search_terms("asthma", 20).await.unwrap();
		let second = adapter.search_terms("asthma", 20).await.unwrap();
		assert_eq!(first, second);
		assert_eq!(fhir_calls.load(Ordering::SeqCst), 1);
		assert_eq!(snowstorm_calls.load(Ordering::SeqCst), 1);
		assert_eq!(cache.stats().hits, 1);

		// a different limit is a different key
		adapter.search_terms("asthma", 5).await.unwrap();
		assert_eq!(snowstorm_calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_concepts_use_separate_namespace() {
		let (terms, term_calls) = FixedStrategy::boxed("terms", &["term-hit"]);
		let (lookup, lookup_calls) = FixedStrategy::boxed("lookup", &["concept-hit"]);
		let cache = Arc::new(TermCache::new(16, None));
		let adapter = TerminologyAdapter::with_resolvers(
			info(),
			TieredResolver::new("term").with_strategy(terms),
			TieredResolver::new("concept").with_strategy(lookup),
			Some(cache),
		);

		let term = adapter.search_terms("195967001", 1).await.unwrap();
		let concept = adapter.lookup_concept("195967001").await.unwrap();
		assert_eq!(term[0]["code"], FieldValue::from("term-hit"));
		assert_eq!(concept["code"], FieldValue::from("concept-hit"));
		adapter.lookup_concept("195967001").await.unwrap();
		assert_eq!(term_calls.load(Ordering::SeqCst), 1);
		assert_eq!(lookup_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_exhausted_search_is_an_error() {
		let (empty, _) = FixedStrategy::boxed("empty", &[]);
		let adapter = TerminologyAdapter::with_resolvers(
			info(),
			TieredResolver::new("term").with_strategy(empty),
			TieredResolver::new("concept"),
			None,
		);
		let err = adapter
			.fetch(&Query::disease("zzz").unwrap(), &FetchOptions::default())
			.await
			.unwrap_err();
		assert!(matches!(err, AdapterError::Exhausted { .. }));
	}

	#[test]
	fn test_umls_key_enables_third_strategy() {
		let plain = TerminologyAdapter::new(SourceRuntimeConfig::new(SourceKey::Terminology), None).unwrap();
		assert_eq!(plain.search_strategies(), vec!["fhir_expand", "snowstorm_search"]);

		let keyed = TerminologyAdapter::new(
			SourceRuntimeConfig::new(SourceKey::Terminology).with_secondary_key(SecretString::new("umls")),
			None,
		)
		.unwrap();
		assert_eq!(
			keyed.search_strategies(),
			vec!["fhir_expand", "snowstorm_search", "umls_search"]
		);
	}

	#[test]
	fn test_snowstorm_concept_normalization() {
		let item = value!({
			"conceptId": "195967001",
			"active": true,
			"moduleId": "900000000000207008",
			"definitionStatus": {"term": "Fully defined"},
			"fsn": {"term": "Asthma (disorder)"},
			"pt": {"term": "Asthma"}
		});
		let record = snowstorm_concept(&item, "current");
		assert_eq!(record["display"], FieldValue::from("Asthma"));
		assert_eq!(record["semantic_tag"], FieldValue::from("disorder"));
		assert_eq!(record["definition_status"], FieldValue::from("Fully defined"));
		assert_eq!(record["active"], FieldValue::Bool(true));
	}

	#[test]
	fn test_fhir_lookup_properties() {
		let body = value!({"parameter": [
			{"name": "display", "valueString": "Asthma"},
			{"name": "property", "part": [
				{"name": "code", "valueCode": "inactive"},
				{"name": "value", "valueBoolean": false}
			]},
			{"name": "property", "part": [
				{"name": "code", "valueString": "moduleId"},
				{"name": "value", "valueCode": "900000000000207008"}
			]}
		]});
		let record = parse_fhir_lookup("195967001", &body).unwrap();
		assert_eq!(record["display"], FieldValue::from("Asthma"));
		assert_eq!(record["property.inactive"], FieldValue::Bool(false));
		assert_eq!(record["property.moduleId"], FieldValue::from("900000000000207008"));
		assert!(parse_fhir_lookup("1", &value!({})).is_none());
	}

	#[test]
	fn test_umls_filters_non_snomed_rows() {
		let body = value!({"result": {"results": [
			{"ui": "195967001", "name": "Asthma", "rootSource": "SNOMEDCT_US", "uri": "u"},
			{"ui": "C0004096", "name": "Asthma", "rootSource": "MTH"}
		]}});
		let records = parse_umls_results(&body);
		assert_eq!(records.len(), 1);
		assert_eq!(records[0]["api_source"], FieldValue::from("UMLS"));
	}
}
