//! Ordered fallback over alternative lookup strategies
//!
//! A [`TieredResolver`] tries each [`ResolverStrategy`] in turn and returns the
//! first non-empty result. Failing strategies are logged and skipped. When
//! every strategy comes back empty or failing the resolver reports
//! [`AdapterError::Exhausted`], which is distinct from any single network
//! error. Successful resolutions can be memoized in a [`ResolutionCache`].

use crate::cache::{CacheKey, ResolutionCache};
use async_trait::async_trait;
use medlens_types::{AdapterError, AdapterResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One way of resolving a query into items
#[async_trait]
pub trait ResolverStrategy<T>: Send + Sync {
	/// Short name used in logs and in [`Resolution::strategy`]
	fn name(&self) -> &str;

	async fn attempt(&self, query: &str, limit: usize) -> AdapterResult<Vec<T>>;
}

/// Successful outcome of a resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<T> {
	pub items: Vec<T>,
	/// Strategy that produced the items, `"cache"` for a cache hit
	pub strategy: String,
	pub from_cache: bool,
}

pub struct TieredResolver<T> {
	subject: String,
	strategies: Vec<Box<dyn ResolverStrategy<T>>>,
	cache: Option<Arc<ResolutionCache<T>>>,
	cache_namespace: String,
}

impl<T: Clone + Send + Sync + 'static> TieredResolver<T> {
	/// `subject` names what is being resolved, for logs and the exhausted error
	pub fn new(subject: impl Into<String>) -> Self {
		Self {
			subject: subject.into(),
			strategies: Vec::new(),
			cache: None,
			cache_namespace: String::new(),
		}
	}

	pub fn with_strategy(mut self, strategy: Box<dyn ResolverStrategy<T>>) -> Self {
		self.strategies.push(strategy);
		self
	}

	pub fn with_cache(mut self, cache: Arc<ResolutionCache<T>>) -> Self {
		self.cache = Some(cache);
		self
	}

	/// Prefix cache keys so two resolvers can share one cache
	pub fn with_cache_namespace(mut self, namespace: impl Into<String>) -> Self {
		self.cache_namespace = namespace.into();
		self
	}

	pub fn strategy_names(&self) -> Vec<&str> {
		self.strategies.iter().map(|s| s.name()).collect()
	}

	fn cache_key(&self, query: &str, limit: usize) -> CacheKey {
		CacheKey::new(format!("{}{}", self.cache_namespace, query), limit)
	}

	pub async fn resolve(&self, query: &str, limit: usize) -> AdapterResult<Resolution<T>> {
		if let Some(cache) = &self.cache {
			if let Some(items) = cache.get(&self.cache_key(query, limit)) {
				debug!("Resolved {} '{}' from cache", self.subject, query);
				return Ok(Resolution {
					items,
					strategy: "cache".to_string(),
					from_cache: true,
				});
			}
		}

		for strategy in &self.strategies {
			match strategy.attempt(query, limit).await {
				Ok(items) if !items.is_empty() => {
					info!(
						"Resolved {} '{}' via {} ({} items)",
						self.subject,
						query,
						strategy.name(),
						items.len()
					);
					if let Some(cache) = &self.cache {
						cache.insert(self.cache_key(query, limit), items.clone());
					}
					return Ok(Resolution {
						items,
						strategy: strategy.name().to_string(),
						from_cache: false,
					});
				},
				Ok(_) => {
					debug!(
						"{} strategy {} found nothing for '{}'",
						self.subject,
						strategy.name(),
						query
					);
				},
				Err(e) => {
					warn!(
						"{} strategy {} failed for '{}': {}",
						self.subject,
						strategy.name(),
						query,
						e
					);
				},
			}
		}

		Err(AdapterError::Exhausted {
			subject: format!("{} '{}'", self.subject, query),
		})
	}
}

impl<T> std::fmt::Debug for TieredResolver<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TieredResolver")
			.field("subject", &self.subject)
			.field(
				"strategies",
				&self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
			)
			.field("cached", &self.cache.is_some())
			.finish()
	}
}
