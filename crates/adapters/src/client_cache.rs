//! HTTP client cache for connection reuse across adapters
//!
//! Adapters built for the same source with the same transport settings share
//! one pooled `reqwest::Client`. Entries expire after a TTL so long-running
//! servers pick up DNS and TLS changes.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use medlens_types::{AdapterError, AdapterResult, SourceKey, SourceRuntimeConfig};
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_USER_AGENT: &str = concat!("medlens-aggregator/", env!("CARGO_PKG_VERSION"));

/// Transport settings that distinguish one pooled client from another
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientConfig {
	pub source: SourceKey,
	pub timeout_ms: u64,
	pub user_agent: String,
	pub max_idle_per_host: usize,
	pub keep_alive_timeout_ms: u64,
}

impl From<&SourceRuntimeConfig> for ClientConfig {
	fn from(config: &SourceRuntimeConfig) -> Self {
		// SEC rejects requests without a contact user agent
		let user_agent = match (config.source, &config.contact) {
			(SourceKey::Filings, Some(contact)) => contact.clone(),
			_ => DEFAULT_USER_AGENT.to_string(),
		};
		Self {
			source: config.source,
			timeout_ms: config.timeout_ms,
			user_agent,
			max_idle_per_host: 10,
			keep_alive_timeout_ms: 90_000,
		}
	}
}

#[derive(Debug, Clone)]
struct CachedClient {
	client: Client,
	created_at: Instant,
}

impl CachedClient {
	fn is_expired(&self, ttl: Duration) -> bool {
		self.created_at.elapsed() > ttl
	}
}

/// Thread-safe TTL cache of HTTP clients keyed by transport settings
#[derive(Clone, Debug)]
pub struct ClientCache {
	clients: Arc<DashMap<ClientConfig, CachedClient>>,
	ttl: Duration,
}

impl ClientCache {
	/// Cache with a 30-minute TTL
	pub fn new() -> Self {
		Self::with_ttl(Duration::from_secs(30 * 60))
	}

	pub fn with_ttl(ttl: Duration) -> Self {
		Self {
			clients: Arc::new(DashMap::new()),
			ttl,
		}
	}

	/// Get or create a client for the given configuration
	pub fn get_client(&self, config: &ClientConfig) -> AdapterResult<Client> {
		self.clients.remove_if(config, |_, cached| {
			let expired = cached.is_expired(self.ttl);
			if expired {
				warn!(
					"Client cache expired for {} (age: {:?}), will create new client",
					config.source,
					cached.created_at.elapsed()
				);
			}
			expired
		});

		if let Some(cached) = self.clients.get(config) {
			return Ok(cached.client.clone());
		}

		debug!("Creating new HTTP client for {}", config.source);
		let client = build_client(config)?;

		match self.clients.entry(config.clone()) {
			Entry::Occupied(entry) => Ok(entry.get().client.clone()),
			Entry::Vacant(entry) => {
				entry.insert(CachedClient {
					client: client.clone(),
					created_at: Instant::now(),
				});
				Ok(client)
			},
		}
	}

	/// Convenience wrapper for adapter constructors
	pub fn client_for(&self, config: &SourceRuntimeConfig) -> AdapterResult<Client> {
		self.get_client(&ClientConfig::from(config))
	}

	pub fn len(&self) -> usize {
		self.clients.len()
	}

	pub fn is_empty(&self) -> bool {
		self.clients.is_empty()
	}

	pub fn clear(&self) {
		self.clients.clear();
	}
}

impl Default for ClientCache {
	fn default() -> Self {
		Self::new()
	}
}

fn build_client(config: &ClientConfig) -> AdapterResult<Client> {
	ClientBuilder::new()
		.user_agent(config.user_agent.clone())
		.timeout(Duration::from_millis(config.timeout_ms))
		.pool_max_idle_per_host(config.max_idle_per_host)
		.pool_idle_timeout(Duration::from_millis(config.keep_alive_timeout_ms))
		.tcp_keepalive(Duration::from_secs(60))
		.build()
		.map_err(AdapterError::HttpError)
}

lazy_static::lazy_static! {
	static ref GLOBAL_CLIENT_CACHE: ClientCache = ClientCache::new();
}

/// Process-wide client cache shared by the default adapter constructors
pub fn global_client_cache() -> &'static ClientCache {
	&GLOBAL_CLIENT_CACHE
}
