//! Bounded memo of successful resolutions
//!
//! Keyed by `(query, limit)`. Concurrent readers and writers go through a
//! `DashMap`; when two writers race on one key the last write wins. Entries
//! optionally expire. Each insert is followed by evicting oldest entries until
//! the size is back within capacity, so once concurrent writers finish the
//! cache never holds more than `capacity` entries.

use dashmap::DashMap;
use medlens_types::Record;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
	pub query: String,
	pub limit: usize,
}

impl CacheKey {
	pub fn new(query: impl Into<String>, limit: usize) -> Self {
		Self {
			query: query.into(),
			limit,
		}
	}
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
	items: Vec<T>,
	inserted_at: Instant,
}

/// Thread-safe cache of resolved item lists
#[derive(Debug)]
pub struct ResolutionCache<T> {
	entries: DashMap<CacheKey, CacheEntry<T>>,
	capacity: usize,
	ttl: Option<Duration>,
	hits: AtomicU64,
	misses: AtomicU64,
}

/// Cache used by the terminology adapter
pub type TermCache = ResolutionCache<Record>;

/// Hit/miss counters and current size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
	pub entries: usize,
	pub hits: u64,
	pub misses: u64,
}

impl<T: Clone> ResolutionCache<T> {
	pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
		Self {
			entries: DashMap::new(),
			capacity: capacity.max(1),
			ttl,
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
		}
	}

	/// Look up a key, dropping it first if it has expired
	pub fn get(&self, key: &CacheKey) -> Option<Vec<T>> {
		if let Some(ttl) = self.ttl {
			self.entries
				.remove_if(key, |_, entry| entry.inserted_at.elapsed() > ttl);
		}
		match self.entries.get(key) {
			Some(entry) => {
				self.hits.fetch_add(1, Ordering::Relaxed);
				Some(entry.items.clone())
			},
			None => {
				self.misses.fetch_add(1, Ordering::Relaxed);
				None
			},
		}
	}

	pub fn insert(&self, key: CacheKey, items: Vec<T>) {
		self.entries.insert(
			key.clone(),
			CacheEntry {
				items,
				inserted_at: Instant::now(),
			},
		);
		while self.entries.len() > self.capacity {
			if !self.evict_oldest(&key) {
				break;
			}
		}
	}

	/// Remove the oldest entry other than `keep`; false when there is none
	fn evict_oldest(&self, keep: &CacheKey) -> bool {
		let oldest = self
			.entries
			.iter()
			.filter(|entry| entry.key() != keep)
			.min_by_key(|entry| entry.value().inserted_at)
			.map(|entry| entry.key().clone());
		match oldest {
			Some(key) => {
				debug!("Evicting cached resolution for '{}'", key.query);
				self.entries.remove(&key);
				true
			},
			None => false,
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn clear(&self) {
		self.entries.clear();
	}

	pub fn stats(&self) -> CacheStats {
		CacheStats {
			entries: self.entries.len(),
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
		}
	}
}

impl<T: Clone> Default for ResolutionCache<T> {
	fn default() -> Self {
		Self::new(1024, None)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_key_includes_limit() {
		let cache: ResolutionCache<u32> = ResolutionCache::default();
		cache.insert(CacheKey::new("diabetes", 20), vec![1, 2]);
		assert_eq!(cache.get(&CacheKey::new("diabetes", 20)), Some(vec![1, 2]));
		assert_eq!(cache.get(&CacheKey::new("diabetes", 10)), None);

		let stats = cache.stats();
		assert_eq!(stats.hits, 1);
		assert_eq!(stats.misses, 1);
	}

	#[test]
	fn test_capacity_evicts_oldest() {
		let cache: ResolutionCache<u32> = ResolutionCache::new(2, None);
		cache.insert(CacheKey::new("a", 1), vec![1]);
		std::thread::sleep(Duration::from_millis(2));
		cache.insert(CacheKey::new("b", 1), vec![2]);
		std::thread::sleep(Duration::from_millis(2));
		cache.insert(CacheKey::new("c", 1), vec![3]);

		assert_eq!(cache.len(), 2);
		assert!(cache.get(&CacheKey::new("a", 1)).is_none());
		assert_eq!(cache.get(&CacheKey::new("c", 1)), Some(vec![3]));
	}

	#[test]
	fn test_last_write_wins() {
		let cache: ResolutionCache<u32> = ResolutionCache::new(1, None);
		cache.insert(CacheKey::new("a", 1), vec![1]);
		cache.insert(CacheKey::new("a", 1), vec![9]);
		assert_eq!(cache.len(), 1);
		assert_eq!(cache.get(&CacheKey::new("a", 1)), Some(vec![9]));
	}

	#[test]
	fn test_concurrent_inserts_stay_within_capacity() {
		let cache: std::sync::Arc<ResolutionCache<u32>> =
			std::sync::Arc::new(ResolutionCache::new(4, None));
		let handles: Vec<_> = (0..8)
			.map(|thread| {
				let cache = cache.clone();
				std::thread::spawn(move || {
					for i in 0..50 {
						cache.insert(CacheKey::new(format!("{}-{}", thread, i), 1), vec![i]);
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}
		assert!(cache.len() <= 4, "cache grew to {}", cache.len());
		assert!(!cache.is_empty());
	}

	#[test]
	fn test_ttl_expiry() {
		let cache: ResolutionCache<u32> = ResolutionCache::new(8, Some(Duration::from_millis(1)));
		cache.insert(CacheKey::new("a", 1), vec![1]);
		std::thread::sleep(Duration::from_millis(5));
		assert!(cache.get(&CacheKey::new("a", 1)).is_none());
		assert!(cache.is_empty());
	}
}
