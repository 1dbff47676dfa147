//! HTTP plumbing shared by the source adapters
//!
//! Status mapping, JSON decoding, bounded exponential-backoff retries and a
//! simple request spacer for upstreams that publish a requests-per-second cap.

use medlens_types::{AdapterError, AdapterResult, SourceKey};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
	/// Retries after the first attempt
	pub max_retries: u32,
	pub initial_backoff: Duration,
	pub max_backoff: Duration,
	/// Exponential factor applied per attempt
	pub multiplier: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: 3,
			initial_backoff: Duration::from_millis(1000),
			max_backoff: Duration::from_secs(30),
			multiplier: 2.0,
		}
	}
}

impl RetryConfig {
	pub fn with_max_retries(max_retries: u32) -> Self {
		Self {
			max_retries,
			..Self::default()
		}
	}

	/// No retries at all
	pub fn none() -> Self {
		Self::with_max_retries(0)
	}

	/// Backoff before retry number `attempt` (0-indexed)
	pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		let backoff_ms =
			self.initial_backoff.as_millis() as f64 * self.multiplier.powi(attempt as i32);
		Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
	}
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget runs out.
pub async fn with_retry<T, F, Fut>(
	config: &RetryConfig,
	operation_name: &str,
	mut operation: F,
) -> AdapterResult<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = AdapterResult<T>>,
{
	let mut attempt = 0;
	loop {
		match operation().await {
			Ok(result) => {
				if attempt > 0 {
					debug!("{} succeeded on attempt {}", operation_name, attempt + 1);
				}
				return Ok(result);
			},
			Err(e) if attempt < config.max_retries && e.is_transient() => {
				let backoff = config.backoff_for_attempt(attempt);
				warn!(
					"{} failed (attempt {}): {}. Retrying in {:?}",
					operation_name,
					attempt + 1,
					e,
					backoff
				);
				tokio::time::sleep(backoff).await;
				attempt += 1;
			},
			Err(e) => {
				if attempt > 0 {
					warn!(
						"{} failed after {} attempts: {}",
						operation_name,
						attempt + 1,
						e
					);
				}
				return Err(e);
			},
		}
	}
}

/// Map a transport error into the adapter error space
pub fn classify_send_error(error: reqwest::Error, timeout_ms: u64) -> AdapterError {
	if error.is_timeout() {
		AdapterError::Timeout { timeout_ms }
	} else if error.is_connect() {
		AdapterError::Connection(error.to_string())
	} else {
		AdapterError::HttpError(error)
	}
}

/// Check status and decode the body as JSON
pub async fn read_json(response: Response, source: SourceKey) -> AdapterResult<Value> {
	let status = response.status();
	if status == StatusCode::TOO_MANY_REQUESTS {
		return Err(AdapterError::RateLimitExceeded {
			source_name: source.to_string(),
		});
	}
	if !status.is_success() {
		let body = response.text().await.unwrap_or_default();
		debug!(
			"{} returned HTTP {}: {}",
			source,
			status.as_u16(),
			body.chars().take(200).collect::<String>()
		);
		return Err(AdapterError::from_http_failure(status.as_u16()));
	}

	let body = response.text().await.map_err(AdapterError::HttpError)?;
	serde_json::from_str(&body).map_err(|e| {
		AdapterError::invalid_response(format!("{} returned malformed JSON: {}", source, e))
	})
}

/// Send a prepared request and decode its JSON body
pub async fn send_json(
	request: RequestBuilder,
	source: SourceKey,
	timeout_ms: u64,
) -> AdapterResult<Value> {
	let response = request
		.send()
		.await
		.map_err(|e| classify_send_error(e, timeout_ms))?;
	read_json(response, source).await
}

/// Enforces a minimum spacing between requests to one upstream
#[derive(Debug)]
pub struct RateLimiter {
	min_interval: Duration,
	last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
	pub fn new(min_interval: Duration) -> Self {
		Self {
			min_interval,
			last_request: Mutex::new(None),
		}
	}

	/// At most `requests` per second
	pub fn per_second(requests: u32) -> Self {
		Self::new(Duration::from_millis(1000 / u64::from(requests.max(1))))
	}

	pub fn min_interval(&self) -> Duration {
		self.min_interval
	}

	/// Wait until the next request may be sent, then record it
	pub async fn wait_for_slot(&self) {
		let mut last = self.last_request.lock().await;
		if let Some(previous) = *last {
			let elapsed = previous.elapsed();
			if elapsed < self.min_interval {
				tokio::time::sleep(self.min_interval - elapsed).await;
			}
		}
		*last = Some(Instant::now());
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	#[test]
	fn test_backoff_growth_is_capped() {
		let config = RetryConfig {
			max_retries: 5,
			initial_backoff: Duration::from_millis(100),
			max_backoff: Duration::from_millis(300),
			multiplier: 2.0,
		};
		assert_eq!(config.backoff_for_attempt(0), Duration::from_millis(100));
		assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(200));
		assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(300));
		assert_eq!(config.backoff_for_attempt(6), Duration::from_millis(300));
	}

	#[tokio::test(start_paused = true)]
	async fn test_retry_recovers_from_transient_error() {
		let calls = Arc::new(AtomicUsize::new(0));
		let tracker = Arc::clone(&calls);
		let result = with_retry(&RetryConfig::with_max_retries(3), "flaky", || {
			let tracker = Arc::clone(&tracker);
			async move {
				if tracker.fetch_add(1, Ordering::SeqCst) < 2 {
					Err(AdapterError::from_http_failure(503))
				} else {
					Ok("ok")
				}
			}
		})
		.await;

		assert_eq!(result.unwrap(), "ok");
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_retry_budget_is_bounded() {
		let calls = Arc::new(AtomicUsize::new(0));
		let tracker = Arc::clone(&calls);
		let result: AdapterResult<()> =
			with_retry(&RetryConfig::with_max_retries(2), "down", || {
				let tracker = Arc::clone(&tracker);
				async move {
					tracker.fetch_add(1, Ordering::SeqCst);
					Err(AdapterError::Timeout { timeout_ms: 5000 })
				}
			})
			.await;

		assert!(matches!(result, Err(AdapterError::Timeout { .. })));
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_malformed_payload_not_retried() {
		let calls = Arc::new(AtomicUsize::new(0));
		let tracker = Arc::clone(&calls);
		let result: AdapterResult<()> =
			with_retry(&RetryConfig::with_max_retries(3), "malformed", || {
				let tracker = Arc::clone(&tracker);
				async move {
					tracker.fetch_add(1, Ordering::SeqCst);
					Err(AdapterError::invalid_response("unexpected token"))
				}
			})
			.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_rate_limiter_spaces_requests() {
		let limiter = RateLimiter::per_second(3);
		let start = Instant::now();
		limiter.wait_for_slot().await;
		limiter.wait_for_slot().await;
		limiter.wait_for_slot().await;
		assert!(start.elapsed() >= limiter.min_interval() * 2);
	}
}
