//! MedLens Service
//!
//! Fan-out aggregation over the source adapters and LLM summarization of
//! the aggregated result.

pub mod aggregator;
pub mod summarizer;

pub use aggregator::{
	AggregationConfig, AggregationStats, AggregatorService, AggregatorTrait,
	DEFAULT_GLOBAL_TIMEOUT_MS, DEFAULT_PER_SOURCE_TIMEOUT_MS,
};
pub use summarizer::{
	ChatCompletionClient, LlmConfig, LlmSummarizer, Summarizer, SummarizerError, TextGenerator,
};
