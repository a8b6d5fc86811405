use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub catalog: Catalog,
	pub providers: Providers,
	pub search: Search,
	pub features: Features,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
	/// Per-session turn queue depth. A second turn for the same session waits;
	/// anything beyond this is rejected.
	#[serde(default = "default_session_queue_depth")]
	pub session_queue_depth: u32,
}

#[derive(Debug, Deserialize)]
pub struct Catalog {
	pub vocabulary_path: PathBuf,
	pub products_path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub query_parser: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Search {
	/// Maximum products returned to the caller per turn.
	pub top_k: u32,
	/// Result count that ends the relaxation cascade.
	pub min_results: u32,
	/// Upper bound on dimensions dropped during one search.
	pub max_relaxation_steps: u32,
	/// Transient index failure retries before the turn degrades.
	pub retry_attempts: u32,
	pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Features {
	/// Consult the language-model query parser for advisory hints.
	pub llm_parser: bool,
	/// Allow handlers to return more than one product per turn.
	pub multi_product: bool,
	/// Emit one conversation log record per turn.
	pub conversation_log: bool,
	/// Rank filter matches by embedding similarity when available.
	pub semantic_ranking: bool,
}

fn default_session_queue_depth() -> u32 {
	1
}
