//! In-memory collaborator doubles and canned fixtures for exercising the
//! turn pipeline without a catalog index, model endpoint, or log sink.

use std::{
	collections::{BTreeMap, BTreeSet},
	sync::{
		Mutex,
		atomic::{AtomicU32, AtomicUsize, Ordering},
	},
	time::Duration,
};

use color_eyre::eyre;
use serde::Deserialize;
use serde_json::Value;

use aisle_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use aisle_domain::{FilterSet, Product, Vocabulary};
use aisle_service::{
	BoxFuture, ConversationLogger, EmbeddingProvider, LogRecord, ProductIndex, QueryParser,
	ScoredProduct,
};
use aisle_providers::parser::ParsedHints;

/// Filter-matching index over a fixed product list. Scores are constant so
/// ordering is decided by the service's score-then-SKU rule.
pub struct MemoryIndex {
	products: Vec<Product>,
	query_count: AtomicUsize,
	lookup_count: AtomicUsize,
	queries: Mutex<Vec<FilterSet>>,
	/// Number of upcoming queries that fail before the index recovers.
	fail_next: AtomicU32,
}

impl MemoryIndex {
	pub fn new(products: Vec<Product>) -> Self {
		Self {
			products,
			query_count: AtomicUsize::new(0),
			lookup_count: AtomicUsize::new(0),
			queries: Mutex::new(Vec::new()),
			fail_next: AtomicU32::new(0),
		}
	}

	pub fn fail_next_queries(&self, count: u32) {
		self.fail_next.store(count, Ordering::SeqCst);
	}

	pub fn query_count(&self) -> usize {
		self.query_count.load(Ordering::SeqCst)
	}

	pub fn lookup_count(&self) -> usize {
		self.lookup_count.load(Ordering::SeqCst)
	}

	/// Every filter set queried so far, in call order.
	pub fn queries(&self) -> Vec<FilterSet> {
		self.queries.lock().map(|q| q.clone()).unwrap_or_default()
	}
}

impl ProductIndex for MemoryIndex {
	fn query<'a>(
		&'a self,
		filters: &'a FilterSet,
		top_k: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ScoredProduct>>> {
		Box::pin(async move {
			self.query_count.fetch_add(1, Ordering::SeqCst);

			if let Ok(mut queries) = self.queries.lock() {
				queries.push(filters.clone());
			}

			let remaining = self.fail_next.load(Ordering::SeqCst);

			if remaining > 0 {
				self.fail_next.store(remaining - 1, Ordering::SeqCst);

				return Err(eyre::eyre!("Injected index failure."));
			}

			let mut matched: Vec<ScoredProduct> = self
				.products
				.iter()
				.filter(|product| filters.matches(product))
				.map(|product| ScoredProduct { product: product.clone(), score: 1. })
				.collect();

			matched.sort_by(|a, b| a.product.sku.cmp(&b.product.sku));
			matched.truncate(top_k as usize);

			Ok(matched)
		})
	}

	fn lookup_sku<'a>(
		&'a self,
		sku: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Option<Product>>> {
		Box::pin(async move {
			self.lookup_count.fetch_add(1, Ordering::SeqCst);

			Ok(self.products.iter().find(|p| p.sku.eq_ignore_ascii_case(sku)).cloned())
		})
	}
}

/// Returns the same hints for every utterance.
pub struct StaticParser {
	pub hints: ParsedHints,
}

impl StaticParser {
	pub fn empty() -> Self {
		Self { hints: ParsedHints::default() }
	}
}

impl QueryParser for StaticParser {
	fn parse<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_utterance: &'a str,
		_vocabulary_digest: &'a Value,
	) -> BoxFuture<'a, color_eyre::Result<ParsedHints>> {
		Box::pin(async move { Ok(self.hints.clone()) })
	}
}

/// Sleeps past any reasonable timeout, for exercising the fallback path.
pub struct SlowParser {
	pub delay_ms: u64,
}

impl QueryParser for SlowParser {
	fn parse<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_utterance: &'a str,
		_vocabulary_digest: &'a Value,
	) -> BoxFuture<'a, color_eyre::Result<ParsedHints>> {
		Box::pin(async move {
			tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;

			Ok(ParsedHints::default())
		})
	}
}

pub struct StaticEmbedding;

impl EmbeddingProvider for StaticEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(vec![vec![0.; cfg.dimensions as usize]; texts.len()]) })
	}
}

/// Embeds each text with a canned vector, for steering the rerank in tests.
pub struct KeyedEmbedding {
	pub vectors: BTreeMap<String, Vec<f32>>,
	pub fallback: Vec<f32>,
}

impl EmbeddingProvider for KeyedEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			Ok(texts
				.iter()
				.map(|text| self.vectors.get(text).unwrap_or(&self.fallback).clone())
				.collect())
		})
	}
}

#[derive(Default)]
pub struct RecordingLogger {
	records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn records(&self) -> Vec<LogRecord> {
		self.records.lock().map(|r| r.clone()).unwrap_or_default()
	}
}

impl ConversationLogger for RecordingLogger {
	fn append<'a>(&'a self, record: &'a LogRecord) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			if let Ok(mut records) = self.records.lock() {
				records.push(record.clone());
			}

			Ok(())
		})
	}
}

/// Always errors, for asserting that log failures stay internal.
pub struct FailingLogger;

impl ConversationLogger for FailingLogger {
	fn append<'a>(&'a self, _record: &'a LogRecord) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async { Err(eyre::eyre!("Injected logger failure.")) })
	}
}

#[derive(Deserialize)]
struct CatalogFile {
	#[serde(default, rename = "product")]
	products: Vec<Product>,
}

pub fn load_catalog_toml(raw: &str) -> color_eyre::Result<Vec<Product>> {
	let file: CatalogFile = toml::from_str(raw)?;

	Ok(file.products)
}

/// Connectivity-hardware vocabulary used across the integration tests.
/// Drop order: color, feature, length, subcategory, connector, category.
pub fn fixture_vocabulary() -> Vocabulary {
	Vocabulary::from_toml_str(
		r#"
version = 1
skus    = ["HDMM10", "HDMM6F", "DK30A2DHU", "DKWG30", "CDP2HD-1M", "KVM4K2P"]

[[dimension]]
name          = "color"
merge         = "exclusive"
drop_priority = 10
values        = ["black", "white", "gray", "silver"]

[[dimension]]
name          = "feature"
merge         = "cumulative"
drop_priority = 20
values        = ["4k", "hdr", "power delivery", "ethernet passthrough", "dual monitor", "triple monitor"]

[[dimension]]
name          = "length"
merge         = "exclusive"
drop_priority = 30
values        = ["1m", "2m", "3ft", "6ft", "10ft"]

[[dimension]]
name          = "subcategory"
merge         = "exclusive"
drop_priority = 40
values        = ["usb-c dock", "hdmi cable", "displayport cable", "usb-c hub", "kvm switch"]

[[dimension]]
name          = "connector"
merge         = "cumulative"
drop_priority = 50
values        = ["usb-c", "hdmi", "displayport", "vga", "ethernet", "thunderbolt"]

[[dimension]]
name          = "category"
merge         = "exclusive"
drop_priority = 60
values        = ["cable", "dock", "hub", "adapter", "switch"]

[synonyms]
"cables"     = "cable"
"docks"      = "dock"
"hubs"       = "hub"
"adapters"   = "adapter"
"dp"         = "displayport"
"usbc"       = "usb-c"
"type-c"     = "usb-c"
"grey"       = "gray"
"cabel"      = "cable"
"hdmi cabel" = "hdmi cable"

[[impossible_pair]]
a = "vga"
b = "ethernet"
"#,
	)
	.unwrap_or_else(|err| panic!("fixture vocabulary parse failed: {err}"))
}

pub fn fixture_catalog() -> Vec<Product> {
	load_catalog_toml(
		r#"
[[product]]
sku  = "HDMM10"
name = "10ft HDMI cable"
[product.attributes]
category    = "cable"
subcategory = "hdmi cable"
color       = "black"
length      = "10ft"
[[product]]
sku        = "HDMM6F"
name       = "6ft HDMI cable"
features   = ["4k"]
connectors = ["hdmi"]
[product.attributes]
category    = "cable"
subcategory = "hdmi cable"
color       = "black"
length      = "6ft"

[[product]]
sku        = "DK30A2DHU"
name       = "Dual-monitor USB-C dock"
features   = ["4k", "power delivery", "dual monitor"]
connectors = ["usb-c", "hdmi", "displayport"]
[product.attributes]
category    = "dock"
subcategory = "usb-c dock"
color       = "silver"

[[product]]
sku        = "DKWG30"
name       = "Travel USB-C dock"
features   = ["power delivery"]
connectors = ["usb-c", "hdmi"]
[product.attributes]
category    = "dock"
subcategory = "usb-c dock"
color       = "white"

[[product]]
sku        = "CDP2HD-1M"
name       = "USB-C to HDMI cable, 1m"
features   = ["4k"]
connectors = ["usb-c", "hdmi"]
[product.attributes]
category    = "cable"
color       = "black"
length      = "1m"

[[product]]
sku        = "KVM4K2P"
name       = "2-port 4K KVM switch"
features   = ["4k"]
connectors = ["hdmi", "usb-c"]
[product.attributes]
category    = "switch"
subcategory = "kvm switch"
color       = "black"
"#,
	)
	.unwrap_or_else(|err| panic!("fixture catalog parse failed: {err}"))
}

/// A fully-populated configuration with every feature flag off except
/// multi-product replies. Tests flip flags per case.
pub fn sample_config() -> Config {
	toml::from_str(
		r#"
[service]
log_level           = "debug"
session_queue_depth = 1

[catalog]
vocabulary_path = "fixtures/vocabulary.toml"
products_path   = "fixtures/catalog.toml"

[providers.embedding]
provider_id     = "test"
api_base        = "http://localhost:0"
api_key         = ""
path            = "/v1/embeddings"
model           = "test-embedding"
dimensions      = 8
timeout_ms      = 250
default_headers = {}

[providers.query_parser]
provider_id     = "test"
api_base        = "http://localhost:0"
api_key         = ""
path            = "/v1/chat/completions"
model           = "test-parser"
temperature     = 0.0
timeout_ms      = 250
default_headers = {}

[search]
top_k                = 5
min_results          = 1
max_relaxation_steps = 4
retry_attempts       = 2
retry_backoff_ms     = 1

[features]
llm_parser       = false
multi_product    = true
conversation_log = true
semantic_ranking = false
"#,
	)
	.unwrap_or_else(|err| panic!("sample config parse failed: {err}"))
}

/// SKUs visible in a catalog, for quick assertions.
pub fn skus(products: &[Product]) -> BTreeSet<&str> {
	products.iter().map(|p| p.sku.as_str()).collect()
}
