pub mod handlers;
pub mod search;
pub mod session;
pub mod time_serde;
pub mod turn;

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;
use uuid::Uuid;

use aisle_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use aisle_domain::{FilterSet, IntentType, Product, Vocabulary};
use aisle_providers::{embedding, parser, parser::ParsedHints};

pub use handlers::{HandlerResult, StaticTopic};
pub use search::{CascadingSearch, SearchOutcome};
pub use session::SessionStore;
pub use turn::TurnOutcome;

pub type ServiceResult<T> = Result<T, ServiceError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("Session {session_id} is already processing a turn.")]
	SessionBusy { session_id: Uuid },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
}

/// External vector/product index. Eventually consistent; may return fewer
/// than `top_k` items.
pub trait ProductIndex
where
	Self: Send + Sync,
{
	fn query<'a>(
		&'a self,
		filters: &'a FilterSet,
		top_k: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ScoredProduct>>>;

	/// Direct SKU lookup, bypassing filter search entirely.
	fn lookup_sku<'a>(&'a self, sku: &'a str)
	-> BoxFuture<'a, color_eyre::Result<Option<Product>>>;
}

pub trait QueryParser
where
	Self: Send + Sync,
{
	fn parse<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		utterance: &'a str,
		vocabulary_digest: &'a Value,
	) -> BoxFuture<'a, color_eyre::Result<ParsedHints>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

/// Fire-and-forget conversation logging; a failed append never fails the
/// turn.
pub trait ConversationLogger
where
	Self: Send + Sync,
{
	fn append<'a>(&'a self, record: &'a LogRecord) -> BoxFuture<'a, color_eyre::Result<()>>;
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ScoredProduct {
	pub product: Product,
	pub score: f32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
	Matched,
	/// Matched only after one or more relaxation steps.
	Relaxed,
	NoMatch,
	/// The turn never ran a search (greeting, farewell, blocked topic).
	NotSearched,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct LogRecord {
	#[serde(with = "crate::time_serde")]
	pub timestamp: time::OffsetDateTime,
	pub session_id: Uuid,
	pub utterance: String,
	pub intent: IntentType,
	pub filters: FilterSet,
	pub shown_skus: Vec<String>,
	pub outcome: MatchOutcome,
}

#[derive(Clone)]
pub struct Collaborators {
	pub index: Arc<dyn ProductIndex>,
	pub parser: Arc<dyn QueryParser>,
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub logger: Arc<dyn ConversationLogger>,
}

impl Collaborators {
	pub fn new(
		index: Arc<dyn ProductIndex>,
		parser: Arc<dyn QueryParser>,
		embedding: Arc<dyn EmbeddingProvider>,
		logger: Arc<dyn ConversationLogger>,
	) -> Self {
		Self { index, parser, embedding, logger }
	}
}

struct DefaultProviders;

impl QueryParser for DefaultProviders {
	fn parse<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		utterance: &'a str,
		vocabulary_digest: &'a Value,
	) -> BoxFuture<'a, color_eyre::Result<ParsedHints>> {
		Box::pin(parser::parse(cfg, utterance, vocabulary_digest))
	}
}

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

/// Swallows records. Used when the conversation log feature is off.
pub struct NullLogger;

impl ConversationLogger for NullLogger {
	fn append<'a>(&'a self, _record: &'a LogRecord) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

pub struct AisleService {
	pub cfg: Config,
	pub vocab: Arc<Vocabulary>,
	pub collaborators: Collaborators,
	pub sessions: SessionStore,
}

impl AisleService {
	pub fn new(cfg: Config, vocab: Arc<Vocabulary>, index: Arc<dyn ProductIndex>) -> Self {
		let provider = Arc::new(DefaultProviders);
		let collaborators =
			Collaborators::new(index, provider.clone(), provider, Arc::new(NullLogger));

		Self::with_collaborators(cfg, vocab, collaborators)
	}

	pub fn with_collaborators(
		cfg: Config,
		vocab: Arc<Vocabulary>,
		collaborators: Collaborators,
	) -> Self {
		let sessions = SessionStore::new(cfg.service.session_queue_depth);

		Self { cfg, vocab, collaborators, sessions }
	}
}
