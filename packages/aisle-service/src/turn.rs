//! The turn pipeline. One utterance in, exactly one [`HandlerResult`] out;
//! no path through this module fails a turn once the session is checked out.

use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use aisle_domain::{
	ConversationState, FeatureOffer, FilterSet, FilterValue, GuidancePhase, Intent, IntentType,
	Normalized, SetupKind, apply_post_rules, classify, extract, merge, normalize,
	product::FEATURE_DIMENSION,
};

use crate::{
	AisleService, LogRecord, MatchOutcome, ScoredProduct, ServiceError, ServiceResult,
	handlers::{Handler, HandlerResult, detect_monitor_count, detect_setup},
	search::CascadingSearch,
	session::SessionGuard,
};

#[derive(Clone, Debug)]
pub struct TurnOutcome {
	pub session_id: Uuid,
	pub turn: u64,
	pub intent: IntentType,
	pub filters: FilterSet,
	pub result: HandlerResult,
}

impl AisleService {
	/// Processes one utterance for a session. Fails only on an empty
	/// utterance or a busy session; every other condition degrades to a
	/// typed [`HandlerResult`].
	pub async fn process_turn(
		&self,
		session_id: Uuid,
		utterance: &str,
	) -> ServiceResult<TurnOutcome> {
		if utterance.trim().is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "Utterance must not be empty.".into(),
			});
		}

		let mut state = self.sessions.checkout(session_id).await?;

		if state.session_id != session_id {
			tracing::warn!(%session_id, "Session state does not match its key; resetting.");
			state.restore();
		}

		let norm = normalize(utterance, &self.vocab);
		let intent = classify(utterance, &self.vocab, &state);
		let adjusted = apply_post_rules(intent, &norm, &state, &self.vocab);
		let intent = adjusted.intent;
		let handler = Handler::select(&intent);
		let filters = self.resolve_filters(&intent, &norm, &adjusted.hints, &state).await;

		tracing::debug!(
			%session_id,
			intent = %intent.kind,
			filter_count = filters.len(),
			"Resolved turn intent."
		);

		let (result, outcome) =
			self.dispatch(handler, &intent, &norm, &filters, &mut state).await;

		state.turn += 1;
		state.last_intent = Some(intent.kind);

		self.log_turn(&state, utterance, intent.kind, &filters, outcome).await;

		Ok(TurnOutcome {
			session_id,
			turn: state.turn,
			intent: intent.kind,
			filters,
			result,
		})
	}

	/// Steps 3 and 4 of the pipeline: post-rule hints, optional advisory
	/// model hints, deterministic extraction, then the turn-over-turn merge.
	async fn resolve_filters(
		&self,
		intent: &Intent,
		norm: &Normalized,
		hints: &FilterSet,
		state: &ConversationState,
	) -> FilterSet {
		let mut base = hints.clone();

		if self.cfg.features.llm_parser {
			let advisory = self.model_hints(&norm.text).await;

			// Advisory only: the model may fill dimensions nothing else
			// mentioned, never override deterministic output.
			for (dimension, value) in advisory.entries() {
				if !base.contains(dimension) {
					match value {
						FilterValue::One(v) => base.set_one(dimension, v.clone()),
						FilterValue::Many(vs) =>
							for v in vs.iter() {
								base.add_cumulative(dimension, v.clone());
							},
					}
				}
			}
		}

		let extracted = extract(norm, &self.vocab);
		let turn_filters = merge(&base, &extracted, &self.vocab);

		if intent.refinement
			|| matches!(
				intent.kind,
				IntentType::SetupFollowup
					| IntentType::MultiFollowup
					| IntentType::SingleFollowup
					| IntentType::FeatureSearchAccept
			) {
			merge(&state.filters, &turn_filters, &self.vocab)
		} else {
			turn_filters
		}
	}

	/// Calls the query-understanding model with a hard timeout; any failure
	/// collapses to empty hints.
	async fn model_hints(&self, text: &str) -> FilterSet {
		let cfg = &self.cfg.providers.query_parser;
		let digest = vocabulary_digest(&self.vocab);
		let call = self.collaborators.parser.parse(cfg, text, &digest);

		let parsed = match tokio::time::timeout(Duration::from_millis(cfg.timeout_ms), call).await
		{
			Ok(Ok(parsed)) => parsed,
			Ok(Err(err)) => {
				tracing::warn!(error = %err, "Query parser failed; using rules only.");

				return FilterSet::new();
			},
			Err(_) => {
				tracing::warn!("Query parser timed out; using rules only.");

				return FilterSet::new();
			},
		};

		let mut hints = FilterSet::new();

		for (dimension, value) in &parsed.filters {
			let Some(schema) = self.vocab.dimension(dimension) else {
				continue;
			};
			let candidates: Vec<&str> = match value {
				Value::String(v) => vec![v.as_str()],
				Value::Array(vs) => vs.iter().filter_map(Value::as_str).collect(),
				_ => Vec::new(),
			};

			for candidate in candidates {
				if let Some(canonical) = self.vocab.canonical(&schema.name, candidate) {
					match schema.merge {
						aisle_domain::MergeMode::Exclusive => hints.set_one(dimension, canonical),
						aisle_domain::MergeMode::Cumulative =>
							hints.add_cumulative(dimension, canonical),
					}
				}
			}
		}

		hints
	}

	async fn dispatch(
		&self,
		handler: Handler,
		intent: &Intent,
		norm: &Normalized,
		filters: &FilterSet,
		state: &mut SessionGuard,
	) -> (HandlerResult, MatchOutcome) {
		match handler {
			Handler::Greeting => (HandlerResult::Greeting, MatchOutcome::NotSearched),
			Handler::Farewell => {
				state.clear_products();
				state.guidance = None;
				state.feature_offer = None;

				(HandlerResult::Farewell, MatchOutcome::NotSearched)
			},
			Handler::Blocked => (HandlerResult::BlockedTopic, MatchOutcome::NotSearched),
			Handler::Static(topic) =>
				(HandlerResult::StaticAnswer { topic }, MatchOutcome::NotSearched),
			Handler::Sku => self.handle_sku(intent, state).await,
			Handler::Guidance => self.handle_guidance(intent, norm, filters, state).await,
			Handler::Search => self.handle_search(norm, filters, state).await,
			Handler::Fallback => (HandlerResult::Clarification, MatchOutcome::NotSearched),
		}
	}

	/// Direct catalog lookup; the cascade is bypassed entirely.
	async fn handle_sku(
		&self,
		intent: &Intent,
		state: &mut SessionGuard,
	) -> (HandlerResult, MatchOutcome) {
		let Some(sku) = intent.sku.as_deref() else {
			return (HandlerResult::Clarification, MatchOutcome::NotSearched);
		};

		match self.collaborators.index.lookup_sku(sku).await {
			Ok(Some(product)) => {
				state.record_shown(std::slice::from_ref(&product));

				(HandlerResult::SingleProduct { product }, MatchOutcome::Matched)
			},
			Ok(None) =>
				(HandlerResult::NoMatch { filters: FilterSet::new() }, MatchOutcome::NoMatch),
			Err(err) => {
				tracing::warn!(error = %err, sku, "SKU lookup failed.");

				(HandlerResult::NoMatch { filters: FilterSet::new() }, MatchOutcome::NoMatch)
			},
		}
	}

	async fn handle_search(
		&self,
		norm: &Normalized,
		filters: &FilterSet,
		state: &mut SessionGuard,
	) -> (HandlerResult, MatchOutcome) {
		if filters.is_empty() {
			return (HandlerResult::Clarification, MatchOutcome::NotSearched);
		}

		let search =
			CascadingSearch::new(self.collaborators.index.as_ref(), &self.vocab, &self.cfg.search);
		let mut outcome = search.run(filters).await;

		if self.cfg.features.semantic_ranking {
			self.semantic_rerank(&norm.text, &mut outcome.products).await;
		}

		state.filters = filters.clone();
		state.feature_offer = None;

		let result = match outcome.outcome {
			MatchOutcome::NoMatch | MatchOutcome::NotSearched => {
				state.clear_products();

				HandlerResult::NoMatch { filters: filters.clone() }
			},
			_ => {
				let products = self.visible_products(&outcome.products);

				state.record_shown(
					&products.iter().map(|p| p.product.clone()).collect::<Vec<_>>(),
				);

				if products.len() == 1 {
					HandlerResult::SingleProduct { product: products[0].product.clone() }
				} else {
					state.feature_offer = offer_feature(filters, &products);

					HandlerResult::ProductList {
						products,
						dropped_dimensions: outcome.dropped_dimensions.clone(),
					}
				}
			},
		};

		(result, outcome.outcome)
	}

	async fn handle_guidance(
		&self,
		intent: &Intent,
		norm: &Normalized,
		filters: &FilterSet,
		state: &mut SessionGuard,
	) -> (HandlerResult, MatchOutcome) {
		if intent.kind == IntentType::SetupGuidance || state.guidance.is_none() {
			let flow = aisle_domain::GuidanceFlow::start(
				detect_setup(norm),
				detect_monitor_count(norm),
			);
			let setup = flow.setup;

			state.guidance = Some(flow);
			state.filters = filters.clone();

			return (HandlerResult::GuidanceQuestion { setup }, MatchOutcome::NotSearched);
		}

		// SetupFollowup with a flow in progress.
		let Some(mut flow) = state.guidance.clone() else {
			return (HandlerResult::Clarification, MatchOutcome::NotSearched);
		};

		if let Some(count) = detect_monitor_count(norm) {
			flow.monitor_count = Some(count);
		}

		let filters = self.guidance_filters(&flow, filters);

		match flow.phase {
			GuidancePhase::InitialQuestions => {
				// An answer with no usable constraints needs another question.
				if filters.is_empty() && flow.monitor_count.is_none() {
					let setup = flow.setup;

					state.guidance = Some(flow);

					return (HandlerResult::GuidanceQuestion { setup }, MatchOutcome::NotSearched);
				}

				flow.phase = GuidancePhase::Recommended;

				let (result, outcome) = self.guidance_recommendation(&filters, state).await;

				state.guidance = Some(flow);

				(result, outcome)
			},
			GuidancePhase::Recommended => {
				flow.phase = GuidancePhase::Complete;

				let (result, outcome) = self.guidance_recommendation(&filters, state).await;

				state.guidance = Some(flow);

				(result, outcome)
			},
			GuidancePhase::Complete => {
				state.guidance = None;

				self.handle_search(norm, &filters, state).await
			},
		}
	}

	/// A multi-monitor flow constrains the recommendation to products that
	/// actually drive that many displays, when the vocabulary knows the term.
	fn guidance_filters(&self, flow: &aisle_domain::GuidanceFlow, filters: &FilterSet) -> FilterSet {
		let mut filters = filters.clone();

		if flow.setup == SetupKind::MultiMonitor
			&& let Some(term) = flow.monitor_count.and_then(monitor_feature_term)
			&& self.vocab.canonical(FEATURE_DIMENSION, term).is_some()
		{
			filters.add_cumulative(FEATURE_DIMENSION, term);
		}

		filters
	}

	async fn guidance_recommendation(
		&self,
		filters: &FilterSet,
		state: &mut SessionGuard,
	) -> (HandlerResult, MatchOutcome) {
		let search =
			CascadingSearch::new(self.collaborators.index.as_ref(), &self.vocab, &self.cfg.search);
		let outcome = search.run(filters).await;

		state.filters = filters.clone();

		match outcome.outcome {
			MatchOutcome::NoMatch | MatchOutcome::NotSearched => {
				state.clear_products();

				(HandlerResult::NoMatch { filters: filters.clone() }, outcome.outcome)
			},
			_ => {
				let products = self.visible_products(&outcome.products);
				let offered = offer_feature(filters, &products);

				state.record_shown(
					&products.iter().map(|p| p.product.clone()).collect::<Vec<_>>(),
				);
				state.feature_offer = offered.clone();

				(
					HandlerResult::GuidanceRecommendation {
						products,
						offered_feature: offered.map(|o| o.feature),
					},
					outcome.outcome,
				)
			},
		}
	}

	/// Deduplicates by SKU, orders by score then SKU, and truncates to the
	/// configured page. Single-product mode shows only the top hit.
	fn visible_products(&self, products: &[ScoredProduct]) -> Vec<ScoredProduct> {
		let mut seen = std::collections::BTreeSet::new();
		let mut ranked: Vec<ScoredProduct> = products
			.iter()
			.filter(|p| seen.insert(p.product.sku.clone()))
			.cloned()
			.collect();

		ranked.sort_by(|a, b| {
			b.score
				.partial_cmp(&a.score)
				.unwrap_or(std::cmp::Ordering::Equal)
				.then_with(|| a.product.sku.cmp(&b.product.sku))
		});

		let limit = if self.cfg.features.multi_product { self.cfg.search.top_k as usize } else { 1 };

		ranked.truncate(limit);

		ranked
	}

	/// Optional embedding-based rerank: the utterance and each product name
	/// are embedded together and filter scores blend with the cosine
	/// similarity to the utterance. Any failure keeps filter ordering.
	async fn semantic_rerank(&self, utterance: &str, products: &mut [ScoredProduct]) {
		if products.len() < 2 {
			return;
		}

		let mut texts = Vec::with_capacity(products.len() + 1);

		texts.push(utterance.to_string());
		texts.extend(products.iter().map(|p| p.product.name.clone()));

		let cfg = &self.cfg.providers.embedding;

		match self.collaborators.embedding.embed(cfg, &texts).await {
			Ok(vectors) if vectors.len() == products.len() + 1 => {
				let query = &vectors[0];

				for (product, vector) in products.iter_mut().zip(&vectors[1..]) {
					product.score = (product.score + cosine(query, vector)) / 2.;
				}
			},
			Ok(_) => tracing::warn!("Embedding count mismatch; keeping filter order."),
			Err(err) => {
				tracing::warn!(error = %err, "Embedding failed; keeping filter order.");
			},
		}
	}

	async fn log_turn(
		&self,
		state: &ConversationState,
		utterance: &str,
		intent: IntentType,
		filters: &FilterSet,
		outcome: MatchOutcome,
	) {
		if !self.cfg.features.conversation_log {
			return;
		}

		let record = LogRecord {
			timestamp: OffsetDateTime::now_utc(),
			session_id: state.session_id,
			utterance: utterance.to_string(),
			intent,
			filters: filters.clone(),
			shown_skus: state.shown_skus.clone(),
			outcome,
		};

		if let Err(err) = self.collaborators.logger.append(&record).await {
			tracing::warn!(error = %err, "Conversation log append failed.");
		}
	}
}

/// Most common feature among the shown products that is not already part of
/// the filter set; ties break lexicographically.
fn offer_feature(filters: &FilterSet, products: &[ScoredProduct]) -> Option<FeatureOffer> {
	let already: std::collections::BTreeSet<&str> = filters
		.get(FEATURE_DIMENSION)
		.map(|v| v.values().into_iter().collect())
		.unwrap_or_default();
	let mut counts: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();

	for scored in products {
		for feature in &scored.product.features {
			if !already.contains(feature.as_str()) {
				*counts.entry(feature.as_str()).or_default() += 1;
			}
		}
	}

	counts
		.into_iter()
		.max_by(|(a_name, a_count), (b_name, b_count)| {
			a_count.cmp(b_count).then_with(|| b_name.cmp(a_name))
		})
		.map(|(feature, _)| FeatureOffer {
			feature: feature.to_string(),
			filters: filters.clone(),
		})
}

/// Feature vocabulary term for a monitor count, if the catalog has one.
fn monitor_feature_term(count: u8) -> Option<&'static str> {
	match count {
		2 => Some("dual monitor"),
		3.. => Some("triple monitor"),
		_ => None,
	}
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
	let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();

	if norm_a == 0. || norm_b == 0. {
		return 0.;
	}

	dot / (norm_a * norm_b)
}

fn vocabulary_digest(vocab: &aisle_domain::Vocabulary) -> Value {
	let dimensions: serde_json::Map<String, Value> = vocab
		.dimensions()
		.map(|schema| {
			(
				schema.name.clone(),
				Value::Array(
					schema.values.iter().map(|v| Value::String(v.clone())).collect(),
				),
			)
		})
		.collect();

	Value::Object(dimensions)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scored(sku: &str, score: f32, features: &[&str]) -> ScoredProduct {
		ScoredProduct {
			product: aisle_domain::Product {
				sku: sku.to_string(),
				name: sku.to_string(),
				attributes: Default::default(),
				connectors: Vec::new(),
				features: features.iter().map(|f| f.to_string()).collect(),
			},
			score,
		}
	}

	#[test]
	fn offered_feature_is_most_common_then_lexicographic() {
		let products =
			[scored("A", 1., &["4k", "hdr"]), scored("B", 1., &["4k"]), scored("C", 1., &["hdr"])];
		let offer = offer_feature(&FilterSet::new(), &products).expect("no offer");

		assert_eq!(offer.feature, "4k");
	}

	#[test]
	fn already_filtered_features_are_not_offered() {
		let mut filters = FilterSet::new();

		filters.add_cumulative(FEATURE_DIMENSION, "4k");

		let products = [scored("A", 1., &["4k", "hdr"]), scored("B", 1., &["4k"])];
		let offer = offer_feature(&filters, &products).expect("no offer");

		assert_eq!(offer.feature, "hdr");
	}

	#[test]
	fn no_features_means_no_offer() {
		let products = [scored("A", 1., &[]), scored("B", 1., &[])];

		assert!(offer_feature(&FilterSet::new(), &products).is_none());
	}

	#[test]
	fn cosine_rewards_aligned_vectors() {
		assert!((cosine(&[1., 0.], &[1., 0.]) - 1.).abs() < f32::EPSILON);
		assert!(cosine(&[1., 0.], &[0., 1.]).abs() < f32::EPSILON);
		assert_eq!(cosine(&[0., 0.], &[1., 0.]), 0.);
	}

	#[test]
	fn monitor_counts_map_to_feature_terms() {
		assert_eq!(monitor_feature_term(1), None);
		assert_eq!(monitor_feature_term(2), Some("dual monitor"));
		assert_eq!(monitor_feature_term(3), Some("triple monitor"));
		assert_eq!(monitor_feature_term(6), Some("triple monitor"));
	}
}
