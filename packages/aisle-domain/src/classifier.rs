//! Priority-ordered intent classification. The rule table is an explicit,
//! inspectable array; the first rule that matches wins. Reordering rules is
//! a behavior change and is pinned by tests.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
	intent::{Intent, IntentType},
	normalize::{Normalized, normalize},
	state::ConversationState,
	vocabulary::{CONNECTOR_DIMENSION, Vocabulary},
};

pub struct RuleContext<'a> {
	pub raw: &'a str,
	pub norm: &'a Normalized,
	pub vocab: &'a Vocabulary,
	pub state: &'a ConversationState,
}

pub struct IntentRule {
	pub name: &'static str,
	pub evaluate: fn(&RuleContext<'_>) -> Option<Intent>,
}

/// The committed priority order, top to bottom.
pub fn rules() -> &'static [IntentRule] {
	const RULES: &[IntentRule] = &[
		IntentRule { name: "guidance_followup", evaluate: guidance_followup },
		IntentRule { name: "feature_offer_accept", evaluate: feature_offer_accept },
		IntentRule { name: "greeting", evaluate: greeting },
		IntentRule { name: "farewell", evaluate: farewell },
		IntentRule { name: "explicit_sku", evaluate: explicit_sku },
		IntentRule { name: "impossible_product", evaluate: impossible_product },
		IntentRule { name: "blocked_topic", evaluate: blocked_topic },
		IntentRule { name: "warranty_question", evaluate: warranty_question },
		IntentRule { name: "pricing_question", evaluate: pricing_question },
		IntentRule { name: "setup_guidance", evaluate: setup_guidance },
		IntentRule { name: "context_switch_search", evaluate: context_switch_search },
		IntentRule { name: "refinement_followup", evaluate: refinement_followup },
		IntentRule { name: "new_search", evaluate: new_search },
		IntentRule { name: "vague_followup", evaluate: vague_followup },
	];

	RULES
}

/// Total function: always resolves exactly one intent, `out_of_scope` when
/// nothing matches.
pub fn classify(raw: &str, vocab: &Vocabulary, state: &ConversationState) -> Intent {
	let norm = normalize(raw, vocab);
	let ctx = RuleContext { raw, norm: &norm, vocab, state };

	for rule in rules() {
		if let Some(intent) = (rule.evaluate)(&ctx) {
			return intent;
		}
	}

	Intent::of(IntentType::OutOfScope)
}

// === Rules ===

fn guidance_followup(ctx: &RuleContext<'_>) -> Option<Intent> {
	if !ctx.state.awaiting_guidance() {
		return None;
	}

	if is_affirmative(ctx.norm) {
		return Some(Intent::of(IntentType::SetupFollowup));
	}

	// Farewells and explicit "show me ..." requests escape the guidance flow.
	if farewell(ctx).is_some() || explicit_search_phrase(ctx.norm) {
		return None;
	}

	// Anything short, or naming ports/counts, reads as an answer to the
	// pending question: "two", "usb-c and hdmi".
	if ctx.norm.word_count <= 6 || mentions_connector(ctx) || mentions_count(ctx.norm) {
		return Some(Intent::of(IntentType::SetupFollowup));
	}

	None
}

fn feature_offer_accept(ctx: &RuleContext<'_>) -> Option<Intent> {
	if ctx.state.feature_offer.is_some() && is_affirmative(ctx.norm) {
		return Some(Intent::of(IntentType::FeatureSearchAccept));
	}

	None
}

fn greeting(ctx: &RuleContext<'_>) -> Option<Intent> {
	const GREETINGS: &[&str] =
		&["hello", "hi", "hey", "good morning", "good afternoon", "good evening"];

	// "Hi, I need cables" is a search, not a greeting.
	if ctx.norm.word_count > 4 || has_domain_token(ctx) {
		return None;
	}

	GREETINGS
		.iter()
		.any(|g| ctx.norm.has_phrase(g))
		.then(|| Intent::of(IntentType::Greeting))
}

fn farewell(ctx: &RuleContext<'_>) -> Option<Intent> {
	const FAREWELLS: &[&str] =
		&["thank you", "thanks", "bye", "goodbye", "see you", "appreciate it", "cheers"];

	FAREWELLS
		.iter()
		.any(|f| ctx.norm.has_phrase(f))
		.then(|| Intent::of(IntentType::Farewell))
}

/// Ranked above every generic search rule: a SKU-shaped token means the user
/// wants that exact product.
fn explicit_sku(ctx: &RuleContext<'_>) -> Option<Intent> {
	detect_sku(ctx.raw, ctx.vocab).map(|sku| Intent::with_sku(IntentType::ExplicitSku, sku))
}

fn impossible_product(ctx: &RuleContext<'_>) -> Option<Intent> {
	let connectors = query_connectors(ctx);

	for a in &connectors {
		for b in &connectors {
			if a < b && ctx.vocab.is_impossible_pair(a, b) {
				return Some(Intent::of(IntentType::ImpossibleProduct));
			}
		}
	}

	None
}

fn blocked_topic(ctx: &RuleContext<'_>) -> Option<Intent> {
	static PATTERN: OnceLock<Regex> = OnceLock::new();

	let re = PATTERN.get_or_init(|| {
		Regex::new(
			r"\b(install|installation|firmware|troubleshoot|repair|drivers?)\b|\bhow (do i|to) (set ?up|mount|configure)\b",
		)
		.unwrap_or_else(|_| unreachable!("blocked topic pattern is static"))
	});

	re.is_match(&ctx.norm.text).then(Intent::blocked)
}

fn warranty_question(ctx: &RuleContext<'_>) -> Option<Intent> {
	(ctx.norm.has_token("warranty")
		|| ctx.norm.has_phrase("return policy")
		|| ctx.norm.has_token("rma"))
	.then(|| Intent::of(IntentType::WarrantyQuestion))
}

fn pricing_question(ctx: &RuleContext<'_>) -> Option<Intent> {
	(ctx.norm.has_token("price")
		|| ctx.norm.has_token("pricing")
		|| ctx.norm.has_token("cost")
		|| ctx.norm.has_phrase("how much"))
	.then(|| Intent::of(IntentType::PricingQuestion))
}

fn setup_guidance(ctx: &RuleContext<'_>) -> Option<Intent> {
	static PATTERN: OnceLock<Regex> = OnceLock::new();

	let re = PATTERN.get_or_init(|| {
		Regex::new(
			r"\b(dual|triple|two|three|multiple|multi) monitors?\b|\bmonitor setup\b|\bwhich (dock|hub|kvm|adapter|cable)\b|\bhelp me (choose|pick|decide)\b|\brecommend (a|an|some)\b",
		)
		.unwrap_or_else(|_| unreachable!("setup guidance pattern is static"))
	});

	re.is_match(&ctx.norm.text).then(|| Intent::of(IntentType::SetupGuidance))
}

/// A different connector or category than the products on screen means a new
/// search, even mid-conversation.
fn context_switch_search(ctx: &RuleContext<'_>) -> Option<Intent> {
	if !ctx.state.has_product_context() {
		return None;
	}

	let query_connectors = query_connectors(ctx);
	let new_connector = !ctx.state.shown_connectors.is_empty()
		&& query_connectors.iter().any(|c| !ctx.state.shown_connectors.contains(c));
	let query_categories = query_categories(ctx);
	let new_category = !ctx.state.shown_categories.is_empty()
		&& query_categories.iter().any(|c| !ctx.state.shown_categories.contains(c));

	(new_connector || new_category).then(|| Intent::of(IntentType::NewSearch))
}

fn refinement_followup(ctx: &RuleContext<'_>) -> Option<Intent> {
	static PATTERN: OnceLock<Regex> = OnceLock::new();

	if !ctx.state.has_product_context() {
		return None;
	}

	let re = PATTERN.get_or_init(|| {
		Regex::new(
			r"\b(instead|rather|shorter|longer|cheaper)\b|\bwhat about\b|\b(in|make it) (black|white|gray|blue|red|silver)\b",
		)
		.unwrap_or_else(|_| unreachable!("refinement pattern is static"))
	});

	re.is_match(&ctx.norm.text).then(|| Intent::refinement(followup_kind(ctx.state)))
}

fn new_search(ctx: &RuleContext<'_>) -> Option<Intent> {
	(explicit_search_phrase(ctx.norm) || has_domain_token(ctx))
		.then(|| Intent::of(IntentType::NewSearch))
}

fn explicit_search_phrase(norm: &Normalized) -> bool {
	static PATTERN: OnceLock<Regex> = OnceLock::new();

	let re = PATTERN.get_or_init(|| {
		Regex::new(r"\b(show|find|get|give|list) me\b|\blooking for\b|\b(need|want) (a|an|some)\b")
			.unwrap_or_else(|_| unreachable!("search phrase pattern is static"))
	});

	re.is_match(&norm.text)
}

fn vague_followup(ctx: &RuleContext<'_>) -> Option<Intent> {
	ctx.state.has_product_context().then(|| Intent::of(followup_kind(ctx.state)))
}

// === Helpers ===

fn followup_kind(state: &ConversationState) -> IntentType {
	if state.has_multi_product_context() {
		IntentType::MultiFollowup
	} else {
		IntentType::SingleFollowup
	}
}

fn is_affirmative(norm: &Normalized) -> bool {
	const AFFIRMATIVES: &[&str] =
		&["yes", "yeah", "yep", "sure", "ok", "okay", "please", "sounds good", "go ahead"];

	AFFIRMATIVES.iter().any(|a| norm.has_phrase(a))
}

fn mentions_connector(ctx: &RuleContext<'_>) -> bool {
	!query_connectors(ctx).is_empty()
}

fn mentions_count(norm: &Normalized) -> bool {
	const COUNTS: &[&str] = &["one", "two", "three", "four", "1", "2", "3", "4"];

	COUNTS.iter().any(|c| norm.has_token(c))
}

fn query_connectors(ctx: &RuleContext<'_>) -> Vec<String> {
	let Some(schema) = ctx.vocab.dimension(CONNECTOR_DIMENSION) else {
		return Vec::new();
	};

	schema.values.iter().filter(|v| ctx.norm.has_phrase(v)).cloned().collect()
}

fn query_categories(ctx: &RuleContext<'_>) -> Vec<String> {
	let Some(schema) = ctx.vocab.dimension("category") else {
		return Vec::new();
	};

	schema.values.iter().filter(|v| ctx.norm.has_phrase(v)).cloned().collect()
}

fn has_domain_token(ctx: &RuleContext<'_>) -> bool {
	let category = ctx.vocab.dimension("category");
	let subcategory = ctx.vocab.dimension("subcategory");
	let connector = ctx.vocab.dimension(CONNECTOR_DIMENSION);

	[category, subcategory, connector]
		.into_iter()
		.flatten()
		.any(|schema| schema.values.iter().any(|v| ctx.norm.has_phrase(v)))
}

/// SKU detection: a known catalog SKU anywhere in the utterance, or a
/// SKU-shaped token (letters and digits, 5-20 chars) when the whole
/// utterance is that one token.
fn detect_sku(raw: &str, vocab: &Vocabulary) -> Option<String> {
	let trimmed = raw.trim();
	let single_token = !trimmed.contains(char::is_whitespace);

	for word in trimmed.split_whitespace() {
		let cleaned = word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '-');

		if let Some(sku) = vocab.resolve_sku(cleaned) {
			return Some(sku.to_string());
		}

		if is_sku_shaped(cleaned, single_token) {
			return Some(cleaned.to_ascii_uppercase());
		}
	}

	None
}

fn is_sku_shaped(token: &str, whole_utterance: bool) -> bool {
	let min_len = if whole_utterance { 4 } else { 5 };

	if token.len() < min_len || token.len() > 20 {
		return false;
	}
	if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
		return false;
	}

	let has_digit = token.chars().any(|c| c.is_ascii_digit());
	let has_alpha = token.chars().any(|c| c.is_ascii_alphabetic());
	// Inside a sentence, both letters and digits are required; "12345"
	// or "great" alone never look like SKUs.
	let mixed = has_digit && (whole_utterance || has_alpha);
	// All-uppercase requirement inside sentences avoids eating normal words.
	let cased = whole_utterance
		|| token.chars().filter(|c| c.is_ascii_alphabetic()).all(|c| c.is_ascii_uppercase());

	mixed && cased
}

#[cfg(test)]
mod tests {
	use super::*;
	use uuid::Uuid;

	fn vocab() -> Vocabulary {
		Vocabulary::from_toml_str(
			r#"
version = 1
skus    = ["HDMM10", "DK30A2DHU"]

[[dimension]]
name          = "category"
merge         = "exclusive"
drop_priority = 60
values        = ["cable", "adapter", "dock", "hub"]

[[dimension]]
name          = "connector"
merge         = "cumulative"
drop_priority = 50
values        = ["usb-c", "hdmi", "displayport", "vga", "ethernet"]

[synonyms]
"cables" = "cable"
"docks"  = "dock"
"dp"     = "displayport"

[[impossible_pair]]
a = "vga"
b = "ethernet"
"#,
		)
		.expect("vocabulary parse failed")
	}

	fn fresh_state() -> ConversationState {
		ConversationState::new(Uuid::nil())
	}

	#[test]
	fn hello_is_greeting() {
		let intent = classify("Hello", &vocab(), &fresh_state());

		assert_eq!(intent.kind, IntentType::Greeting);
	}

	#[test]
	fn greeting_with_product_words_is_search() {
		let intent = classify("Hi, I need cables", &vocab(), &fresh_state());

		assert_eq!(intent.kind, IntentType::NewSearch);
	}

	#[test]
	fn sku_outranks_generic_search() {
		let intent = classify("show me cables like HDMM10", &vocab(), &fresh_state());

		assert_eq!(intent.kind, IntentType::ExplicitSku);
		assert_eq!(intent.sku.as_deref(), Some("HDMM10"));
	}

	#[test]
	fn bare_sku_token_resolves() {
		let intent = classify("dk30a2dhu", &vocab(), &fresh_state());

		assert_eq!(intent.kind, IntentType::ExplicitSku);
		assert_eq!(intent.sku.as_deref(), Some("DK30A2DHU"));
	}

	#[test]
	fn ordinary_words_are_not_skus() {
		let intent = classify("great", &vocab(), &fresh_state());

		assert_eq!(intent.kind, IntentType::OutOfScope);
	}

	#[test]
	fn unmatched_input_falls_back_to_out_of_scope() {
		let intent = classify("what is the weather like", &vocab(), &fresh_state());

		assert_eq!(intent.kind, IntentType::OutOfScope);
		assert!(!intent.blocked);
	}

	#[test]
	fn install_asks_are_blocked_out_of_scope() {
		let intent = classify("how do I install the firmware", &vocab(), &fresh_state());

		assert_eq!(intent.kind, IntentType::OutOfScope);
		assert!(intent.blocked);
	}

	#[test]
	fn pending_guidance_reinterprets_affirmative() {
		let mut state = fresh_state();

		state.guidance =
			Some(crate::state::GuidanceFlow::start(crate::state::SetupKind::MultiMonitor, Some(2)));

		let intent = classify("yes", &vocab(), &state);

		assert_eq!(intent.kind, IntentType::SetupFollowup);
	}

	#[test]
	fn impossible_pair_detected() {
		let intent = classify("a vga to ethernet cable", &vocab(), &fresh_state());

		assert_eq!(intent.kind, IntentType::ImpossibleProduct);
	}

	#[test]
	fn different_connector_with_context_is_new_search() {
		let mut state = fresh_state();

		state.shown_skus = vec!["A1".to_string(), "B2".to_string()];
		state.shown_connectors = ["usb-c".to_string(), "hdmi".to_string()].into_iter().collect();

		let intent = classify("displayport cables under 6ft", &vocab(), &state);

		assert_eq!(intent.kind, IntentType::NewSearch);
	}

	#[test]
	fn refinement_with_multi_context_is_multi_followup() {
		let mut state = fresh_state();

		state.shown_skus = vec!["A1".to_string(), "B2".to_string()];
		state.shown_connectors = ["usb-c".to_string()].into_iter().collect();

		let intent = classify("what about white instead", &vocab(), &state);

		assert_eq!(intent.kind, IntentType::MultiFollowup);
		assert!(intent.refinement);
	}

	#[test]
	fn rule_order_is_pinned() {
		let names: Vec<&str> = rules().iter().map(|rule| rule.name).collect();

		assert_eq!(
			names,
			vec![
				"guidance_followup",
				"feature_offer_accept",
				"greeting",
				"farewell",
				"explicit_sku",
				"impossible_product",
				"blocked_topic",
				"warranty_question",
				"pricing_question",
				"setup_guidance",
				"context_switch_search",
				"refinement_followup",
				"new_search",
				"vague_followup",
			]
		);
	}
}
