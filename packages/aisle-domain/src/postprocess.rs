//! Domain post-processing: pure adjustments applied between classification
//! and filter extraction. May override the intent or pre-seed filter hints,
//! never anything else.

use crate::{
	filters::FilterSet,
	intent::{Intent, IntentType},
	normalize::Normalized,
	state::ConversationState,
	vocabulary::{CONNECTOR_DIMENSION, Vocabulary},
};

/// Device names that imply a connector requirement. Only applied when the
/// vocabulary actually lists the connector.
const DEVICE_CONNECTORS: &[(&str, &str)] = &[
	("macbook", "usb-c"),
	("macbook pro", "thunderbolt"),
	("ipad pro", "usb-c"),
	("surface", "usb-c"),
	("chromebook", "usb-c"),
	("ps5", "hdmi"),
	("xbox", "hdmi"),
	("raspberry pi", "hdmi"),
];

#[derive(Clone, Debug)]
pub struct Adjustment {
	pub intent: Intent,
	/// Filter hints merged ahead of extraction; extraction output wins on
	/// conflicts because it reflects what the user actually said.
	pub hints: FilterSet,
}

pub fn apply_post_rules(
	intent: Intent,
	norm: &Normalized,
	state: &ConversationState,
	vocab: &Vocabulary,
) -> Adjustment {
	let mut intent = intent;
	let mut hints = FilterSet::new();

	device_connector_hints(norm, vocab, &mut hints);
	canonicalize_sku(&mut intent, vocab);
	seed_feature_offer(&intent, state, &mut hints);

	// A refinement that mentions nothing recognizable keeps the carried
	// filter set intact; nothing to adjust here, the merge policy handles it.

	Adjustment { intent, hints }
}

fn device_connector_hints(norm: &Normalized, vocab: &Vocabulary, hints: &mut FilterSet) {
	for (device, connector) in DEVICE_CONNECTORS {
		if !norm.has_phrase(device) {
			continue;
		}
		if vocab.canonical(CONNECTOR_DIMENSION, connector).is_none() {
			continue;
		}

		hints.add_cumulative(CONNECTOR_DIMENSION, *connector);
	}
}

/// Hyphen-insensitive SKU resolution: "CDP2HD1M" settles on the catalog's
/// "CDP2HD-1M" spelling before any lookup happens.
fn canonicalize_sku(intent: &mut Intent, vocab: &Vocabulary) {
	if intent.kind != IntentType::ExplicitSku {
		return;
	}

	if let Some(sku) = intent.sku.as_deref()
		&& let Some(canonical) = vocab.resolve_sku(sku)
	{
		intent.sku = Some(canonical.to_string());
	}
}

/// Accepting a feature offer re-runs the stored search with the offered
/// feature added.
fn seed_feature_offer(intent: &Intent, state: &ConversationState, hints: &mut FilterSet) {
	if intent.kind != IntentType::FeatureSearchAccept {
		return;
	}

	let Some(offer) = state.feature_offer.as_ref() else {
		return;
	};

	for (dimension, value) in offer.filters.entries() {
		match value {
			crate::filters::FilterValue::One(v) => hints.set_one(dimension, v.clone()),
			crate::filters::FilterValue::Many(vs) =>
				for v in vs {
					hints.add_cumulative(dimension, v.clone());
				},
		}
	}

	hints.add_cumulative("feature", offer.feature.clone());
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{filters::FilterValue, normalize::normalize, state::FeatureOffer};
	use uuid::Uuid;

	fn vocab() -> Vocabulary {
		Vocabulary::from_toml_str(
			r#"
version = 1
skus    = ["CDP2HD-1M"]

[[dimension]]
name          = "connector"
merge         = "cumulative"
drop_priority = 50
values        = ["usb-c", "hdmi", "thunderbolt"]

[[dimension]]
name          = "feature"
merge         = "cumulative"
drop_priority = 20
values        = ["4k"]
"#,
		)
		.expect("vocabulary parse failed")
	}

	#[test]
	fn macbook_implies_usb_c() {
		let vocab = vocab();
		let norm = normalize("a dock for my macbook", &vocab);
		let state = ConversationState::new(Uuid::nil());
		let adjusted =
			apply_post_rules(Intent::of(IntentType::NewSearch), &norm, &state, &vocab);

		assert!(
			adjusted
				.hints
				.get("connector")
				.map(|v| v.values().contains(&"usb-c"))
				.unwrap_or(false)
		);
	}

	#[test]
	fn sku_is_canonicalized() {
		let vocab = vocab();
		let norm = normalize("CDP2HD1M", &vocab);
		let state = ConversationState::new(Uuid::nil());
		let intent = Intent::with_sku(IntentType::ExplicitSku, "CDP2HD1M");
		let adjusted = apply_post_rules(intent, &norm, &state, &vocab);

		assert_eq!(adjusted.intent.sku.as_deref(), Some("CDP2HD-1M"));
	}

	#[test]
	fn accepted_offer_seeds_stored_filters() {
		let vocab = vocab();
		let norm = normalize("yes please", &vocab);
		let mut state = ConversationState::new(Uuid::nil());
		let mut stored = FilterSet::new();

		stored.set_one("subcategory", "hdmi cable");
		state.feature_offer =
			Some(FeatureOffer { feature: "4k".to_string(), filters: stored });

		let adjusted =
			apply_post_rules(Intent::of(IntentType::FeatureSearchAccept), &norm, &state, &vocab);

		assert_eq!(
			adjusted.hints.get("subcategory"),
			Some(&FilterValue::One("hdmi cable".to_string()))
		);
		assert!(
			adjusted
				.hints
				.get("feature")
				.map(|v| v.values().contains(&"4k"))
				.unwrap_or(false)
		);
	}
}
