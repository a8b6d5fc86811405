//! Intent-to-handler dispatch. The mapping is an explicit closed match so
//! adding an intent without routing it is a compile error, and every turn
//! produces exactly one [`HandlerResult`].

use aisle_domain::{FilterSet, Intent, IntentType, Normalized, Product, SetupKind};

use crate::ScoredProduct;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StaticTopic {
	Warranty,
	Pricing,
	ImpossibleProduct,
}

/// The closed set of reply shapes. Rendering is the caller's concern.
#[derive(Clone, Debug, PartialEq)]
pub enum HandlerResult {
	Greeting,
	Farewell,
	ProductList { products: Vec<ScoredProduct>, dropped_dimensions: Vec<String> },
	SingleProduct { product: Product },
	GuidanceQuestion { setup: SetupKind },
	GuidanceRecommendation { products: Vec<ScoredProduct>, offered_feature: Option<String> },
	BlockedTopic,
	NoMatch { filters: FilterSet },
	Clarification,
	StaticAnswer { topic: StaticTopic },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Handler {
	Greeting,
	Farewell,
	Search,
	Sku,
	Guidance,
	Static(StaticTopic),
	Blocked,
	Fallback,
}

impl Handler {
	pub fn select(intent: &Intent) -> Self {
		if intent.blocked {
			return Self::Blocked;
		}

		match intent.kind {
			IntentType::Greeting => Self::Greeting,
			IntentType::Farewell => Self::Farewell,
			IntentType::ExplicitSku => Self::Sku,
			IntentType::SetupGuidance | IntentType::SetupFollowup => Self::Guidance,
			IntentType::WarrantyQuestion => Self::Static(StaticTopic::Warranty),
			IntentType::PricingQuestion => Self::Static(StaticTopic::Pricing),
			IntentType::ImpossibleProduct => Self::Static(StaticTopic::ImpossibleProduct),
			IntentType::NewSearch
			| IntentType::FeatureSearchAccept
			| IntentType::MultiFollowup
			| IntentType::SingleFollowup => Self::Search,
			IntentType::OutOfScope => Self::Fallback,
		}
	}

	/// Whether this handler queries the catalog at all. Greetings, canned
	/// answers and blocked topics never touch the index.
	pub fn searches(self) -> bool {
		matches!(self, Self::Search | Self::Sku | Self::Guidance)
	}
}

/// Which setup the guidance flow is about, read off the opening utterance.
pub fn detect_setup(norm: &Normalized) -> SetupKind {
	if norm.has_token("kvm") {
		return SetupKind::KvmSelection;
	}
	if norm.has_token("monitor") || norm.has_token("monitors") {
		return SetupKind::MultiMonitor;
	}

	SetupKind::DockSelection
}

pub fn detect_monitor_count(norm: &Normalized) -> Option<u8> {
	const COUNTS: &[(&str, u8)] = &[
		("one", 1),
		("1", 1),
		("single", 1),
		("two", 2),
		("2", 2),
		("dual", 2),
		("three", 3),
		("3", 3),
		("triple", 3),
		("four", 4),
		("4", 4),
	];

	COUNTS.iter().find(|(word, _)| norm.has_token(word)).map(|(_, count)| *count)
}

#[cfg(test)]
mod tests {
	use super::*;
	use aisle_domain::{Vocabulary, normalize};

	fn vocab() -> Vocabulary {
		Vocabulary::from_toml_str("version = 1\nskus = []\n").expect("vocabulary parse failed")
	}

	#[test]
	fn every_intent_routes_somewhere() {
		let kinds = [
			IntentType::Greeting,
			IntentType::Farewell,
			IntentType::NewSearch,
			IntentType::FeatureSearchAccept,
			IntentType::ExplicitSku,
			IntentType::SetupGuidance,
			IntentType::SetupFollowup,
			IntentType::MultiFollowup,
			IntentType::SingleFollowup,
			IntentType::WarrantyQuestion,
			IntentType::PricingQuestion,
			IntentType::ImpossibleProduct,
			IntentType::OutOfScope,
		];

		for kind in kinds {
			// The match in select is exhaustive; this pins a few anchors.
			let _ = Handler::select(&Intent::of(kind));
		}

		assert_eq!(Handler::select(&Intent::of(IntentType::Greeting)), Handler::Greeting);
		assert_eq!(Handler::select(&Intent::of(IntentType::NewSearch)), Handler::Search);
		assert_eq!(Handler::select(&Intent::blocked()), Handler::Blocked);
		assert_eq!(
			Handler::select(&Intent::of(IntentType::WarrantyQuestion)),
			Handler::Static(StaticTopic::Warranty)
		);
	}

	#[test]
	fn static_handlers_never_search() {
		assert!(!Handler::Static(StaticTopic::Pricing).searches());
		assert!(!Handler::Greeting.searches());
		assert!(!Handler::Blocked.searches());
		assert!(Handler::Search.searches());
	}

	#[test]
	fn dual_monitor_ask_is_multi_monitor_setup() {
		let vocab = vocab();
		let norm = normalize("help with a dual monitor setup", &vocab);

		assert_eq!(detect_setup(&norm), SetupKind::MultiMonitor);
		assert_eq!(detect_monitor_count(&norm), Some(2));
	}

	#[test]
	fn which_dock_defaults_to_dock_selection() {
		let vocab = vocab();
		let norm = normalize("which dock do i need", &vocab);

		assert_eq!(detect_setup(&norm), SetupKind::DockSelection);
		assert_eq!(detect_monitor_count(&norm), None);
	}
}
