use serde::{Deserialize, Serialize};

/// Closed set of per-turn meanings. Exactly one is resolved per utterance;
/// `OutOfScope` is the total fallback, never an error.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
	Greeting,
	Farewell,
	NewSearch,
	FeatureSearchAccept,
	ExplicitSku,
	SetupGuidance,
	SetupFollowup,
	MultiFollowup,
	SingleFollowup,
	WarrantyQuestion,
	PricingQuestion,
	ImpossibleProduct,
	OutOfScope,
}

impl IntentType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Greeting => "greeting",
			Self::Farewell => "farewell",
			Self::NewSearch => "new_search",
			Self::FeatureSearchAccept => "feature_search_accept",
			Self::ExplicitSku => "explicit_sku",
			Self::SetupGuidance => "setup_guidance",
			Self::SetupFollowup => "setup_followup",
			Self::MultiFollowup => "multi_followup",
			Self::SingleFollowup => "single_followup",
			Self::WarrantyQuestion => "warranty_question",
			Self::PricingQuestion => "pricing_question",
			Self::ImpossibleProduct => "impossible_product",
			Self::OutOfScope => "out_of_scope",
		}
	}
}

impl std::fmt::Display for IntentType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Intent {
	pub kind: IntentType,
	/// Canonical SKU when the utterance named one.
	pub sku: Option<String>,
	/// The turn refines carried filters instead of starting over.
	pub refinement: bool,
	/// Install/troubleshooting ask that the assistant redirects.
	pub blocked: bool,
}

impl Intent {
	pub fn of(kind: IntentType) -> Self {
		Self { kind, sku: None, refinement: false, blocked: false }
	}

	pub fn with_sku(kind: IntentType, sku: impl Into<String>) -> Self {
		Self { kind, sku: Some(sku.into()), refinement: false, blocked: false }
	}

	pub fn refinement(kind: IntentType) -> Self {
		Self { kind, sku: None, refinement: true, blocked: false }
	}

	pub fn blocked() -> Self {
		Self { kind: IntentType::OutOfScope, sku: None, refinement: false, blocked: true }
	}
}
