//! Per-session conversation state. Owned by the orchestrator's session
//! store; every mutation happens inside a single turn.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	filters::FilterSet,
	intent::IntentType,
	product::Product,
	vocabulary::CONNECTOR_DIMENSION,
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupKind {
	MultiMonitor,
	DockSelection,
	KvmSelection,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidancePhase {
	/// Asking about ports and monitor counts.
	InitialQuestions,
	/// A recommendation was shown; awaiting accept or refine.
	Recommended,
	Complete,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GuidanceFlow {
	pub setup: SetupKind,
	pub monitor_count: Option<u8>,
	pub phase: GuidancePhase,
}

impl GuidanceFlow {
	pub fn start(setup: SetupKind, monitor_count: Option<u8>) -> Self {
		Self { setup, monitor_count, phase: GuidancePhase::InitialQuestions }
	}

	pub fn awaiting_answers(&self) -> bool {
		matches!(self.phase, GuidancePhase::InitialQuestions | GuidancePhase::Recommended)
	}
}

/// A feature search the assistant offered and the user has not yet answered
/// ("want me to look for 4K-capable ones?").
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FeatureOffer {
	pub feature: String,
	pub filters: FilterSet,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ConversationState {
	pub session_id: Uuid,
	pub last_intent: Option<IntentType>,
	pub guidance: Option<GuidanceFlow>,
	pub feature_offer: Option<FeatureOffer>,
	/// Filters carried across turns; merged, never replaced wholesale.
	pub filters: FilterSet,
	pub turn: u64,
	pub shown_skus: Vec<String>,
	/// Connector and category values of the products last shown, used by the
	/// classifier to detect a context switch.
	pub shown_connectors: BTreeSet<String>,
	pub shown_categories: BTreeSet<String>,
}

impl ConversationState {
	pub fn new(session_id: Uuid) -> Self {
		Self {
			session_id,
			last_intent: None,
			guidance: None,
			feature_offer: None,
			filters: FilterSet::new(),
			turn: 0,
			shown_skus: Vec::new(),
			shown_connectors: BTreeSet::new(),
			shown_categories: BTreeSet::new(),
		}
	}

	pub fn has_product_context(&self) -> bool {
		!self.shown_skus.is_empty()
	}

	pub fn has_multi_product_context(&self) -> bool {
		self.shown_skus.len() > 1
	}

	pub fn awaiting_guidance(&self) -> bool {
		self.guidance.as_ref().map(GuidanceFlow::awaiting_answers).unwrap_or(false)
	}

	pub fn record_shown(&mut self, products: &[Product]) {
		self.shown_skus = products.iter().map(|p| p.sku.clone()).collect();
		self.shown_connectors = products
			.iter()
			.flat_map(|p| p.values_for(CONNECTOR_DIMENSION))
			.map(|v| v.to_ascii_lowercase())
			.collect();
		self.shown_categories = products
			.iter()
			.filter_map(|p| p.attributes.get("category"))
			.map(|v| v.to_ascii_lowercase())
			.collect();
	}

	pub fn clear_products(&mut self) {
		self.shown_skus.clear();
		self.shown_connectors.clear();
		self.shown_categories.clear();
	}
}
