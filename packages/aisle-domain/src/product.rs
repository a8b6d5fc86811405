use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::vocabulary::CONNECTOR_DIMENSION;

pub const FEATURE_DIMENSION: &str = "feature";

/// Immutable catalog entry. One value per categorical dimension in
/// `attributes`; connectors and features are multi-valued.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Product {
	pub sku: String,
	pub name: String,
	#[serde(default)]
	pub attributes: BTreeMap<String, String>,
	#[serde(default)]
	pub connectors: Vec<String>,
	#[serde(default)]
	pub features: BTreeSet<String>,
}

impl Product {
	/// All values the product carries for one filter dimension.
	pub fn values_for(&self, dimension: &str) -> Vec<&str> {
		match dimension {
			CONNECTOR_DIMENSION => self.connectors.iter().map(String::as_str).collect(),
			FEATURE_DIMENSION => self.features.iter().map(String::as_str).collect(),
			_ => self.attributes.get(dimension).map(String::as_str).into_iter().collect(),
		}
	}

	pub fn has_value(&self, dimension: &str, value: &str) -> bool {
		self.values_for(dimension).iter().any(|v| v.eq_ignore_ascii_case(value))
	}
}
