//! Static filter vocabulary: dimension schemas, the synonym table, and the
//! SKU list. Loaded once at startup and read-only afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

pub type Result<T, E = VocabularyError> = std::result::Result<T, E>;

pub const CONNECTOR_DIMENSION: &str = "connector";
pub const CONNECTOR_FROM_DIMENSION: &str = "connector_from";
pub const CONNECTOR_TO_DIMENSION: &str = "connector_to";

#[derive(Debug, thiserror::Error)]
pub enum VocabularyError {
	#[error("Failed to parse vocabulary document.")]
	Parse(#[from] toml::de::Error),
	#[error("{message}")]
	Validation { message: String },
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
	/// A new value replaces the carried one (color, category, length).
	Exclusive,
	/// New values union with the carried ones (features, connectors).
	Cumulative,
}

#[derive(Clone, Debug)]
pub struct DimensionSchema {
	pub name: String,
	pub merge: MergeMode,
	/// Relaxation order: lower priority is dropped first. The cascade is a
	/// committed business table, versioned with the vocabulary document.
	pub drop_priority: u32,
	pub values: BTreeSet<String>,
}

#[derive(Debug)]
pub struct Vocabulary {
	version: u32,
	dimensions: BTreeMap<String, DimensionSchema>,
	synonyms: BTreeMap<String, String>,
	skus: BTreeSet<String>,
	skus_dehyphenated: BTreeMap<String, String>,
	impossible_pairs: BTreeSet<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct VocabularyFile {
	version: u32,
	#[serde(default, rename = "dimension")]
	dimensions: Vec<DimensionEntry>,
	#[serde(default)]
	synonyms: BTreeMap<String, String>,
	#[serde(default)]
	skus: Vec<String>,
	#[serde(default, rename = "impossible_pair")]
	impossible_pairs: Vec<ImpossiblePairEntry>,
}

#[derive(Debug, Deserialize)]
struct DimensionEntry {
	name: String,
	merge: MergeMode,
	drop_priority: u32,
	values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ImpossiblePairEntry {
	a: String,
	b: String,
}

impl Vocabulary {
	pub fn from_toml_str(raw: &str) -> Result<Self> {
		let file: VocabularyFile = toml::from_str(raw)?;

		if file.version == 0 {
			return Err(VocabularyError::Validation {
				message: "Vocabulary version must be greater than zero.".to_string(),
			});
		}

		let mut dimensions = BTreeMap::new();

		for entry in file.dimensions {
			if entry.values.is_empty() {
				return Err(VocabularyError::Validation {
					message: format!("Dimension {} must declare at least one value.", entry.name),
				});
			}

			let values: BTreeSet<String> =
				entry.values.into_iter().map(|v| v.trim().to_ascii_lowercase()).collect();
			let schema = DimensionSchema {
				name: entry.name.clone(),
				merge: entry.merge,
				drop_priority: entry.drop_priority,
				values,
			};

			if dimensions.insert(entry.name.clone(), schema).is_some() {
				return Err(VocabularyError::Validation {
					message: format!("Dimension {} is declared twice.", entry.name),
				});
			}
		}

		let synonyms = file
			.synonyms
			.into_iter()
			.map(|(alias, canonical)| {
				(alias.trim().to_ascii_lowercase(), canonical.trim().to_ascii_lowercase())
			})
			.collect();

		let mut skus = BTreeSet::new();
		let mut skus_dehyphenated = BTreeMap::new();

		for sku in file.skus {
			let canonical = sku.trim().to_ascii_uppercase();

			if canonical.is_empty() {
				continue;
			}

			skus_dehyphenated.insert(canonical.replace('-', ""), canonical.clone());
			skus.insert(canonical);
		}

		let mut impossible_pairs = BTreeSet::new();

		for pair in file.impossible_pairs {
			let a = pair.a.trim().to_ascii_lowercase();
			let b = pair.b.trim().to_ascii_lowercase();

			if a == b {
				return Err(VocabularyError::Validation {
					message: format!("Impossible pair {a}/{b} must name two distinct values."),
				});
			}

			impossible_pairs.insert(if a < b { (a, b) } else { (b, a) });
		}

		Ok(Self {
			version: file.version,
			dimensions,
			synonyms,
			skus,
			skus_dehyphenated,
			impossible_pairs,
		})
	}

	pub fn version(&self) -> u32 {
		self.version
	}

	pub fn dimension(&self, name: &str) -> Option<&DimensionSchema> {
		self.dimensions.get(name)
	}

	pub fn dimensions(&self) -> impl Iterator<Item = &DimensionSchema> {
		self.dimensions.values()
	}

	pub fn merge_mode(&self, name: &str) -> Option<MergeMode> {
		self.dimensions.get(name).map(|schema| schema.merge)
	}

	/// Canonical value lookup; `None` when the term is not in the dimension.
	pub fn canonical(&self, dimension: &str, value: &str) -> Option<&str> {
		let schema = self.dimensions.get(dimension)?;
		let needle = value.trim().to_ascii_lowercase();

		schema.values.get(needle.as_str()).map(String::as_str)
	}

	pub fn synonym(&self, alias: &str) -> Option<&str> {
		self.synonyms.get(alias).map(String::as_str)
	}

	pub fn synonyms(&self) -> impl Iterator<Item = (&str, &str)> {
		self.synonyms.iter().map(|(alias, canonical)| (alias.as_str(), canonical.as_str()))
	}

	pub fn is_known_sku(&self, token: &str) -> bool {
		self.skus.contains(token.trim().to_ascii_uppercase().as_str())
	}

	/// Resolves a SKU token to its canonical form, tolerating missing or
	/// extra hyphens.
	pub fn resolve_sku(&self, token: &str) -> Option<&str> {
		let upper = token.trim().to_ascii_uppercase();

		if let Some(sku) = self.skus.get(upper.as_str()) {
			return Some(sku.as_str());
		}

		self.skus_dehyphenated.get(upper.replace('-', "").as_str()).map(String::as_str)
	}

	pub fn is_impossible_pair(&self, a: &str, b: &str) -> bool {
		let a = a.trim().to_ascii_lowercase();
		let b = b.trim().to_ascii_lowercase();
		let key = if a < b { (a, b) } else { (b, a) };

		self.impossible_pairs.contains(&key)
	}

	/// Dimensions in relaxation order: lowest drop priority first, name as
	/// the tie breaker so the cascade is stable across calls.
	pub fn drop_order(&self) -> Vec<&str> {
		let mut order: Vec<&DimensionSchema> = self.dimensions.values().collect();

		order.sort_by(|a, b| {
			a.drop_priority.cmp(&b.drop_priority).then_with(|| a.name.cmp(&b.name))
		});

		order.into_iter().map(|schema| schema.name.as_str()).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"
version = 1
skus    = ["HDMM10", "CDP2HD-1M"]

[[dimension]]
name          = "color"
merge         = "exclusive"
drop_priority = 10
values        = ["black", "white", "Gray"]

[[dimension]]
name          = "connector"
merge         = "cumulative"
drop_priority = 50
values        = ["usb-c", "hdmi", "vga"]

[synonyms]
"grey" = "gray"

[[impossible_pair]]
a = "vga"
b = "usb-c"
"#;

	#[test]
	fn parses_and_canonicalizes() {
		let vocab = Vocabulary::from_toml_str(SAMPLE).expect("parse failed");

		assert_eq!(vocab.version(), 1);
		assert_eq!(vocab.canonical("color", "GRAY"), Some("gray"));
		assert_eq!(vocab.canonical("color", "teal"), None);
		assert_eq!(vocab.synonym("grey"), Some("gray"));
	}

	#[test]
	fn resolves_skus_without_hyphens() {
		let vocab = Vocabulary::from_toml_str(SAMPLE).expect("parse failed");

		assert!(vocab.is_known_sku("hdmm10"));
		assert_eq!(vocab.resolve_sku("CDP2HD1M"), Some("CDP2HD-1M"));
		assert_eq!(vocab.resolve_sku("NOPE99"), None);
	}

	#[test]
	fn drop_order_is_priority_then_name() {
		let vocab = Vocabulary::from_toml_str(SAMPLE).expect("parse failed");

		assert_eq!(vocab.drop_order(), vec!["color", "connector"]);
	}

	#[test]
	fn impossible_pairs_are_order_insensitive() {
		let vocab = Vocabulary::from_toml_str(SAMPLE).expect("parse failed");

		assert!(vocab.is_impossible_pair("usb-c", "vga"));
		assert!(vocab.is_impossible_pair("VGA", "usb-c"));
		assert!(!vocab.is_impossible_pair("hdmi", "usb-c"));
	}

	#[test]
	fn rejects_duplicate_dimension() {
		let raw = r#"
version = 1

[[dimension]]
name          = "color"
merge         = "exclusive"
drop_priority = 10
values        = ["black"]

[[dimension]]
name          = "color"
merge         = "exclusive"
drop_priority = 20
values        = ["white"]
"#;

		assert!(matches!(
			Vocabulary::from_toml_str(raw),
			Err(VocabularyError::Validation { .. })
		));
	}
}
