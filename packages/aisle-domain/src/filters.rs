//! Typed filter sets: extraction from normalized utterances against the
//! vocabulary, and the per-dimension merge policy (exclusive replaces,
//! cumulative unions).

use std::{
	collections::{BTreeMap, BTreeSet},
	sync::OnceLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
	normalize::{Normalized, find_phrase},
	product::Product,
	vocabulary::{
		CONNECTOR_DIMENSION, CONNECTOR_FROM_DIMENSION, CONNECTOR_TO_DIMENSION, MergeMode,
		Vocabulary,
	},
};

pub const LENGTH_DIMENSION: &str = "length";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
	One(String),
	Many(BTreeSet<String>),
}

impl FilterValue {
	pub fn values(&self) -> Vec<&str> {
		match self {
			Self::One(v) => vec![v.as_str()],
			Self::Many(vs) => vs.iter().map(String::as_str).collect(),
		}
	}
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterSet {
	entries: BTreeMap<String, FilterValue>,
}

impl FilterSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn get(&self, dimension: &str) -> Option<&FilterValue> {
		self.entries.get(dimension)
	}

	pub fn contains(&self, dimension: &str) -> bool {
		self.entries.contains_key(dimension)
	}

	pub fn set_one(&mut self, dimension: impl Into<String>, value: impl Into<String>) {
		self.entries.insert(dimension.into(), FilterValue::One(value.into()));
	}

	pub fn add_cumulative(&mut self, dimension: impl Into<String>, value: impl Into<String>) {
		let entry = self
			.entries
			.entry(dimension.into())
			.or_insert_with(|| FilterValue::Many(BTreeSet::new()));

		match entry {
			FilterValue::Many(vs) => {
				vs.insert(value.into());
			},
			FilterValue::One(existing) => {
				let mut vs = BTreeSet::new();

				vs.insert(existing.clone());
				vs.insert(value.into());

				*entry = FilterValue::Many(vs);
			},
		}
	}

	/// A copy with one dimension removed; the receiver is untouched.
	pub fn without(&self, dimension: &str) -> Self {
		let mut entries = self.entries.clone();

		entries.remove(dimension);

		Self { entries }
	}

	pub fn dimensions(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(String::as_str)
	}

	pub fn entries(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), v))
	}

	/// Logical AND across dimensions; cumulative values must all be present.
	pub fn matches(&self, product: &Product) -> bool {
		self.entries.iter().all(|(dimension, value)| match value {
			FilterValue::One(v) => product.has_value(dimension, v),
			FilterValue::Many(vs) => vs.iter().all(|v| product.has_value(dimension, v)),
		})
	}
}

/// Pure turn-over-turn merge. Exclusive dimensions: incoming replaces.
/// Cumulative dimensions: incoming unions with carried values.
pub fn merge(previous: &FilterSet, incoming: &FilterSet, vocab: &Vocabulary) -> FilterSet {
	let mut merged = previous.clone();

	for (dimension, value) in incoming.entries() {
		let mode = vocab.merge_mode(dimension).unwrap_or(match value {
			FilterValue::One(_) => MergeMode::Exclusive,
			FilterValue::Many(_) => MergeMode::Cumulative,
		});

		match mode {
			MergeMode::Exclusive => {
				merged.entries.insert(dimension.to_string(), value.clone());
			},
			MergeMode::Cumulative =>
				for v in value.values() {
					merged.add_cumulative(dimension, v);
				},
		}
	}

	merged
}

/// Extracts a validated filter set from a normalized utterance. Unknown
/// terms are dropped, never errors.
pub fn extract(norm: &Normalized, vocab: &Vocabulary) -> FilterSet {
	let mut filters = FilterSet::new();
	let mut consumed: Vec<(usize, usize)> = Vec::new();

	extract_connector_pair(norm, vocab, &mut filters, &mut consumed);
	extract_vocabulary_matches(norm, vocab, &mut filters, &consumed);
	extract_length(norm, vocab, &mut filters);

	filters
}

/// "usb-c to hdmi" fills the directional connector dimensions when the
/// vocabulary declares them, and the plain connector dimension otherwise.
fn extract_connector_pair(
	norm: &Normalized,
	vocab: &Vocabulary,
	filters: &mut FilterSet,
	consumed: &mut Vec<(usize, usize)>,
) {
	let Some(connector) = vocab.dimension(CONNECTOR_DIMENSION) else {
		return;
	};

	for from in &connector.values {
		for to in &connector.values {
			let phrase = format!("{from} to {to}");
			let Some(span) = find_phrase(&norm.text, &phrase) else {
				continue;
			};

			let has_directional = vocab.dimension(CONNECTOR_FROM_DIMENSION).is_some()
				&& vocab.dimension(CONNECTOR_TO_DIMENSION).is_some();

			if has_directional {
				filters.set_one(CONNECTOR_FROM_DIMENSION, from.clone());
				filters.set_one(CONNECTOR_TO_DIMENSION, to.clone());
			} else {
				filters.add_cumulative(CONNECTOR_DIMENSION, from.clone());
				filters.add_cumulative(CONNECTOR_DIMENSION, to.clone());
			}

			consumed.push(span);

			return;
		}
	}
}

/// Greedy longest-phrase matching across every dimension. A longer value
/// ("usb-c dock") wins over any value it overlaps ("usb-c", "dock"), which
/// keeps connector terms inside subcategory names from leaking into the
/// connector dimension.
fn extract_vocabulary_matches(
	norm: &Normalized,
	vocab: &Vocabulary,
	filters: &mut FilterSet,
	consumed: &[(usize, usize)],
) {
	struct Candidate<'a> {
		start: usize,
		end: usize,
		dimension: &'a str,
		value: &'a str,
		merge: MergeMode,
	}

	let mut candidates: Vec<Candidate<'_>> = Vec::new();

	for schema in vocab.dimensions() {
		// Directional connector dimensions are only fed by the pair rule.
		if schema.name == CONNECTOR_FROM_DIMENSION || schema.name == CONNECTOR_TO_DIMENSION {
			continue;
		}

		for value in &schema.values {
			let mut offset = 0;

			while let Some((start, end)) = find_phrase(&norm.text[offset..], value) {
				candidates.push(Candidate {
					start: offset + start,
					end: offset + end,
					dimension: &schema.name,
					value,
					merge: schema.merge,
				});

				offset += end.max(1);
			}
		}
	}

	candidates.sort_by(|a, b| {
		(b.end - b.start)
			.cmp(&(a.end - a.start))
			.then_with(|| a.start.cmp(&b.start))
			.then_with(|| a.dimension.cmp(b.dimension))
			.then_with(|| a.value.cmp(b.value))
	});

	let mut taken: Vec<(usize, usize)> = consumed.to_vec();

	for candidate in candidates {
		let overlaps = taken
			.iter()
			.any(|(start, end)| candidate.start < *end && *start < candidate.end);

		if overlaps {
			continue;
		}

		match candidate.merge {
			MergeMode::Exclusive => {
				if filters.contains(candidate.dimension) {
					continue;
				}

				filters.set_one(candidate.dimension, candidate.value);
			},
			MergeMode::Cumulative => filters.add_cumulative(candidate.dimension, candidate.value),
		}

		taken.push((candidate.start, candidate.end));
	}
}

/// "6 ft", "6ft", "2 meters" -> the canonical length value, when the
/// vocabulary lists it. Unlisted lengths are dropped like any unknown term.
fn extract_length(norm: &Normalized, vocab: &Vocabulary, filters: &mut FilterSet) {
	static LENGTH: OnceLock<Regex> = OnceLock::new();

	let Some(schema) = vocab.dimension(LENGTH_DIMENSION) else {
		return;
	};

	if filters.contains(LENGTH_DIMENSION) {
		return;
	}

	let re = LENGTH.get_or_init(|| {
		Regex::new(r"\b(\d+(?:\.\d+)?)\s*(ft|feet|foot|m|meter|meters|metre|metres)\b")
			.unwrap_or_else(|_| unreachable!("length pattern is static"))
	});

	let Some(caps) = re.captures(&norm.text) else {
		return;
	};
	let amount = &caps[1];
	let unit = match &caps[2] {
		"ft" | "feet" | "foot" => "ft",
		_ => "m",
	};
	let canonical = format!("{amount}{unit}");

	if schema.values.contains(canonical.as_str()) {
		filters.set_one(LENGTH_DIMENSION, canonical);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::normalize::normalize;

	fn vocab() -> Vocabulary {
		Vocabulary::from_toml_str(
			r#"
version = 1

[[dimension]]
name          = "category"
merge         = "exclusive"
drop_priority = 60
values        = ["cable", "adapter", "dock", "hub"]

[[dimension]]
name          = "subcategory"
merge         = "exclusive"
drop_priority = 40
values        = ["usb-c dock", "hdmi cable", "displayport cable"]

[[dimension]]
name          = "color"
merge         = "exclusive"
drop_priority = 10
values        = ["black", "white", "gray"]

[[dimension]]
name          = "connector"
merge         = "cumulative"
drop_priority = 50
values        = ["usb-c", "hdmi", "displayport", "vga"]

[[dimension]]
name          = "connector_from"
merge         = "exclusive"
drop_priority = 55
values        = ["usb-c", "hdmi", "displayport", "vga"]

[[dimension]]
name          = "connector_to"
merge         = "exclusive"
drop_priority = 56
values        = ["usb-c", "hdmi", "displayport", "vga"]

[[dimension]]
name          = "feature"
merge         = "cumulative"
drop_priority = 20
values        = ["4k", "8k", "power delivery"]

[[dimension]]
name          = "length"
merge         = "exclusive"
drop_priority = 30
values        = ["3ft", "6ft", "10ft", "2m"]

[synonyms]
"cables"   = "cable"
"docks"    = "dock"
"dp"       = "displayport"
"grey"     = "gray"
"docking station" = "dock"
"#,
		)
		.expect("vocabulary parse failed")
	}

	fn extract_from(utterance: &str) -> FilterSet {
		let vocab = vocab();
		let norm = normalize(utterance, &vocab);

		extract(&norm, &vocab)
	}

	#[test]
	fn extracts_subcategory_and_color() {
		let filters = extract_from("I need a USB-C dock in black");

		assert_eq!(
			filters.get("subcategory"),
			Some(&FilterValue::One("usb-c dock".to_string()))
		);
		assert_eq!(filters.get("color"), Some(&FilterValue::One("black".to_string())));
		// The connector token is part of the subcategory phrase, not a
		// standalone constraint.
		assert_eq!(filters.get("connector"), None);
	}

	#[test]
	fn extracts_connector_pair() {
		let filters = extract_from("a 6ft usb-c to hdmi cable");

		assert_eq!(
			filters.get("connector_from"),
			Some(&FilterValue::One("usb-c".to_string()))
		);
		assert_eq!(filters.get("connector_to"), Some(&FilterValue::One("hdmi".to_string())));
		assert_eq!(filters.get("length"), Some(&FilterValue::One("6ft".to_string())));
		assert_eq!(filters.get("category"), Some(&FilterValue::One("cable".to_string())));
	}

	#[test]
	fn drops_unknown_terms() {
		let filters = extract_from("a teal quantum cable");

		assert_eq!(filters.get("color"), None);
		assert_eq!(filters.get("category"), Some(&FilterValue::One("cable".to_string())));
	}

	#[test]
	fn drops_unlisted_length() {
		let filters = extract_from("a 47ft hdmi cable");

		assert_eq!(filters.get("length"), None);
	}

	#[test]
	fn accumulates_features() {
		let filters = extract_from("a dock with 4k and power delivery");
		let expected: BTreeSet<String> =
			["4k".to_string(), "power delivery".to_string()].into_iter().collect();

		assert_eq!(filters.get("feature"), Some(&FilterValue::Many(expected)));
	}

	#[test]
	fn merge_replaces_exclusive_dimensions() {
		let vocab = vocab();
		let mut previous = FilterSet::new();
		let mut incoming = FilterSet::new();

		previous.set_one("color", "black");
		previous.set_one("subcategory", "usb-c dock");
		incoming.set_one("color", "white");

		let merged = merge(&previous, &incoming, &vocab);

		assert_eq!(merged.get("color"), Some(&FilterValue::One("white".to_string())));
		assert_eq!(
			merged.get("subcategory"),
			Some(&FilterValue::One("usb-c dock".to_string()))
		);
		// Inputs are untouched.
		assert_eq!(previous.get("color"), Some(&FilterValue::One("black".to_string())));
	}

	#[test]
	fn merge_unions_cumulative_dimensions() {
		let vocab = vocab();
		let mut previous = FilterSet::new();
		let mut incoming = FilterSet::new();

		previous.add_cumulative("feature", "4k");
		incoming.add_cumulative("feature", "power delivery");

		let merged = merge(&previous, &incoming, &vocab);
		let expected: BTreeSet<String> =
			["4k".to_string(), "power delivery".to_string()].into_iter().collect();

		assert_eq!(merged.get("feature"), Some(&FilterValue::Many(expected)));
	}

	#[test]
	fn merge_is_idempotent() {
		let vocab = vocab();
		let mut filters = FilterSet::new();

		filters.set_one("color", "black");
		filters.add_cumulative("feature", "4k");

		let once = merge(&filters, &filters, &vocab);
		let twice = merge(&once, &filters, &vocab);

		assert_eq!(once, twice);
	}

	#[test]
	fn matches_requires_every_dimension() {
		let mut filters = FilterSet::new();

		filters.set_one("color", "black");
		filters.add_cumulative("connector", "usb-c");

		let product = Product {
			sku: "DK30BK".to_string(),
			name: "USB-C dock, black".to_string(),
			attributes: [("color".to_string(), "black".to_string())].into_iter().collect(),
			connectors: vec!["usb-c".to_string(), "hdmi".to_string()],
			features: BTreeSet::new(),
		};

		assert!(filters.matches(&product));

		filters.set_one("color", "white");

		assert!(!filters.matches(&product));
	}
}
