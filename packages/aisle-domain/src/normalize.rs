//! Utterance normalization: case folding, punctuation stripping, and
//! synonym/typo substitution against the vocabulary table.

use unicode_segmentation::UnicodeSegmentation;

use crate::vocabulary::Vocabulary;

#[derive(Clone, Debug)]
pub struct Normalized {
	/// Lowercased, punctuation-stripped, synonym-substituted text.
	pub text: String,
	pub tokens: Vec<String>,
	/// Word count of the raw utterance, before substitution.
	pub word_count: usize,
}

impl Normalized {
	pub fn has_token(&self, token: &str) -> bool {
		self.tokens.iter().any(|t| t == token)
	}

	pub fn has_phrase(&self, phrase: &str) -> bool {
		contains_phrase(&self.text, phrase)
	}
}

pub fn normalize(raw: &str, vocab: &Vocabulary) -> Normalized {
	let word_count = raw.unicode_words().count();
	let mut text = strip(raw);

	// Multi-word aliases first ("type c" -> "usb-c"), then single tokens.
	for (alias, canonical) in vocab.synonyms() {
		if alias.contains(' ') {
			text = replace_phrase(&text, alias, canonical);
		}
	}

	let tokens: Vec<String> = text
		.split_whitespace()
		.map(|token| match vocab.synonym(token) {
			Some(canonical) => canonical.to_string(),
			None => token.to_string(),
		})
		.collect();
	let text = tokens.join(" ");

	Normalized { text, tokens, word_count }
}

/// Word-boundary substring check. Hyphens and periods count as word
/// characters so "usb-c" and "3.0" stay intact.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
	find_phrase(text, phrase).is_some()
}

pub(crate) fn find_phrase(text: &str, phrase: &str) -> Option<(usize, usize)> {
	if phrase.is_empty() {
		return None;
	}

	let mut offset = 0;

	while let Some(pos) = text[offset..].find(phrase) {
		let start = offset + pos;
		let end = start + phrase.len();
		let before_ok = start == 0
			|| !text[..start].chars().next_back().map(is_word_char).unwrap_or(false);
		let after_ok =
			end == text.len() || !text[end..].chars().next().map(is_word_char).unwrap_or(false);

		if before_ok && after_ok {
			return Some((start, end));
		}

		offset = start + phrase.len().max(1);
	}

	None
}

fn replace_phrase(text: &str, phrase: &str, replacement: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut rest = text;

	// Scans forward so the replacement itself is never re-matched.
	while let Some((start, end)) = find_phrase(rest, phrase) {
		out.push_str(&rest[..start]);
		out.push_str(replacement);
		rest = &rest[end..];
	}

	out.push_str(rest);
	out
}

fn is_word_char(ch: char) -> bool {
	ch.is_alphanumeric() || ch == '-' || ch == '.'
}

fn strip(raw: &str) -> String {
	let lowered = raw.to_lowercase();
	let mut out = String::with_capacity(lowered.len());

	for ch in lowered.chars() {
		if is_word_char(ch) || ch.is_whitespace() {
			out.push(ch);
		} else {
			out.push(' ');
		}
	}

	out.split_whitespace().collect::<Vec<_>>().join(" ")
}
