//! Language-model query understanding. Advisory only: the orchestrator
//! merges these hints with the deterministic rule output and never trusts
//! them exclusively.

use std::{collections::BTreeMap, time::Duration};

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

const SYSTEM_PROMPT: &str = "You extract structured product-search hints from a customer \
	utterance. Reply with a single JSON object: {\"intent\": string|null, \"filters\": \
	{dimension: value|[values]}}. Use only dimensions and values from the provided vocabulary. \
	Reply with {} when unsure.";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ParsedHints {
	#[serde(default)]
	pub intent: Option<String>,
	#[serde(default)]
	pub filters: BTreeMap<String, Value>,
}

pub async fn parse(
	cfg: &aisle_config::LlmProviderConfig,
	utterance: &str,
	vocabulary_digest: &Value,
) -> Result<ParsedHints> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let messages = [
		serde_json::json!({ "role": "system", "content": SYSTEM_PROMPT }),
		serde_json::json!({
			"role": "user",
			"content": format!("Vocabulary: {vocabulary_digest}\nUtterance: {utterance}"),
		}),
	];

	for _ in 0..3 {
		let body = serde_json::json!({
			"model": cfg.model,
			"temperature": cfg.temperature,
			"messages": messages,
		});
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;
		if let Ok(parsed) = parse_hints_json(json) {
			return Ok(parsed);
		}
	}

	Err(eyre::eyre!("Query parser response is not valid JSON."))
}

fn parse_hints_json(json: Value) -> Result<ParsedHints> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		let parsed: ParsedHints = serde_json::from_str(content)
			.map_err(|_| eyre::eyre!("Query parser content is not valid JSON."))?;

		return Ok(parsed);
	}

	if json.is_object() {
		return Ok(serde_json::from_value(json)?);
	}

	Err(eyre::eyre!("Query parser response is missing JSON content."))
}
