pub mod embedding;
pub mod parser;

use color_eyre::{Result, eyre};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

/// Builds the header set for one provider call: bearer auth from the
/// configured key plus any configured extra headers.
pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(eyre::eyre!("Provider header `{key}` must be a string value."));
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bearer_and_extra_headers_are_set() {
		let mut extras = Map::new();

		extras.insert("x-provider-tier".to_string(), Value::String("standard".to_string()));

		let headers = auth_headers("secret", &extras).expect("header build failed");

		assert_eq!(headers[AUTHORIZATION], "Bearer secret");
		assert_eq!(headers["x-provider-tier"], "standard");
	}

	#[test]
	fn non_string_extra_header_is_rejected() {
		let mut extras = Map::new();

		extras.insert("x-retries".to_string(), Value::from(3));

		let err = auth_headers("secret", &extras).expect_err("expected a header error");

		assert!(err.to_string().contains("x-retries"));
	}
}
