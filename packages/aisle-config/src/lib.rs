mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Catalog, Config, EmbeddingProviderConfig, Features, LlmProviderConfig, Providers, Search,
	Service,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if !matches!(cfg.service.log_level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
		return Err(Error::Validation {
			message: "service.log_level must be one of trace, debug, info, warn, or error."
				.to_string(),
		});
	}
	if cfg.service.session_queue_depth == 0 {
		return Err(Error::Validation {
			message: "service.session_queue_depth must be greater than zero.".to_string(),
		});
	}
	if cfg.catalog.vocabulary_path.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "catalog.vocabulary_path must be non-empty.".to_string(),
		});
	}
	if cfg.catalog.products_path.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "catalog.products_path must be non-empty.".to_string(),
		});
	}
	if cfg.search.top_k == 0 {
		return Err(Error::Validation {
			message: "search.top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.search.min_results == 0 {
		return Err(Error::Validation {
			message: "search.min_results must be greater than zero.".to_string(),
		});
	}
	if cfg.search.min_results > cfg.search.top_k {
		return Err(Error::Validation {
			message: "search.min_results must not exceed search.top_k.".to_string(),
		});
	}
	if cfg.search.retry_attempts == 0 {
		return Err(Error::Validation {
			message: "search.retry_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.timeout_ms == 0 || cfg.providers.query_parser.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "provider timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.features.llm_parser && cfg.providers.query_parser.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.query_parser.api_key must be non-empty when features.llm_parser is enabled."
				.to_string(),
		});
	}
	if cfg.features.semantic_ranking && cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty when features.semantic_ranking is enabled."
				.to_string(),
		});
	}

	Ok(())
}
