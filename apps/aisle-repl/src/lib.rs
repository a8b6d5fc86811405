//! Terminal front end for the product finder. One process, one session;
//! the catalog is served from a local TOML file instead of a remote index.

pub mod catalog;

use std::{
	io::{BufRead, Write},
	path::PathBuf,
	sync::Arc,
};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use aisle_service::{AisleService, HandlerResult, StaticTopic};

use crate::catalog::FileIndex;

#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = aisle_config::load(&args.config)?;

	init_tracing(&config)?;

	let vocabulary_raw = std::fs::read_to_string(&config.catalog.vocabulary_path)?;
	let vocabulary = Arc::new(aisle_domain::Vocabulary::from_toml_str(&vocabulary_raw)?);
	let index = Arc::new(FileIndex::load(&config.catalog.products_path)?);

	tracing::info!(
		products = index.len(),
		vocabulary_version = vocabulary.version(),
		"Catalog loaded."
	);

	let service = AisleService::new(config, vocabulary, index);
	let session = Uuid::new_v4();
	let stdin = std::io::stdin();
	let mut stdout = std::io::stdout();

	loop {
		write!(stdout, "> ")?;
		stdout.flush()?;

		let mut line = String::new();

		if stdin.lock().read_line(&mut line)? == 0 {
			break;
		}

		let utterance = line.trim();

		if utterance.is_empty() {
			continue;
		}

		match service.process_turn(session, utterance).await {
			Ok(outcome) => {
				render(&mut stdout, &outcome.result)?;

				if outcome.result == HandlerResult::Farewell {
					break;
				}
			},
			Err(err) => writeln!(stdout, "! {err}")?,
		}
	}

	Ok(())
}

fn render(out: &mut impl Write, result: &HandlerResult) -> std::io::Result<()> {
	match result {
		HandlerResult::Greeting =>
			writeln!(out, "Hi! Tell me what you are trying to connect."),
		HandlerResult::Farewell => writeln!(out, "Glad to help. Bye!"),
		HandlerResult::ProductList { products, dropped_dimensions } => {
			if !dropped_dimensions.is_empty() {
				writeln!(out, "(relaxed: {})", dropped_dimensions.join(", "))?;
			}
			for scored in products {
				writeln!(out, "  {}  {}", scored.product.sku, scored.product.name)?;
			}

			Ok(())
		},
		HandlerResult::SingleProduct { product } =>
			writeln!(out, "  {}  {}", product.sku, product.name),
		HandlerResult::GuidanceQuestion { setup } => writeln!(
			out,
			"What ports does your computer have? ({setup:?} setup)"
		),
		HandlerResult::GuidanceRecommendation { products, offered_feature } => {
			for scored in products {
				writeln!(out, "  {}  {}", scored.product.sku, scored.product.name)?;
			}
			if let Some(feature) = offered_feature {
				writeln!(out, "Want me to narrow these down to {feature}-capable ones?")?;
			}

			Ok(())
		},
		HandlerResult::BlockedTopic =>
			writeln!(out, "Setup and troubleshooting are handled by support. I can help you find hardware."),
		HandlerResult::NoMatch { .. } =>
			writeln!(out, "Nothing in the catalog matches that. Try loosening a constraint."),
		HandlerResult::Clarification =>
			writeln!(out, "Could you tell me more about what you are looking for?"),
		HandlerResult::StaticAnswer { topic } => match topic {
			StaticTopic::Warranty =>
				writeln!(out, "Most products carry a 2-year warranty; check the product page."),
			StaticTopic::Pricing =>
				writeln!(out, "Pricing lives on the product page; I can help you pick the product."),
			StaticTopic::ImpossibleProduct =>
				writeln!(out, "Those connectors cannot be bridged by a single passive product."),
		},
	}
}

fn init_tracing(config: &aisle_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}
