//! Cascading catalog search. Runs the full filter set first, then relaxes
//! one dimension at a time following the vocabulary drop order until enough
//! products match or the relaxation budget is spent.

use std::{collections::BTreeSet, time::Duration};

use aisle_config::Search as SearchConfig;
use aisle_domain::{FilterSet, Vocabulary};

use crate::{MatchOutcome, ProductIndex, ScoredProduct};

#[derive(Clone, Debug)]
pub struct SearchOutcome {
	pub products: Vec<ScoredProduct>,
	/// The filter set the winning tier actually ran with.
	pub filters_used: FilterSet,
	/// Dimensions relaxed away to produce the result set, in drop order.
	pub dropped_dimensions: Vec<String>,
	pub outcome: MatchOutcome,
}

impl SearchOutcome {
	fn not_searched() -> Self {
		Self {
			products: Vec::new(),
			filters_used: FilterSet::new(),
			dropped_dimensions: Vec::new(),
			outcome: MatchOutcome::NotSearched,
		}
	}
}

pub struct CascadingSearch<'a> {
	index: &'a dyn ProductIndex,
	vocab: &'a Vocabulary,
	cfg: &'a SearchConfig,
}

impl<'a> CascadingSearch<'a> {
	pub fn new(index: &'a dyn ProductIndex, vocab: &'a Vocabulary, cfg: &'a SearchConfig) -> Self {
		Self { index, vocab, cfg }
	}

	/// Runs the cascade. Infallible from the caller's view: index failures
	/// that survive the retry budget degrade to an empty no-match outcome.
	pub async fn run(&self, filters: &FilterSet) -> SearchOutcome {
		if filters.is_empty() {
			return SearchOutcome::not_searched();
		}

		let mut current = filters.clone();
		let mut dropped = Vec::new();
		let mut drop_queue = self.drop_queue(filters);
		// Best partial tier seen so far, kept in case every tier falls short.
		let mut partial: Option<SearchOutcome> = None;

		for _ in 0..=self.cfg.max_relaxation_steps {
			let products = self.query_with_retry(&current).await;
			let outcome =
				if dropped.is_empty() { MatchOutcome::Matched } else { MatchOutcome::Relaxed };

			if products.len() as u32 >= self.cfg.min_results {
				return SearchOutcome {
					products,
					filters_used: current,
					dropped_dimensions: dropped,
					outcome,
				};
			}
			if !products.is_empty()
				&& partial.as_ref().is_none_or(|p| p.products.len() < products.len())
			{
				partial = Some(SearchOutcome {
					products,
					filters_used: current.clone(),
					dropped_dimensions: dropped.clone(),
					outcome,
				});
			}

			let Some(dimension) = drop_queue.pop() else {
				break;
			};

			current = current.without(&dimension);
			dropped.push(dimension);

			if current.is_empty() {
				break;
			}
		}

		partial.unwrap_or(SearchOutcome {
			products: Vec::new(),
			filters_used: FilterSet::new(),
			dropped_dimensions: dropped,
			outcome: MatchOutcome::NoMatch,
		})
	}

	/// Dimensions present in the filter set, ordered so that `pop` yields
	/// the next dimension to drop.
	fn drop_queue(&self, filters: &FilterSet) -> Vec<String> {
		let present: BTreeSet<&str> = filters.dimensions().collect();
		let mut queue: Vec<String> = self
			.vocab
			.drop_order()
			.into_iter()
			.filter(|name| present.contains(*name))
			.map(str::to_owned)
			.collect();

		// Last element pops first.
		queue.reverse();

		queue
	}

	async fn query_with_retry(&self, filters: &FilterSet) -> Vec<ScoredProduct> {
		for attempt in 0..self.cfg.retry_attempts {
			match self.index.query(filters, self.cfg.top_k).await {
				Ok(products) => return products,
				Err(err) => {
					tracing::warn!(
						error = %err,
						attempt = attempt + 1,
						"Product index query failed."
					);

					if attempt + 1 < self.cfg.retry_attempts {
						tokio::time::sleep(Duration::from_millis(self.cfg.retry_backoff_ms)).await;
					}
				},
			}
		}

		tracing::error!("Product index is unavailable; degrading to no match.");

		Vec::new()
	}
}
