//! Local catalog index backed by a TOML product file. Stands in for the
//! remote vector index when running against a flat catalog export.

use std::path::Path;

use serde::Deserialize;

use aisle_domain::{FilterSet, Product};
use aisle_service::{BoxFuture, ProductIndex, ScoredProduct};

#[derive(Debug, Deserialize)]
struct CatalogFile {
	#[serde(default, rename = "product")]
	products: Vec<Product>,
}

pub struct FileIndex {
	products: Vec<Product>,
}

impl FileIndex {
	pub fn load(path: &Path) -> color_eyre::Result<Self> {
		let raw = std::fs::read_to_string(path)?;
		let file: CatalogFile = toml::from_str(&raw)?;

		Ok(Self { products: file.products })
	}

	pub fn len(&self) -> usize {
		self.products.len()
	}

	pub fn is_empty(&self) -> bool {
		self.products.is_empty()
	}
}

impl ProductIndex for FileIndex {
	fn query<'a>(
		&'a self,
		filters: &'a FilterSet,
		top_k: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ScoredProduct>>> {
		Box::pin(async move {
			let mut matched: Vec<ScoredProduct> = self
				.products
				.iter()
				.filter(|product| filters.matches(product))
				.map(|product| ScoredProduct { product: product.clone(), score: 1. })
				.collect();

			matched.sort_by(|a, b| a.product.sku.cmp(&b.product.sku));
			matched.truncate(top_k as usize);

			Ok(matched)
		})
	}

	fn lookup_sku<'a>(
		&'a self,
		sku: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Option<Product>>> {
		Box::pin(async move {
			Ok(self.products.iter().find(|p| p.sku.eq_ignore_ascii_case(sku)).cloned())
		})
	}
}
