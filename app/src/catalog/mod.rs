use anyhow::Result;

use infra::ids::Id;
use infra::persistence::Storage;
use infra::records::Filter;

use crate::errors::StorageResultExt;

mod categories;
pub mod filter;
mod models;
mod products;

pub use self::categories::*;
pub use self::filter::ProductFilter;
pub use self::models::*;
pub use self::products::*;

/// Every category, product and variant, read in one pass for the views that
/// cross-reference them.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub categories: Vec<Category>,
    pub products: Vec<Product>,
    pub variants: Vec<Variant>,
}

impl CatalogSnapshot {
    pub(crate) fn load<D: Storage>(docs: &D) -> Result<Self> {
        let categories = docs.select::<Category>(&Filter::all()).translated()?;
        let products = docs.select::<Product>(&Filter::all()).translated()?;
        let variants = docs.select::<Variant>(&Filter::all()).translated()?;
        Ok(CatalogSnapshot {
            categories,
            products,
            variants,
        })
    }

    pub fn category(&self, id: &Id<Category>) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == *id)
    }

    pub fn product(&self, id: &Id<Product>) -> Option<&Product> {
        self.products.iter().find(|p| p.id == *id)
    }

    pub fn variant(&self, id: &Id<Variant>) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == *id)
    }

    pub fn variants_of<'a>(
        &'a self,
        product_id: &'a Id<Product>,
    ) -> impl Iterator<Item = &'a Variant> + 'a {
        self.variants
            .iter()
            .filter(move |v| v.product_id == *product_id)
    }
}
