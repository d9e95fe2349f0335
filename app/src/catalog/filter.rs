use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use infra::ids::Id;

use super::models::{Category, Product};

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub category_id: Option<Id<Category>>,
    /// Case-insensitive substring of the name or SKU.
    pub search: Option<String>,
    pub active_only: bool,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if self.active_only && !product.is_active {
            return false;
        }
        if let Some(category_id) = self.category_id {
            if product.category_id != category_id {
                return false;
            }
        }
        match self.needle() {
            Some(needle) => {
                product.name.to_lowercase().contains(&needle)
                    || product
                        .sku
                        .as_ref()
                        .map(|sku| sku.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            }
            None => true,
        }
    }

    fn needle(&self) -> Option<String> {
        self.search
            .as_ref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }
}

pub fn filter_products(products: Vec<Product>, filter: &ProductFilter) -> Vec<Product> {
    let mut products = products
        .into_iter()
        .filter(|p| filter.matches(p))
        .collect::<Vec<_>>();
    products.sort_by(|a, b| by_name(&a.name, &b.name));
    products
}

/// Case-insensitive name order, falling back to the exact spelling so the
/// result is total.
pub fn by_name(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// The designated add-ons category is matched by trimmed, case-insensitive name.
pub fn is_named(category: &Category, name: &str) -> bool {
    category.name.trim().to_lowercase() == name.trim().to_lowercase()
}
