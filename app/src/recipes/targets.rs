use std::collections::HashSet;

use infra::ids::Id;

use super::models::{PortionControl, RecipeKey, RecipeTarget};
use crate::catalog::filter::{by_name, is_named};
use crate::catalog::{CatalogSnapshot, Product, Variant};

/// Products and variants that can still be given a recipe.
///
/// Only active products outside the add-ons category qualify. A product with
/// variants is offered per variant, never as itself; a product without
/// variants is offered once. Anything that already has a recipe is left out,
/// except the target of `editing`, so that a recipe being edited can keep
/// its current target.
pub fn recipe_targets(
    catalog: &CatalogSnapshot,
    recipes: &[PortionControl],
    addons_category: &str,
    editing: Option<&Id<PortionControl>>,
) -> Vec<RecipeTarget> {
    let taken = recipes
        .iter()
        .filter(|r| Some(&r.id) != editing)
        .map(PortionControl::key)
        .collect::<HashSet<_>>();

    let mut targets = Vec::new();
    for product in catalog.products.iter().filter(|p| p.is_active) {
        let is_addon = catalog
            .category(&product.category_id)
            .map(|c| is_named(c, addons_category))
            .unwrap_or(false);
        if is_addon {
            continue;
        }

        let mut variants = catalog.variants_of(&product.id).peekable();
        if variants.peek().is_none() {
            let key = RecipeKey {
                product_id: product.id,
                variant_id: None,
            };
            if !taken.contains(&key) {
                targets.push(RecipeTarget {
                    key,
                    label: product.name.clone(),
                });
            }
            continue;
        }

        for variant in variants {
            let key = RecipeKey {
                product_id: product.id,
                variant_id: Some(variant.id),
            };
            if !taken.contains(&key) {
                targets.push(RecipeTarget {
                    key,
                    label: label(product, Some(variant)),
                });
            }
        }
    }
    targets.sort_by(|a, b| by_name(&a.label, &b.label));
    targets
}

pub fn label(product: &Product, variant: Option<&Variant>) -> String {
    match variant {
        Some(variant) => format!("{} - {}", product.name, variant.name),
        None => product.name.clone(),
    }
}
