use std::collections::HashMap;

use infra::ids::Id;

use super::models::{GroupKey, PortionControl, PortionControlItem, RecipeGroup, RecipeSummary};
use crate::catalog::filter::by_name;
use crate::catalog::CatalogSnapshot;

pub const UNCATEGORIZED: &str = "Uncategorized";

pub fn summarize(
    catalog: &CatalogSnapshot,
    recipe: PortionControl,
    item_counts: &HashMap<Id<PortionControl>, usize>,
) -> RecipeSummary {
    let product = catalog.product(&recipe.product_id);
    let variant = recipe.variant_id.as_ref().and_then(|id| catalog.variant(id));
    let category = product.and_then(|p| catalog.category(&p.category_id));
    RecipeSummary {
        product_name: product.map(|p| p.name.clone()),
        variant_name: variant.map(|v| v.name.clone()),
        category_id: category.map(|c| c.id),
        category_name: category.map(|c| c.name.clone()),
        item_count: item_counts.get(&recipe.id).cloned().unwrap_or(0),
        recipe,
    }
}

pub fn count_items(items: &[PortionControlItem]) -> HashMap<Id<PortionControl>, usize> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(item.portion_control_id).or_insert(0) += 1;
    }
    counts
}

/// Buckets recipes by their product's category, sorted by category name.
/// Recipes whose product or category cannot be found land in the
/// [`UNCATEGORIZED`] bucket. Each recipe appears exactly once, and keeps its
/// input order within its bucket.
pub fn group_by_category(
    catalog: &CatalogSnapshot,
    recipes: Vec<PortionControl>,
    items: &[PortionControlItem],
) -> Vec<RecipeGroup> {
    let counts = count_items(items);
    let mut groups: Vec<RecipeGroup> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for recipe in recipes {
        let summary = summarize(catalog, recipe, &counts);
        let (key, name) = match (summary.category_id, summary.category_name.as_ref()) {
            (Some(id), Some(name)) => (GroupKey::Category(id), name.clone()),
            _ => (GroupKey::Uncategorized, UNCATEGORIZED.to_string()),
        };
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(RecipeGroup {
                key,
                name,
                recipes: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].recipes.push(summary);
    }

    groups.sort_by(|a, b| by_name(&a.name, &b.name));
    groups
}
