//! Guarded with `#[cfg(test)]` from `lib.rs`

use std::collections::BTreeMap;

use anyhow::Result;
use maplit::btreemap;
use r2d2::Pool;

use infra::persistence::Storage;

use crate::catalog::{CategoryForm, CreateCategory, CreateProduct, ProductForm, VariantForm};
use crate::config::CatalogConfig;
use crate::errors::CmsError;
use crate::recipes::{
    CreateRecipe, GroupRecipes, ItemForm, ListRecipeTargets, RecipeForm, UpdateRecipe,
};
use crate::services::{Commandable, Queryable};
use crate::Backoffice;

mod junk_drawer;

fn category(name: &str) -> CategoryForm {
    CategoryForm {
        name: name.to_string(),
        description: None,
        is_active: true,
    }
}

fn item(name: &str, quantity: f64, unit: &str) -> ItemForm {
    ItemForm {
        ingredient_product_id: None,
        ingredient_variant_id: None,
        ingredient_name: name.to_string(),
        quantity,
        unit: unit.to_string(),
        notes: None,
    }
}

fn recipe_workflow_as_transaction_script<M, D>(pool: Pool<M>) -> Result<()>
where
    M: r2d2::ManageConnection<Connection = D>,
    D: Storage + Send + 'static,
{
    let bo = Backoffice::with_pool(pool, &CatalogConfig::default());

    let coffee = bo.categories().execute(CreateCategory(category("Coffee")))?;
    let addons = bo.categories().execute(CreateCategory(category("Add-ons")))?;
    let product = |name: &str, category_id| ProductForm {
        name: name.to_string(),
        description: None,
        category_id,
        sku: None,
        price: Some(4.0),
        stock: None,
        is_active: true,
    };
    let latte = bo.products().execute(CreateProduct {
        product: product("Latte", coffee.id),
        variants: vec![],
    })?;
    let mocha = bo.products().execute(CreateProduct {
        product: product("Mocha", coffee.id),
        variants: vec![
            VariantForm {
                name: "Small".to_string(),
                price: None,
                stock: None,
                sku: None,
                options: vec![],
            },
            VariantForm {
                name: "Large".to_string(),
                price: Some(5.0),
                stock: None,
                sku: None,
                options: vec![],
            },
        ],
    })?;
    bo.products().execute(CreateProduct {
        product: product("Oat milk shot", addons.id),
        variants: vec![],
    })?;

    let labels = |bo: &Backoffice<M>| -> Result<Vec<String>> {
        Ok(bo
            .recipes()
            .query(ListRecipeTargets::default())?
            .into_iter()
            .map(|t| t.label)
            .collect())
    };
    assert_eq!(labels(&bo)?, vec!["Latte", "Mocha - Large", "Mocha - Small"]);

    let latte_recipe = bo.recipes().execute(CreateRecipe(RecipeForm {
        product_id: latte.product.id,
        variant_id: None,
        name: "Latte".to_string(),
        description: None,
        serving_size: Some("12oz".to_string()),
        items: vec![item("Espresso", 2.0, "shot"), item("Milk", 250.0, "ml")],
    }))?;
    let large = &mocha.variants[0].variant;
    assert_eq!(large.name, "Large");
    let mocha_recipe = bo.recipes().execute(CreateRecipe(RecipeForm {
        product_id: mocha.product.id,
        variant_id: Some(large.id),
        name: "Large mocha".to_string(),
        description: None,
        serving_size: None,
        items: vec![item("Chocolate", 30.0, "g")],
    }))?;
    assert_eq!(labels(&bo)?, vec!["Mocha - Small"]);

    let err = bo
        .recipes()
        .execute(CreateRecipe(RecipeForm {
            name: "Another latte".to_string(),
            ..latte_recipe_form(&latte_recipe.recipe.product_id)
        }))
        .expect_err("duplicate");
    assert!(
        matches!(err.downcast_ref::<CmsError>(), Some(CmsError::Conflict(_))),
        "{:?}",
        err
    );

    let updated = bo.recipes().execute(UpdateRecipe {
        id: mocha_recipe.recipe.id,
        form: RecipeForm {
            product_id: mocha.product.id,
            variant_id: Some(large.id),
            name: "Large mocha".to_string(),
            description: None,
            serving_size: None,
            items: vec![item("Chocolate", 40.0, "g"), item("Cream", 20.0, "ml")],
        },
    })?;
    assert_eq!(updated.items.len(), 2);

    let groups = bo.recipes().query(GroupRecipes)?;
    let counts = groups
        .iter()
        .map(|g| {
            (
                g.name.clone(),
                g.recipes.iter().map(|s| s.item_count).collect::<Vec<_>>(),
            )
        })
        .collect::<BTreeMap<_, _>>();
    assert_eq!(counts, btreemap! {"Coffee".to_string() => vec![2, 2]});

    Ok(())
}

fn latte_recipe_form(product_id: &infra::ids::Id<crate::catalog::Product>) -> RecipeForm {
    RecipeForm {
        product_id: *product_id,
        variant_id: None,
        name: "Latte".to_string(),
        description: None,
        serving_size: None,
        items: vec![item("Espresso", 2.0, "shot")],
    }
}

#[test]
fn recipe_workflow_in_memory() -> Result<()> {
    env_logger::try_init().unwrap_or_default();
    recipe_workflow_as_transaction_script(junk_drawer::memory_pool()?)
}

#[test]
#[ignore]
fn recipe_workflow_in_postgres() -> Result<()> {
    env_logger::try_init().unwrap_or_default();
    let pool = junk_drawer::postgres_pool("recipe_workflow_in_postgres")?;
    recipe_workflow_as_transaction_script(pool)
}
