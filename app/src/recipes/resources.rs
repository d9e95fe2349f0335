use anyhow::Result;
use chrono::Utc;
use log::*;
use r2d2::Pool;

use infra::ids::{Id, IdGen};
use infra::persistence::Storage;
use infra::records::Filter;

use super::grouping::group_by_category;
use super::guard::{ensure_available, needs_check, translate_conflict};
use super::models::*;
use super::targets::recipe_targets;
use crate::catalog::{CatalogSnapshot, Product, Variant};
use crate::errors::{CmsError, StorageResultExt};
use crate::services::{Commandable, Queryable, Request, Validate};

#[derive(Debug)]
pub struct PortionControls<M: r2d2::ManageConnection> {
    db: Pool<M>,
    idgen: IdGen,
    addons_category: String,
}

/// Products and variants still without a recipe. `editing` names a recipe
/// whose own target stays eligible.
#[derive(Debug, Clone, Default)]
pub struct ListRecipeTargets {
    pub editing: Option<Id<PortionControl>>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupRecipes;

#[derive(Debug, Clone)]
pub struct GetRecipe(pub Id<PortionControl>);

#[derive(Debug, Clone)]
pub struct CreateRecipe(pub RecipeForm);

/// Rewrites the recipe and replaces its ingredient list wholesale.
#[derive(Debug, Clone)]
pub struct UpdateRecipe {
    pub id: Id<PortionControl>,
    pub form: RecipeForm,
}

#[derive(Debug, Clone)]
pub struct DeleteRecipe(pub Id<PortionControl>);

impl Request for ListRecipeTargets {
    type Resp = Vec<RecipeTarget>;
}
impl Request for GroupRecipes {
    type Resp = Vec<RecipeGroup>;
}
impl Request for GetRecipe {
    type Resp = Option<RecipeDetail>;
}
impl Request for CreateRecipe {
    type Resp = RecipeDetail;
}
impl Request for UpdateRecipe {
    type Resp = RecipeDetail;
}
impl Request for DeleteRecipe {
    type Resp = ();
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> PortionControls<M> {
    pub fn new<S: Into<String>>(db: Pool<M>, idgen: IdGen, addons_category: S) -> Self {
        let addons_category = addons_category.into();
        PortionControls {
            db,
            idgen,
            addons_category,
        }
    }

    /// The product must exist, and a variant must belong to it.
    fn ensure_target(&self, docs: &D, key: &RecipeKey) -> Result<()> {
        docs.load::<Product>(&key.product_id)
            .translated()?
            .ok_or_else(|| CmsError::not_found(&key.product_id))?;
        if let Some(variant_id) = key.variant_id {
            let variant = docs
                .load::<Variant>(&variant_id)
                .translated()?
                .ok_or_else(|| CmsError::not_found(&variant_id))?;
            if variant.product_id != key.product_id {
                let message = "The variant does not belong to this product";
                return Err(CmsError::validation(message).into());
            }
        }
        Ok(())
    }

    fn new_items(
        &self,
        recipe_id: Id<PortionControl>,
        forms: &[ItemForm],
    ) -> Vec<PortionControlItem> {
        forms
            .iter()
            .map(|form| PortionControlItem::new(self.idgen.generate(), recipe_id, form))
            .collect()
    }

    fn items_of(&self, docs: &D, recipe_id: Id<PortionControl>) -> Result<Vec<PortionControlItem>> {
        docs.select(&Filter::all().eq("portion_control_id", recipe_id))
            .translated()
    }
}

impl<M: r2d2::ManageConnection> Clone for PortionControls<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        let idgen = self.idgen.clone();
        let addons_category = self.addons_category.clone();
        PortionControls {
            db,
            idgen,
            addons_category,
        }
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ListRecipeTargets> for PortionControls<M>
{
    fn query(&self, req: ListRecipeTargets) -> Result<Vec<RecipeTarget>> {
        let docs = self.db.get()?;
        let catalog = CatalogSnapshot::load(&*docs)?;
        let recipes = docs.select::<PortionControl>(&Filter::all()).translated()?;
        let targets = recipe_targets(
            &catalog,
            &recipes,
            &self.addons_category,
            req.editing.as_ref(),
        );
        debug!("{} recipe targets available", targets.len());
        Ok(targets)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<GroupRecipes> for PortionControls<M>
{
    fn query(&self, _: GroupRecipes) -> Result<Vec<RecipeGroup>> {
        let docs = self.db.get()?;
        let catalog = CatalogSnapshot::load(&*docs)?;
        let recipes = docs.select::<PortionControl>(&Filter::all()).translated()?;
        let items = docs
            .select::<PortionControlItem>(&Filter::all())
            .translated()?;
        Ok(group_by_category(&catalog, recipes, &items))
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<GetRecipe> for PortionControls<M>
{
    fn query(&self, GetRecipe(id): GetRecipe) -> Result<Option<RecipeDetail>> {
        let docs = self.db.get()?;
        match docs.load(&id).translated()? {
            Some(recipe) => {
                let items = self.items_of(&docs, id)?;
                Ok(Some(RecipeDetail { recipe, items }))
            }
            None => {
                debug!("No recipe {}", id);
                Ok(None)
            }
        }
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<CreateRecipe> for PortionControls<M>
{
    fn execute(&self, CreateRecipe(form): CreateRecipe) -> Result<RecipeDetail> {
        form.validate()?;
        let key = form.key();
        let docs = self.db.get()?;
        self.ensure_target(&docs, &key)?;
        ensure_available(&*docs, &key)?;

        let recipe = PortionControl::new(self.idgen.generate(), &form, Utc::now());
        let recipe = docs
            .insert(&recipe)
            .map_err(|e| translate_conflict(&key, e))?;

        let items = self.new_items(recipe.id, &form.items);
        match docs.insert_many(&items).translated() {
            Ok(items) => {
                info!("Created recipe {} for {:?}", recipe.id, key);
                Ok(RecipeDetail { recipe, items })
            }
            Err(e) => {
                warn!("Ingredients for {} rejected, removing recipe: {}", recipe.id, e);
                if let Err(cleanup) = docs.delete(&recipe.id) {
                    warn!("Could not remove recipe {}: {}", recipe.id, cleanup);
                }
                Err(e)
            }
        }
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<UpdateRecipe> for PortionControls<M>
{
    fn execute(&self, req: UpdateRecipe) -> Result<RecipeDetail> {
        req.form.validate()?;
        let key = req.form.key();
        let docs = self.db.get()?;
        let mut recipe = docs
            .load::<PortionControl>(&req.id)
            .translated()?
            .ok_or_else(|| CmsError::not_found(&req.id))?;
        if needs_check(&recipe, &key) {
            self.ensure_target(&docs, &key)?;
            ensure_available(&*docs, &key)?;
        }

        recipe.apply(&req.form, Utc::now());
        let recipe = docs
            .update(&recipe)
            .map_err(|e| translate_conflict(&key, e))?;

        // Not atomic: a failure here leaves the recipe with no ingredients.
        let removed = docs
            .delete_where::<PortionControlItem>(&Filter::all().eq("portion_control_id", recipe.id))
            .translated()?;
        let items = self.new_items(recipe.id, &req.form.items);
        let items = docs.insert_many(&items).translated()?;
        debug!(
            "Replaced {} ingredients of {} with {}",
            removed,
            recipe.id,
            items.len()
        );
        Ok(RecipeDetail { recipe, items })
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<DeleteRecipe> for PortionControls<M>
{
    fn execute(&self, DeleteRecipe(id): DeleteRecipe) -> Result<()> {
        self.db.get()?.delete(&id).translated()?;
        info!("Deleted recipe {}", id);
        Ok(())
    }
}
