use anyhow::Result;
use chrono::Utc;
use log::*;
use r2d2::Pool;

use infra::ids::{Id, IdGen};
use infra::persistence::Storage;
use infra::records::Filter;

use super::filter::by_name;
use super::models::{Category, CategoryForm};
use crate::errors::{CmsError, StorageResultExt};
use crate::services::{Commandable, Queryable, Request, Validate};

#[derive(Debug)]
pub struct Categories<M: r2d2::ManageConnection> {
    db: Pool<M>,
    idgen: IdGen,
}

#[derive(Debug, Clone, Default)]
pub struct ListCategories {
    pub active_only: bool,
}

#[derive(Debug, Clone)]
pub struct GetCategory(pub Id<Category>);

#[derive(Debug, Clone)]
pub struct CreateCategory(pub CategoryForm);

#[derive(Debug, Clone)]
pub struct UpdateCategory {
    pub id: Id<Category>,
    pub form: CategoryForm,
}

/// Flips `is_active` and returns the stored result.
#[derive(Debug, Clone)]
pub struct ToggleCategory(pub Id<Category>);

#[derive(Debug, Clone)]
pub struct DeleteCategory(pub Id<Category>);

impl Request for ListCategories {
    type Resp = Vec<Category>;
}
impl Request for GetCategory {
    type Resp = Option<Category>;
}
impl Request for CreateCategory {
    type Resp = Category;
}
impl Request for UpdateCategory {
    type Resp = Category;
}
impl Request for ToggleCategory {
    type Resp = Category;
}
impl Request for DeleteCategory {
    type Resp = ();
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Categories<M> {
    pub fn new(db: Pool<M>, idgen: IdGen) -> Self {
        Categories { db, idgen }
    }

    fn load_existing(&self, docs: &D, id: &Id<Category>) -> Result<Category> {
        let category = docs
            .load(id)
            .translated()?
            .ok_or_else(|| CmsError::not_found(id))?;
        Ok(category)
    }
}

impl<M: r2d2::ManageConnection> Clone for Categories<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        let idgen = self.idgen.clone();
        Categories { db, idgen }
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ListCategories> for Categories<M>
{
    fn query(&self, req: ListCategories) -> Result<Vec<Category>> {
        let filter = if req.active_only {
            Filter::all().eq("is_active", true)
        } else {
            Filter::all()
        };
        let mut categories = self.db.get()?.select::<Category>(&filter).translated()?;
        categories.sort_by(|a, b| by_name(&a.name, &b.name));
        Ok(categories)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<GetCategory> for Categories<M>
{
    fn query(&self, GetCategory(id): GetCategory) -> Result<Option<Category>> {
        let category = self.db.get()?.load(&id).translated()?;
        debug!("Load {} -> {:?}", id, category);
        Ok(category)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<CreateCategory> for Categories<M>
{
    fn execute(&self, CreateCategory(form): CreateCategory) -> Result<Category> {
        form.validate()?;
        let category = Category::new(self.idgen.generate(), &form, Utc::now());
        let category = self.db.get()?.insert(&category).translated()?;
        info!("Created category {}: {}", category.id, category.name);
        Ok(category)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<UpdateCategory> for Categories<M>
{
    fn execute(&self, req: UpdateCategory) -> Result<Category> {
        req.form.validate()?;
        let docs = self.db.get()?;
        let mut category = self.load_existing(&docs, &req.id)?;
        category.apply(&req.form, Utc::now());
        let category = docs.update(&category).translated()?;
        debug!("Updated category {:?}", category);
        Ok(category)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<ToggleCategory> for Categories<M>
{
    fn execute(&self, ToggleCategory(id): ToggleCategory) -> Result<Category> {
        let docs = self.db.get()?;
        let mut category = self.load_existing(&docs, &id)?;
        category.is_active = !category.is_active;
        category.updated_at = Some(Utc::now());
        let category = docs.update(&category).translated()?;
        info!("Category {} active: {}", category.id, category.is_active);
        Ok(category)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<DeleteCategory> for Categories<M>
{
    fn execute(&self, DeleteCategory(id): DeleteCategory) -> Result<()> {
        self.db.get()?.delete(&id).translated()?;
        info!("Deleted category {}", id);
        Ok(())
    }
}
