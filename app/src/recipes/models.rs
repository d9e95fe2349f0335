use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use infra::ids::{Entity, Id};
use infra::records::Record;

use crate::catalog::{Category, Product, Variant};
use crate::errors::CmsError;
use crate::services::{optional_text, require_text, Validate};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PortionControl {
    pub id: Id<PortionControl>,
    pub product_id: Id<Product>,
    pub variant_id: Option<Id<Variant>>,
    pub name: String,
    pub description: Option<String>,
    pub serving_size: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One ingredient line of a recipe.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PortionControlItem {
    pub id: Id<PortionControlItem>,
    pub portion_control_id: Id<PortionControl>,
    pub ingredient_product_id: Option<Id<Product>>,
    pub ingredient_variant_id: Option<Id<Variant>>,
    pub ingredient_name: String,
    pub quantity: f64,
    pub unit: String,
    pub notes: Option<String>,
}

/// What a recipe is attached to. A missing variant means the base product.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecipeKey {
    pub product_id: Id<Product>,
    pub variant_id: Option<Id<Variant>>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeDetail {
    pub recipe: PortionControl,
    pub items: Vec<PortionControlItem>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ItemForm {
    pub ingredient_product_id: Option<Id<Product>>,
    pub ingredient_variant_id: Option<Id<Variant>>,
    pub ingredient_name: String,
    pub quantity: f64,
    pub unit: String,
    pub notes: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RecipeForm {
    pub product_id: Id<Product>,
    pub variant_id: Option<Id<Variant>>,
    pub name: String,
    pub description: Option<String>,
    pub serving_size: Option<String>,
    pub items: Vec<ItemForm>,
}

/// A product or variant that may be given a recipe.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeTarget {
    pub key: RecipeKey,
    pub label: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeSummary {
    pub recipe: PortionControl,
    pub product_name: Option<String>,
    pub variant_name: Option<String>,
    pub category_id: Option<Id<Category>>,
    pub category_name: Option<String>,
    pub item_count: usize,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Category(Id<Category>),
    Uncategorized,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeGroup {
    pub key: GroupKey,
    pub name: String,
    pub recipes: Vec<RecipeSummary>,
}

impl Entity for PortionControl {
    const PREFIX: &'static str = "portion";
}

impl Record for PortionControl {
    const TABLE: &'static str = "portion_controls";
    fn id(&self) -> Id<Self> {
        self.id
    }
}

impl Entity for PortionControlItem {
    const PREFIX: &'static str = "ingredient";
}

impl Record for PortionControlItem {
    const TABLE: &'static str = "portion_control_items";
    fn id(&self) -> Id<Self> {
        self.id
    }
}

impl PortionControl {
    pub fn key(&self) -> RecipeKey {
        RecipeKey {
            product_id: self.product_id,
            variant_id: self.variant_id,
        }
    }

    pub(crate) fn new(id: Id<PortionControl>, form: &RecipeForm, now: DateTime<Utc>) -> Self {
        PortionControl {
            id,
            product_id: form.product_id,
            variant_id: form.variant_id,
            name: form.name.trim().to_string(),
            description: optional_text(&form.description),
            serving_size: optional_text(&form.serving_size),
            created_at: now,
            updated_at: None,
        }
    }

    pub(crate) fn apply(&mut self, form: &RecipeForm, now: DateTime<Utc>) {
        self.product_id = form.product_id;
        self.variant_id = form.variant_id;
        self.name = form.name.trim().to_string();
        self.description = optional_text(&form.description);
        self.serving_size = optional_text(&form.serving_size);
        self.updated_at = Some(now);
    }
}

impl PortionControlItem {
    pub(crate) fn new(
        id: Id<PortionControlItem>,
        portion_control_id: Id<PortionControl>,
        form: &ItemForm,
    ) -> Self {
        PortionControlItem {
            id,
            portion_control_id,
            ingredient_product_id: form.ingredient_product_id,
            ingredient_variant_id: form.ingredient_variant_id,
            ingredient_name: form.ingredient_name.trim().to_string(),
            quantity: form.quantity,
            unit: form.unit.trim().to_string(),
            notes: optional_text(&form.notes),
        }
    }
}

impl RecipeForm {
    pub fn key(&self) -> RecipeKey {
        RecipeKey {
            product_id: self.product_id,
            variant_id: self.variant_id,
        }
    }
}

impl Validate for ItemForm {
    fn validate(&self) -> Result<(), CmsError> {
        require_text("Ingredient name", &self.ingredient_name)?;
        require_text("Unit", &self.unit)?;
        if !(self.quantity > 0.0) || !self.quantity.is_finite() {
            return Err(CmsError::validation(format!(
                "Quantity of {} must be greater than zero",
                self.ingredient_name.trim()
            )));
        }
        Ok(())
    }
}

impl Validate for RecipeForm {
    fn validate(&self) -> Result<(), CmsError> {
        require_text("Recipe name", &self.name)?;
        if self.items.is_empty() {
            return Err(CmsError::validation("A recipe needs at least one ingredient"));
        }
        for item in self.items.iter() {
            item.validate()?;
        }
        Ok(())
    }
}
