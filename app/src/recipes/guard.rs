//! At most one recipe may exist per product, or per product variant.
//!
//! The existence check here runs before every write that sets a recipe's
//! target. The storage unique key on `(product_id, variant_id)` remains the
//! authority: two writers can both pass the check, and the loser's unique
//! violation is reported with the same message as a failed check.

use anyhow::Result;
use log::*;

use infra::persistence::{Storage, StorageError};
use infra::records::Filter;

use super::models::{PortionControl, RecipeKey};
use crate::errors::{translate, CmsError, StorageResultExt};

pub const PRODUCT_CONFLICT: &str = "A recipe already exists for this product";
pub const VARIANT_CONFLICT: &str = "A recipe already exists for this product variant";

impl RecipeKey {
    pub fn filter(&self) -> Filter {
        Filter::all()
            .eq("product_id", self.product_id)
            .maybe("variant_id", self.variant_id)
    }

    pub fn conflict(&self) -> CmsError {
        match self.variant_id {
            None => CmsError::Conflict(PRODUCT_CONFLICT.to_string()),
            Some(_) => CmsError::Conflict(VARIANT_CONFLICT.to_string()),
        }
    }
}

pub(crate) fn ensure_available<D: Storage>(docs: &D, key: &RecipeKey) -> Result<()> {
    let existing = docs.select::<PortionControl>(&key.filter()).translated()?;
    if let Some(recipe) = existing.first() {
        debug!("Target {:?} already has recipe {}", key, recipe.id);
        return Err(key.conflict().into());
    }
    Ok(())
}

/// Moving a recipe to a new target needs the check; editing it in place
/// does not.
pub(crate) fn needs_check(existing: &PortionControl, key: &RecipeKey) -> bool {
    existing.key() != *key
}

pub(crate) fn translate_conflict(key: &RecipeKey, err: StorageError) -> anyhow::Error {
    if err.is_unique_violation() {
        warn!("Unique key rejected recipe for {:?}: {}", key, err);
        key.conflict().into()
    } else {
        translate(err)
    }
}
