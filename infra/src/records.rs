//! Typed rows. Every table is described by a [`Record`], and rows cross the
//! storage boundary as JSON objects that are decoded exactly once.

use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::ids::{Entity, Id};
use crate::persistence::StorageError;

pub trait Record: Entity + Serialize + DeserializeOwned + Clone + fmt::Debug + Send + 'static {
    const TABLE: &'static str;

    fn id(&self) -> Id<Self>;
}

/// A conjunction of column equality tests. A `null` value matches SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    columns: Map<String, Value>,
}

impl Filter {
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn eq<V: Into<Value>>(mut self, column: &str, value: V) -> Self {
        self.columns.insert(column.to_string(), value.into());
        self
    }

    pub fn maybe<V: Into<Value>>(self, column: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self.eq(column, Value::Null),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.columns
            .iter()
            .all(|(column, expected)| row.get(column).unwrap_or(&Value::Null) == expected)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.columns.clone())
    }
}

pub fn to_row<R: Record>(record: &R) -> Result<Value, StorageError> {
    let row = serde_json::to_value(record).map_err(|e| StorageError::Encode {
        table: R::TABLE,
        message: e.to_string(),
    })?;
    if !row.is_object() {
        return Err(StorageError::Encode {
            table: R::TABLE,
            message: format!("expected an object, got {}", row),
        });
    }
    Ok(row)
}

pub fn from_row<R: Record>(row: Value) -> Result<R, StorageError> {
    serde_json::from_value(row).map_err(|e| StorageError::Decode {
        table: R::TABLE,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::all().matches(&json!({"id": "x", "name": "Latte"})));
    }

    #[test]
    fn null_filter_matches_null_and_missing_columns() {
        let filter = Filter::all().eq("variant_id", Value::Null);

        assert!(filter.matches(&json!({"variant_id": null})));
        assert!(filter.matches(&json!({})));
        assert!(!filter.matches(&json!({"variant_id": "variant-01"})));
    }

    #[test]
    fn maybe_without_value_filters_for_null() {
        let filter = Filter::all()
            .eq("product_id", "product-01")
            .maybe::<String>("variant_id", None);

        assert_eq!(filter.to_json(), json!({"product_id": "product-01", "variant_id": null}));
        assert!(filter.matches(&json!({"product_id": "product-01", "variant_id": null})));
        assert!(!filter.matches(&json!({"product_id": "product-02", "variant_id": null})));
    }
}
