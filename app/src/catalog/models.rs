use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use infra::ids::{Entity, Id};
use infra::records::Record;

use crate::errors::CmsError;
use crate::services::{
    optional_text, require_non_negative, require_price, require_text, Validate,
};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Category {
    pub id: Id<Category>,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Product {
    pub id: Id<Product>,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Id<Category>,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Variant {
    pub id: Id<Variant>,
    pub product_id: Id<Product>,
    pub name: String,
    pub price: Option<f64>,
    pub stock: Option<i32>,
    pub sku: Option<String>,
}

/// A `name = value` attribute of a variant, such as `Size = Large`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct VariantOption {
    pub id: Id<VariantOption>,
    pub variant_id: Id<Variant>,
    pub name: String,
    pub value: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VariantDetail {
    pub variant: Variant,
    pub options: Vec<VariantOption>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProductDetail {
    pub product: Product,
    pub variants: Vec<VariantDetail>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CategoryForm {
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ProductForm {
    pub name: String,
    pub description: Option<String>,
    pub category_id: Id<Category>,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i32>,
    pub is_active: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct OptionForm {
    pub name: String,
    pub value: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct VariantForm {
    pub name: String,
    pub price: Option<f64>,
    pub stock: Option<i32>,
    pub sku: Option<String>,
    #[serde(default)]
    pub options: Vec<OptionForm>,
}

impl Entity for Category {
    const PREFIX: &'static str = "category";
}

impl Record for Category {
    const TABLE: &'static str = "categories";
    fn id(&self) -> Id<Self> {
        self.id
    }
}

impl Entity for Product {
    const PREFIX: &'static str = "product";
}

impl Record for Product {
    const TABLE: &'static str = "products";
    fn id(&self) -> Id<Self> {
        self.id
    }
}

impl Entity for Variant {
    const PREFIX: &'static str = "variant";
}

impl Record for Variant {
    const TABLE: &'static str = "product_variants";
    fn id(&self) -> Id<Self> {
        self.id
    }
}

impl Entity for VariantOption {
    const PREFIX: &'static str = "option";
}

impl Record for VariantOption {
    const TABLE: &'static str = "product_variant_options";
    fn id(&self) -> Id<Self> {
        self.id
    }
}

impl Category {
    pub(crate) fn new(id: Id<Category>, form: &CategoryForm, now: DateTime<Utc>) -> Self {
        Category {
            id,
            name: form.name.trim().to_string(),
            description: optional_text(&form.description),
            is_active: form.is_active,
            created_at: now,
            updated_at: None,
        }
    }

    pub(crate) fn apply(&mut self, form: &CategoryForm, now: DateTime<Utc>) {
        self.name = form.name.trim().to_string();
        self.description = optional_text(&form.description);
        self.is_active = form.is_active;
        self.updated_at = Some(now);
    }
}

impl Product {
    pub(crate) fn new(id: Id<Product>, form: &ProductForm, now: DateTime<Utc>) -> Self {
        Product {
            id,
            name: form.name.trim().to_string(),
            description: optional_text(&form.description),
            category_id: form.category_id,
            sku: optional_text(&form.sku),
            price: form.price,
            stock: form.stock,
            is_active: form.is_active,
            created_at: now,
            updated_at: None,
        }
    }

    pub(crate) fn apply(&mut self, form: &ProductForm, now: DateTime<Utc>) {
        self.name = form.name.trim().to_string();
        self.description = optional_text(&form.description);
        self.category_id = form.category_id;
        self.sku = optional_text(&form.sku);
        self.price = form.price;
        self.stock = form.stock;
        self.is_active = form.is_active;
        self.updated_at = Some(now);
    }
}

impl Variant {
    pub(crate) fn new(id: Id<Variant>, product_id: Id<Product>, form: &VariantForm) -> Self {
        Variant {
            id,
            product_id,
            name: form.name.trim().to_string(),
            price: form.price,
            stock: form.stock,
            sku: optional_text(&form.sku),
        }
    }
}

impl VariantOption {
    pub(crate) fn new(id: Id<VariantOption>, variant_id: Id<Variant>, form: &OptionForm) -> Self {
        VariantOption {
            id,
            variant_id,
            name: form.name.trim().to_string(),
            value: form.value.trim().to_string(),
        }
    }
}

impl Validate for CategoryForm {
    fn validate(&self) -> Result<(), CmsError> {
        require_text("Category name", &self.name)
    }
}

impl Validate for ProductForm {
    fn validate(&self) -> Result<(), CmsError> {
        require_text("Product name", &self.name)?;
        require_price("Price", self.price)?;
        require_non_negative("Stock", self.stock)?;
        Ok(())
    }
}

impl Validate for VariantForm {
    fn validate(&self) -> Result<(), CmsError> {
        require_text("Variant name", &self.name)?;
        require_price("Variant price", self.price)?;
        require_non_negative("Variant stock", self.stock)?;
        for option in self.options.iter() {
            require_text("Option name", &option.name)?;
            require_text("Option value", &option.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use infra::ids::IdGen;

    fn latte_form(category_id: Id<Category>) -> ProductForm {
        ProductForm {
            name: "  Latte ".to_string(),
            description: Some("".to_string()),
            category_id,
            sku: Some(" LAT-01 ".to_string()),
            price: Some(4.5),
            stock: None,
            is_active: true,
        }
    }

    #[test]
    fn product_fields_are_trimmed_on_creation() {
        let idgen = IdGen::new();
        let product = Product::new(idgen.generate(), &latte_form(idgen.generate()), Utc::now());

        assert_eq!(product.name, "Latte");
        assert_eq!(product.description, None);
        assert_eq!(product.sku, Some("LAT-01".to_string()));
        assert_eq!(product.updated_at, None);
    }

    #[test]
    fn negative_price_fails_validation() {
        let idgen = IdGen::new();
        let form = ProductForm {
            price: Some(-1.0),
            ..latte_form(idgen.generate())
        };

        assert_eq!(
            form.validate(),
            Err(CmsError::Validation("Price must not be negative".to_string()))
        );
    }

    #[test]
    fn non_finite_prices_fail_validation() {
        let idgen = IdGen::new();
        for price in &[f64::NAN, f64::INFINITY] {
            let product = ProductForm {
                price: Some(*price),
                ..latte_form(idgen.generate())
            };
            assert_eq!(
                product.validate(),
                Err(CmsError::Validation("Price must be a finite number".to_string()))
            );

            let variant = VariantForm {
                name: "Large".to_string(),
                price: Some(*price),
                stock: None,
                sku: None,
                options: vec![],
            };
            assert!(variant.validate().is_err());
        }
    }

    #[test]
    fn variant_options_need_a_name_and_value() {
        let form = VariantForm {
            name: "Large".to_string(),
            price: None,
            stock: None,
            sku: None,
            options: vec![OptionForm {
                name: "Size".to_string(),
                value: " ".to_string(),
            }],
        };

        assert!(form.validate().is_err());
    }

    #[test]
    fn rows_round_trip_through_json() {
        let idgen = IdGen::new();
        let product = Product::new(idgen.generate(), &latte_form(idgen.generate()), Utc::now());

        let row = serde_json::to_value(&product).expect("to_value");
        assert_eq!(row["category_id"], serde_json::Value::from(product.category_id));
        let back: Product = serde_json::from_value(row).expect("from_value");
        assert_eq!(back, product);
    }
}
