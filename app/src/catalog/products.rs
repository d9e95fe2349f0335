use anyhow::Result;
use chrono::Utc;
use log::*;
use r2d2::Pool;

use infra::ids::{Id, IdGen};
use infra::persistence::Storage;
use infra::records::Filter;

use super::filter::{by_name, filter_products, ProductFilter};
use super::models::*;
use crate::errors::{CmsError, StorageResultExt};
use crate::services::{Commandable, Queryable, Request, Validate};

const COPY_SUFFIX: &str = " (Copy)";

#[derive(Debug)]
pub struct Products<M: r2d2::ManageConnection> {
    db: Pool<M>,
    idgen: IdGen,
}

#[derive(Debug, Clone, Default)]
pub struct ListProducts(pub ProductFilter);

#[derive(Debug, Clone)]
pub struct GetProduct(pub Id<Product>);

#[derive(Debug, Clone)]
pub struct CreateProduct {
    pub product: ProductForm,
    pub variants: Vec<VariantForm>,
}

#[derive(Debug, Clone)]
pub struct UpdateProduct {
    pub id: Id<Product>,
    pub form: ProductForm,
}

#[derive(Debug, Clone)]
pub struct DeleteProduct(pub Id<Product>);

/// Copies a product with its variants and options. SKUs are cleared and the
/// name gets a `(Copy)` suffix; recipes stay with the original.
#[derive(Debug, Clone)]
pub struct CloneProduct(pub Id<Product>);

#[derive(Debug, Clone)]
pub struct AddVariant {
    pub product_id: Id<Product>,
    pub form: VariantForm,
}

/// Replaces the variant's fields, and its options wholesale.
#[derive(Debug, Clone)]
pub struct UpdateVariant {
    pub id: Id<Variant>,
    pub form: VariantForm,
}

#[derive(Debug, Clone)]
pub struct DeleteVariant(pub Id<Variant>);

impl Request for ListProducts {
    type Resp = Vec<Product>;
}
impl Request for GetProduct {
    type Resp = Option<ProductDetail>;
}
impl Request for CreateProduct {
    type Resp = ProductDetail;
}
impl Request for UpdateProduct {
    type Resp = Product;
}
impl Request for DeleteProduct {
    type Resp = ();
}
impl Request for CloneProduct {
    type Resp = ProductDetail;
}
impl Request for AddVariant {
    type Resp = VariantDetail;
}
impl Request for UpdateVariant {
    type Resp = VariantDetail;
}
impl Request for DeleteVariant {
    type Resp = ();
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Products<M> {
    pub fn new(db: Pool<M>, idgen: IdGen) -> Self {
        Products { db, idgen }
    }

    fn ensure_category(&self, docs: &D, id: &Id<Category>) -> Result<()> {
        docs.load(id)
            .translated()?
            .ok_or_else(|| CmsError::not_found(id))?;
        Ok(())
    }

    fn load_detail(&self, docs: &D, product: Product) -> Result<ProductDetail> {
        let mut variants = docs
            .select::<Variant>(&Filter::all().eq("product_id", product.id))
            .translated()?;
        variants.sort_by(|a, b| by_name(&a.name, &b.name));
        let variants = variants
            .into_iter()
            .map(|variant| self.variant_detail(docs, variant))
            .collect::<Result<Vec<_>>>()?;
        Ok(ProductDetail { product, variants })
    }

    fn variant_detail(&self, docs: &D, variant: Variant) -> Result<VariantDetail> {
        let options = docs
            .select::<VariantOption>(&Filter::all().eq("variant_id", variant.id))
            .translated()?;
        Ok(VariantDetail { variant, options })
    }

    fn insert_variant(
        &self,
        docs: &D,
        variant: &Variant,
        options: &[VariantOption],
    ) -> Result<VariantDetail> {
        let variant = docs.insert(variant).translated()?;
        let options = docs.insert_many(options).translated()?;
        Ok(VariantDetail { variant, options })
    }

    fn new_options(&self, variant_id: Id<Variant>, forms: &[OptionForm]) -> Vec<VariantOption> {
        forms
            .iter()
            .map(|o| VariantOption::new(self.idgen.generate(), variant_id, o))
            .collect()
    }

    /// Inserts the variants one by one. On failure the product is deleted,
    /// which cascades to whatever variants made it in. Not atomic.
    fn insert_variants_or_remove(
        &self,
        docs: &D,
        product: Product,
        variants: Vec<(Variant, Vec<VariantOption>)>,
    ) -> Result<ProductDetail> {
        let mut inserted = Vec::with_capacity(variants.len());
        for (variant, options) in variants.iter() {
            match self.insert_variant(docs, variant, options) {
                Ok(detail) => inserted.push(detail),
                Err(e) => {
                    warn!("Variant insert for {} failed, removing product: {}", product.id, e);
                    if let Err(cleanup) = docs.delete(&product.id) {
                        warn!("Could not remove product {}: {}", product.id, cleanup);
                    }
                    return Err(e);
                }
            }
        }
        inserted.sort_by(|a, b| by_name(&a.variant.name, &b.variant.name));
        Ok(ProductDetail {
            product,
            variants: inserted,
        })
    }
}

impl<M: r2d2::ManageConnection> Clone for Products<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        let idgen = self.idgen.clone();
        Products { db, idgen }
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ListProducts> for Products<M>
{
    fn query(&self, ListProducts(filter): ListProducts) -> Result<Vec<Product>> {
        let mut query = Filter::all();
        if let Some(category_id) = filter.category_id {
            query = query.eq("category_id", category_id);
        }
        let products = self.db.get()?.select::<Product>(&query).translated()?;
        Ok(filter_products(products, &filter))
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<GetProduct> for Products<M>
{
    fn query(&self, GetProduct(id): GetProduct) -> Result<Option<ProductDetail>> {
        let docs = self.db.get()?;
        match docs.load(&id).translated()? {
            Some(product) => Ok(Some(self.load_detail(&docs, product)?)),
            None => {
                debug!("No product {}", id);
                Ok(None)
            }
        }
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<CreateProduct> for Products<M>
{
    fn execute(&self, req: CreateProduct) -> Result<ProductDetail> {
        req.product.validate()?;
        for variant in req.variants.iter() {
            variant.validate()?;
        }
        let docs = self.db.get()?;
        self.ensure_category(&docs, &req.product.category_id)?;

        let product = Product::new(self.idgen.generate(), &req.product, Utc::now());
        let product = docs.insert(&product).translated()?;
        info!("Created product {}: {}", product.id, product.name);

        let variants = req
            .variants
            .iter()
            .map(|form| {
                let variant = Variant::new(self.idgen.generate(), product.id, form);
                let options = self.new_options(variant.id, &form.options);
                (variant, options)
            })
            .collect::<Vec<_>>();
        self.insert_variants_or_remove(&docs, product, variants)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<UpdateProduct> for Products<M>
{
    fn execute(&self, req: UpdateProduct) -> Result<Product> {
        req.form.validate()?;
        let docs = self.db.get()?;
        let mut product = docs
            .load(&req.id)
            .translated()?
            .ok_or_else(|| CmsError::not_found(&req.id))?;
        if product.category_id != req.form.category_id {
            self.ensure_category(&docs, &req.form.category_id)?;
        }
        product.apply(&req.form, Utc::now());
        let product = docs.update(&product).translated()?;
        debug!("Updated product {:?}", product);
        Ok(product)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<DeleteProduct> for Products<M>
{
    fn execute(&self, DeleteProduct(id): DeleteProduct) -> Result<()> {
        self.db.get()?.delete(&id).translated()?;
        info!("Deleted product {}", id);
        Ok(())
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<CloneProduct> for Products<M>
{
    fn execute(&self, CloneProduct(id): CloneProduct) -> Result<ProductDetail> {
        let docs = self.db.get()?;
        let original = docs
            .load(&id)
            .translated()?
            .ok_or_else(|| CmsError::not_found(&id))?;
        let original = self.load_detail(&docs, original)?;

        let product = Product {
            id: self.idgen.generate(),
            name: format!("{}{}", original.product.name, COPY_SUFFIX),
            sku: None,
            created_at: Utc::now(),
            updated_at: None,
            ..original.product.clone()
        };
        let product = docs.insert(&product).translated()?;

        let variants = original
            .variants
            .iter()
            .map(|detail| {
                let variant = Variant {
                    id: self.idgen.generate(),
                    product_id: product.id,
                    sku: None,
                    ..detail.variant.clone()
                };
                let options = detail
                    .options
                    .iter()
                    .map(|o| VariantOption {
                        id: self.idgen.generate(),
                        variant_id: variant.id,
                        ..o.clone()
                    })
                    .collect::<Vec<_>>();
                (variant, options)
            })
            .collect::<Vec<_>>();
        let cloned = self.insert_variants_or_remove(&docs, product, variants)?;
        info!("Cloned product {} as {}", id, cloned.product.id);
        Ok(cloned)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<AddVariant> for Products<M>
{
    fn execute(&self, req: AddVariant) -> Result<VariantDetail> {
        req.form.validate()?;
        let docs = self.db.get()?;
        docs.load(&req.product_id)
            .translated()?
            .ok_or_else(|| CmsError::not_found(&req.product_id))?;
        let variant = Variant::new(self.idgen.generate(), req.product_id, &req.form);
        let options = self.new_options(variant.id, &req.form.options);
        let detail = self.insert_variant(&docs, &variant, &options)?;
        info!("Added variant {} to {}", detail.variant.id, req.product_id);
        Ok(detail)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<UpdateVariant> for Products<M>
{
    fn execute(&self, req: UpdateVariant) -> Result<VariantDetail> {
        req.form.validate()?;
        let docs = self.db.get()?;
        let existing = docs
            .load(&req.id)
            .translated()?
            .ok_or_else(|| CmsError::not_found(&req.id))?;
        let variant = Variant::new(existing.id, existing.product_id, &req.form);
        let variant = docs.update(&variant).translated()?;

        docs.delete_where::<VariantOption>(&Filter::all().eq("variant_id", variant.id))
            .translated()?;
        let options = self.new_options(variant.id, &req.form.options);
        let options = docs.insert_many(&options).translated()?;
        debug!("Replaced options of {}: {:?}", variant.id, options);
        Ok(VariantDetail { variant, options })
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<DeleteVariant> for Products<M>
{
    fn execute(&self, DeleteVariant(id): DeleteVariant) -> Result<()> {
        self.db.get()?.delete(&id).translated()?;
        info!("Deleted variant {}", id);
        Ok(())
    }
}
