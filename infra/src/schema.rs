//! Referential and uniqueness rules, mirroring `persistence.sql`. The
//! in-memory store enforces these; PostgreSQL enforces its own copy.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Restrict,
    Cascade,
    SetNull,
}

#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub name: &'static str,
    pub table: &'static str,
    pub column: &'static str,
    pub references: &'static str,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, Copy)]
pub struct UniqueKey {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
    /// When false, `NULL` compares equal to `NULL` for this key.
    pub nulls_distinct: bool,
}

pub const TABLES: &[&str] = &[
    "categories",
    "products",
    "product_variants",
    "product_variant_options",
    "portion_controls",
    "portion_control_items",
    "events",
    "expenses",
    "orders",
];

pub const FOREIGN_KEYS: &[ForeignKey] = &[
    ForeignKey {
        name: "products_category_id_fkey",
        table: "products",
        column: "category_id",
        references: "categories",
        on_delete: OnDelete::Restrict,
    },
    ForeignKey {
        name: "product_variants_product_id_fkey",
        table: "product_variants",
        column: "product_id",
        references: "products",
        on_delete: OnDelete::Cascade,
    },
    ForeignKey {
        name: "product_variant_options_variant_id_fkey",
        table: "product_variant_options",
        column: "variant_id",
        references: "product_variants",
        on_delete: OnDelete::Cascade,
    },
    ForeignKey {
        name: "portion_controls_product_id_fkey",
        table: "portion_controls",
        column: "product_id",
        references: "products",
        on_delete: OnDelete::Cascade,
    },
    ForeignKey {
        name: "portion_controls_variant_id_fkey",
        table: "portion_controls",
        column: "variant_id",
        references: "product_variants",
        on_delete: OnDelete::Cascade,
    },
    ForeignKey {
        name: "portion_control_items_portion_control_id_fkey",
        table: "portion_control_items",
        column: "portion_control_id",
        references: "portion_controls",
        on_delete: OnDelete::Cascade,
    },
    ForeignKey {
        name: "portion_control_items_ingredient_product_id_fkey",
        table: "portion_control_items",
        column: "ingredient_product_id",
        references: "products",
        on_delete: OnDelete::SetNull,
    },
    ForeignKey {
        name: "portion_control_items_ingredient_variant_id_fkey",
        table: "portion_control_items",
        column: "ingredient_variant_id",
        references: "product_variants",
        on_delete: OnDelete::SetNull,
    },
];

pub const UNIQUE_KEYS: &[UniqueKey] = &[
    UniqueKey {
        name: "products_sku_key",
        table: "products",
        columns: &["sku"],
        nulls_distinct: true,
    },
    UniqueKey {
        name: "product_variants_sku_key",
        table: "product_variants",
        columns: &["sku"],
        nulls_distinct: true,
    },
    UniqueKey {
        name: "portion_controls_target_key",
        table: "portion_controls",
        columns: &["product_id", "variant_id"],
        nulls_distinct: false,
    },
    UniqueKey {
        name: "orders_order_number_key",
        table: "orders",
        columns: &["order_number"],
        nulls_distinct: true,
    },
];

pub fn foreign_keys_from(table: &str) -> impl Iterator<Item = &'static ForeignKey> + '_ {
    FOREIGN_KEYS.iter().filter(move |fk| fk.table == table)
}

pub fn foreign_keys_to(table: &str) -> impl Iterator<Item = &'static ForeignKey> + '_ {
    FOREIGN_KEYS.iter().filter(move |fk| fk.references == table)
}

pub fn unique_keys(table: &str) -> impl Iterator<Item = &'static UniqueKey> + '_ {
    UNIQUE_KEYS.iter().filter(move |uk| uk.table == table)
}
