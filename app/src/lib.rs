//! Back-office services for a coffee shop: the catalog, recipes (portion
//! controls), the order queue, events and expenses.

use anyhow::{Context, Result};
use log::*;
use r2d2::Pool;

use infra::ids::IdGen;
use infra::memory::{MemoryConnectionManager, MemoryStore};
use infra::persistence::{RecordConnectionManager, Storage};

pub mod catalog;
pub mod config;
pub mod errors;
pub mod events;
pub mod expenses;
pub mod orders;
pub mod recipes;
pub mod services;

#[cfg(test)]
mod test;

use crate::catalog::{Categories, Products};
use crate::events::Events;
use crate::expenses::Expenses;
use crate::orders::Orders;
use crate::recipes::PortionControls;

const MEMORY_POOL_SIZE: u32 = 4;

/// Every service, sharing one pool and one id generator.
#[derive(Debug)]
pub struct Backoffice<M: r2d2::ManageConnection> {
    db: Pool<M>,
    categories: Categories<M>,
    products: Products<M>,
    recipes: PortionControls<M>,
    orders: Orders<M>,
    events: Events<M>,
    expenses: Expenses<M>,
}

impl Backoffice<RecordConnectionManager> {
    pub fn new(config: &config::Config) -> Result<Self> {
        let db = config.postgres.build()?;
        Ok(Backoffice::with_pool(db, &config.catalog))
    }
}

impl Backoffice<MemoryConnectionManager> {
    /// A private, empty store with the schema already set up.
    pub fn in_memory(catalog: &config::CatalogConfig) -> Result<Self> {
        let manager = MemoryConnectionManager::new(MemoryStore::new());
        let db = r2d2::Pool::builder()
            .max_size(MEMORY_POOL_SIZE)
            .build(manager)
            .context("build memory pool")?;
        let backoffice = Backoffice::with_pool(db, catalog);
        backoffice.setup()?;
        Ok(backoffice)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Backoffice<M> {
    pub fn with_pool(db: Pool<M>, catalog: &config::CatalogConfig) -> Self {
        let idgen = IdGen::new();
        let categories = Categories::new(db.clone(), idgen.clone());
        let products = Products::new(db.clone(), idgen.clone());
        let recipes =
            PortionControls::new(db.clone(), idgen.clone(), catalog.addons_category.clone());
        let orders = Orders::new(db.clone(), idgen.clone());
        let events = Events::new(db.clone(), idgen.clone());
        let expenses = Expenses::new(db.clone(), idgen);
        Backoffice {
            db,
            categories,
            products,
            recipes,
            orders,
            events,
            expenses,
        }
    }

    pub fn setup(&self) -> Result<()> {
        debug!("Init schema");
        self.db.get()?.setup().context("Setup persistence")?;
        info!("Schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &Pool<M> {
        &self.db
    }

    pub fn categories(&self) -> &Categories<M> {
        &self.categories
    }

    pub fn products(&self) -> &Products<M> {
        &self.products
    }

    pub fn recipes(&self) -> &PortionControls<M> {
        &self.recipes
    }

    pub fn orders(&self) -> &Orders<M> {
        &self.orders
    }

    pub fn events(&self) -> &Events<M> {
        &self.events
    }

    pub fn expenses(&self) -> &Expenses<M> {
        &self.expenses
    }
}

impl<M: r2d2::ManageConnection> Clone for Backoffice<M> {
    fn clone(&self) -> Self {
        Backoffice {
            db: self.db.clone(),
            categories: self.categories.clone(),
            products: self.products.clone(),
            recipes: self.recipes.clone(),
            orders: self.orders.clone(),
            events: self.events.clone(),
            expenses: self.expenses.clone(),
        }
    }
}
