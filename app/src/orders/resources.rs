use anyhow::Result;
use chrono::{DateTime, Utc};
use log::*;
use r2d2::Pool;

use infra::ids::{Id, IdGen};
use infra::persistence::Storage;
use infra::records::Filter;

use super::models::*;
use crate::errors::{CmsError, StorageResultExt};
use crate::services::{Commandable, Queryable, Request, Validate};

#[derive(Debug)]
pub struct Orders<M: r2d2::ManageConnection> {
    db: Pool<M>,
    idgen: IdGen,
}

#[derive(Debug, Clone)]
pub struct PlaceOrder(pub OrderForm);

/// Orders not yet completed or cancelled, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ListOrderQueue;

#[derive(Debug, Clone)]
pub struct UpdateOrderStatus {
    pub id: Id<Order>,
    pub status: OrderStatus,
}

/// Orders created strictly after `since`, oldest first. Without `since`,
/// every order.
#[derive(Debug, Clone, Default)]
pub struct PollNewOrders {
    pub since: Option<DateTime<Utc>>,
}

impl Request for PlaceOrder {
    type Resp = Order;
}
impl Request for ListOrderQueue {
    type Resp = Vec<Order>;
}
impl Request for UpdateOrderStatus {
    type Resp = Order;
}
impl Request for PollNewOrders {
    type Resp = Vec<Order>;
}

fn oldest_first(orders: &mut Vec<Order>) {
    orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Orders<M> {
    pub fn new(db: Pool<M>, idgen: IdGen) -> Self {
        Orders { db, idgen }
    }
}

impl<M: r2d2::ManageConnection> Clone for Orders<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        let idgen = self.idgen.clone();
        Orders { db, idgen }
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<PlaceOrder> for Orders<M>
{
    fn execute(&self, PlaceOrder(form): PlaceOrder) -> Result<Order> {
        form.validate()?;
        let order = Order::new(self.idgen.generate(), &form, Utc::now());
        let order = self.db.get()?.insert(&order).translated()?;
        info!("Placed order {} as {}", order.order_number, order.id);
        Ok(order)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ListOrderQueue> for Orders<M>
{
    fn query(&self, _: ListOrderQueue) -> Result<Vec<Order>> {
        let docs = self.db.get()?;
        let mut queue = Vec::new();
        for status in OrderStatus::ALL.iter().filter(|s| s.is_open()) {
            let filter = Filter::all().eq("status", status.as_str());
            queue.extend(docs.select::<Order>(&filter).translated()?);
        }
        oldest_first(&mut queue);
        Ok(queue)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<UpdateOrderStatus> for Orders<M>
{
    fn execute(&self, req: UpdateOrderStatus) -> Result<Order> {
        let docs = self.db.get()?;
        let mut order = docs
            .load(&req.id)
            .translated()?
            .ok_or_else(|| CmsError::not_found(&req.id))?;
        let previous = order.status;
        order.status = req.status;
        order.updated_at = Some(Utc::now());
        let order = docs.update(&order).translated()?;
        info!("Order {}: {} -> {}", order.order_number, previous, order.status);
        Ok(order)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<PollNewOrders> for Orders<M>
{
    fn query(&self, req: PollNewOrders) -> Result<Vec<Order>> {
        let mut orders = self
            .db
            .get()?
            .select::<Order>(&Filter::all())
            .translated()?
            .into_iter()
            .filter(|o| req.since.map(|since| o.created_at > since).unwrap_or(true))
            .collect::<Vec<_>>();
        oldest_first(&mut orders);
        trace!("Poll since {:?} found {} orders", req.since, orders.len());
        Ok(orders)
    }
}
