//! Client-held feed of new-order notifications. Read state lives only here
//! and is never written back to storage.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::*;

use infra::ids::Id;

use super::models::{Order, OrderNotification};

#[derive(Debug, Clone, Default)]
pub struct NotificationFeed {
    notifications: Vec<OrderNotification>,
    read: HashSet<Id<Order>>,
    last_seen: Option<DateTime<Utc>>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        NotificationFeed::default()
    }

    /// Adds orders not already in the feed, keeping it newest first.
    /// Returns how many were new.
    pub fn ingest<'a, I: IntoIterator<Item = &'a Order>>(&mut self, orders: I) -> usize {
        let mut added = 0;
        for order in orders {
            if self.last_seen.map(|t| order.created_at > t).unwrap_or(true) {
                self.last_seen = Some(order.created_at);
            }
            if self.notifications.iter().any(|n| n.order_id == order.id) {
                continue;
            }
            self.notifications.push(order.notification());
            added += 1;
        }
        self.notifications
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.order_id.cmp(&a.order_id)));
        if added > 0 {
            debug!("{} new order notifications, {} unread", added, self.unread_count());
        }
        added
    }

    pub fn mark_read(&mut self, order_id: Id<Order>) -> bool {
        if !self.notifications.iter().any(|n| n.order_id == order_id) {
            return false;
        }
        self.read.insert(order_id)
    }

    pub fn mark_all_read(&mut self) {
        let ids = self.notifications.iter().map(|n| n.order_id);
        self.read.extend(ids);
    }

    /// Empties the feed. The high-water mark is kept so cleared orders are
    /// not fetched again.
    pub fn clear(&mut self) {
        self.notifications.clear();
        self.read.clear();
    }

    pub fn unread_count(&self) -> usize {
        self.notifications
            .iter()
            .filter(|n| !self.read.contains(&n.order_id))
            .count()
    }

    pub fn is_read(&self, order_id: &Id<Order>) -> bool {
        self.read.contains(order_id)
    }

    pub fn notifications(&self) -> &[OrderNotification] {
        &self.notifications
    }

    /// Creation time of the newest order seen so far.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }
}
