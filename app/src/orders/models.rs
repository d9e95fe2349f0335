use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use err_derive::Error;
use serde::{Deserialize, Serialize};

use infra::ids::{Entity, Id};
use infra::records::Record;

use crate::errors::CmsError;
use crate::services::{optional_text, require_text, Validate};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(display = "Unknown order status: {:?}", _0)]
pub struct StatusParseError(String);

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Id<Order>,
    pub order_number: String,
    pub customer_name: Option<String>,
    pub total: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct OrderForm {
    pub order_number: String,
    pub customer_name: Option<String>,
    pub total: f64,
}

/// What the notification feed shows for a new order.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OrderNotification {
    pub order_id: Id<Order>,
    pub order_number: String,
    pub customer_name: Option<String>,
    pub total: f64,
    pub created_at: DateTime<Utc>,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Still waiting to be handed over.
    pub fn is_open(self) -> bool {
        match self {
            OrderStatus::Pending | OrderStatus::Preparing | OrderStatus::Ready => true,
            OrderStatus::Completed | OrderStatus::Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = StatusParseError;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let wanted = src.trim().to_lowercase();
        OrderStatus::ALL
            .iter()
            .cloned()
            .find(|s| s.as_str() == wanted)
            .ok_or_else(|| StatusParseError(src.to_string()))
    }
}

impl Entity for Order {
    const PREFIX: &'static str = "order";
}

impl Record for Order {
    const TABLE: &'static str = "orders";
    fn id(&self) -> Id<Self> {
        self.id
    }
}

impl Order {
    pub(crate) fn new(id: Id<Order>, form: &OrderForm, now: DateTime<Utc>) -> Self {
        Order {
            id,
            order_number: form.order_number.trim().to_string(),
            customer_name: optional_text(&form.customer_name),
            total: form.total,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: None,
        }
    }

    pub fn notification(&self) -> OrderNotification {
        OrderNotification {
            order_id: self.id,
            order_number: self.order_number.clone(),
            customer_name: self.customer_name.clone(),
            total: self.total,
            created_at: self.created_at,
        }
    }
}

impl Validate for OrderForm {
    fn validate(&self) -> Result<(), CmsError> {
        require_text("Order number", &self.order_number)?;
        if !(self.total >= 0.0) {
            return Err(CmsError::validation("Total must not be negative"));
        }
        if !self.total.is_finite() {
            return Err(CmsError::validation("Total must be a finite number"));
        }
        Ok(())
    }
}
