//! Orders: immutable line snapshots plus a status that only moves forward.

mod status;

pub use status::OrderStatus;

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::cart::CartLine;
use crate::error::{AmountOverflow, LifecycleError};
use crate::value_objects::Money;

/// Frozen copy of a cart line taken when the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,

    /// Product name at order time, kept for receipts and error messages.
    pub product_name: String,

    pub quantity: u32,

    /// Price captured when the item went into the cart.
    pub unit_price: Money,
}

impl OrderLine {
    /// Snapshots a cart line.
    pub fn from_cart_line(line: &CartLine, product_name: impl Into<String>) -> Self {
        Self {
            product_id: line.product_id,
            product_name: product_name.into(),
            quantity: line.quantity,
            unit_price: line.unit_price,
        }
    }

    /// Returns the total price for this line (quantity * unit_price), or
    /// `None` if it overflows.
    pub fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// Every persisted field of an order, used to rebuild one from storage.
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub total: Money,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub billing_address: String,
    pub tracking_code: Option<String>,
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A placed order.
///
/// Lines and total never change after [`Order::place`]. Only the status and
/// the tracking/payment metadata are mutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    lines: Vec<OrderLine>,
    total: Money,
    status: OrderStatus,
    shipping_address: String,
    billing_address: String,
    tracking_code: Option<String>,
    payment_id: Option<PaymentId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Places a new `pending` order. The total is the sum of line subtotals.
    ///
    /// Fails if that sum does not fit in a [`Money`].
    pub fn place(
        user_id: UserId,
        lines: Vec<OrderLine>,
        shipping_address: impl Into<String>,
        billing_address: impl Into<String>,
    ) -> Result<Self, AmountOverflow> {
        let total =
            Money::checked_sum(lines.iter().map(OrderLine::subtotal)).ok_or(AmountOverflow)?;
        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            user_id,
            lines,
            total,
            status: OrderStatus::Pending,
            shipping_address: shipping_address.into(),
            billing_address: billing_address.into(),
            tracking_code: None,
            payment_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds an order from storage.
    pub fn from_parts(parts: OrderParts) -> Self {
        Self {
            id: parts.id,
            user_id: parts.user_id,
            lines: parts.lines,
            total: parts.total,
            status: parts.status,
            shipping_address: parts.shipping_address,
            billing_address: parts.billing_address,
            tracking_code: parts.tracking_code,
            payment_id: parts.payment_id,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    /// Splits the order into its persisted fields.
    pub fn into_parts(self) -> OrderParts {
        OrderParts {
            id: self.id,
            user_id: self.user_id,
            lines: self.lines,
            total: self.total,
            status: self.status,
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            tracking_code: self.tracking_code,
            payment_id: self.payment_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn shipping_address(&self) -> &str {
        &self.shipping_address
    }

    pub fn billing_address(&self) -> &str {
        &self.billing_address
    }

    pub fn tracking_code(&self) -> Option<&str> {
        self.tracking_code.as_deref()
    }

    pub fn payment_id(&self) -> Option<PaymentId> {
        self.payment_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the order belongs to `user_id`.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Returns true if the customer may cancel the order themselves.
    ///
    /// Narrower than the transition table: only `pending` and `paid` orders.
    pub fn can_be_cancelled(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Paid)
    }

    /// Returns true if the order is in a status where a refund makes sense.
    pub fn can_be_refunded(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Paid | OrderStatus::Processing | OrderStatus::Shipped
        )
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// State changes
impl Order {
    /// Moves the order to `next` if the transition table allows it.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), LifecycleError> {
        if !self.status.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records the carrier tracking code.
    pub fn set_tracking_code(&mut self, code: impl Into<String>) -> Result<(), LifecycleError> {
        self.ensure_open()?;
        self.tracking_code = Some(code.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Links a payment record to the order.
    pub fn attach_payment(&mut self, payment_id: PaymentId) -> Result<(), LifecycleError> {
        self.ensure_open()?;
        self.payment_id = Some(payment_id);
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), LifecycleError> {
        if self.is_terminal() {
            return Err(LifecycleError::Closed {
                status: self.status,
            });
        }
        Ok(())
    }
}
