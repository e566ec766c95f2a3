// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Orders and the order status state machine.
//!
//! Statuses follow a state machine:
//! - [`Pending`] → [`Processing`] / [`Shipped`] (administrative updates)
//! - any non-terminal → [`Delivered`] (external fulfillment) or
//!   [`Cancelled`] (via cancellation, which restores stock)
//! - [`Delivered`] and [`Cancelled`] are terminal.
//!
//! An order's lines and total are immutable from creation; only the status
//! and `updated_at` ever change.
//!
//! [`Pending`]: OrderStatus::Pending
//! [`Processing`]: OrderStatus::Processing
//! [`Shipped`]: OrderStatus::Shipped
//! [`Delivered`]: OrderStatus::Delivered
//! [`Cancelled`]: OrderStatus::Cancelled

use crate::StoreError;
use crate::base::{OrderId, ProductId, UserId};
use crate::product::Product;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Terminal statuses permit no further lifecycle transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

/// One immutable order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price captured at order creation. Never recomputed from the
    /// live product, so catalog price changes cannot rewrite history.
    pub price: Decimal,
}

impl OrderItem {
    pub fn subtotal(&self) -> Decimal {
        (self.price * Decimal::from(self.quantity)).round_dp(Product::PRICE_PRECISION)
    }
}

#[derive(Debug)]
pub(crate) struct OrderState {
    pub(crate) status: OrderStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl OrderState {
    /// Status write guarded by the terminal check.
    pub(crate) fn set_status(&mut self, to: OrderStatus) -> Result<(), StoreError> {
        if self.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// An immutable order.
///
/// Created exactly once from a cart or an explicit line list; afterwards
/// only the status and `updated_at` change, through the engine.
#[derive(Debug)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    items: Vec<OrderItem>,
    total_price: Decimal,
    state: Mutex<OrderState>,
}

impl Order {
    pub(crate) fn new(id: OrderId, user_id: UserId, items: Vec<OrderItem>) -> Self {
        let total_price = items
            .iter()
            .map(OrderItem::subtotal)
            .sum::<Decimal>()
            .round_dp(Product::PRICE_PRECISION);
        let now = Utc::now();
        Self {
            id,
            user_id,
            items,
            total_price,
            state: Mutex::new(OrderState {
                status: OrderStatus::Pending,
                created_at: now,
                updated_at: now,
            }),
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Sum of captured line prices; fixed at creation time.
    pub fn total_price(&self) -> Decimal {
        self.total_price
    }

    pub fn status(&self) -> OrderStatus {
        self.state.lock().status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.state.lock().created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.state.lock().updated_at
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, OrderState> {
        self.state.lock()
    }
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.user_id == other.user_id
            && self.items == other.items
            && self.total_price == other.total_price
            && self.status() == other.status()
    }
}

impl Serialize for Order {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let state = self.state.lock();
        let mut row = serializer.serialize_struct("Order", 4)?;
        row.serialize_field("id", &self.id)?;
        row.serialize_field("user", &self.user_id)?;
        row.serialize_field("status", &state.status)?;
        row.serialize_field(
            "total",
            &self.total_price.round_dp(Product::PRICE_PRECISION),
        )?;
        row.end()
    }
}
