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

//! Error types for cart and order processing.

use crate::base::{OrderId, ProductId, UserId};
use crate::order::OrderStatus;
use thiserror::Error;

/// Store processing errors.
///
/// Every failure is detected synchronously inside the operation that caused
/// it; no partial state survives an error return.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Quantity is zero (line quantities must be at least 1)
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// Price is negative
    #[error("price must not be negative")]
    InvalidPrice,

    /// Referenced product does not exist in the catalog
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Product ID is already registered in the catalog
    #[error("product {0} already exists")]
    DuplicateProduct(ProductId),

    /// The user has no cart yet
    #[error("cart not found for user {0}")]
    CartNotFound(UserId),

    /// The cart has no line for the referenced product
    #[error("product {0} is not in the cart")]
    ItemNotInCart(ProductId),

    /// Referenced order does not exist
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// Requested quantity exceeds the currently available stock
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Order creation attempted with nothing to order
    #[error("cart is empty")]
    EmptyCart,

    /// Requested status change is not permitted from the current status
    #[error("cannot transition order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
