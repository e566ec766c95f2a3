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

//! # Storefront
//!
//! This library provides a cart-to-order transaction engine for e-commerce
//! workloads: per-user shopping carts, an authoritative inventory ledger
//! with atomic stock reservation, checkout into immutable orders, and
//! cancellation that restores stock.
//!
//! ## Core Components
//!
//! - [`Engine`]: Central entry point managing carts, orders, and stock
//! - [`Inventory`]: Per-product stock ledger with atomic reserve/release
//! - [`Cart`]: A user's mutable cart with recomputed [`CartView`]s
//! - [`Order`]: Immutable order with snapshot line prices and a status
//!   state machine
//! - [`StoreError`]: Error types for cart and order processing failures
//!
//! ## Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use storefront_rs::{Engine, ProductId, UserId};
//!
//! let engine = Engine::new();
//! engine
//!     .inventory()
//!     .add_product(ProductId(1), "Widget", dec!(10.00), 5)
//!     .unwrap();
//!
//! // Fill the cart and check out
//! engine.add_item(UserId(1), ProductId(1), 2).unwrap();
//! let order = engine.create_order_from_cart(UserId(1)).unwrap();
//!
//! assert_eq!(order.total_price(), dec!(20.00));
//! assert_eq!(engine.inventory().peek(ProductId(1)).unwrap(), 3);
//! assert!(engine.cart(UserId(1)).items.is_empty());
//! ```
//!
//! ## Thread Safety
//!
//! The engine handles concurrent access with per-entity locking, allowing
//! operations on different users and products to proceed in parallel.
//! Reservations for the same product serialize on its lock, so the sum of
//! granted reservations never exceeds the available stock.

pub mod base;
pub mod cart;
mod engine;
pub mod error;
pub mod inventory;
pub mod order;
pub mod product;

pub use base::{OrderId, ProductId, UserId};
pub use cart::{Cart, CartLine, CartView};
pub use engine::Engine;
pub use error::StoreError;
pub use inventory::{Inventory, ProductSnapshot};
pub use order::{Order, OrderItem, OrderStatus};
pub use product::Product;
