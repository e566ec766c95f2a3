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

//! The cart-to-order engine.
//!
//! The [`Engine`] is the central component tying the inventory ledger, the
//! cart store, and the order book together. It is the only place where a
//! cart (or an explicit line list) becomes an order, and the only place
//! where an order's lifecycle is advanced.
//!
//! # Operations
//!
//! - **Cart**: get-or-create, add/update/remove lines, clear. Soft stock
//!   checks only; every operation returns the recomputed [`CartView`].
//! - **Checkout**: capture price snapshots, reserve every line atomically,
//!   create the `PENDING` order, clear the cart — all or nothing.
//! - **Lifecycle**: cancellation releases every reserved line back to the
//!   ledger atomically with the status write; administrative status updates
//!   are plain writes guarded by the terminal check.
//!
//! # Thread Safety
//!
//! The engine is called from many concurrent request-serving threads. Carts
//! and products live behind per-entity locks inside [`DashMap`]s, so
//! operations on different users and products proceed in parallel while
//! operations on the same entity serialize.
//!
//! # Invariants
//!
//! - Stock is only ever mutated through reserve/release; it can never go
//!   negative.
//! - For any history of checkouts and cancellations, the quantities on
//!   non-cancelled orders plus current stock equal the original stock.
//! - Lock order is always cart → products (ascending by ID), so concurrent
//!   checkouts cannot deadlock.
//! - Order lines and totals are immutable once created; catalog price
//!   changes never rewrite them.

use crate::StoreError;
use crate::base::{OrderId, ProductId, UserId};
use crate::cart::{Cart, CartView};
use crate::inventory::Inventory;
use crate::order::{Order, OrderItem, OrderStatus};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Cart-to-order transaction engine.
pub struct Engine {
    /// Authoritative stock ledger and product catalog.
    inventory: Inventory,
    /// One cart per user, created lazily.
    carts: DashMap<UserId, Arc<Cart>>,
    /// All orders ever created, indexed by ID.
    orders: DashMap<OrderId, Arc<Order>>,
    /// Monotonic order ID source.
    next_order_id: AtomicU64,
}

impl Engine {
    /// Creates a new engine with an empty catalog and no carts or orders.
    pub fn new() -> Self {
        Engine {
            inventory: Inventory::new(),
            carts: DashMap::new(),
            orders: DashMap::new(),
            next_order_id: AtomicU64::new(0),
        }
    }

    /// The inventory ledger (catalog registration, peek, reporting).
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    fn next_order_id(&self) -> OrderId {
        OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Existing cart or a fresh empty one; the Arc is cloned out so no map
    /// shard stays locked while the cart is used.
    fn cart_handle(&self, user_id: UserId) -> Arc<Cart> {
        Arc::clone(
            self.carts
                .entry(user_id)
                .or_insert_with(|| Arc::new(Cart::new(user_id)))
                .value(),
        )
    }

    fn existing_cart(&self, user_id: UserId) -> Result<Arc<Cart>, StoreError> {
        self.carts
            .get(&user_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StoreError::CartNotFound(user_id))
    }

    // === Cart Store ===

    /// Returns the user's cart view, creating an empty cart if needed.
    /// Idempotent.
    pub fn cart(&self, user_id: UserId) -> CartView {
        self.cart_handle(user_id).view(&self.inventory)
    }

    /// Adds a product to the user's cart, or increments the existing line.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ProductNotFound`] - Unknown product ID.
    /// - [`StoreError::InvalidQuantity`] - Zero quantity.
    /// - [`StoreError::InsufficientStock`] - The prospective line total
    ///   exceeds the product's current stock (a soft check; the
    ///   authoritative one happens at checkout).
    pub fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView, StoreError> {
        self.cart_handle(user_id)
            .add_item(&self.inventory, product_id, quantity)
    }

    /// Sets a cart line's quantity exactly.
    ///
    /// # Errors
    ///
    /// - [`StoreError::CartNotFound`] - The user has no cart yet.
    /// - [`StoreError::ItemNotInCart`] - No line for this product.
    /// - [`StoreError::InvalidQuantity`] / [`StoreError::InsufficientStock`]
    pub fn update_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView, StoreError> {
        self.existing_cart(user_id)?
            .update_item(&self.inventory, product_id, quantity)
    }

    /// Removes a line from the user's cart.
    ///
    /// # Errors
    ///
    /// - [`StoreError::CartNotFound`] - The user has no cart yet.
    /// - [`StoreError::ItemNotInCart`] - No line for this product.
    pub fn remove_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<CartView, StoreError> {
        self.existing_cart(user_id)?
            .remove_item(&self.inventory, product_id)
    }

    /// Empties the user's cart, creating it first if needed. Idempotent.
    pub fn clear_cart(&self, user_id: UserId) -> CartView {
        self.cart_handle(user_id).clear(&self.inventory)
    }

    // === Order Factory ===

    /// Captures current catalog prices for the given lines. The captured
    /// prices become immutable order history.
    fn capture_items(&self, lines: &[(ProductId, u32)]) -> Result<Vec<OrderItem>, StoreError> {
        lines
            .iter()
            .map(|&(product_id, quantity)| {
                let snapshot = self
                    .inventory
                    .get(product_id)
                    .ok_or(StoreError::ProductNotFound(product_id))?;
                Ok(OrderItem {
                    product_id,
                    quantity,
                    price: snapshot.price,
                })
            })
            .collect()
    }

    /// Converts the user's cart into a `PENDING` order.
    ///
    /// The cart's lock is held across the whole unit of work: price capture,
    /// reservation of every line, order creation, and cart clearing. The
    /// reservation is all-or-nothing and precedes the first visible write,
    /// so an error at any step leaves no partial effect — no stock
    /// decremented, no order created, cart intact.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EmptyCart`] - The cart is missing or has no lines.
    /// - [`StoreError::InsufficientStock`] - Some line exceeds available
    ///   stock; names the product and its available quantity.
    pub fn create_order_from_cart(&self, user_id: UserId) -> Result<Arc<Order>, StoreError> {
        let cart = self
            .carts
            .get(&user_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StoreError::EmptyCart)?;

        let mut data = cart.lock();
        if data.items.is_empty() {
            return Err(StoreError::EmptyCart);
        }

        let mut lines: Vec<(ProductId, u32)> = data
            .items
            .iter()
            .map(|(&product_id, &quantity)| (product_id, quantity))
            .collect();
        lines.sort_by_key(|&(product_id, _)| product_id);

        let items = self.capture_items(&lines)?;
        if let Err(err) = self.inventory.reserve_all(&lines) {
            warn!(user = %user_id, error = %err, "checkout aborted");
            return Err(err);
        }

        let order = Arc::new(Order::new(self.next_order_id(), user_id, items));
        self.orders.insert(order.id(), Arc::clone(&order));
        data.items.clear();

        info!(
            order = %order.id(),
            user = %user_id,
            total = %order.total_price(),
            lines = order.items().len(),
            "order created from cart"
        );
        Ok(order)
    }

    /// Creates a `PENDING` order from an explicit line list, bypassing the
    /// cart. Duplicate product lines are merged. No cart is touched.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EmptyCart`] - The list is empty.
    /// - [`StoreError::ProductNotFound`] - Per missing product ID.
    /// - [`StoreError::InvalidQuantity`] - Zero quantity on any line.
    /// - [`StoreError::InsufficientStock`] - Merged line total exceeds
    ///   available stock.
    pub fn create_order_direct(
        &self,
        user_id: UserId,
        items: &[(ProductId, u32)],
    ) -> Result<Arc<Order>, StoreError> {
        if items.is_empty() {
            return Err(StoreError::EmptyCart);
        }

        let mut merged: BTreeMap<ProductId, u32> = BTreeMap::new();
        for &(product_id, quantity) in items {
            if quantity == 0 {
                return Err(StoreError::InvalidQuantity);
            }
            let total = merged.entry(product_id).or_insert(0);
            *total = total
                .checked_add(quantity)
                .ok_or(StoreError::InvalidQuantity)?;
        }
        let lines: Vec<(ProductId, u32)> = merged.into_iter().collect();

        let captured = self.capture_items(&lines)?;
        if let Err(err) = self.inventory.reserve_all(&lines) {
            warn!(user = %user_id, error = %err, "direct order aborted");
            return Err(err);
        }

        let order = Arc::new(Order::new(self.next_order_id(), user_id, captured));
        self.orders.insert(order.id(), Arc::clone(&order));

        info!(
            order = %order.id(),
            user = %user_id,
            total = %order.total_price(),
            lines = order.items().len(),
            "order created direct"
        );
        Ok(order)
    }

    // === Order Lifecycle ===

    /// Cancels an order, releasing every reserved line back to the ledger.
    ///
    /// The order's state lock is held across the stock releases and the
    /// status write, so restoration and the `CANCELLED` status cannot
    /// diverge.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OrderNotFound`] - Unknown order ID.
    /// - [`StoreError::InvalidTransition`] - The order is already
    ///   `DELIVERED` or `CANCELLED`.
    pub fn cancel_order(&self, order_id: OrderId) -> Result<Arc<Order>, StoreError> {
        let order = self.order(order_id).ok_or(StoreError::OrderNotFound(order_id))?;

        let mut state = order.state();
        if state.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: state.status,
                to: OrderStatus::Cancelled,
            });
        }

        for item in order.items() {
            self.inventory.release(item.product_id, item.quantity)?;
        }
        state.set_status(OrderStatus::Cancelled)?;
        drop(state);

        info!(order = %order_id, "order cancelled, stock restored");
        Ok(order)
    }

    /// Administrative status update: a plain field write with an existence
    /// check and the terminal guard.
    ///
    /// `CANCELLED` is rejected here — stock restoration must go through
    /// [`cancel_order`](Self::cancel_order), otherwise sold stock would leak.
    pub fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Arc<Order>, StoreError> {
        let order = self.order(order_id).ok_or(StoreError::OrderNotFound(order_id))?;

        if status == OrderStatus::Cancelled {
            return Err(StoreError::InvalidTransition {
                from: order.status(),
                to: status,
            });
        }

        order.state().set_status(status)?;
        Ok(order)
    }

    // === Lookups ===

    /// Retrieves an order by ID.
    pub fn order(&self, order_id: OrderId) -> Option<Arc<Order>> {
        self.orders
            .get(&order_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// All orders in creation order.
    pub fn orders(&self) -> Vec<Arc<Order>> {
        let mut orders: Vec<Arc<Order>> = self
            .orders
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        orders.sort_by_key(|order| order.id());
        orders
    }

    /// A user's orders in creation order.
    pub fn orders_for_user(&self, user_id: UserId) -> Vec<Arc<Order>> {
        let mut orders: Vec<Arc<Order>> = self
            .orders
            .iter()
            .filter(|entry| entry.value().user_id() == user_id)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        orders.sort_by_key(|order| order.id());
        orders
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
