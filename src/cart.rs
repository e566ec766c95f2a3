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

//! Per-user shopping carts.
//!
//! A cart is mutable scratch state: one per user, created lazily, never
//! deleted, only emptied. Stock checks here are soft — display-quality
//! validation against a stock read that may be stale. The authoritative
//! check happens at checkout, inside the inventory ledger.
//!
//! The read of a line's existing quantity and the write of its new one
//! happen under the cart's lock, so two concurrent adds for the same user
//! cannot lose an update.

use crate::StoreError;
use crate::base::{ProductId, UserId};
use crate::inventory::Inventory;
use crate::product::Product;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug)]
pub(crate) struct CartData {
    pub(crate) user_id: UserId,
    /// Line quantities, unique per product.
    pub(crate) items: HashMap<ProductId, u32>,
}

/// One line of a [`CartView`], priced at the current catalog price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
}

/// Recomputed view of a cart.
///
/// Prices are the *current* catalog prices — the cart has not yet
/// crystallized an order, so there is nothing to snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub user_id: UserId,
    pub items: Vec<CartLine>,
    /// Distinct lines, not total units.
    pub item_count: usize,
    pub total_price: Decimal,
}

/// A user's mutable cart.
#[derive(Debug)]
pub struct Cart {
    inner: Mutex<CartData>,
}

impl Cart {
    pub fn new(user_id: UserId) -> Self {
        Self {
            inner: Mutex::new(CartData {
                user_id,
                items: HashMap::new(),
            }),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.inner.lock().user_id
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Inserts a new line or increments an existing one.
    ///
    /// The soft stock check compares the *prospective* line total (existing
    /// plus added) against the product's current stock.
    pub fn add_item(
        &self,
        inventory: &Inventory,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView, StoreError> {
        if quantity == 0 {
            return Err(StoreError::InvalidQuantity);
        }

        let mut data = self.inner.lock();
        let snapshot = inventory
            .get(product_id)
            .ok_or(StoreError::ProductNotFound(product_id))?;

        let current = data.items.get(&product_id).copied().unwrap_or(0);
        let prospective = current
            .checked_add(quantity)
            .ok_or(StoreError::InvalidQuantity)?;

        if snapshot.stock < prospective {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: prospective,
                available: snapshot.stock,
            });
        }

        data.items.insert(product_id, prospective);
        Ok(Self::view_of(&data, inventory))
    }

    /// Sets a line's quantity exactly (not additive).
    pub fn update_item(
        &self,
        inventory: &Inventory,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView, StoreError> {
        if quantity == 0 {
            return Err(StoreError::InvalidQuantity);
        }

        let mut data = self.inner.lock();
        if !data.items.contains_key(&product_id) {
            return Err(StoreError::ItemNotInCart(product_id));
        }

        let snapshot = inventory
            .get(product_id)
            .ok_or(StoreError::ProductNotFound(product_id))?;
        if snapshot.stock < quantity {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: quantity,
                available: snapshot.stock,
            });
        }

        data.items.insert(product_id, quantity);
        Ok(Self::view_of(&data, inventory))
    }

    /// Deletes a line.
    pub fn remove_item(
        &self,
        inventory: &Inventory,
        product_id: ProductId,
    ) -> Result<CartView, StoreError> {
        let mut data = self.inner.lock();
        if data.items.remove(&product_id).is_none() {
            return Err(StoreError::ItemNotInCart(product_id));
        }
        Ok(Self::view_of(&data, inventory))
    }

    /// Deletes all lines. Idempotent.
    pub fn clear(&self, inventory: &Inventory) -> CartView {
        let mut data = self.inner.lock();
        data.items.clear();
        Self::view_of(&data, inventory)
    }

    /// Recomputes the view at current catalog prices.
    pub fn view(&self, inventory: &Inventory) -> CartView {
        Self::view_of(&self.inner.lock(), inventory)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CartData> {
        self.inner.lock()
    }

    pub(crate) fn view_of(data: &CartData, inventory: &Inventory) -> CartView {
        let mut items: Vec<CartLine> = data
            .items
            .iter()
            .filter_map(|(&product_id, &quantity)| {
                // Catalog removal is out of scope; a line whose product is
                // gone is skipped rather than poisoning the whole view.
                let snapshot = inventory.get(product_id)?;
                let subtotal = (snapshot.price * Decimal::from(quantity))
                    .round_dp(Product::PRICE_PRECISION);
                Some(CartLine {
                    product_id,
                    name: snapshot.name,
                    price: snapshot.price,
                    quantity,
                    subtotal,
                })
            })
            .collect();
        items.sort_by_key(|line| line.product_id);

        let total_price = items
            .iter()
            .map(|line| line.subtotal)
            .sum::<Decimal>()
            .round_dp(Product::PRICE_PRECISION);

        CartView {
            user_id: data.user_id,
            item_count: items.len(),
            items,
            total_price,
        }
    }
}
