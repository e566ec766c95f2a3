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

//! The inventory ledger: authoritative available-stock counts per product.
//!
//! All stock mutation in the crate goes through [`Inventory::reserve`],
//! [`Inventory::reserve_all`], and [`Inventory::release`]. The check and the
//! decrement are a single step under the product's lock, so concurrent
//! reservations for one product serialize and the sum of granted
//! reservations never exceeds the stock that was available.

use crate::StoreError;
use crate::base::ProductId;
use crate::product::Product;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Point-in-time product view for display and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub stock: u32,
}

/// Per-product stock ledger.
///
/// Products are stored as `Arc<Product>` so a multi-product reservation can
/// take the product locks without pinning map shards.
#[derive(Debug, Default)]
pub struct Inventory {
    products: DashMap<ProductId, Arc<Product>>,
}

impl Inventory {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            products: DashMap::new(),
        }
    }

    /// Registers a product in the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateProduct`] if the ID is already
    /// registered, [`StoreError::InvalidPrice`] for a negative price.
    pub fn add_product(
        &self,
        id: ProductId,
        name: impl Into<String>,
        price: Decimal,
        stock: u32,
    ) -> Result<(), StoreError> {
        let product = Product::new(id, name, price, stock)?;

        // Entry API for atomic check-and-insert; a plain contains/insert
        // pair would race with a concurrent registration of the same ID.
        match self.products.entry(id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateProduct(id)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(product));
                Ok(())
            }
        }
    }

    fn resolve(&self, id: ProductId) -> Result<Arc<Product>, StoreError> {
        self.products
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StoreError::ProductNotFound(id))
    }

    /// Returns a point-in-time snapshot of a product, or `None` if the ID is
    /// unknown.
    pub fn get(&self, id: ProductId) -> Option<ProductSnapshot> {
        self.products.get(&id).map(|entry| {
            let data = entry.data();
            ProductSnapshot {
                id: data.id,
                name: data.name.clone(),
                price: data.price,
                stock: data.stock,
            }
        })
    }

    /// Non-authoritative stock read for display.
    ///
    /// The value can be stale by the time a reservation is attempted; do not
    /// base decisions on it.
    pub fn peek(&self, id: ProductId) -> Result<u32, StoreError> {
        Ok(self.resolve(id)?.stock())
    }

    /// Atomically checks availability and decrements stock by `quantity`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ProductNotFound`] - Unknown product ID.
    /// - [`StoreError::InvalidQuantity`] - Zero quantity.
    /// - [`StoreError::InsufficientStock`] - Fewer than `quantity` units
    ///   available; carries the available count.
    pub fn reserve(&self, id: ProductId, quantity: u32) -> Result<(), StoreError> {
        self.resolve(id)?.data().reserve(quantity)
    }

    /// Atomically increments stock by `quantity`, undoing a prior
    /// reservation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProductNotFound`] if the product no longer
    /// exists; the ledger itself never removes products.
    pub fn release(&self, id: ProductId, quantity: u32) -> Result<(), StoreError> {
        self.resolve(id)?.data().release(quantity);
        Ok(())
    }

    /// All-or-nothing reservation across multiple lines.
    ///
    /// Duplicate product lines are merged, product locks are acquired in
    /// ascending `ProductId` order (one global order, so concurrent
    /// multi-line reservations cannot deadlock), every line is validated
    /// while all locks are held, and only then is anything decremented.
    /// On failure no stock has been touched.
    pub fn reserve_all(&self, lines: &[(ProductId, u32)]) -> Result<(), StoreError> {
        let mut merged: BTreeMap<ProductId, u32> = BTreeMap::new();
        for &(id, quantity) in lines {
            if quantity == 0 {
                return Err(StoreError::InvalidQuantity);
            }
            let total = merged.entry(id).or_insert(0);
            *total = total
                .checked_add(quantity)
                .ok_or(StoreError::InvalidQuantity)?;
        }

        // Resolve Arcs first so no shard lock is held while taking product
        // locks. BTreeMap iteration gives the ascending lock order.
        let mut entries = Vec::with_capacity(merged.len());
        for (&id, &quantity) in &merged {
            entries.push((self.resolve(id)?, quantity));
        }

        let mut guards = Vec::with_capacity(entries.len());
        for (product, quantity) in &entries {
            guards.push((product.data(), *quantity));
        }

        for (guard, quantity) in &guards {
            if guard.stock < *quantity {
                return Err(StoreError::InsufficientStock {
                    product_id: guard.id,
                    requested: *quantity,
                    available: guard.stock,
                });
            }
        }

        for (guard, quantity) in &mut guards {
            guard.stock -= *quantity;
        }

        Ok(())
    }

    /// Updates a product's price.
    ///
    /// Existing orders are unaffected: order lines carry the price captured
    /// at creation time.
    pub fn set_price(&self, id: ProductId, price: Decimal) -> Result<(), StoreError> {
        self.resolve(id)?.data().set_price(price)
    }

    /// All products, ordered by product ID.
    ///
    /// Useful for generating reports of catalog state.
    pub fn products(&self) -> Vec<Arc<Product>> {
        let mut products: Vec<Arc<Product>> = self
            .products
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        products.sort_by_key(|product| product.id());
        products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
