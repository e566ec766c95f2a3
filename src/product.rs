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

//! Product entities and the per-product stock primitive.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use storefront_rs::{Product, ProductId};
//!
//! let product = Product::new(ProductId(1), "Widget", dec!(9.99), 10).unwrap();
//! assert_eq!(product.stock(), 10);
//! ```

use crate::StoreError;
use crate::base::ProductId;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

#[derive(Debug)]
pub(crate) struct ProductData {
    pub(crate) id: ProductId,
    pub(crate) name: String,
    pub(crate) price: Decimal,
    /// Available stock. Unsigned, so a negative count is unrepresentable;
    /// `reserve` still checks availability before decrementing.
    pub(crate) stock: u32,
}

impl ProductData {
    fn new(id: ProductId, name: String, price: Decimal, stock: u32) -> Self {
        Self {
            id,
            name,
            price,
            stock,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.price >= Decimal::ZERO,
            "Invariant violated: price went negative: {}",
            self.price
        );
    }

    /// Conditional decrement: the availability check and the write are one
    /// step under the product's lock.
    pub(crate) fn reserve(&mut self, quantity: u32) -> Result<(), StoreError> {
        if quantity == 0 {
            return Err(StoreError::InvalidQuantity);
        }
        if self.stock < quantity {
            return Err(StoreError::InsufficientStock {
                product_id: self.id,
                requested: quantity,
                available: self.stock,
            });
        }
        self.stock -= quantity;
        self.assert_invariants();
        Ok(())
    }

    /// Returns previously reserved stock. Commutes with `reserve`.
    pub(crate) fn release(&mut self, quantity: u32) {
        self.stock += quantity;
        self.assert_invariants();
    }

    pub(crate) fn set_price(&mut self, price: Decimal) -> Result<(), StoreError> {
        if price < Decimal::ZERO {
            return Err(StoreError::InvalidPrice);
        }
        self.price = price;
        self.assert_invariants();
        Ok(())
    }
}

/// Catalog product with an authoritative stock count.
///
/// All stock mutation goes through [`reserve`](crate::Inventory::reserve) /
/// [`release`](crate::Inventory::release) on the owning ledger; there is no
/// read-modify-write path for callers.
#[derive(Debug)]
pub struct Product {
    inner: Mutex<ProductData>,
}

impl Product {
    pub(crate) const PRICE_PRECISION: u32 = 2;

    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        price: Decimal,
        stock: u32,
    ) -> Result<Self, StoreError> {
        if price < Decimal::ZERO {
            return Err(StoreError::InvalidPrice);
        }
        Ok(Self {
            inner: Mutex::new(ProductData::new(id, name.into(), price, stock)),
        })
    }

    pub fn id(&self) -> ProductId {
        self.inner.lock().id
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn price(&self) -> Decimal {
        self.inner.lock().price
    }

    /// Currently available stock. Stale the moment the lock is dropped;
    /// decisions belong in `reserve`, not here.
    pub fn stock(&self) -> u32 {
        self.inner.lock().stock
    }

    pub(crate) fn data(&self) -> MutexGuard<'_, ProductData> {
        self.inner.lock()
    }
}

impl Serialize for Product {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Product", 4)?;
        state.serialize_field("id", &data.id)?;
        state.serialize_field("name", &data.name)?;
        state.serialize_field("price", &data.price.round_dp(Product::PRICE_PRECISION))?;
        state.serialize_field("stock", &data.stock)?;
        state.end()
    }
}
