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

use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use storefront_rs::{Engine, OrderId, ProductId, UserId};
use tracing_subscriber::EnvFilter;

/// Storefront Engine - Replay commerce operation CSV files
///
/// Reads a script of catalog/cart/order operations from a CSV file, applies
/// them in order against a fresh engine, and writes the final state to
/// stdout.
#[derive(Parser, Debug)]
#[command(name = "storefront-rs")]
#[command(about = "A cart-to-order engine that replays commerce CSV scripts", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,user,ref,quantity,price,name
    /// Example: cargo run -- script.csv > products.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Which final state to write to stdout
    #[arg(long, value_enum, default_value = "products")]
    report: Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Report {
    /// Final product states (id, name, price, stock)
    Products,
    /// Final order states (id, user, status, total)
    Orders,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match process_script(BufReader::new(file)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error processing script: {}", e);
            process::exit(1);
        }
    };

    let result = match args.report {
        Report::Products => write_products(&engine, std::io::stdout()),
        Report::Orders => write_orders(&engine, std::io::stdout()),
    };
    if let Err(e) = result {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, user, ref, quantity, price, name`
/// - `ref` is a product ID for catalog/cart ops, an order ID for `cancel`.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    user: Option<u32>,
    #[serde(rename = "ref", deserialize_with = "csv::invalid_option")]
    reference: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    quantity: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    price: Option<Decimal>,
    name: Option<String>,
}

/// One commerce operation.
#[derive(Debug)]
enum Op {
    Product {
        id: ProductId,
        name: String,
        price: Decimal,
        stock: u32,
    },
    Add {
        user: UserId,
        product: ProductId,
        quantity: u32,
    },
    Update {
        user: UserId,
        product: ProductId,
        quantity: u32,
    },
    Remove {
        user: UserId,
        product: ProductId,
    },
    Clear {
        user: UserId,
    },
    Checkout {
        user: UserId,
    },
    Cancel {
        order: OrderId,
    },
}

impl CsvRecord {
    /// Converts a CSV record to an operation.
    ///
    /// Returns `None` for unknown ops or missing required fields.
    fn into_op(self) -> Option<Op> {
        let product = || self.reference.and_then(|r| u32::try_from(r).ok());

        match self.op.to_lowercase().as_str() {
            "product" => {
                let id = ProductId(product()?);
                Some(Op::Product {
                    id,
                    name: match self.name {
                        Some(name) if !name.is_empty() => name,
                        _ => format!("product-{id}"),
                    },
                    price: self.price?,
                    stock: self.quantity?,
                })
            }
            "add" => Some(Op::Add {
                user: UserId(self.user?),
                product: ProductId(product()?),
                quantity: self.quantity?,
            }),
            "update" => Some(Op::Update {
                user: UserId(self.user?),
                product: ProductId(product()?),
                quantity: self.quantity?,
            }),
            "remove" => Some(Op::Remove {
                user: UserId(self.user?),
                product: ProductId(product()?),
            }),
            "clear" => Some(Op::Clear {
                user: UserId(self.user?),
            }),
            "checkout" => Some(Op::Checkout {
                user: UserId(self.user?),
            }),
            "cancel" => Some(Op::Cancel {
                order: OrderId(self.reference?),
            }),
            _ => None,
        }
    }
}

/// Replays an operation script from a CSV reader.
///
/// This function uses streaming parsing to handle arbitrarily large scripts
/// without loading the entire file into memory. Malformed rows and failing
/// operations are skipped.
///
/// # CSV Format
///
/// Expected columns: `op, user, ref, quantity, price, name`
/// - `op`: Operation (product, add, update, remove, clear, checkout, cancel)
/// - `user`: User ID (u32; cart and checkout ops)
/// - `ref`: Product ID, or order ID for `cancel`
/// - `quantity`: Line quantity, or initial stock for `product`
/// - `price`: Decimal unit price (`product` only)
/// - `name`: Product name (`product` only, optional)
///
/// # Example
///
/// ```csv
/// op,user,ref,quantity,price,name
/// product,,1,5,10.00,Widget
/// add,1,1,2,,
/// checkout,1,,,,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
/// Individual operation errors are logged but don't stop processing.
pub fn process_script<R: Read>(reader: R) -> Result<Engine, csv::Error> {
    let engine = Engine::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " checkout "
        .flexible(true) // Allow missing trailing fields
        .has_headers(true) // Skip first row as header
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(op) = record.into_op() else {
                    tracing::debug!("skipping invalid operation record");
                    continue;
                };

                // Apply the operation, skipping failures
                if let Err(e) = apply(&engine, op) {
                    tracing::debug!("skipping operation: {e}");
                }
            }
            Err(e) => {
                // Skip malformed rows
                tracing::debug!("skipping malformed row: {e}");
                continue;
            }
        }
    }

    Ok(engine)
}

fn apply(engine: &Engine, op: Op) -> Result<(), storefront_rs::StoreError> {
    match op {
        Op::Product {
            id,
            name,
            price,
            stock,
        } => engine.inventory().add_product(id, name, price, stock),
        Op::Add {
            user,
            product,
            quantity,
        } => engine.add_item(user, product, quantity).map(|_| ()),
        Op::Update {
            user,
            product,
            quantity,
        } => engine.update_item(user, product, quantity).map(|_| ()),
        Op::Remove { user, product } => engine.remove_item(user, product).map(|_| ()),
        Op::Clear { user } => {
            engine.clear_cart(user);
            Ok(())
        }
        Op::Checkout { user } => engine.create_order_from_cart(user).map(|_| ()),
        Op::Cancel { order } => engine.cancel_order(order).map(|_| ()),
    }
}

/// Write final product states to a CSV writer.
///
/// # CSV Format
///
/// Columns: `id, name, price, stock`, ordered by product ID, prices rounded
/// to 2 decimal places.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_products<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for product in engine.inventory().products() {
        wtr.serialize(product.as_ref())?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write final order states to a CSV writer.
///
/// # CSV Format
///
/// Columns: `id, user, status, total`, in creation order.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_orders<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for order in engine.orders() {
        wtr.serialize(order.as_ref())?;
    }

    wtr.flush()?;
    Ok(())
}
