//! Simple REST API server example for the storefront engine.
//!
//! Run with: `cargo run --example server`
//!
//! The authenticated user is supplied by the `x-user-id` header — identity
//! is an external collaborator and the engine trusts the value it is given.
//!
//! ## Endpoints
//!
//! - `GET /cart` - Current user's cart view
//! - `POST /cart/items` - Add a product to the cart (or increment the line)
//! - `PATCH /cart/items/{product_id}` - Set a line's quantity
//! - `DELETE /cart/items/{product_id}` - Remove a line
//! - `DELETE /cart` - Clear the cart
//! - `POST /orders` - Create an order from the current cart
//! - `POST /orders/direct` - Create an order from an explicit item list
//! - `GET /orders` - Current user's orders
//! - `GET /orders/{id}` - Get an order by ID
//! - `POST /orders/{id}/cancel` - Cancel an order, restoring stock
//! - `POST /products` / `GET /products` / `GET /products/{id}` - Catalog seam
//!
//! ## Example Usage
//!
//! ```bash
//! # Register a product
//! curl -X POST http://localhost:3000/products \
//!   -H "Content-Type: application/json" \
//!   -d '{"id": 1, "name": "Widget", "price": "10.00", "stock": 5}'
//!
//! # Add to cart
//! curl -X POST http://localhost:3000/cart/items \
//!   -H "Content-Type: application/json" -H "x-user-id: 1" \
//!   -d '{"product_id": 1, "quantity": 2}'
//!
//! # Check out
//! curl -X POST http://localhost:3000/orders -H "x-user-id: 1"
//!
//! # Cancel
//! curl -X POST http://localhost:3000/orders/1/cancel -H "x-user-id: 1"
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storefront_rs::{CartView, Engine, Order, OrderId, ProductId, StoreError, UserId};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

// === Request/Response DTOs ===

/// Request body for adding a product to the cart.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: u32,
    pub quantity: u32,
}

/// Request body for setting a cart line's quantity.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

/// One line of a direct order request.
#[derive(Debug, Deserialize)]
pub struct DirectOrderItem {
    pub product_id: u32,
    pub quantity: u32,
}

/// Request body for creating an order from an explicit item list.
#[derive(Debug, Deserialize)]
pub struct DirectOrderRequest {
    pub items: Vec<DirectOrderItem>,
}

/// Request body for registering a product.
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub id: u32,
    pub name: String,
    pub price: Decimal,
    pub stock: u32,
}

/// Response body for product information.
#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: u32,
    pub name: String,
    pub price: Decimal,
    pub stock: u32,
}

/// Response body for one order line.
#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: u32,
    pub quantity: u32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

/// Response body for order information.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: u64,
    pub user: u32,
    pub status: String,
    pub total: Decimal,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderResponse {
    fn from_order(order: &Order) -> Self {
        OrderResponse {
            id: order.id().0,
            user: order.user_id().0,
            status: order.status().to_string(),
            total: order.total_price(),
            items: order
                .items()
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.0,
                    quantity: item.quantity,
                    price: item.price,
                    subtotal: item.subtotal(),
                })
                .collect(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the storefront engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting engine failures into HTTP responses.
pub enum AppError {
    Store(StoreError),
    MissingUser,
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Store(err) => {
                let (status, code) = match err {
                    StoreError::InvalidQuantity => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY"),
                    StoreError::InvalidPrice => (StatusCode::BAD_REQUEST, "INVALID_PRICE"),
                    StoreError::ProductNotFound(_) => (StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND"),
                    StoreError::DuplicateProduct(_) => (StatusCode::CONFLICT, "DUPLICATE_PRODUCT"),
                    StoreError::CartNotFound(_) => (StatusCode::NOT_FOUND, "CART_NOT_FOUND"),
                    StoreError::ItemNotInCart(_) => (StatusCode::NOT_FOUND, "ITEM_NOT_IN_CART"),
                    StoreError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
                    StoreError::InsufficientStock { .. } => {
                        (StatusCode::BAD_REQUEST, "INSUFFICIENT_STOCK")
                    }
                    StoreError::EmptyCart => (StatusCode::BAD_REQUEST, "EMPTY_CART"),
                    StoreError::InvalidTransition { .. } => {
                        (StatusCode::BAD_REQUEST, "INVALID_TRANSITION")
                    }
                };
                (status, code, err.to_string())
            }
            AppError::MissingUser => (
                StatusCode::UNAUTHORIZED,
                "MISSING_USER",
                "missing or invalid x-user-id header".to_string(),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// The authenticated user, as asserted by the identity layer upstream.
fn current_user(headers: &HeaderMap) -> Result<UserId, AppError> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u32>().ok())
        .map(UserId)
        .ok_or(AppError::MissingUser)
}

// === Cart Handlers ===

/// GET /cart - Current user's cart view.
async fn get_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CartView>, AppError> {
    let user = current_user(&headers)?;
    Ok(Json(state.engine.cart(user)))
}

/// POST /cart/items - Add a product to the cart.
async fn add_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartView>, AppError> {
    let user = current_user(&headers)?;
    let view = state
        .engine
        .add_item(user, ProductId(request.product_id), request.quantity)?;
    Ok(Json(view))
}

/// PATCH /cart/items/{product_id} - Set a line's quantity.
async fn update_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(product_id): Path<u32>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<CartView>, AppError> {
    let user = current_user(&headers)?;
    let view = state
        .engine
        .update_item(user, ProductId(product_id), request.quantity)?;
    Ok(Json(view))
}

/// DELETE /cart/items/{product_id} - Remove a line.
async fn remove_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(product_id): Path<u32>,
) -> Result<Json<CartView>, AppError> {
    let user = current_user(&headers)?;
    let view = state.engine.remove_item(user, ProductId(product_id))?;
    Ok(Json(view))
}

/// DELETE /cart - Clear the cart.
async fn clear_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CartView>, AppError> {
    let user = current_user(&headers)?;
    Ok(Json(state.engine.clear_cart(user)))
}

// === Order Handlers ===

/// POST /orders - Create an order from the current cart.
async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let user = current_user(&headers)?;
    let order = state.engine.create_order_from_cart(user)?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from_order(&order))))
}

/// POST /orders/direct - Create an order from an explicit item list.
async fn create_order_direct(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DirectOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let user = current_user(&headers)?;
    let items: Vec<(ProductId, u32)> = request
        .items
        .iter()
        .map(|item| (ProductId(item.product_id), item.quantity))
        .collect();
    let order = state.engine.create_order_direct(user, &items)?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from_order(&order))))
}

/// GET /orders - Current user's orders in creation order.
async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let user = current_user(&headers)?;
    let orders = state
        .engine
        .orders_for_user(user)
        .iter()
        .map(|order| OrderResponse::from_order(order))
        .collect();
    Ok(Json(orders))
}

/// GET /orders/{id} - Get an order by ID.
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .engine
        .order(OrderId(id))
        .ok_or(StoreError::OrderNotFound(OrderId(id)))?;
    Ok(Json(OrderResponse::from_order(&order)))
}

/// POST /orders/{id}/cancel - Cancel an order, restoring stock.
async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.engine.cancel_order(OrderId(id))?;
    Ok(Json(OrderResponse::from_order(&order)))
}

// === Catalog Handlers ===

/// POST /products - Register a product.
async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<StatusCode, AppError> {
    state.engine.inventory().add_product(
        ProductId(request.id),
        request.name,
        request.price,
        request.stock,
    )?;
    Ok(StatusCode::CREATED)
}

/// GET /products - List all products.
async fn list_products(State(state): State<AppState>) -> Json<Vec<ProductResponse>> {
    let products = state
        .engine
        .inventory()
        .products()
        .iter()
        .map(|product| ProductResponse {
            id: product.id().0,
            name: product.name(),
            price: product.price(),
            stock: product.stock(),
        })
        .collect();
    Json(products)
}

/// GET /products/{id} - Get a product by ID.
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<ProductResponse>, AppError> {
    let snapshot = state
        .engine
        .inventory()
        .get(ProductId(id))
        .ok_or(StoreError::ProductNotFound(ProductId(id)))?;
    Ok(Json(ProductResponse {
        id: snapshot.id.0,
        name: snapshot.name,
        price: snapshot.price,
        stock: snapshot.stock,
    }))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/items", post(add_cart_item))
        .route(
            "/cart/items/{product_id}",
            delete(remove_cart_item).patch(update_cart_item),
        )
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/direct", post(create_order_direct))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/products", post(create_product).get(list_products))
        .route("/products/{id}", get(get_product))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let state = AppState {
        engine: Arc::new(Engine::new()),
    };

    let app = create_router(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = TcpListener::bind(&addr).await.unwrap();
    println!("Storefront API server running on http://{addr}");
    println!();
    println!("Endpoints:");
    println!("  GET    /cart                      - Current user's cart");
    println!("  POST   /cart/items                - Add product to cart");
    println!("  PATCH  /cart/items/{{product_id}}   - Set line quantity");
    println!("  DELETE /cart/items/{{product_id}}   - Remove line");
    println!("  DELETE /cart                      - Clear cart");
    println!("  POST   /orders                    - Create order from cart");
    println!("  POST   /orders/direct             - Create order from item list");
    println!("  GET    /orders                    - Current user's orders");
    println!("  GET    /orders/{{id}}               - Get order by ID");
    println!("  POST   /orders/{{id}}/cancel        - Cancel order");
    println!("  POST   /products                  - Register product");
    println!("  GET    /products                  - List products");

    axum::serve(listener, app).await.unwrap();
}
