//! Cart values. A cart is passed into and returned from each operation; nothing
//! here holds state between calls.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::CartLine;
use crate::repositories::CatalogStore;

/// A product reference as submitted by a client. Prices are never accepted from clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    #[schema(example = 2)]
    pub quantity: i64,
}

/// Increments the line for `line.product_id`, or appends `line`.
pub fn add_item(mut cart: Vec<CartLine>, line: CartLine) -> Result<Vec<CartLine>, ServiceError> {
    match cart.iter_mut().find(|l| l.product_id == line.product_id) {
        Some(existing) => {
            existing.quantity = existing
                .quantity
                .checked_add(line.quantity)
                .ok_or_else(|| ServiceError::InvalidRequest("quantity overflows".into()))?;
        }
        None => cart.push(line),
    }
    Ok(cart)
}

/// Removes one product, or clears the cart when `product_id` is `None`.
pub fn remove_item(mut cart: Vec<CartLine>, product_id: Option<Uuid>) -> Vec<CartLine> {
    match product_id {
        Some(id) => cart.retain(|l| l.product_id != id),
        None => cart.clear(),
    }
    cart
}

/// Sets the quantity of an existing line; zero removes it.
pub fn update_quantity(
    mut cart: Vec<CartLine>,
    product_id: Uuid,
    quantity: i64,
) -> Result<Vec<CartLine>, ServiceError> {
    if quantity < 0 {
        return Err(ServiceError::InvalidRequest(
            "quantity must not be negative".into(),
        ));
    }
    let idx = cart
        .iter()
        .position(|l| l.product_id == product_id)
        .ok_or_else(|| ServiceError::NotFound(format!("product {} not in cart", product_id)))?;

    if quantity == 0 {
        cart.remove(idx);
    } else {
        cart[idx].quantity = quantity;
    }
    Ok(cart)
}

/// Resolves client items against the catalog into priced cart lines.
#[derive(Clone)]
pub struct CartService {
    catalog: Arc<dyn CatalogStore>,
}

impl CartService {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Unknown products and non-positive quantities are invalid requests.
    /// Repeated products are merged in first-seen order.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn assemble(&self, items: &[CartItemInput]) -> Result<Vec<CartLine>, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "cart must contain at least one line".into(),
            ));
        }

        let mut cart = Vec::with_capacity(items.len());
        for item in items {
            item.validate()?;
            if let Some(existing) = cart.iter().find(|l: &&CartLine| l.product_id == item.product_id) {
                let line = CartLine::new(
                    item.product_id,
                    existing.unit_price_minor_units,
                    item.quantity,
                );
                cart = add_item(cart, line)?;
                continue;
            }

            let product = self
                .catalog
                .find_by_id(item.product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::InvalidRequest(format!("unknown product {}", item.product_id))
                })?;
            cart = add_item(
                cart,
                CartLine::new(product.id, product.price_minor_units, item.quantity),
            )?;
        }
        Ok(cart)
    }
}
