//! Session cart service. Carts live only for the buyer's session; the one
//! durable outcome is the order produced at checkout.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::aggregates::cart::{Cart, ProductSnapshot};
use crate::domain::aggregates::order::{NewOrder, Order, Party, PaymentMethod};
use crate::services::orders::OrderService;
use crate::{Error, Result};

/// Checkout fields the buyer-side shell supplies on top of the cart lines.
#[derive(Clone, Debug)]
pub struct CheckoutDetails {
    pub customer: Party,
    pub store: Party,
    pub distance_km: f64,
    pub discount_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub buyer_note: Option<String>,
}

#[derive(Default)]
pub struct CartService {
    carts: RwLock<HashMap<String, Cart>>,
}

impl CartService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, session: &str) -> Cart {
        self.carts
            .read()
            .await
            .get(session)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn add(&self, session: &str, product: ProductSnapshot, quantity: u32) -> Cart {
        let mut carts = self.carts.write().await;
        let cart = carts.entry(session.to_string()).or_default();
        cart.add(product, quantity);
        cart.clone()
    }

    pub async fn update_quantity(&self, session: &str, line_id: &str, quantity: u32) -> Result<Cart> {
        let mut carts = self.carts.write().await;
        let cart = carts.get_mut(session).ok_or(Error::CartLineNotFound)?;
        cart.update_quantity(line_id, quantity)?;
        Ok(cart.clone())
    }

    pub async fn clear(&self, session: &str) {
        self.carts.write().await.remove(session);
    }

    /// Turns the session cart into an order. The cart is cleared only after
    /// the order was created and persisted.
    pub async fn checkout(
        &self,
        session: &str,
        details: CheckoutDetails,
        orders: &OrderService,
    ) -> Result<Order> {
        let cart = self.get(session).await;
        if cart.is_empty() {
            return Err(Error::EmptyCart);
        }
        let order = orders
            .create_order(NewOrder {
                customer: details.customer,
                store: details.store,
                items: cart.to_line_items(),
                distance_km: details.distance_km,
                discount_code: details.discount_code,
                payment_method: details.payment_method,
                buyer_note: details.buyer_note,
            })
            .await?;
        self.clear(session).await;
        Ok(order)
    }
}
