//! Cart aggregate: session-scoped line items feeding checkout.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::order::LineItem;
use crate::{Error, Result};

/// Product fields a cart line snapshots at add time. The price is frozen at
/// that moment; later catalog changes do not touch lines already in the cart.
#[derive(Clone, Debug, Deserialize)]
pub struct ProductSnapshot {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
    pub merchant_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartLine {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image_url: Option<String>,
    pub merchant_id: String,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Derived on every read, never stored.
    pub fn items_total(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Merges by product id: an existing line grows its quantity, a new
    /// product appends a fresh line with a snapshot of the catalog fields.
    pub fn add(&mut self, product: ProductSnapshot, quantity: u32) {
        let quantity = quantity.max(1);
        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            line.quantity += quantity;
            return;
        }
        self.lines.push(CartLine {
            id: Uuid::new_v4().to_string(),
            product_id: product.id,
            product_name: product.name,
            price: product.price,
            quantity,
            image_url: product.image_url,
            merchant_id: product.merchant_id,
        });
    }

    /// A quantity of zero removes the line; zero/negative quantities are
    /// never stored.
    pub fn update_quantity(&mut self, line_id: &str, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return self.remove(line_id);
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or(Error::CartLineNotFound)?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn remove(&mut self, line_id: &str) -> Result<()> {
        let before = self.lines.len();
        self.lines.retain(|l| l.id != line_id);
        if self.lines.len() == before {
            return Err(Error::CartLineNotFound);
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Order line items for checkout.
    pub fn to_line_items(&self) -> Vec<LineItem> {
        self.lines
            .iter()
            .map(|l| LineItem {
                product_id: l.product_id.clone(),
                product_name: l.product_name.clone(),
                price: l.price,
                quantity: l.quantity,
                image_url: l.image_url.clone(),
            })
            .collect()
    }
}
