//! Order aggregate: the delivery lifecycle state machine.
//!
//! Every transition validates the current status before mutating and rejects
//! with a typed conflict error otherwise; an order is never left half-moved.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::events::OrderEvent;
use crate::domain::pricing;
use crate::domain::status::OrderStatus;
use crate::domain::value_objects::{GeoPoint, PinAuthor, PinLocation, PinSide, Rating};
use crate::{Error, Result};

/// Customer or store identity attached to an order. Address and location are
/// optional for stores; the dropoff pin falls back to the customer location
/// when no pin was dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Party {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

/// Rider contact details, set atomically at claim time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiderContact {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Latest reported rider coordinate. Overwritten wholesale; no history.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiderLiveLocation {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiderFeedback {
    pub stars: Rating,
    pub review: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuyerReview {
    pub rating: Rating,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Prepaid,
    #[default]
    Cod,
}

/// Checkout input assembled by the cart/session shell.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub customer: Party,
    pub store: Party,
    pub items: Vec<LineItem>,
    pub distance_km: f64,
    pub discount_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub buyer_note: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer: Party,
    pub store: Party,
    #[serde(default)]
    pub rider: Option<RiderContact>,

    #[serde(default)]
    pub pickup_pin: Option<PinLocation>,
    #[serde(default)]
    pub dropoff_pin: Option<PinLocation>,

    pub items: Vec<LineItem>,

    pub items_total: Decimal,
    pub delivery_fee: Decimal,
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    pub discount_amount: Option<Decimal>,
    pub grand_total: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub buyer_note: Option<String>,

    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub rider_live_location: Option<RiderLiveLocation>,
    #[serde(default)]
    pub rider_rating: Option<RiderFeedback>,
    #[serde(default)]
    pub buyer_review: Option<BuyerReview>,

    #[serde(skip)]
    events: Vec<OrderEvent>,
}

impl Order {
    pub fn create(new: NewOrder) -> Result<Self> {
        if new.items.is_empty() {
            return Err(Error::EmptyCart);
        }
        if new.customer.id.trim().is_empty() || new.customer.name.trim().is_empty() {
            return Err(Error::Validation("customer identity is required".into()));
        }

        let items_total: Decimal = new.items.iter().map(LineItem::line_total).sum();
        let delivery_fee = pricing::delivery_fee(new.distance_km);
        // An invalid or under-minimum code is dropped silently; checkout
        // proceeds without the discount.
        let discount = new
            .discount_code
            .as_deref()
            .and_then(|c| pricing::calculate_discount(c, items_total, delivery_fee));
        let grand_total = pricing::grand_total(items_total, delivery_fee, discount.as_ref());

        let now = Utc::now();
        let id = format!(
            "ORD-{}{:04}",
            now.timestamp_millis(),
            rand::random::<u16>() % 10_000
        );

        let mut order = Self {
            id: id.clone(),
            customer: new.customer,
            store: new.store,
            rider: None,
            pickup_pin: None,
            dropoff_pin: None,
            items: new.items,
            items_total,
            delivery_fee,
            discount_code: discount.as_ref().map(|d| d.code.clone()),
            discount_amount: discount.as_ref().map(|d| d.amount),
            grand_total,
            payment_method: new.payment_method,
            buyer_note: new.buyer_note,
            status: OrderStatus::Pending,
            created_at: now,
            confirmed_at: None,
            assigned_at: None,
            picked_up_at: None,
            delivered_at: None,
            completed_at: None,
            cancelled_at: None,
            rider_live_location: None,
            rider_rating: None,
            buyer_review: None,
            events: vec![],
        };
        let customer_id = order.customer.id.clone();
        order.raise(OrderEvent::Created {
            order_id: id,
            customer_id,
            grand_total,
        });
        Ok(order)
    }

    fn guard(&self, expected: OrderStatus, action: &'static str) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }

    pub fn confirm(&mut self) -> Result<()> {
        self.guard(OrderStatus::Pending, "confirm")?;
        self.status = OrderStatus::Confirmed;
        self.confirmed_at = Some(Utc::now());
        self.raise(OrderEvent::Confirmed {
            order_id: self.id.clone(),
        });
        Ok(())
    }

    pub fn set_waiting_rider(&mut self) -> Result<()> {
        self.guard(OrderStatus::Confirmed, "open for riders")?;
        self.status = OrderStatus::WaitingRider;
        self.raise(OrderEvent::WaitingRider {
            order_id: self.id.clone(),
        });
        Ok(())
    }

    /// Claims the job for `rider`. Conditional: succeeds only while no rider
    /// is set, so a second concurrent claim gets `AlreadyClaimed` instead of
    /// silently overwriting the winner.
    pub fn assign_rider(&mut self, rider: RiderContact) -> Result<()> {
        if self.rider.is_some() {
            return Err(Error::AlreadyClaimed);
        }
        self.guard(OrderStatus::WaitingRider, "assign rider")?;
        let rider_id = rider.id.clone();
        self.rider = Some(rider);
        self.status = OrderStatus::RiderAssigned;
        self.assigned_at = Some(Utc::now());
        self.raise(OrderEvent::RiderAssigned {
            order_id: self.id.clone(),
            rider_id,
        });
        Ok(())
    }

    /// Only the assigned rider can confirm pickup.
    pub fn confirm_pickup(&mut self, caller_rider_id: &str) -> Result<()> {
        self.guard(OrderStatus::RiderAssigned, "confirm pickup")?;
        match &self.rider {
            Some(r) if r.id == caller_rider_id => {}
            _ => return Err(Error::RiderMismatch),
        }
        self.status = OrderStatus::PickedUp;
        self.picked_up_at = Some(Utc::now());
        self.raise(OrderEvent::PickedUp {
            order_id: self.id.clone(),
        });
        Ok(())
    }

    pub fn confirm_delivery(&mut self) -> Result<()> {
        self.guard(OrderStatus::PickedUp, "confirm delivery")?;
        self.status = OrderStatus::Delivered;
        self.delivered_at = Some(Utc::now());
        self.raise(OrderEvent::Delivered {
            order_id: self.id.clone(),
        });
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.guard(OrderStatus::Delivered, "complete")?;
        self.status = OrderStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.raise(OrderEvent::Completed {
            order_id: self.id.clone(),
        });
        Ok(())
    }

    /// Reachable from any non-terminal state.
    pub fn cancel(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: self.status,
                action: "cancel",
            });
        }
        self.status = OrderStatus::Cancelled;
        self.cancelled_at = Some(Utc::now());
        self.raise(OrderEvent::Cancelled {
            order_id: self.id.clone(),
        });
        Ok(())
    }

    pub fn rate_rider(&mut self, stars: u8, review: impl Into<String>) -> Result<()> {
        self.guard(OrderStatus::Completed, "rate rider")?;
        if self.rider_rating.is_some() {
            return Err(Error::AlreadyRated);
        }
        let stars = Rating::new(stars)?;
        self.rider_rating = Some(RiderFeedback {
            stars,
            review: review.into(),
        });
        self.raise(OrderEvent::RiderRated {
            order_id: self.id.clone(),
            stars: stars.stars(),
        });
        Ok(())
    }

    pub fn add_buyer_review(&mut self, rating: u8, comment: impl Into<String>) -> Result<()> {
        self.guard(OrderStatus::Completed, "review")?;
        self.buyer_review = Some(BuyerReview {
            rating: Rating::new(rating)?,
            comment: comment.into(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    /// Latest coordinate wins; independent of the order status.
    pub fn update_live_location(&mut self, location: RiderLiveLocation) {
        self.rider_live_location = Some(location);
    }

    /// Pins stay editable until the parcel is delivered.
    fn pins_locked(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Delivered | OrderStatus::Completed | OrderStatus::Cancelled
        )
    }

    /// Replaces the pin wholesale. Any previously resolved address is
    /// discarded along with the old coordinate.
    pub fn set_pin(&mut self, side: PinSide, coord: GeoPoint, note: Option<String>) -> Result<()> {
        if self.pins_locked() {
            return Err(Error::PinLocked);
        }
        let author = match side {
            PinSide::Pickup => PinAuthor::Merchant,
            PinSide::Dropoff => PinAuthor::Customer,
        };
        let pin = PinLocation::new(coord, note, author);
        match side {
            PinSide::Pickup => self.pickup_pin = Some(pin),
            PinSide::Dropoff => self.dropoff_pin = Some(pin),
        }
        Ok(())
    }

    /// Patches the resolved address into a pin without moving it. Applied
    /// only while the pin still sits at `coord`; a result for a superseded
    /// coordinate is dropped. Returns whether the address was applied.
    pub fn merge_pin_address(&mut self, side: PinSide, coord: GeoPoint, address: String) -> bool {
        let pin = match side {
            PinSide::Pickup => self.pickup_pin.as_mut(),
            PinSide::Dropoff => self.dropoff_pin.as_mut(),
        };
        match pin {
            Some(p) if p.coord() == coord => {
                p.address_text = Some(address);
                true
            }
            _ => false,
        }
    }

    /// Re-runs the stored discount code against the current subtotal and fee.
    /// A code whose minimum no longer holds is cleared, not partially kept.
    pub fn revalidate_discount(&mut self) {
        let discount = self
            .discount_code
            .as_deref()
            .and_then(|c| pricing::calculate_discount(c, self.items_total, self.delivery_fee));
        self.discount_code = discount.as_ref().map(|d| d.code.clone());
        self.discount_amount = discount.as_ref().map(|d| d.amount);
        self.grand_total =
            pricing::grand_total(self.items_total, self.delivery_fee, discount.as_ref());
    }

    /// Admission filter for the rider job feed.
    pub fn is_claimable(&self) -> bool {
        self.status == OrderStatus::WaitingRider && self.rider.is_none()
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> {
        std::mem::take(&mut self.events)
    }

    fn raise(&mut self, event: OrderEvent) {
        self.events.push(event);
    }
}
