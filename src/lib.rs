//! NadHub Delivery Core
//!
//! Local-delivery marketplace service for buyer/merchant/rider flows.
//!
//! ## Features
//! - Order lifecycle state machine (pending through completion/cancellation)
//! - Pickup/dropoff pin management with reverse-geocoded addresses
//! - Delivery fee and discount computation
//! - Live rider-location tracking
//! - Session shopping carts

use thiserror::Error;

pub mod domain;
pub mod services;
pub mod storage;

pub use domain::aggregates::{Cart, CartLine, LineItem, Order, Party, RiderContact};
pub use domain::status::OrderStatus;
pub use domain::value_objects::{GeoPoint, PinLocation, PinSide};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum Error {
    #[error("order not found")]
    OrderNotFound,

    #[error("cart line not found")]
    CartLineNotFound,

    #[error("cart is empty")]
    EmptyCart,

    #[error("{0}")]
    Validation(String),

    #[error("cannot {action} while order is {from}")]
    InvalidTransition {
        from: OrderStatus,
        action: &'static str,
    },

    #[error("order already claimed by another rider")]
    AlreadyClaimed,

    #[error("order is assigned to a different rider")]
    RiderMismatch,

    #[error("rider already rated for this order")]
    AlreadyRated,

    #[error("pins are locked once the order is delivered")]
    PinLocked,

    #[error("reverse geocoding unavailable")]
    GeocodeUnavailable,

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// State-conflict errors get their own class so callers can tell
    /// "this job was just taken" apart from a generic failure.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::InvalidTransition { .. }
                | Error::AlreadyClaimed
                | Error::RiderMismatch
                | Error::AlreadyRated
                | Error::PinLocked
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
