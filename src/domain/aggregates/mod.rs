//! Aggregates module
pub mod cart;
pub mod order;

pub use cart::{Cart, CartLine, ProductSnapshot};
pub use order::{
    LineItem, NewOrder, Order, Party, PaymentMethod, RiderContact, RiderLiveLocation,
};
