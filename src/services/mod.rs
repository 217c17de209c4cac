//! Service layer: explicit, injectable state holders. All mutation goes
//! through declared operations; nothing ambient.

pub mod carts;
pub mod geocode;
pub mod orders;

pub use carts::{CartService, CheckoutDetails};
pub use geocode::{MapPlatform, NoopGeocoder, PinAddressResolver, ReverseGeocode};
pub use orders::{OrderService, RiderReview, RiderStats};
