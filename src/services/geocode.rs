//! Reverse geocoding for delivery pins, plus the native-map deep link.
//!
//! Pin drags generate bursts of coordinates; lookups are debounced behind a
//! settle window and a superseded in-flight lookup's result is discarded, not
//! applied out of order. Any failure leaves the pin coordinate-only, which
//! stays fully valid; geocoding never blocks pin confirmation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::value_objects::{GeoPoint, PinSide};
use crate::services::orders::OrderService;
use crate::{Error, Result};

#[async_trait]
pub trait ReverseGeocode: Send + Sync {
    async fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<String>;
}

/// Stand-in for deployments without a geocoding provider. Pins simply stay
/// without an address text.
pub struct NoopGeocoder;

#[async_trait]
impl ReverseGeocode for NoopGeocoder {
    async fn reverse_geocode(&self, _lat: f64, _lng: f64) -> Result<String> {
        Err(Error::GeocodeUnavailable)
    }
}

pub struct PinAddressResolver {
    geocoder: Arc<dyn ReverseGeocode>,
    orders: Arc<OrderService>,
    settle: Duration,
    lookup_timeout: Duration,
    counter: AtomicU64,
    // Latest token per pin; a task whose token was overtaken stops.
    tokens: Mutex<HashMap<(String, PinSide), u64>>,
}

impl PinAddressResolver {
    pub fn new(geocoder: Arc<dyn ReverseGeocode>, orders: Arc<OrderService>) -> Self {
        Self {
            geocoder,
            orders,
            settle: Duration::from_millis(800),
            lookup_timeout: Duration::from_secs(5),
            counter: AtomicU64::new(0),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timing(mut self, settle: Duration, lookup_timeout: Duration) -> Self {
        self.settle = settle;
        self.lookup_timeout = lookup_timeout;
        self
    }

    /// Queues an address lookup for a freshly placed pin. Fire-and-forget:
    /// the resolved text is merged into the pin in the background.
    pub fn schedule(self: &Arc<Self>, order_id: String, side: PinSide, coord: GeoPoint) {
        let token = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((order_id.clone(), side), token);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.resolve(&order_id, side, coord, token).await;
            this.finish(&order_id, side, token);
        });
    }

    async fn resolve(&self, order_id: &str, side: PinSide, coord: GeoPoint, token: u64) {
        tokio::time::sleep(self.settle).await;
        // The pin moved again during the settle window.
        if !self.is_current(order_id, side, token) {
            return;
        }

        let lookup = self.geocoder.reverse_geocode(coord.lat, coord.lng);
        let address = match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(address)) => address,
            Ok(Err(e)) => {
                tracing::warn!(%order_id, ?side, error = %e, "reverse geocode failed, pin stays coordinate-only");
                return;
            }
            Err(_) => {
                tracing::warn!(%order_id, ?side, "reverse geocode timed out, pin stays coordinate-only");
                return;
            }
        };

        // Superseded while the lookup was in flight.
        if !self.is_current(order_id, side, token) {
            return;
        }
        match self
            .orders
            .merge_pin_address(order_id, side, coord, address)
            .await
        {
            Ok(true) => tracing::debug!(%order_id, ?side, "pin address resolved"),
            Ok(false) => tracing::debug!(%order_id, ?side, "stale geocode result dropped"),
            Err(e) => tracing::warn!(%order_id, ?side, error = %e, "could not merge pin address"),
        }
    }

    fn is_current(&self, order_id: &str, side: PinSide, token: u64) -> bool {
        self.tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&(order_id.to_string(), side))
            == Some(&token)
    }

    /// Drops the pin's token entry once its task is done, unless a newer
    /// placement already replaced it. Keeps the map bounded by in-flight work.
    fn finish(&self, order_id: &str, side: PinSide, token: u64) {
        let mut tokens = self
            .tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let key = (order_id.to_string(), side);
        if tokens.get(&key) == Some(&token) {
            tokens.remove(&key);
        }
    }
}

/// Platform of the device asking for turn-by-turn navigation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapPlatform {
    Ios,
    Android,
}

/// Deep link that opens the device's native map app at a destination.
/// Fire-and-forget on the client; nothing comes back.
pub fn navigation_url(platform: MapPlatform, coord: GeoPoint, label: &str) -> String {
    match platform {
        MapPlatform::Ios => format!("maps:0,0?q={}@{},{}", label, coord.lat, coord.lng),
        MapPlatform::Android => format!("geo:0,0?q={},{}({})", coord.lat, coord.lng, label),
    }
}
