//! Value objects for the delivery domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Normalized geographic point. Persisted data carries coordinates under
/// either `lat`/`lng` or `latitude`/`longitude` (a schema-migration
/// leftover); both spellings deserialize into the one canonical pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// Who last moved a pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinAuthor {
    Merchant,
    Customer,
}

/// Which side of the delivery a pin belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinSide {
    Pickup,
    Dropoff,
}

impl PinSide {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pickup" => Some(Self::Pickup),
            "dropoff" => Some(Self::Dropoff),
            _ => None,
        }
    }
}

/// A delivery pin: coordinate plus optional driver note and resolved address.
///
/// Edits replace the whole pin; only `address_text` may be patched in place,
/// by background reverse geocoding that must not move the coordinate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinLocation {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, alias = "address")]
    pub address_text: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: Option<PinAuthor>,
}

impl PinLocation {
    pub fn new(coord: GeoPoint, note: Option<String>, updated_by: PinAuthor) -> Self {
        Self {
            lat: coord.lat,
            lng: coord.lng,
            note,
            address_text: None,
            updated_at: Utc::now(),
            updated_by: Some(updated_by),
        }
    }

    pub fn coord(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Star rating, always within 1..=5. The bound also holds on
/// deserialization, so a tampered persisted record cannot smuggle one in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub fn new(stars: u8) -> Result<Self> {
        if (1..=5).contains(&stars) {
            Ok(Self(stars))
        } else {
            Err(Error::Validation(format!(
                "rating must be between 1 and 5, got {stars}"
            )))
        }
    }

    pub fn stars(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = Error;

    fn try_from(stars: u8) -> Result<Self> {
        Self::new(stars)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_spelling_normalization() {
        let short: PinLocation =
            serde_json::from_str(r#"{"lat":13.75,"lng":100.5,"updated_at":"2025-01-01T00:00:00Z"}"#)
                .unwrap();
        let long: PinLocation = serde_json::from_str(
            r#"{"latitude":13.75,"longitude":100.5,"updated_at":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(short.coord(), long.coord());
        assert_eq!(short.coord(), GeoPoint::new(13.75, 100.5));
    }

    #[test]
    fn test_geopoint_legacy_spelling() {
        let p: GeoPoint = serde_json::from_str(r#"{"latitude":16.43,"longitude":102.83}"#).unwrap();
        assert_eq!(p, GeoPoint::new(16.43, 102.83));
        // Canonical shape on write.
        assert_eq!(
            serde_json::to_string(&p).unwrap(),
            r#"{"lat":16.43,"lng":102.83}"#
        );
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert_eq!(Rating::new(5).unwrap().stars(), 5);
    }

    #[test]
    fn test_rating_bound_enforced_on_load() {
        // A hand-edited or corrupt persisted record must not get past 1..=5.
        assert!(serde_json::from_str::<Rating>("9").is_err());
        assert!(serde_json::from_str::<Rating>("0").is_err());
        assert_eq!(serde_json::from_str::<Rating>("3").unwrap().stars(), 3);
        assert_eq!(
            serde_json::to_string(&Rating::new(4).unwrap()).unwrap(),
            "4"
        );
    }
}
