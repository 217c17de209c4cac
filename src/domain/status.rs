//! Order status vocabulary.
//!
//! One canonical enumeration. Earlier app revisions shipped two overlapping
//! vocabularies (a short lowercase set and a long uppercase set); those legacy
//! spellings are accepted on deserialization only and never appear inside
//! business logic.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[serde(alias = "pending", alias = "PENDING_STORE_CONFIRM")]
    Pending,
    #[serde(alias = "confirmed", alias = "STORE_CONFIRMED")]
    Confirmed,
    WaitingRider,
    #[serde(alias = "assigned", alias = "RIDER_HEADING_TO_STORE")]
    RiderAssigned,
    #[serde(alias = "picked_up")]
    PickedUp,
    #[serde(
        alias = "delivered",
        alias = "RIDER_ARRIVED",
        alias = "DELIVERED_WAITING_PAYMENT"
    )]
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Lifecycle order, terminal states last.
    pub const ALL: [OrderStatus; 8] = [
        Self::Pending,
        Self::Confirmed,
        Self::WaitingRider,
        Self::RiderAssigned,
        Self::PickedUp,
        Self::Delivered,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::WaitingRider => "WAITING_RIDER",
            Self::RiderAssigned => "RIDER_ASSIGNED",
            Self::PickedUp => "PICKED_UP",
            Self::Delivered => "DELIVERED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Buyer-facing label, Thai like the rest of the product surface.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "ร้านค้ากำลังตรวจสอบคำสั่งซื้อ",
            Self::Confirmed => "ร้านค้ายืนยันคำสั่งแล้ว รอไรเดอร์รับงาน",
            Self::WaitingRider => "รอไรเดอร์รับงาน",
            Self::RiderAssigned => "ไรเดอร์รับงานแล้ว",
            Self::PickedUp => "ไรเดอร์รับสินค้าแล้ว กำลังนำส่ง",
            Self::Delivered | Self::Completed => "จัดส่งสำเร็จ",
            Self::Cancelled => "ถูกยกเลิก",
        }
    }

    /// Hex color used by status badges.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Pending => "#F5A623",
            Self::Cancelled => "#FF5C5C",
            _ => "#36D873",
        }
    }

    /// Active orders show in the "ongoing" view; terminal ones in history.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
