//! Domain events raised by order transitions. Drained by the service layer
//! and emitted to the log stream.

use rust_decimal::Decimal;

#[derive(Clone, Debug)]
pub enum OrderEvent {
    Created {
        order_id: String,
        customer_id: String,
        grand_total: Decimal,
    },
    Confirmed {
        order_id: String,
    },
    WaitingRider {
        order_id: String,
    },
    RiderAssigned {
        order_id: String,
        rider_id: String,
    },
    PickedUp {
        order_id: String,
    },
    Delivered {
        order_id: String,
    },
    Completed {
        order_id: String,
    },
    Cancelled {
        order_id: String,
    },
    RiderRated {
        order_id: String,
        stars: u8,
    },
}
