//! Domain layer: aggregates, value objects, pricing and status vocabulary.

pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod status;
pub mod value_objects;
