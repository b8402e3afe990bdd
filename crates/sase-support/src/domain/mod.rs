//! Domain module
//!
//! Ticket aggregate, value objects, events and the pure domain services.

pub mod aggregates;
pub mod events;
pub mod services;
pub mod value_objects;

pub use aggregates::*;
pub use events::*;
pub use value_objects::*;
